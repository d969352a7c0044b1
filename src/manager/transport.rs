//! # Transport boundary of the manager stubs.
//!
//! The simulation server is reached through these traits. Each reply carries the
//! result code for the application callback, the artificial delay to apply
//! before invoking it, and whether a callback is wanted at all.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ErrorCode, StubResult};
use crate::manager::{ServiceStatus, SystemInfo};

/// Reply to an init request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReply {
    /// Service status reported by the server.
    pub status: ServiceStatus,
    /// Delay before readiness callbacks fire; also the manager's default
    /// completion delay from then on.
    pub delay: Duration,
}

/// Reply to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    pub error: ErrorCode,
    pub delay: Duration,
    pub callback_needed: bool,
    pub payload: T,
}

impl<T> Reply<T> {
    /// Successful reply wanting a callback after `delay`.
    pub fn ok(payload: T, delay: Duration) -> Self {
        Self {
            error: ErrorCode::Success,
            delay,
            callback_needed: true,
            payload,
        }
    }
}

/// Per-recipient outcome of a sent SMS, reported later as a delivery report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub msg_ref: u32,
    pub error: ErrorCode,
    /// Wait before this report, counted from the previous one.
    pub delay: Duration,
}

/// Service-level part shared by every manager transport.
#[async_trait]
pub trait ServiceTransport: Send + Sync + 'static {
    /// Asks the server for the service status of `phone_id`.
    async fn init(&self, phone_id: i32) -> StubResult<InitReply>;
}

/// Transport of the SMS manager.
#[async_trait]
pub trait SmsTransport: ServiceTransport {
    /// Sends one SMS. The payload lists the delivery records of the message.
    async fn send_sms(
        &self,
        phone_id: i32,
        text: &str,
        receiver: &str,
    ) -> StubResult<Reply<Vec<DeliveryRecord>>>;
}

/// Transport of the serving-system manager.
#[async_trait]
pub trait ServingSystemTransport: ServiceTransport {
    async fn request_system_info(&self, phone_id: i32) -> StubResult<Reply<SystemInfo>>;
}
