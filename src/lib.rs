//! # simstub
//!
//! **simstub** is an async runtime for manager stubs of a simulated telephony
//! stack. Each stub answers requests with artificial delays, keeps track of
//! application listeners, and turns inbound transport events into listener
//! notifications.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   application                     simstub                            transport
//! ┌─────────────┐  init/request  ┌──────────────────────┐  async calls  ┌───────────┐
//! │  callbacks  │ ─────────────► │ SmsManager           │ ────────────► │ Sms/SS    │
//! │  listeners  │ ◄── delayed ── │ ServingSystemManager │               │ Transport │
//! └─────────────┘   (TaskQueue)  │   └─ ServiceCore     │               └───────────┘
//!        ▲                       └──────────▲───────────┘                     │
//!        │ fanout (ListenerRegistry)        │ on_event                        │
//!        │                        ┌─────────┴─────────┐   (key, payload)      │
//!        └──────────────────────  │  EventDispatcher  │ ◄── EventPump ◄───────┘
//!                                 │  filter key → set │      (EventSource)
//!                                 └─────────┬─────────┘
//!                                           ▼
//!                                 Upstream (active filters)
//! ```
//!
//! ### Runtime events
//! ```text
//! TaskQueue / ListenerRegistry / EventDispatcher / SegmentReassembler / ServiceCore
//!        │ publish(Event)
//!        ▼
//!  Bus (broadcast) ──► Runtime listener ──► SubscriberSet ──► worker ──► Subscribe::on_event
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                                  |
//! |-------------------|----------------------------------------------------------------|-----------------------------------------------------|
//! | **Managers**      | SMS and serving-system stubs with init and delayed replies.    | [`SmsManager`], [`ServingSystemManager`]            |
//! | **Transport**     | Seams to the simulated server.                                 | [`SmsTransport`], [`ServingSystemTransport`]        |
//! | **Listeners**     | Weak, mask-aware listener bookkeeping with panic isolation.    | [`ListenerRegistry`]                                |
//! | **Dispatch**      | Filter-key routing of inbound events, upstream filter sync.    | [`EventDispatcher`], [`EventPump`], [`Upstream`]    |
//! | **Reassembly**    | Multi-part SMS reassembly keyed by sender and reference.       | [`SegmentReassembler`]                              |
//! | **Deferred work** | Delayed completions with owner guards and ordered lane.        | [`TaskQueue`], [`Task`]                             |
//! | **Subscribers**   | Observe runtime events (logging, metrics, tests).              | [`Subscribe`], [`SubscriberSet`]                    |
//! | **Configuration** | Centralized runtime settings.                                  | [`Config`], [`ReconnectPolicy`]                     |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```no_run
//! use std::sync::{Arc, Weak};
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use simstub::{
//!     Config, DeliveryRecord, InitReply, Reply, Runtime, ServiceStatus, ServiceTransport,
//!     SmsListener, SmsManager, SmsMessage, SmsTransport, StubResult,
//! };
//!
//! struct Loopback;
//!
//! #[async_trait]
//! impl ServiceTransport for Loopback {
//!     async fn init(&self, _phone_id: i32) -> StubResult<InitReply> {
//!         Ok(InitReply { status: ServiceStatus::Available, delay: Duration::from_millis(10) })
//!     }
//! }
//!
//! #[async_trait]
//! impl SmsTransport for Loopback {
//!     async fn send_sms(
//!         &self,
//!         _phone_id: i32,
//!         _text: &str,
//!         _to: &str,
//!     ) -> StubResult<Reply<Vec<DeliveryRecord>>> {
//!         Ok(Reply::ok(Vec::new(), Duration::from_millis(10)))
//!     }
//! }
//!
//! struct Printer;
//!
//! impl SmsListener for Printer {
//!     fn on_incoming_messages(&self, phone_id: i32, parts: &[SmsMessage]) {
//!         let text: String = parts.iter().map(|m| m.text.as_str()).collect();
//!         println!("phone {phone_id}: {text}");
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::builder(Config::default()).build();
//!     let sms = SmsManager::new(&runtime, 0, Arc::new(Loopback));
//!
//!     let (tx, rx) = tokio::sync::oneshot::channel();
//!     sms.init(move |status| {
//!         let _ = tx.send(status);
//!     })?;
//!     assert_eq!(rx.await?, ServiceStatus::Available);
//!
//!     let printer = Arc::new(Printer);
//!     sms.register_listener(Arc::downgrade(&printer) as Weak<dyn SmsListener>)?;
//!     sms.send_sms("hello", "+15550100", false, |code| println!("sent: {code:?}"))?;
//!
//!     sms.shutdown().await;
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```
mod config;
mod dispatch;
mod error;
mod events;
mod listeners;
mod manager;
mod policies;
mod queue;
mod reassembly;
mod runtime;
mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use dispatch::{
    ALL_FILTER, EventDispatcher, EventPump, EventSource, EventTarget, FilterKey, InboundStream,
    NoopUpstream, Payload, Upstream,
};
pub use error::{ErrorCode, Status, StubError, StubResult};
pub use events::{Bus, Event, EventKind};
pub use listeners::{ListenerRegistry, Registration, Unmasked};
pub use manager::{
    ALL_NOTIFICATIONS, DeliveryRecord, InitCallback, InitReply, ManagerState, NetworkRejectInfo, NetworkTimeInfo,
    RadioTechnology, RegistrationState, Reply, RfBandInfo, SMS_FILTER, SelectionPreference,
    ServiceCore, ServiceDomain, ServiceStatus, ServiceTransport, ServingSystemEvent,
    ServingSystemListener, ServingSystemManager, ServingSystemNotificationMask,
    ServingSystemTransport, ServingSystemUpdate, SmsEvent, SmsListener, SmsManager, SmsMessage,
    SmsTransport, SmsUpdate, StorageType, SystemInfo,
};
pub use policies::ReconnectPolicy;
pub use queue::{BoxTaskFuture, Task, TaskQueue};
pub use reassembly::{MessageKey, Reassembly, SegmentInfo, SegmentReassembler};
pub use runtime::{Runtime, RuntimeBuilder};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
