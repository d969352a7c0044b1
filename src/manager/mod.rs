//! # Manager stubs: the composition of queue, registry, dispatcher and reassembler.
//!
//! Every manager follows the same shape:
//!
//! ```text
//!             init(cb) ─────────► ServiceCore ──► TaskQueue ──► transport.init()
//!                                   │  state: Uninitialized → Initializing → Available | Failed
//!                                   └─ replays queued readiness callbacks once resolved
//!
//! request(..) ─► ensure_ready ─► TaskQueue ─► transport call ─► sleep(reply.delay) ─► callback
//!
//! EventDispatcher ─► on_event(key, payload) ─► phone-id filter ─► (SegmentReassembler) ─► ListenerRegistry fanout
//! ```
//!
//! Managers are created from a [`Runtime`](crate::Runtime) and returned as `Arc`
//! so they can subscribe themselves to the dispatcher by weak reference.

mod service;
mod serving_system;
mod sms;
mod status;
mod transport;

pub use service::{InitCallback, ServiceCore};
pub use serving_system::{
    ALL_NOTIFICATIONS, NetworkRejectInfo, NetworkTimeInfo, RadioTechnology, RegistrationState,
    RfBandInfo, SelectionPreference, ServiceDomain, ServingSystemEvent, ServingSystemListener,
    ServingSystemManager, ServingSystemNotificationMask, ServingSystemUpdate, SystemInfo,
};
pub use sms::{SMS_FILTER, SmsEvent, SmsListener, SmsManager, SmsMessage, SmsUpdate, StorageType};
pub use status::{ManagerState, ServiceStatus};
pub use transport::{
    DeliveryRecord, InitReply, Reply, ServiceTransport, ServingSystemTransport, SmsTransport,
};
