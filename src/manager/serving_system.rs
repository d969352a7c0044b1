//! # Serving-system manager stub.
//!
//! Listeners subscribe with a [`ServingSystemNotificationMask`]. Every
//! registered listener is also a *default* listener and receives network time
//! and selection preference updates; the mask bits select the optional
//! notifications.
//!
//! Filter keys follow the activation edges reported by the registry:
//!
//! | bit                     | filter key                              |
//! |-------------------------|-----------------------------------------|
//! | (any non-empty mask)    | `tel_serving_system_selection_pref`, `tel_serving_system_network_time` |
//! | `SYSTEM_INFO`           | `tel_serving_system_info`               |
//! | `RF_BAND_INFO`          | `tel_serving_system_rf_band_info`       |
//! | `NETWORK_REJ_INFO`      | `tel_serving_system_network_rej_info`   |
//! | `LTE_SIB16_NETWORK_TIME`, `NR5G_RRC_UTC_TIME` | served by the network-time default key |

use std::sync::{Arc, Weak};

use tracing::debug;

use crate::dispatch::{EventDispatcher, EventTarget, Payload};
use crate::error::{ErrorCode, Status, StubError, StubResult};
use crate::listeners::ListenerRegistry;
use crate::manager::{ServiceCore, ServiceStatus, ServingSystemTransport};
use crate::runtime::Runtime;

const SELECTION_PREF_FILTER: &str = "tel_serving_system_selection_pref";
const NETWORK_TIME_FILTER: &str = "tel_serving_system_network_time";
const DEFAULT_FILTERS: [&str; 2] = [SELECTION_PREF_FILTER, NETWORK_TIME_FILTER];

bitflags::bitflags! {
    /// Optional serving-system notifications.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ServingSystemNotificationMask: u32 {
        const SYSTEM_INFO = 1 << 0;
        const RF_BAND_INFO = 1 << 1;
        const NETWORK_REJ_INFO = 1 << 2;
        const LTE_SIB16_NETWORK_TIME = 1 << 3;
        const NR5G_RRC_UTC_TIME = 1 << 4;
    }
}

/// Pseudo mask selecting every notification, current and future.
///
/// Expanded to the defined bits on entry; it is never stored.
pub const ALL_NOTIFICATIONS: ServingSystemNotificationMask =
    ServingSystemNotificationMask::from_bits_retain(u32::MAX);

impl ServingSystemNotificationMask {
    /// Filter keys owned by the bits of this mask.
    fn filter_keys(self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.contains(Self::SYSTEM_INFO) {
            keys.push("tel_serving_system_info");
        }
        if self.contains(Self::RF_BAND_INFO) {
            keys.push("tel_serving_system_rf_band_info");
        }
        if self.contains(Self::NETWORK_REJ_INFO) {
            keys.push("tel_serving_system_network_rej_info");
        }
        keys
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadioTechnology {
    #[default]
    Unknown,
    Gsm,
    Wcdma,
    Lte,
    Nr5g,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceDomain {
    #[default]
    Unknown,
    CsOnly,
    PsOnly,
    CsPs,
    Camped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationState {
    #[default]
    Unknown,
    InService,
    LimitedService,
    NoService,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemInfo {
    pub rat: RadioTechnology,
    pub domain: ServiceDomain,
    pub state: RegistrationState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RfBandInfo {
    pub band: u32,
    pub channel: u32,
    pub bandwidth_mhz: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkRejectInfo {
    pub rat: RadioTechnology,
    pub domain: ServiceDomain,
    pub cause: u8,
    pub mcc: String,
    pub mnc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkTimeInfo {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub day_of_week: u8,
    /// Offset from UTC in 15-minute units.
    pub time_zone: i8,
    pub dst_adj: u8,
    pub nitz_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionPreference {
    /// One bit per preferred radio technology.
    pub rat_preference: u16,
    pub domain: ServiceDomain,
}

/// Inbound serving-system event, as produced by the transport.
#[derive(Debug, Clone)]
pub struct ServingSystemEvent {
    pub phone_id: i32,
    pub update: ServingSystemUpdate,
}

#[derive(Debug, Clone)]
pub enum ServingSystemUpdate {
    SystemInfo(SystemInfo),
    RfBandInfo(RfBandInfo),
    NetworkRejection(NetworkRejectInfo),
    NetworkTime(NetworkTimeInfo),
    SelectionPreference(SelectionPreference),
}

/// Application-side serving-system observer. Every method defaults to a no-op.
pub trait ServingSystemListener: Send + Sync + 'static {
    fn on_system_info_changed(&self, _info: &SystemInfo) {}
    fn on_rf_band_info_changed(&self, _info: &RfBandInfo) {}
    fn on_network_rejection(&self, _info: &NetworkRejectInfo) {}
    fn on_network_time_changed(&self, _info: &NetworkTimeInfo) {}
    fn on_selection_preference_changed(&self, _pref: &SelectionPreference) {}
}

/// Serving-system manager for one phone (subscription slot).
///
/// A listener dropped without deregistering is pruned silently: its bits never
/// show up in a deactivation edge, so their filter keys stay subscribed until
/// another listener registers that bit and [deregisters](Self::deregister_listener) it.
pub struct ServingSystemManager {
    core: ServiceCore,
    transport: Arc<dyn ServingSystemTransport>,
    listeners: ListenerRegistry<dyn ServingSystemListener, ServingSystemNotificationMask>,
    dispatcher: Arc<EventDispatcher>,
    me: Weak<ServingSystemManager>,
}

impl ServingSystemManager {
    pub fn new(
        runtime: &Runtime,
        phone_id: i32,
        transport: Arc<dyn ServingSystemTransport>,
    ) -> Arc<Self> {
        let name = format!("serving-system-{phone_id}");
        Arc::new_cyclic(|me| Self {
            core: ServiceCore::new(name.as_str(), phone_id, runtime),
            transport,
            listeners: ListenerRegistry::new(name.as_str(), runtime.bus().clone()),
            dispatcher: Arc::clone(runtime.dispatcher()),
            me: Weak::clone(me),
        })
    }

    pub fn init(&self, callback: impl FnOnce(ServiceStatus) + Send + 'static) -> StubResult<Status> {
        let transport = Arc::clone(&self.transport);
        let phone_id = self.core.phone_id();
        self.core
            .init(async move { transport.init(phone_id).await }, Box::new(callback))
    }

    pub fn on_ready(&self, callback: impl FnOnce(ServiceStatus) + Send + 'static) -> StubResult<()> {
        self.core.on_ready(Box::new(callback))
    }

    pub fn service_status(&self) -> ServiceStatus {
        self.core.service_status()
    }

    /// Registers `listener` for the default notifications plus `mask`.
    ///
    /// [`ALL_NOTIFICATIONS`] selects every defined bit. With an empty mask only
    /// the default listener registration happens.
    ///
    /// ### Errors
    /// - [`StubError::NotReady`] unless available
    /// - [`StubError::InvalidParam`] for a dropped listener
    pub fn register_listener(
        &self,
        listener: Weak<dyn ServingSystemListener>,
        mask: ServingSystemNotificationMask,
    ) -> StubResult<Status> {
        self.core.ensure_ready()?;
        let mask = expand(mask);

        let status = self.listeners.register(Weak::clone(&listener))?;
        if mask.is_empty() {
            return Ok(status);
        }

        self.dispatcher.subscribe(self.target(), &DEFAULT_FILTERS)?;
        let reg = self.listeners.register_mask(listener, mask)?;
        let keys = reg.first_activated.filter_keys();
        if !keys.is_empty() {
            debug!(manager = self.core.name(), ?keys, "subscribing optional notifications");
            self.dispatcher.subscribe(self.target(), &keys)?;
        }
        Ok(reg.status)
    }

    /// Deregisters `listener` from `mask`.
    ///
    /// [`ALL_NOTIFICATIONS`] also removes the default registration; in that case a
    /// listener without optional notifications is not an error.
    ///
    /// ### Errors
    /// - [`StubError::InvalidParam`] for an empty mask
    /// - [`StubError::NoSuch`] when the listener held none of the bits
    pub fn deregister_listener(
        &self,
        listener: &Weak<dyn ServingSystemListener>,
        mask: ServingSystemNotificationMask,
    ) -> StubResult<Status> {
        self.core.ensure_ready()?;
        if mask.is_empty() {
            return Err(StubError::invalid("empty notification mask"));
        }

        let all = mask == ALL_NOTIFICATIONS;
        if all {
            self.listeners.deregister(listener)?;
        }
        let last = match self.listeners.deregister_mask(listener, expand(mask)) {
            Ok(last) => last,
            Err(e) if all && e.is_no_such() => {
                self.release_default_filters()?;
                return Ok(Status::Success);
            }
            Err(e) => return Err(e),
        };

        let keys = last.filter_keys();
        if !keys.is_empty() {
            debug!(manager = self.core.name(), ?keys, "releasing optional notifications");
            ignore_no_such(self.dispatcher.unsubscribe(&self.target(), &keys))?;
        }
        self.release_default_filters()?;
        Ok(Status::Success)
    }

    /// Asks the server for the current system info.
    pub fn request_system_info(
        &self,
        callback: impl FnOnce(ErrorCode, SystemInfo) + Send + 'static,
    ) -> StubResult<()> {
        let transport = Arc::clone(&self.transport);
        let phone_id = self.core.phone_id();
        self.core.request(
            "request_system_info",
            async move { transport.request_system_info(phone_id).await },
            callback,
        )
    }

    /// Notification bits with at least one listener.
    pub fn active_notifications(&self) -> ServingSystemNotificationMask {
        self.listeners.active_mask()
    }

    pub async fn shutdown(&self) {
        self.core.shutdown().await;
    }

    fn target(&self) -> Weak<dyn EventTarget> {
        self.me.clone()
    }

    /// Drops the default filter keys once nobody needs them.
    fn release_default_filters(&self) -> StubResult<()> {
        if !self.listeners.listeners().is_empty() || !self.listeners.active_mask().is_empty() {
            return Ok(());
        }
        let target = self.target();
        if !self.dispatcher.is_subscribed(&target, SELECTION_PREF_FILTER) {
            return Ok(());
        }
        ignore_no_such(self.dispatcher.unsubscribe(&target, &DEFAULT_FILTERS))
    }
}

impl EventTarget for ServingSystemManager {
    fn on_event(&self, _key: &str, payload: &Payload) {
        let Some(event) = payload.downcast_ref::<ServingSystemEvent>() else {
            return;
        };
        if event.phone_id != self.core.phone_id() {
            debug!(manager = self.core.name(), phone_id = event.phone_id, "event for another phone ignored");
            return;
        }

        use ServingSystemNotificationMask as Bit;
        match &event.update {
            ServingSystemUpdate::SystemInfo(info) => self
                .listeners
                .fanout(Bit::SYSTEM_INFO, |l| l.on_system_info_changed(info)),
            ServingSystemUpdate::RfBandInfo(info) => self
                .listeners
                .fanout(Bit::RF_BAND_INFO, |l| l.on_rf_band_info_changed(info)),
            ServingSystemUpdate::NetworkRejection(info) => self
                .listeners
                .fanout(Bit::NETWORK_REJ_INFO, |l| l.on_network_rejection(info)),
            ServingSystemUpdate::NetworkTime(info) => self
                .listeners
                .broadcast(|l| l.on_network_time_changed(info)),
            ServingSystemUpdate::SelectionPreference(pref) => self
                .listeners
                .broadcast(|l| l.on_selection_preference_changed(pref)),
        }
    }
}

/// Reduces a raw mask (including [`ALL_NOTIFICATIONS`]) to the defined bits.
fn expand(mask: ServingSystemNotificationMask) -> ServingSystemNotificationMask {
    ServingSystemNotificationMask::from_bits_truncate(mask.bits())
}

fn ignore_no_such(res: StubResult<()>) -> StubResult<()> {
    match res {
        Err(e) if e.is_no_such() => Ok(()),
        other => other,
    }
}
