//! # SMS manager stub.
//!
//! Inbound `tel_sms` events are delivered segment by segment through
//! [`SmsListener::on_incoming_sms`]. Multi-part messages additionally go through
//! the [`SegmentReassembler`]; once every segment is present the ordered list is
//! delivered through [`SmsListener::on_incoming_messages`]. Single-part messages
//! skip the reassembler and are delivered as a one-element list right away.
//!
//! A send with `delivery_report` set schedules one [`SmsListener::on_delivery_report`]
//! per delivery record once the transport accepted the message. Reports run on
//! the manager's queue, each after its own delay, in record order.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::dispatch::{EventDispatcher, EventTarget, Payload};
use crate::error::{ErrorCode, Status, StubError, StubResult};
use crate::listeners::ListenerRegistry;
use crate::manager::{DeliveryRecord, ServiceCore, ServiceStatus, SmsTransport};
use crate::queue::Task;
use crate::reassembly::{Reassembly, SegmentInfo, SegmentReassembler};
use crate::runtime::Runtime;

/// Filter key of every SMS event.
pub const SMS_FILTER: &str = "tel_sms";

/// One received (or stored) SMS segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub text: String,
    pub sender: String,
    pub receiver: String,
    pub part: SegmentInfo,
}

impl SmsMessage {
    /// Single-part message.
    pub fn new(text: impl Into<String>, sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: sender.into(),
            receiver: receiver.into(),
            part: SegmentInfo::single(),
        }
    }

    pub fn with_part(mut self, part: SegmentInfo) -> Self {
        self.part = part;
        self
    }
}

/// Message storage that ran out of space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Unknown,
    Sim,
}

/// Inbound SMS event, as produced by the transport.
#[derive(Debug, Clone)]
pub struct SmsEvent {
    pub phone_id: i32,
    pub update: SmsUpdate,
}

#[derive(Debug, Clone)]
pub enum SmsUpdate {
    Incoming(SmsMessage),
    MemoryFull(StorageType),
}

/// Application-side SMS observer. Every method defaults to a no-op.
pub trait SmsListener: Send + Sync + 'static {
    /// One segment arrived (single-part messages included).
    fn on_incoming_sms(&self, _phone_id: i32, _message: &SmsMessage) {}

    /// A complete message, segments in order.
    fn on_incoming_messages(&self, _phone_id: i32, _messages: &[SmsMessage]) {}

    fn on_memory_full(&self, _phone_id: i32, _storage: StorageType) {}

    /// Outcome of a message sent with a delivery report requested.
    fn on_delivery_report(&self, _phone_id: i32, _msg_ref: u32, _receiver: &str, _error: ErrorCode) {}
}

/// SMS manager for one phone (subscription slot).
pub struct SmsManager {
    core: ServiceCore,
    transport: Arc<dyn SmsTransport>,
    listeners: ListenerRegistry<dyn SmsListener>,
    reassembler: SegmentReassembler<SmsMessage>,
    dispatcher: Arc<EventDispatcher>,
    assembly_ttl: Option<Duration>,
    me: Weak<SmsManager>,
}

impl SmsManager {
    pub fn new(runtime: &Runtime, phone_id: i32, transport: Arc<dyn SmsTransport>) -> Arc<Self> {
        let name = format!("sms-{phone_id}");
        Arc::new_cyclic(|me| Self {
            core: ServiceCore::new(name.as_str(), phone_id, runtime),
            transport,
            listeners: ListenerRegistry::new(name.as_str(), runtime.bus().clone()),
            reassembler: SegmentReassembler::new(runtime.bus().clone()),
            dispatcher: Arc::clone(runtime.dispatcher()),
            assembly_ttl: runtime.config().assembly_ttl(),
            me: Weak::clone(me),
        })
    }

    /// Starts initialization; `callback` fires once with the resolved status.
    pub fn init(&self, callback: impl FnOnce(ServiceStatus) + Send + 'static) -> StubResult<Status> {
        let transport = Arc::clone(&self.transport);
        let phone_id = self.core.phone_id();
        self.core
            .init(async move { transport.init(phone_id).await }, Box::new(callback))
    }

    /// Registers a readiness callback (replayed if already resolved).
    pub fn on_ready(&self, callback: impl FnOnce(ServiceStatus) + Send + 'static) -> StubResult<()> {
        self.core.on_ready(Box::new(callback))
    }

    pub fn service_status(&self) -> ServiceStatus {
        self.core.service_status()
    }

    pub fn phone_id(&self) -> i32 {
        self.core.phone_id()
    }

    /// Adds an SMS listener and makes sure the manager receives SMS events.
    pub fn register_listener(&self, listener: Weak<dyn SmsListener>) -> StubResult<Status> {
        self.core.ensure_ready()?;
        let status = self.listeners.register(listener)?;
        self.dispatcher.subscribe(self.target(), &[SMS_FILTER])?;
        Ok(status)
    }

    /// Removes an SMS listener; the last one releases the SMS filter.
    pub fn remove_listener(&self, listener: &Weak<dyn SmsListener>) -> StubResult<()> {
        self.core.ensure_ready()?;
        self.listeners.deregister(listener)?;
        if self.listeners.listeners().is_empty() {
            match self.dispatcher.unsubscribe(&self.target(), &[SMS_FILTER]) {
                Err(e) if !e.is_no_such() => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    /// Sends `text` to `receiver`; `callback` gets the transport's result code.
    ///
    /// With `delivery_report` set, a successful send is followed by delivery
    /// reports to every listener.
    ///
    /// ### Errors
    /// - [`StubError::InvalidParam`] for an empty text or receiver
    /// - [`StubError::NotReady`] unless the service is available
    pub fn send_sms(
        &self,
        text: &str,
        receiver: &str,
        delivery_report: bool,
        callback: impl FnOnce(ErrorCode) + Send + 'static,
    ) -> StubResult<()> {
        if text.is_empty() || receiver.is_empty() {
            return Err(StubError::invalid("empty message or receiver"));
        }
        let transport = Arc::clone(&self.transport);
        let phone_id = self.core.phone_id();
        let me = Weak::clone(&self.me);
        let text = text.to_string();
        let receiver = receiver.to_string();
        self.core.request(
            "send_sms",
            async move {
                let res = transport.send_sms(phone_id, &text, &receiver).await;
                if let Ok(reply) = &res {
                    if delivery_report && reply.error.is_success() {
                        if let Some(me) = me.upgrade() {
                            me.schedule_delivery_reports(receiver, reply.payload.clone());
                        }
                    }
                }
                res
            },
            move |code, _records| callback(code),
        )
    }

    /// Number of multi-part messages still waiting for segments.
    pub fn pending_messages(&self) -> usize {
        self.reassembler.pending()
    }

    /// Waits for every pending completion of this manager.
    pub async fn shutdown(&self) {
        self.core.shutdown().await;
    }

    fn schedule_delivery_reports(&self, receiver: String, records: Vec<DeliveryRecord>) {
        if records.is_empty() {
            return;
        }
        let me = Weak::clone(&self.me);
        let phone_id = self.core.phone_id();
        let task = Task::new("delivery_report", async move {
            for rec in records {
                tokio::time::sleep(rec.delay).await;
                let Some(me) = me.upgrade() else {
                    return;
                };
                me.listeners
                    .broadcast(|l| l.on_delivery_report(phone_id, rec.msg_ref, &receiver, rec.error));
            }
        })
        .guarded_by(self.core.lifetime().clone());

        if let Err(e) = self.core.queue().submit(task) {
            warn!(manager = self.core.name(), error = e.as_label(), "delivery reports not scheduled");
        }
    }

    fn target(&self) -> Weak<dyn EventTarget> {
        self.me.clone()
    }

    fn handle_incoming(&self, phone_id: i32, message: &SmsMessage) {
        self.listeners.broadcast(|l| l.on_incoming_sms(phone_id, message));

        if let Err(e) = message.part.validate() {
            error!(manager = self.core.name(), sender = %message.sender, error = %e, "invalid segment dropped");
            return;
        }
        if let Some(ttl) = self.assembly_ttl {
            self.reassembler.evict_expired(ttl);
        }

        match self.reassembler.ingest(&message.sender, message.part, message.clone()) {
            Reassembly::Complete(messages) => {
                self.listeners
                    .broadcast(|l| l.on_incoming_messages(phone_id, &messages));
            }
            Reassembly::Incomplete => {
                debug!(manager = self.core.name(), sender = %message.sender, "waiting for more segments");
            }
        }
    }
}

impl EventTarget for SmsManager {
    fn on_event(&self, _key: &str, payload: &Payload) {
        let Some(event) = payload.downcast_ref::<SmsEvent>() else {
            return;
        };
        if event.phone_id != self.core.phone_id() {
            debug!(manager = self.core.name(), phone_id = event.phone_id, "event for another phone ignored");
            return;
        }
        match &event.update {
            SmsUpdate::Incoming(message) => self.handle_incoming(event.phone_id, message),
            SmsUpdate::MemoryFull(storage) => {
                let storage = *storage;
                self.listeners
                    .broadcast(|l| l.on_memory_full(event.phone_id, storage));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::StubError;
    use crate::manager::{InitReply, Reply, ServiceTransport};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        rejected: bool,
    }

    #[async_trait]
    impl ServiceTransport for FakeTransport {
        async fn init(&self, _phone_id: i32) -> StubResult<InitReply> {
            Ok(InitReply {
                status: ServiceStatus::Available,
                delay: Duration::from_millis(10),
            })
        }
    }

    #[async_trait]
    impl SmsTransport for FakeTransport {
        async fn send_sms(
            &self,
            _phone_id: i32,
            _text: &str,
            _receiver: &str,
        ) -> StubResult<Reply<Vec<DeliveryRecord>>> {
            let records = vec![
                DeliveryRecord {
                    msg_ref: 1,
                    error: ErrorCode::Success,
                    delay: Duration::from_millis(10),
                },
                DeliveryRecord {
                    msg_ref: 2,
                    error: ErrorCode::GenericFailure,
                    delay: Duration::from_millis(20),
                },
            ];
            let mut reply = Reply::ok(records, Duration::from_millis(50));
            if self.rejected {
                reply.error = ErrorCode::GenericFailure;
            }
            Ok(reply)
        }
    }

    #[derive(Default)]
    struct Inbox {
        segments: Mutex<Vec<String>>,
        messages: Mutex<Vec<Vec<String>>>,
        memory_full: Mutex<Vec<StorageType>>,
        reports: Mutex<Vec<(u32, String, ErrorCode)>>,
    }

    impl SmsListener for Inbox {
        fn on_incoming_sms(&self, _phone_id: i32, message: &SmsMessage) {
            self.segments.lock().push(message.text.clone());
        }
        fn on_incoming_messages(&self, _phone_id: i32, messages: &[SmsMessage]) {
            self.messages
                .lock()
                .push(messages.iter().map(|m| m.text.clone()).collect());
        }
        fn on_memory_full(&self, _phone_id: i32, storage: StorageType) {
            self.memory_full.lock().push(storage);
        }
        fn on_delivery_report(&self, _phone_id: i32, msg_ref: u32, receiver: &str, error: ErrorCode) {
            self.reports.lock().push((msg_ref, receiver.to_string(), error));
        }
    }

    async fn ready_manager(rt: &Runtime) -> Arc<SmsManager> {
        manager_with(rt, FakeTransport::default()).await
    }

    async fn manager_with(rt: &Runtime, transport: FakeTransport) -> Arc<SmsManager> {
        let sms = SmsManager::new(rt, 0, Arc::new(transport));
        sms.init(|_| {}).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sms.service_status(), ServiceStatus::Available);
        sms
    }

    fn segment(text: &str, reference: u32, total: u32, index: u32) -> Payload {
        Payload::new(SmsEvent {
            phone_id: 0,
            update: SmsUpdate::Incoming(
                SmsMessage::new(text, "+15550100", "+15550199")
                    .with_part(SegmentInfo::new(reference, total, index)),
            ),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn listener_requires_available_service() {
        let rt = Runtime::builder(Config::default()).build();
        let sms = SmsManager::new(&rt, 0, Arc::new(FakeTransport::default()));
        let inbox = Arc::new(Inbox::default());
        let err = sms
            .register_listener(Arc::downgrade(&inbox) as Weak<dyn SmsListener>)
            .unwrap_err();
        assert_eq!(err, StubError::NotReady);
    }

    #[tokio::test(start_paused = true)]
    async fn first_listener_subscribes_last_releases() {
        let rt = Runtime::builder(Config::default()).build();
        let sms = ready_manager(&rt).await;
        let a = Arc::new(Inbox::default());
        let b = Arc::new(Inbox::default());
        let wa = Arc::downgrade(&a) as Weak<dyn SmsListener>;
        let wb = Arc::downgrade(&b) as Weak<dyn SmsListener>;

        sms.register_listener(wa.clone()).unwrap();
        sms.register_listener(wb.clone()).unwrap();
        assert_eq!(rt.dispatcher().active_filters(), vec![Arc::<str>::from(SMS_FILTER)]);

        sms.remove_listener(&wa).unwrap();
        assert_eq!(rt.dispatcher().subscriber_count(SMS_FILTER), 1);
        sms.remove_listener(&wb).unwrap();
        assert!(rt.dispatcher().active_filters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn multipart_message_is_reassembled() {
        let rt = Runtime::builder(Config::default()).build();
        let sms = ready_manager(&rt).await;
        let inbox = Arc::new(Inbox::default());
        sms.register_listener(Arc::downgrade(&inbox) as Weak<dyn SmsListener>)
            .unwrap();

        let d = rt.dispatcher();
        d.dispatch(SMS_FILTER, &segment("lo ", 4, 3, 2));
        d.dispatch(SMS_FILTER, &segment("hel", 4, 3, 1));
        d.dispatch(SMS_FILTER, &segment("lo ", 4, 3, 2));
        assert!(inbox.messages.lock().is_empty());
        assert_eq!(sms.pending_messages(), 1);

        d.dispatch(SMS_FILTER, &segment("world", 4, 3, 3));
        assert_eq!(inbox.segments.lock().len(), 4);
        assert_eq!(
            *inbox.messages.lock(),
            vec![vec!["hel".to_string(), "lo ".to_string(), "world".to_string()]]
        );
        assert_eq!(sms.pending_messages(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn single_part_and_invalid_segments() {
        let rt = Runtime::builder(Config::default()).build();
        let sms = ready_manager(&rt).await;
        let inbox = Arc::new(Inbox::default());
        sms.register_listener(Arc::downgrade(&inbox) as Weak<dyn SmsListener>)
            .unwrap();

        let d = rt.dispatcher();
        d.dispatch(SMS_FILTER, &segment("hi", 0, 1, 1));
        d.dispatch(SMS_FILTER, &segment("bad", 0, 1, 2));
        assert_eq!(*inbox.segments.lock(), vec!["hi".to_string(), "bad".to_string()]);
        assert_eq!(*inbox.messages.lock(), vec![vec!["hi".to_string()]]);
        assert_eq!(sms.pending_messages(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_phone_is_ignored_and_memory_full_fans_out() {
        let rt = Runtime::builder(Config::default()).build();
        let sms = ready_manager(&rt).await;
        let inbox = Arc::new(Inbox::default());
        sms.register_listener(Arc::downgrade(&inbox) as Weak<dyn SmsListener>)
            .unwrap();

        let d = rt.dispatcher();
        d.dispatch(
            SMS_FILTER,
            &Payload::new(SmsEvent {
                phone_id: 1,
                update: SmsUpdate::Incoming(SmsMessage::new("x", "a", "b")),
            }),
        );
        d.dispatch(
            SMS_FILTER,
            &Payload::new(SmsEvent {
                phone_id: 0,
                update: SmsUpdate::MemoryFull(StorageType::Sim),
            }),
        );
        assert!(inbox.segments.lock().is_empty());
        assert_eq!(*inbox.memory_full.lock(), vec![StorageType::Sim]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_sms_rejects_empty_fields_synchronously() {
        let rt = Runtime::builder(Config::default()).build();
        let sms = SmsManager::new(&rt, 0, Arc::new(FakeTransport::default()));

        // checked before readiness
        let err = sms.send_sms("", "+15550199", false, |_| {}).unwrap_err();
        assert_eq!(err.as_label(), "invalid_param");
        let err = sms.send_sms("hello", "", false, |_| {}).unwrap_err();
        assert_eq!(err.as_label(), "invalid_param");
        assert_eq!(
            sms.send_sms("hello", "+15550199", false, |_| {}).unwrap_err(),
            StubError::NotReady
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_sms_reports_transport_result() {
        let rt = Runtime::builder(Config::default()).build();
        let sms = ready_manager(&rt).await;
        let codes = Arc::new(Mutex::new(Vec::new()));

        let c = Arc::clone(&codes);
        sms.send_sms("hello", "+15550199", false, move |code| c.lock().push(code))
            .unwrap();
        assert!(sms.send_sms("", "+15550199", false, |_| {}).is_err());

        sms.shutdown().await;
        assert_eq!(*codes.lock(), vec![ErrorCode::Success]);
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_reports_follow_records_in_order() {
        let rt = Runtime::builder(Config::default()).build();
        let sms = ready_manager(&rt).await;
        let inbox = Arc::new(Inbox::default());
        sms.register_listener(Arc::downgrade(&inbox) as Weak<dyn SmsListener>)
            .unwrap();

        sms.send_sms("quiet", "+15550199", false, |_| {}).unwrap();
        sms.send_sms("hello", "+15550199", true, |_| {}).unwrap();

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(inbox.reports.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        sms.shutdown().await;
        assert_eq!(
            *inbox.reports.lock(),
            vec![
                (1, "+15550199".to_string(), ErrorCode::Success),
                (2, "+15550199".to_string(), ErrorCode::GenericFailure),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_has_no_delivery_reports() {
        let rt = Runtime::builder(Config::default()).build();
        let sms = manager_with(&rt, FakeTransport { rejected: true }).await;
        let inbox = Arc::new(Inbox::default());
        sms.register_listener(Arc::downgrade(&inbox) as Weak<dyn SmsListener>)
            .unwrap();

        let codes = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&codes);
        sms.send_sms("hello", "+15550199", true, move |code| c.lock().push(code))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        sms.shutdown().await;
        assert_eq!(*codes.lock(), vec![ErrorCode::GenericFailure]);
        assert!(inbox.reports.lock().is_empty());
    }
}
