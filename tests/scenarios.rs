use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use simstub::{
    ALL_FILTER, ALL_NOTIFICATIONS, Bus, Config, DeliveryRecord, Event, EventKind, EventSource,
    FilterKey, InboundStream, InitReply, ListenerRegistry, Payload, Reassembly, Reply, Runtime, SMS_FILTER,
    SegmentInfo, SegmentReassembler, ServiceStatus, ServiceTransport, ServingSystemListener,
    ServingSystemManager, ServingSystemNotificationMask, ServingSystemTransport, SmsEvent,
    SmsListener, SmsManager, SmsMessage, SmsTransport, SmsUpdate, Status, StorageType, StubResult,
    Subscribe, SystemInfo, Upstream,
};

type Mask = ServingSystemNotificationMask;

struct Server {
    init_delay: Duration,
}

#[async_trait]
impl ServiceTransport for Server {
    async fn init(&self, _phone_id: i32) -> StubResult<InitReply> {
        Ok(InitReply {
            status: ServiceStatus::Available,
            delay: self.init_delay,
        })
    }
}

#[async_trait]
impl SmsTransport for Server {
    async fn send_sms(
        &self,
        _phone_id: i32,
        _text: &str,
        _receiver: &str,
    ) -> StubResult<Reply<Vec<DeliveryRecord>>> {
        Ok(Reply::ok(Vec::new(), self.init_delay))
    }
}

#[async_trait]
impl ServingSystemTransport for Server {
    async fn request_system_info(&self, _phone_id: i32) -> StubResult<Reply<SystemInfo>> {
        Ok(Reply::ok(SystemInfo::default(), self.init_delay))
    }
}

fn server(ms: u64) -> Arc<Server> {
    Arc::new(Server {
        init_delay: Duration::from_millis(ms),
    })
}

#[derive(Default)]
struct Inbox {
    segments: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
    memory_full: AtomicUsize,
}

impl SmsListener for Inbox {
    fn on_incoming_sms(&self, _phone_id: i32, message: &SmsMessage) {
        self.segments.lock().push(message.text.clone());
    }
    fn on_incoming_messages(&self, _phone_id: i32, messages: &[SmsMessage]) {
        self.messages
            .lock()
            .push(messages.iter().map(|m| m.text.as_str()).collect());
    }
    fn on_memory_full(&self, _phone_id: i32, _storage: StorageType) {
        self.memory_full.fetch_add(1, Ordering::SeqCst);
    }
}

struct Quiet;

impl ServingSystemListener for Quiet {}

#[derive(Default)]
struct FilterLog(Mutex<Vec<Vec<String>>>);

impl Upstream for FilterLog {
    fn update_filters(&self, active: &[FilterKey]) {
        self.0
            .lock()
            .push(active.iter().map(|k| k.to_string()).collect());
    }
}

#[derive(Default)]
struct Kinds(Mutex<Vec<EventKind>>);

#[async_trait]
impl Subscribe for Kinds {
    async fn on_event(&self, event: &Event) {
        self.0.lock().push(event.kind);
    }
    fn name(&self) -> &'static str {
        "kinds"
    }
}

/// Serves one batch on the first connection, then stays idle.
struct OneShotSource {
    batch: Mutex<Option<Vec<(FilterKey, Payload)>>>,
}

#[async_trait]
impl EventSource for OneShotSource {
    async fn connect(&self) -> StubResult<InboundStream> {
        match self.batch.lock().take() {
            Some(items) => Ok(futures::stream::iter(items).boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }

    fn name(&self) -> &'static str {
        "one-shot"
    }
}

fn segment(text: &str, reference: u32, total: u32, index: u32) -> (FilterKey, Payload) {
    let message = SmsMessage::new(text, "+15550100", "+15550199")
        .with_part(SegmentInfo::new(reference, total, index));
    (
        FilterKey::from(SMS_FILTER),
        Payload::new(SmsEvent {
            phone_id: 0,
            update: SmsUpdate::Incoming(message),
        }),
    )
}

#[tokio::test(start_paused = true)]
async fn readiness_callbacks_fire_once_each() {
    let rt = Runtime::builder(Config::default()).build();
    let sms = SmsManager::new(&rt, 0, server(50));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = seen.clone();
    assert_eq!(
        sms.init(move |st| s.lock().push(("init", st))).unwrap(),
        Status::Success
    );
    for name in ["first", "second"] {
        let s = seen.clone();
        sms.on_ready(move |st| s.lock().push((name, st))).unwrap();
    }
    assert!(seen.lock().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    sms.shutdown().await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|(_, st)| *st == ServiceStatus::Available));
    for name in ["init", "first", "second"] {
        assert_eq!(seen.iter().filter(|(n, _)| *n == name).count(), 1, "{name}");
    }
}

#[test]
fn out_of_order_segments_with_duplicate() {
    let r: SegmentReassembler<&str> = SegmentReassembler::new(Bus::new(16));
    let seg = |i| SegmentInfo::new(42, 3, i);

    assert_eq!(r.ingest("+1", seg(2), "two"), Reassembly::Incomplete);
    assert_eq!(r.ingest("+1", seg(1), "one"), Reassembly::Incomplete);
    assert_eq!(r.ingest("+1", seg(2), "two"), Reassembly::Incomplete);
    assert_eq!(
        r.ingest("+1", seg(3), "three"),
        Reassembly::Complete(vec!["one", "two", "three"])
    );
}

#[test]
fn second_registration_activates_nothing_new() {
    let registry: ListenerRegistry<dyn ServingSystemListener, Mask> =
        ListenerRegistry::new("serving-system", Bus::new(16));
    let a: Arc<dyn ServingSystemListener> = Arc::new(Quiet);
    let b: Arc<dyn ServingSystemListener> = Arc::new(Quiet);

    let ra = registry
        .register_mask(Arc::downgrade(&a), Mask::SYSTEM_INFO | Mask::RF_BAND_INFO)
        .unwrap();
    let rb = registry
        .register_mask(Arc::downgrade(&b), Mask::SYSTEM_INFO)
        .unwrap();

    assert_eq!(ra.first_activated, Mask::SYSTEM_INFO | Mask::RF_BAND_INFO);
    assert!(rb.first_activated.is_empty());
}

#[test]
fn empty_mask_deregistration_changes_nothing() {
    let registry: ListenerRegistry<dyn ServingSystemListener, Mask> =
        ListenerRegistry::new("serving-system", Bus::new(16));
    let a: Arc<dyn ServingSystemListener> = Arc::new(Quiet);
    registry
        .register_mask(Arc::downgrade(&a), Mask::NETWORK_REJ_INFO)
        .unwrap();

    let err = registry
        .deregister_mask(&Arc::downgrade(&a), Mask::empty())
        .unwrap_err();
    assert_eq!(err.as_label(), "invalid_param");
    assert_eq!(registry.active_mask(), Mask::NETWORK_REJ_INFO);
}

#[test]
fn all_round_trip_reports_every_bit() {
    let registry: ListenerRegistry<dyn ServingSystemListener, Mask> =
        ListenerRegistry::new("serving-system", Bus::new(16));
    let a: Arc<dyn ServingSystemListener> = Arc::new(Quiet);
    let all = Mask::from_bits_truncate(ALL_NOTIFICATIONS.bits());

    let reg = registry.register_mask(Arc::downgrade(&a), all).unwrap();
    assert_eq!(reg.first_activated, Mask::all());

    let last = registry.deregister_mask(&Arc::downgrade(&a), all).unwrap();
    assert_eq!(last, Mask::all());
    assert!(registry.active_mask().is_empty());
}

#[tokio::test(start_paused = true)]
async fn inbound_stream_reaches_sms_listeners() {
    let upstream = Arc::new(FilterLog::default());
    let kinds = Arc::new(Kinds::default());
    let rt = Runtime::builder(Config::default())
        .with_upstream(upstream.clone())
        .with_subscribers(vec![kinds.clone()])
        .build();

    let sms = SmsManager::new(&rt, 0, server(10));
    sms.init(|_| {}).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let inbox = Arc::new(Inbox::default());
    let listener = Arc::downgrade(&inbox) as Weak<dyn SmsListener>;
    sms.register_listener(Weak::clone(&listener)).unwrap();

    let source = Arc::new(OneShotSource {
        batch: Mutex::new(Some(vec![
            segment("lo, ", 7, 3, 2),
            segment("Hel", 7, 3, 1),
            segment("world", 7, 3, 3),
        ])),
    });
    let pump = rt.spawn_event_pump(source);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(inbox.segments.lock().len(), 3);
    assert_eq!(*inbox.messages.lock(), vec!["Hello, world".to_string()]);
    assert_eq!(sms.pending_messages(), 0);

    sms.remove_listener(&listener).unwrap();
    assert_eq!(
        *upstream.0.lock(),
        vec![vec![SMS_FILTER.to_string()], Vec::<String>::new()]
    );

    sms.shutdown().await;
    rt.shutdown().await;
    pump.await.unwrap();

    let kinds = kinds.0.lock();
    for kind in [
        EventKind::FilterActivated,
        EventKind::SourceConnected,
        EventKind::MessageReassembled,
        EventKind::FilterDeactivated,
    ] {
        assert!(kinds.contains(&kind), "{kind:?} missing from {kinds:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn all_filter_reaches_every_manager_once() {
    let rt = Runtime::builder(Config::default()).build();
    let sms = SmsManager::new(&rt, 0, server(10));
    let ss = ServingSystemManager::new(&rt, 0, server(10));
    sms.init(|_| {}).unwrap();
    ss.init(|_| {}).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let inbox = Arc::new(Inbox::default());
    sms.register_listener(Arc::downgrade(&inbox) as Weak<dyn SmsListener>)
        .unwrap();
    let quiet: Arc<dyn ServingSystemListener> = Arc::new(Quiet);
    ss.register_listener(Arc::downgrade(&quiet), ALL_NOTIFICATIONS)
        .unwrap();

    let memory_full = Payload::new(SmsEvent {
        phone_id: 0,
        update: SmsUpdate::MemoryFull(StorageType::Sim),
    });
    assert_eq!(rt.dispatcher().dispatch(ALL_FILTER, &memory_full), 2);
    assert_eq!(inbox.memory_full.load(Ordering::SeqCst), 1);

    assert_eq!(
        ss.deregister_listener(&Arc::downgrade(&quiet), ALL_NOTIFICATIONS)
            .unwrap(),
        Status::Success
    );
    assert_eq!(
        rt.dispatcher()
            .active_filters()
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>(),
        vec![SMS_FILTER.to_string()]
    );
    rt.shutdown().await;
}
