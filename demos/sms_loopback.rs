//! # Example: sms_loopback
//!
//! One SMS manager wired to a loopback transport that echoes every sent
//! message back as a two-part inbound SMS.
//!
//! Demonstrates how to:
//! - Implement [`SmsTransport`] with delivery records.
//! - Feed inbound events through an [`EventSource`] and the runtime's event pump.
//! - Observe segments, reassembled messages and delivery reports from one listener.
//!
//! ## Flow
//! ```text
//! send_sms(text, delivery_report) ──► Loopback::send_sms()
//!     ├─► callback(Success)                (after reply delay)
//!     ├─► on_delivery_report(msg_ref)       (per record)
//!     └─► echo channel ──► EventPump ──► EventDispatcher ──► SmsManager
//!                                                ├─► on_incoming_sms   (per segment)
//!                                                └─► on_incoming_messages (reassembled)
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example sms_loopback
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use simstub::{
    Config, DeliveryRecord, ErrorCode, EventSource, FilterKey, InboundStream, InitReply, Payload,
    Reply, Runtime, SMS_FILTER, SegmentInfo, ServiceStatus, ServiceTransport, SmsEvent,
    SmsListener, SmsManager, SmsMessage, SmsTransport, SmsUpdate, StubError, StubResult,
};
use tokio::sync::mpsc;

const OWN_NUMBER: &str = "+15550100";

/// Accepts every message and echoes it back split in two segments.
struct Loopback {
    echo: mpsc::UnboundedSender<(FilterKey, Payload)>,
    next_ref: Mutex<u32>,
}

#[async_trait]
impl ServiceTransport for Loopback {
    async fn init(&self, _phone_id: i32) -> StubResult<InitReply> {
        Ok(InitReply {
            status: ServiceStatus::Available,
            delay: Duration::from_millis(20),
        })
    }
}

#[async_trait]
impl SmsTransport for Loopback {
    async fn send_sms(
        &self,
        phone_id: i32,
        text: &str,
        receiver: &str,
    ) -> StubResult<Reply<Vec<DeliveryRecord>>> {
        let reference = {
            let mut next = self.next_ref.lock();
            *next += 1;
            *next
        };

        let mid = text.char_indices().nth(text.chars().count() / 2).map_or(0, |(i, _)| i);
        let (head, tail) = text.split_at(mid);
        // delivered back to front; the reassembler restores the order
        for (index, part) in [(2, tail), (1, head)] {
            let message = SmsMessage::new(part, receiver, OWN_NUMBER)
                .with_part(SegmentInfo::new(reference, 2, index));
            let event = SmsEvent {
                phone_id,
                update: SmsUpdate::Incoming(message),
            };
            self.echo
                .send((FilterKey::from(SMS_FILTER), Payload::new(event)))
                .map_err(|_| StubError::failed("echo channel closed"))?;
        }

        let records = vec![DeliveryRecord {
            msg_ref: reference,
            error: ErrorCode::Success,
            delay: Duration::from_millis(50),
        }];
        Ok(Reply::ok(records, Duration::from_millis(10)))
    }
}

/// Hands the echo channel to the pump on the first connection.
struct EchoSource {
    rx: Mutex<Option<mpsc::UnboundedReceiver<(FilterKey, Payload)>>>,
}

#[async_trait]
impl EventSource for EchoSource {
    async fn connect(&self) -> StubResult<InboundStream> {
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| StubError::failed("echo channel already taken"))?;
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

struct Printer;

impl SmsListener for Printer {
    fn on_incoming_sms(&self, _phone_id: i32, message: &SmsMessage) {
        println!(
            "[segment] {}/{} {:?}",
            message.part.index, message.part.total, message.text
        );
    }

    fn on_incoming_messages(&self, phone_id: i32, messages: &[SmsMessage]) {
        let text: String = messages.iter().map(|m| m.text.as_str()).collect();
        let sender = messages.first().map_or("?", |m| m.sender.as_str());
        println!("[message] phone={phone_id} from={sender} {text:?}");
    }

    fn on_delivery_report(&self, _phone_id: i32, msg_ref: u32, receiver: &str, error: ErrorCode) {
        println!("[delivery] ref={msg_ref} to={receiver} result={error:?}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Runtime and the loopback wiring
    let runtime = Runtime::builder(Config::default()).build();
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = Arc::new(Loopback {
        echo: tx,
        next_ref: Mutex::new(0),
    });
    let pump = runtime.spawn_event_pump(Arc::new(EchoSource {
        rx: Mutex::new(Some(rx)),
    }));

    // 2. Bring the manager up
    let sms = SmsManager::new(&runtime, 0, transport);
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    sms.init(move |status| {
        let _ = ready_tx.send(status);
    })?;
    println!("[init] status={:?}", ready_rx.await?);

    // 3. Listen and send
    let printer = Arc::new(Printer);
    sms.register_listener(Arc::downgrade(&printer) as Weak<dyn SmsListener>)?;
    sms.send_sms("hello from the loopback", "+15550199", true, |code| {
        println!("[sent] result={code:?}");
    })?;

    // 4. Let the reply delay and the delivery report elapse, then stop
    tokio::time::sleep(Duration::from_millis(200)).await;
    sms.shutdown().await;
    runtime.shutdown().await;
    pump.await?;
    Ok(())
}
