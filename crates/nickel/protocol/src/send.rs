use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{join_all, JoinAll};
use nickel_bus::{Bus, ConsumerHandle, Message, SharedBus};
use nickel_types::{Nickel, NickelType};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::batch::NickelBatch;
use crate::config::ProtocolConfig;
use crate::error::SendError;
use crate::publish::{publish, CORRELATION_ID_HEADER};

type Outcome = Result<Nickel, SendError>;
type HandleSlot = Arc<Mutex<Option<ConsumerHandle>>>;

/// Shared between the waiting consumer and whoever registered it.
struct Waiter {
    complete: Arc<AtomicBool>,
    reply: Mutex<Option<oneshot::Sender<Outcome>>>,
    handle: HandleSlot,
}

impl Waiter {
    /// Settle with `outcome` if nothing settled first.
    fn settle(&self, outcome: Outcome) {
        if self.complete.swap(true, Ordering::SeqCst) {
            return;
        }
        self.release();
        if let Some(reply) = self.reply.lock().take() {
            // The caller may have dropped the reply future.
            let _ = reply.send(outcome);
        }
    }

    fn release(&self) {
        release(&self.handle);
    }
}

fn release(slot: &HandleSlot) {
    let handle = slot.lock().take();
    if let Some(handle) = handle {
        handle.unregister();
    }
}

/// Reply to a correlated send.
///
/// Resolves with the first terminal Nickel carrying the request's
/// correlation id: RESPONSE and TIMEOUT are `Ok`, ERROR is
/// [`SendError::ErrorNickel`].
///
/// Dropping an unsettled reply unregisters its temporary consumer.
#[must_use = "a pending reply does nothing unless awaited"]
pub struct PendingReply {
    correlation_id: Uuid,
    complete: Arc<AtomicBool>,
    handle: HandleSlot,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingReply {
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// True once a terminal Nickel has been received.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }
}

impl Future for PendingReply {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(SendError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if !self.is_complete() {
            release(&self.handle);
        }
    }
}

/// Publish `nickel` to `address` and wait for its correlated reply.
///
/// A temporary consumer on `address` watches for terminal Nickels with the
/// same correlation id; the first one settles the reply and unregisters the
/// consumer. Later matches are ignored. The request itself is not terminal,
/// so its own delivery on the address is ignored too.
pub fn send<B: Bus + ?Sized>(bus: &B, address: &str, nickel: Nickel) -> PendingReply {
    let correlation_id = nickel.correlation_id();
    let (tx, rx) = oneshot::channel();
    let complete = Arc::new(AtomicBool::new(false));
    let handle_slot: HandleSlot = Arc::new(Mutex::new(None));
    let waiter = Arc::new(Waiter {
        complete: complete.clone(),
        reply: Mutex::new(Some(tx)),
        handle: handle_slot.clone(),
    });

    let expected = correlation_id.to_string();
    let consumer_waiter = waiter.clone();
    let handle = bus.consumer(
        address,
        Arc::new(move |message: Message| {
            if message.header(CORRELATION_ID_HEADER) != Some(expected.as_str()) {
                return;
            }
            let outcome = match message.body.kind() {
                Some(NickelType::Response) | Some(NickelType::Timeout) => Ok(message.body),
                Some(NickelType::Error) => Err(SendError::ErrorNickel(Box::new(message.body))),
                _ => return,
            };
            debug!(
                address = %message.address,
                correlation_id = %expected,
                ok = outcome.is_ok(),
                "Correlated reply received"
            );
            consumer_waiter.settle(outcome);
        }),
    );

    *waiter.handle.lock() = Some(handle);
    // A reply that settled before the handle was stored could not release it.
    if waiter.complete.load(Ordering::SeqCst) {
        waiter.release();
    }

    publish(bus, address, nickel);

    PendingReply {
        correlation_id,
        complete,
        handle: handle_slot,
        rx,
    }
}

/// [`send`], synthesizing a TIMEOUT reply if nothing terminal arrives
/// within `timeout`.
///
/// The TIMEOUT Nickel is published to `address` like any other reply, so
/// other observers of the address see it too. A real reply arriving after
/// the timeout is ignored. Must be called within a tokio runtime.
pub fn send_with_timeout(
    bus: &SharedBus,
    address: &str,
    nickel: Nickel,
    timeout: Duration,
) -> PendingReply {
    let timeout_nickel = Nickel::for_timeout(&nickel);
    let pending = send(bus.as_ref(), address, nickel);

    let complete = pending.complete.clone();
    let bus = bus.clone();
    let address = address.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if complete.load(Ordering::SeqCst) {
            return;
        }
        warn!(
            address = %address,
            correlation_id = %timeout_nickel.correlation_id(),
            timeout_ms = timeout.as_millis() as u64,
            "No reply in time, publishing timeout"
        );
        publish(bus.as_ref(), &address, timeout_nickel);
    });

    pending
}

/// [`send_with_timeout`] using the configured default timeout.
pub fn send_with_default_timeout(
    bus: &SharedBus,
    address: &str,
    nickel: Nickel,
    config: &ProtocolConfig,
) -> PendingReply {
    send_with_timeout(bus, address, nickel, config.default_timeout())
}

/// Send every Nickel of `batch` and wait for all replies.
///
/// All requests are published before this returns. The returned future
/// resolves once every send has settled, failures included, with results in
/// batch order.
pub fn send_all<B: Bus + ?Sized>(bus: &B, batch: &NickelBatch) -> JoinAll<PendingReply> {
    let pending: Vec<PendingReply> = batch
        .iter()
        .map(|(address, nickel)| send(bus, address, nickel.clone()))
        .collect();
    join_all(pending)
}

/// [`send_all`] with a timeout applied to every send.
pub fn send_all_with_timeout(
    bus: &SharedBus,
    batch: &NickelBatch,
    timeout: Duration,
) -> JoinAll<PendingReply> {
    let pending: Vec<PendingReply> = batch
        .iter()
        .map(|(address, nickel)| send_with_timeout(bus, address, nickel.clone(), timeout))
        .collect();
    join_all(pending)
}
