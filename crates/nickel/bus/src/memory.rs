use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use nickel_types::Nickel;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::bus::{Bus, ConsumerFn, ConsumerHandle};
use crate::codec::MessageCodec;
use crate::config::{BusConfig, Delivery};
use crate::error::BusError;
use crate::message::{Headers, Message};

struct Registration {
    id: u64,
    callback: ConsumerFn,
}

struct Inner {
    config: BusConfig,
    consumers: RwLock<HashMap<String, Vec<Registration>>>,
    codec: RwLock<Option<Arc<dyn MessageCodec>>>,
    next_id: AtomicU64,
}

impl Inner {
    fn remove(&self, address: &str, id: u64) {
        let mut consumers = self.consumers.write();
        if let Some(registrations) = consumers.get_mut(address) {
            registrations.retain(|r| r.id != id);
            if registrations.is_empty() {
                consumers.remove(address);
            }
        }
        debug!(address, consumer_id = id, "Consumer unregistered");
    }
}

/// In-process bus delivering each published Nickel to every consumer of its
/// address on a spawned tokio task.
///
/// Must be used from within a tokio runtime; publishing outside one logs and
/// drops the Nickel.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl InMemoryBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                consumers: RwLock::new(HashMap::new()),
                codec: RwLock::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Number of consumers currently registered on `address`.
    pub fn consumer_count(&self, address: &str) -> usize {
        self.inner
            .consumers
            .read()
            .get(address)
            .map_or(0, Vec::len)
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    fn prepare(&self, nickel: &Nickel) -> Result<Prepared, BusError> {
        let codec = self.inner.codec.read().clone();
        match self.inner.config.delivery {
            Delivery::Local => Ok(Prepared::Value(match codec {
                Some(codec) => codec.transform(nickel),
                None => nickel.clone(),
            })),
            Delivery::Clustered => {
                let codec = codec.ok_or(BusError::NoCodec)?;
                let frame = codec.encode(nickel)?;
                Ok(Prepared::Frame(codec, frame))
            }
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

enum Prepared {
    Value(Nickel),
    Frame(Arc<dyn MessageCodec>, Bytes),
}

impl Prepared {
    fn body(&self) -> Result<Nickel, BusError> {
        match self {
            Prepared::Value(nickel) => Ok(nickel.clone()),
            Prepared::Frame(codec, frame) => codec.decode(frame),
        }
    }
}

impl Bus for InMemoryBus {
    fn publish(&self, address: &str, nickel: Nickel, headers: Headers) {
        let callbacks: Vec<ConsumerFn> = self
            .inner
            .consumers
            .read()
            .get(address)
            .map(|regs| regs.iter().map(|r| r.callback.clone()).collect())
            .unwrap_or_default();

        if callbacks.is_empty() {
            debug!(address, correlation_id = %nickel.correlation_id(), "No consumers for address");
            return;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(
                    address,
                    correlation_id = %nickel.correlation_id(),
                    error = %BusError::NoRuntime,
                    "Dropping nickel"
                );
                return;
            }
        };

        let prepared = match self.prepare(&nickel) {
            Ok(prepared) => Arc::new(prepared),
            Err(e) => {
                warn!(
                    address,
                    correlation_id = %nickel.correlation_id(),
                    error = %e,
                    "Dropping nickel"
                );
                return;
            }
        };

        for callback in callbacks {
            let prepared = prepared.clone();
            let address = address.to_string();
            let headers = headers.clone();
            runtime.spawn(async move {
                match prepared.body() {
                    Ok(body) => callback(Message {
                        address,
                        headers,
                        body,
                    }),
                    Err(e) => warn!(address, error = %e, "Failed to decode delivered nickel"),
                }
            });
        }
    }

    fn consumer(&self, address: &str, callback: ConsumerFn) -> ConsumerHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .consumers
            .write()
            .entry(address.to_string())
            .or_default()
            .push(Registration { id, callback });
        debug!(address, consumer_id = id, "Consumer registered");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let owned_address = address.to_string();
        ConsumerHandle::new(address, move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(&owned_address, id);
            }
        })
    }

    fn register_codec(&self, codec: Arc<dyn MessageCodec>) {
        debug!(codec = codec.name(), codec_id = codec.id(), "Codec registered");
        *self.inner.codec.write() = Some(codec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nickel_codec::NickelCodec;
    use nickel_types::NickelType;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn collecting_consumer(
        bus: &InMemoryBus,
        address: &str,
    ) -> (ConsumerHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = bus.consumer(
            address,
            Arc::new(move |message: Message| {
                let _ = tx.send(message);
            }),
        );
        (handle, rx)
    }

    #[tokio::test]
    async fn delivers_to_every_consumer() {
        let bus = InMemoryBus::default();
        let (_h1, mut rx1) = collecting_consumer(&bus, "documents");
        let (_h2, mut rx2) = collecting_consumer(&bus, "documents");
        let (_h3, mut other) = collecting_consumer(&bus, "tasks");

        let nickel = Nickel::create().with_type(NickelType::Save);
        bus.publish("documents", nickel.clone(), Headers::new().with("k", "v"));

        let first = rx1.recv().await.unwrap();
        let second = rx2.recv().await.unwrap();
        assert_eq!(first.body, nickel);
        assert_eq!(second.header("k"), Some("v"));
        assert_eq!(first.address, "documents");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let bus = InMemoryBus::default();
        let (handle, mut rx) = collecting_consumer(&bus, "a");
        assert_eq!(bus.consumer_count("a"), 1);

        assert!(handle.unregister());
        assert!(!handle.unregister());
        assert_eq!(bus.consumer_count("a"), 0);

        bus.publish("a", Nickel::create(), Headers::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn clustered_delivery_roundtrips_through_codec() {
        let bus = InMemoryBus::new(BusConfig::clustered());
        bus.register_codec(Arc::new(NickelCodec::new()));
        let (_h, mut rx) = collecting_consumer(&bus, "a");

        let mut nickel = Nickel::create().with_type(NickelType::Create);
        nickel.pack_object(serde_json::json!({"id": 7}).as_object().unwrap());
        bus.publish("a", nickel.clone(), Headers::new());

        assert_eq!(rx.recv().await.unwrap().body, nickel);
    }

    #[tokio::test]
    async fn clustered_delivery_without_codec_drops() {
        let bus = InMemoryBus::new(BusConfig::clustered());
        let (_h, mut rx) = collecting_consumer(&bus, "a");

        bus.publish("a", Nickel::create(), Headers::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publish_outside_runtime_drops() {
        let bus = InMemoryBus::default();
        let _h = bus.consumer("a", Arc::new(|_: Message| panic!("must not be delivered")));
        bus.publish("a", Nickel::create(), Headers::new());
    }

    #[test]
    fn config_deserializes() {
        let config: BusConfig = serde_json::from_str(r#"{"delivery": "clustered"}"#).unwrap();
        assert_eq!(config.delivery, Delivery::Clustered);
        let config: BusConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.delivery, Delivery::Local);
    }
}
