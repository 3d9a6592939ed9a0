use std::fmt;
use std::sync::Arc;

use nickel_types::Nickel;
use parking_lot::Mutex;

use crate::codec::MessageCodec;
use crate::message::{Headers, Message};

/// Callback invoked for every Message delivered to a consumer.
///
/// Consumers run on arbitrary workers; the bus gives no mutual exclusion
/// between deliveries to the same address.
pub type ConsumerFn = Arc<dyn Fn(Message) + Send + Sync>;

/// Shared handle to a bus.
pub type SharedBus = Arc<dyn Bus>;

/// Publish/subscribe transport delivering Nickels to named addresses.
///
/// Every published Nickel reaches every consumer registered on its address
/// at least once. No ordering is guaranteed across addresses.
pub trait Bus: Send + Sync {
    fn publish(&self, address: &str, nickel: Nickel, headers: Headers);

    fn consumer(&self, address: &str, callback: ConsumerFn) -> ConsumerHandle;

    /// Install the codec used when a Nickel crosses a process boundary.
    fn register_codec(&self, codec: Arc<dyn MessageCodec>);
}

/// Registration of a consumer on an address.
///
/// `unregister` is idempotent; dropping the handle leaves the consumer
/// registered.
pub struct ConsumerHandle {
    address: String,
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ConsumerHandle {
    pub fn new(address: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            address: address.into(),
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Stop delivery to this consumer. Returns false if already unregistered.
    pub fn unregister(&self) -> bool {
        let release = self.release.lock().take();
        match release {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.release.lock().is_some()
    }
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("address", &self.address)
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unregister_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = ConsumerHandle::new("a", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.is_registered());
        assert!(handle.unregister());
        assert!(!handle.unregister());
        assert!(!handle.is_registered());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
