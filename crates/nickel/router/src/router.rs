use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use nickel_bus::{ConsumerHandle, Message, SharedBus};
use nickel_protocol::publish;
use nickel_types::{Nickel, NickelType};
use parking_lot::{Mutex, RwLock};
use prometheus::Registry;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::RouterError;
use crate::function::{NickelFunction, NickelHandler};
use crate::metrics::RouterMetrics;

/// Tracer name used for the consumer spans opened around functions.
pub const TRACER_NAME: &str = "nickel-router";

#[derive(Default)]
struct Routes {
    type_functions: HashMap<NickelType, Arc<dyn NickelFunction>>,
    type_handlers: HashMap<NickelType, Arc<dyn NickelHandler>>,
    global_function: Option<Arc<dyn NickelFunction>>,
    global_handler: Option<Arc<dyn NickelHandler>>,
}

enum Route {
    Function(Arc<dyn NickelFunction>),
    Handler(Arc<dyn NickelHandler>),
    Swallow,
}

impl Routes {
    /// type-function > global-function > type-handler > global-handler.
    /// RESPONSE and ERROR never reach a function.
    fn resolve(&self, kind: Option<NickelType>) -> Route {
        let functions_allowed = !kind.is_some_and(NickelType::is_function_exempt);
        if functions_allowed {
            let function = kind
                .and_then(|k| self.type_functions.get(&k))
                .or(self.global_function.as_ref());
            if let Some(function) = function {
                return Route::Function(function.clone());
            }
        }

        kind.and_then(|k| self.type_handlers.get(&k))
            .or(self.global_handler.as_ref())
            .map_or(Route::Swallow, |handler| Route::Handler(handler.clone()))
    }

    fn clear(&mut self) {
        self.type_functions.clear();
        self.type_handlers.clear();
        self.global_function = None;
        self.global_handler = None;
    }
}

struct Inner {
    address: String,
    bus: SharedBus,
    routes: RwLock<Routes>,
    destroyed: AtomicBool,
    consumer: Mutex<Option<ConsumerHandle>>,
    metrics: RouterMetrics,
}

impl Inner {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn dispatch(self: &Arc<Self>, nickel: Nickel) {
        if self.is_destroyed() {
            debug!(
                address = %self.address,
                correlation_id = %nickel.correlation_id(),
                "Router destroyed, ignoring nickel"
            );
            return;
        }

        let route = self.routes.read().resolve(nickel.kind());
        match route {
            Route::Function(function) => {
                debug!(
                    address = %self.address,
                    correlation_id = %nickel.correlation_id(),
                    kind = ?nickel.kind(),
                    "Dispatching nickel to function"
                );
                self.metrics.function_total.inc();
                let inner = self.clone();
                tokio::spawn(async move { inner.run_function(function, nickel).await });
            }
            Route::Handler(handler) => {
                debug!(
                    address = %self.address,
                    correlation_id = %nickel.correlation_id(),
                    kind = ?nickel.kind(),
                    "Dispatching nickel to handler"
                );
                self.metrics.handler_total.inc();
                handler.handle(nickel);
            }
            Route::Swallow => {
                self.metrics.swallowed_total.inc();
                debug!(
                    address = %self.address,
                    correlation_id = %nickel.correlation_id(),
                    kind = ?nickel.kind(),
                    "No function or handler, nickel swallowed"
                );
            }
        }
    }

    async fn run_function(&self, function: Arc<dyn NickelFunction>, incoming: Nickel) {
        let scope = incoming.extend_scope_global(TRACER_NAME, &self.address);
        let reply = Nickel::for_reply(&incoming);
        let result = function.apply(incoming.clone(), reply).await;

        if self.is_destroyed() {
            debug!(
                address = %self.address,
                correlation_id = %incoming.correlation_id(),
                "Router destroyed while function ran, dropping result"
            );
            return;
        }

        let mut outgoing = match result {
            Ok(outgoing) => outgoing,
            Err(e) => {
                self.metrics.function_failures_total.inc();
                warn!(
                    address = %self.address,
                    correlation_id = %incoming.correlation_id(),
                    error = %e,
                    "Function failed, replying with error"
                );
                let mut body = Map::new();
                body.insert("error".to_string(), Value::String(e.to_string()));
                let mut failure = Nickel::for_error(&incoming);
                failure.pack_object(&body);
                failure
            }
        };
        outgoing.inject_scope(&scope);
        publish(self.bus.as_ref(), &self.address, outgoing);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.consumer.get_mut().take() {
            handle.unregister();
        }
    }
}

/// Dispatcher bound to one bus address.
///
/// Each incoming Nickel goes to at most one of, in order: the function for
/// its type, the global function, the handler for its type, the global
/// handler. A function's result (or an ERROR wrapping its failure) is
/// republished to the same address. RESPONSE and ERROR Nickels are never
/// given to functions, so a function's own reply cannot re-trigger it.
///
/// Re-registering for the same key replaces the previous entry.
#[derive(Clone)]
pub struct NickelRouter {
    inner: Arc<Inner>,
}

impl NickelRouter {
    /// Create a router consuming everything published to `address`.
    pub fn bind(bus: SharedBus, address: impl Into<String>) -> Result<Self, RouterError> {
        let address = address.into();
        let metrics = RouterMetrics::new(&address)?;
        let inner = Arc::new(Inner {
            address: address.clone(),
            bus: bus.clone(),
            routes: RwLock::new(Routes::default()),
            destroyed: AtomicBool::new(false),
            consumer: Mutex::new(None),
            metrics,
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let handle = bus.consumer(
            &address,
            Arc::new(move |message: Message| {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch(message.body);
                }
            }),
        );
        *inner.consumer.lock() = Some(handle);

        info!(address = %address, "Router bound");
        Ok(Self { inner })
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn metrics(&self) -> &RouterMetrics {
        &self.inner.metrics
    }

    /// Register this router's counters with `registry`.
    pub fn register_metrics(&self, registry: &Registry) -> Result<(), RouterError> {
        self.inner.metrics.register(registry)
    }

    /// Set the function applied to Nickels without a type-specific function.
    pub fn function(&self, function: impl NickelFunction + 'static) -> &Self {
        self.inner.routes.write().global_function = Some(Arc::new(function));
        self
    }

    /// Set the function for `kind`. RESPONSE and ERROR are refused: the
    /// refusal is logged and the registration ignored.
    pub fn type_function(
        &self,
        kind: NickelType,
        function: impl NickelFunction + 'static,
    ) -> &Self {
        if let Err(e) = self.try_type_function(kind, function) {
            error!(
                address = %self.inner.address,
                kind = ?kind,
                error = %e,
                "Function registration rejected"
            );
        }
        self
    }

    /// As [`NickelRouter::type_function`], reporting a refused registration.
    pub fn try_type_function(
        &self,
        kind: NickelType,
        function: impl NickelFunction + 'static,
    ) -> Result<&Self, RouterError> {
        if kind.is_function_exempt() {
            return Err(RouterError::TerminalFunction(kind));
        }
        self.inner
            .routes
            .write()
            .type_functions
            .insert(kind, Arc::new(function));
        Ok(self)
    }

    /// Set the handler for Nickels with neither a function nor a
    /// type-specific handler.
    pub fn handler(&self, handler: impl NickelHandler + 'static) -> &Self {
        self.inner.routes.write().global_handler = Some(Arc::new(handler));
        self
    }

    /// Set the handler for `kind`.
    pub fn type_handler(&self, kind: NickelType, handler: impl NickelHandler + 'static) -> &Self {
        self.inner
            .routes
            .write()
            .type_handlers
            .insert(kind, Arc::new(handler));
        self
    }

    /// True if a function would be considered for `kind` (`None` for the
    /// global function).
    pub fn has_function(&self, kind: Option<NickelType>) -> bool {
        let routes = self.inner.routes.read();
        match kind {
            Some(kind) => routes.type_functions.contains_key(&kind),
            None => routes.global_function.is_some(),
        }
    }

    /// True if a handler is registered for `kind` (`None` for the global
    /// handler).
    pub fn has_handler(&self, kind: Option<NickelType>) -> bool {
        let routes = self.inner.routes.read();
        match kind {
            Some(kind) => routes.type_handlers.contains_key(&kind),
            None => routes.global_handler.is_some(),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Stop routing: clears every registration and unregisters from the bus.
    ///
    /// Nickels still being delivered are ignored, and results of functions
    /// still running are dropped instead of republished.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.routes.write().clear();
        let handle = self.inner.consumer.lock().take();
        if let Some(handle) = handle {
            handle.unregister();
        }
        info!(address = %self.inner.address, "Router destroyed");
    }
}
