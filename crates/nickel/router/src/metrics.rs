//! Router counters

use prometheus::{IntCounter, Opts, Registry};

use crate::error::RouterError;

/// Dispatch counters for one router, labelled with its address.
#[derive(Clone)]
pub struct RouterMetrics {
    /// Nickels given to a function
    pub function_total: IntCounter,

    /// Nickels given to a handler
    pub handler_total: IntCounter,

    /// Nickels with neither a function nor a handler
    pub swallowed_total: IntCounter,

    /// Function invocations that failed and were answered with ERROR
    pub function_failures_total: IntCounter,
}

impl RouterMetrics {
    pub fn new(address: &str) -> Result<Self, RouterError> {
        let counter = |name: &str, help: &str| {
            IntCounter::with_opts(Opts::new(name, help).const_label("address", address))
        };

        Ok(Self {
            function_total: counter("nickels_function_total", "Nickels dispatched to a function")?,
            handler_total: counter("nickels_handler_total", "Nickels dispatched to a handler")?,
            swallowed_total: counter(
                "nickels_swallowed_total",
                "Nickels with no function or handler",
            )?,
            function_failures_total: counter(
                "nickels_function_failures_total",
                "Router functions that failed",
            )?,
        })
    }

    /// Register every counter with `registry`.
    pub fn register(&self, registry: &Registry) -> Result<(), RouterError> {
        registry.register(Box::new(self.function_total.clone()))?;
        registry.register(Box::new(self.handler_total.clone()))?;
        registry.register(Box::new(self.swallowed_total.clone()))?;
        registry.register(Box::new(self.function_failures_total.clone()))?;
        Ok(())
    }
}
