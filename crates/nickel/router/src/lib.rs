//! Per-address Nickel routing.
//!
//! A [`NickelRouter`] consumes every Nickel published to one address and
//! hands it to at most one registered function or handler:
//!
//! 1. function for the Nickel's type
//! 2. global function
//! 3. handler for the Nickel's type
//! 4. global handler
//!
//! Functions compute a reply that is republished to the same address;
//! handlers only have side effects. RESPONSE and ERROR Nickels are never
//! given to functions. Nickels nobody takes are counted as swallowed.

pub mod error;
pub mod function;
pub mod metrics;
pub mod router;

pub use error::RouterError;
pub use function::{NickelFunction, NickelHandler};
pub use metrics::RouterMetrics;
pub use router::{NickelRouter, TRACER_NAME};
