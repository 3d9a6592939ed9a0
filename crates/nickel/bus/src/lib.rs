//! Bus contract for Nickel delivery.
//!
//! The bus is a collaborator: it delivers every Nickel published to an
//! address to every consumer registered there, with flat string headers, and
//! uses a [`MessageCodec`] when a Nickel crosses a process boundary.
//! [`InMemoryBus`] is the in-process reference implementation.

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod memory;
pub mod message;

pub use bus::{Bus, ConsumerFn, ConsumerHandle, SharedBus};
pub use codec::MessageCodec;
pub use config::{BusConfig, Delivery};
pub use error::BusError;
pub use memory::InMemoryBus;
pub use message::{Headers, Message};
