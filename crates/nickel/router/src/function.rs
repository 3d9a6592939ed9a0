use std::future::Future;

use async_trait::async_trait;
use nickel_types::Nickel;

/// Computes a reply to an incoming Nickel.
///
/// Receives the incoming Nickel and a ready-made RESPONSE for it. The
/// returned Nickel is republished to the router's address; an error becomes
/// an ERROR Nickel carrying the message.
#[async_trait]
pub trait NickelFunction: Send + Sync {
    async fn apply(&self, incoming: Nickel, reply: Nickel) -> anyhow::Result<Nickel>;
}

#[async_trait]
impl<F, Fut> NickelFunction for F
where
    F: Fn(Nickel, Nickel) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Nickel>> + Send + 'static,
{
    async fn apply(&self, incoming: Nickel, reply: Nickel) -> anyhow::Result<Nickel> {
        (self)(incoming, reply).await
    }
}

/// Side-effect-only consumer of incoming Nickels. Nothing is republished.
pub trait NickelHandler: Send + Sync {
    fn handle(&self, nickel: Nickel);
}

impl<F> NickelHandler for F
where
    F: Fn(Nickel) + Send + Sync,
{
    fn handle(&self, nickel: Nickel) {
        (self)(nickel)
    }
}
