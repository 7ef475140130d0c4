//! Delivery targets

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::message::BusMessage;

/// Receives messages delivered by the bus.
///
/// Errors and panics are caught and logged by the bus; they never reach the
/// sender.
#[async_trait]
pub trait BusSubscriber: Send + Sync {
    async fn deliver(&self, message: BusMessage) -> eyre::Result<()>;
}

/// Adapter turning an async closure into a `BusSubscriber`
pub struct FnSubscriber<F>(F);

#[async_trait]
impl<F, Fut> BusSubscriber for FnSubscriber<F>
where
    F: Fn(BusMessage) -> Fut + Send + Sync,
    Fut: Future<Output = eyre::Result<()>> + Send,
{
    async fn deliver(&self, message: BusMessage) -> eyre::Result<()> {
        (self.0)(message).await
    }
}

pub fn subscriber_fn<F, Fut>(f: F) -> Arc<dyn BusSubscriber>
where
    F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<()>> + Send + 'static,
{
    Arc::new(FnSubscriber(f))
}

/// Forwards deliveries into a bounded channel.
///
/// Intended for a gateway streaming bus traffic to a client. A full channel
/// applies backpressure to the sender; a closed one is reported as an error.
pub struct ChannelSubscriber {
    tx: mpsc::Sender<BusMessage>,
}

impl ChannelSubscriber {
    pub fn new(buffer: usize) -> (Arc<Self>, mpsc::Receiver<BusMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl BusSubscriber for ChannelSubscriber {
    async fn deliver(&self, message: BusMessage) -> eyre::Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| eyre::eyre!("subscriber channel closed"))
    }
}
