//! Wallet glue: observers notified when a transaction becomes relevant or confirms.
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::types::TransactionCallback;

/// Receives wallet-relevant transaction events after they are durable.
///
/// Listeners run while ingestion holds its notification lock, so they must not
/// call back into ingestion. Reading balances or records is fine.
#[async_trait]
pub trait TransactionListener: Send + Sync {
    /// Called once per relevant ingestion. An error is logged and does not
    /// stop later listeners.
    async fn on_transaction(&self, event: &TransactionCallback) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> TransactionListener for F
where
    F: Fn(&TransactionCallback) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_transaction(&self, event: &TransactionCallback) -> anyhow::Result<()> {
        (self)(event)
    }
}

/// Registered listeners, invoked in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    inner: RwLock<Vec<Arc<dyn TransactionListener>>>,
}

impl Listeners {
    pub(crate) async fn register(&self, listener: Arc<dyn TransactionListener>) {
        self.inner.write().await.push(listener);
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Deliver `event` to every listener; returns how many failed.
    pub(crate) async fn notify(&self, event: &TransactionCallback) -> usize {
        let listeners = self.inner.read().await.clone();
        let mut failed = 0;
        for (slot, listener) in listeners.iter().enumerate() {
            if let Err(e) = listener.on_transaction(event).await {
                failed += 1;
                warn!(txid = %event.txid, slot, error = %e, "transaction listener failed");
            }
        }
        failed
    }
}
