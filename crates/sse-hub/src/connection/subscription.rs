//! Handle returned by `Hub::connect`

use super::ConsumerId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A live subscription.
///
/// Dropping the handle detaches it; the consumer keeps streaming until the
/// peer goes away, it is removed, or the hub closes.
#[derive(Debug)]
pub struct Subscription<C> {
    cid: C,
    lifetime: CancellationToken,
    task: JoinHandle<()>,
}

impl<C: ConsumerId> Subscription<C> {
    pub(crate) fn new(cid: C, lifetime: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cid,
            lifetime,
            task,
        }
    }

    /// The CID this subscription was registered under
    pub fn cid(&self) -> &C {
        &self.cid
    }

    /// End the subscription. Disconnect hooks still run.
    pub fn disconnect(&self) {
        self.lifetime.cancel();
    }

    /// Whether the consumer is still streaming
    pub fn is_active(&self) -> bool {
        !self.lifetime.is_cancelled() && !self.task.is_finished()
    }

    /// Wait until the consumer is gone and its disconnect hook has run
    pub async fn closed(self) {
        if let Err(err) = self.task.await {
            tracing::error!(cid = ?self.cid, error = %err, "Consumer task failed");
        }
    }
}
