//! Shared generation request queue
//!
//! One semaphore bounds concurrent model calls for the whole run,
//! independent of batch membership. Tokio semaphores hand out permits in
//! FIFO order, so waiting requests are served in arrival order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::model::{CallOptions, ModelClient, ModelError};

#[derive(Clone)]
pub struct GenerationQueue {
    client: Arc<dyn ModelClient>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl GenerationQueue {
    pub fn new(client: Arc<dyn ModelClient>, concurrency_limit: usize, timeout: Duration) -> Self {
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(client: Arc<dyn ModelClient>, config: &PipelineConfig) -> Self {
        Self::new(
            client,
            config.concurrency_limit,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Wait for a slot, then make one model call bounded by the request timeout.
    /// A timeout cancels only this request.
    pub async fn call(
        &self,
        system: &str,
        user: &str,
        options: &CallOptions,
    ) -> Result<String, ModelError> {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ModelError::Cancelled),
            permit = self.semaphore.acquire() => {
                permit.map_err(|_| ModelError::Cancelled)?
            }
        };

        tracing::debug!(
            "[QUEUE] Calling {} for {:?} ({} slots free)",
            self.client.name(),
            options.deliverable,
            self.semaphore.available_permits()
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ModelError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.client.call(system, user, options)) => {
                match result {
                    Ok(response) => response,
                    Err(_) => {
                        let after_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                        tracing::warn!(
                            "[QUEUE] Call for {:?} timed out after {}ms",
                            options.deliverable,
                            after_ms
                        );
                        Err(ModelError::Timeout(after_ms))
                    }
                }
            }
        }
    }

    /// Abort waiting and in-flight calls; later calls fail immediately
    pub fn cancel(&self) {
        tracing::info!("[QUEUE] Cancelling outstanding generation requests");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
