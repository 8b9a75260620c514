// src/core/fencing/prober.rs

//! Background liveness prober: periodically re-asserts fencing by running an
//! empty fenced-multi, so a controller that has silently lost its ACL
//! privileges (e.g. an operator rotated the root ACL underneath it) notices
//! before its next real mutation rather than after.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::FencingGuard;
use crate::core::client::CoordinationClient;
use crate::core::errors::StoreError;

pub struct LivenessProber<C: CoordinationClient + 'static> {
    guard: Arc<FencingGuard>,
    client: Arc<C>,
    interval: Duration,
}

impl<C: CoordinationClient + 'static> LivenessProber<C> {
    pub fn new(guard: Arc<FencingGuard>, client: Arc<C>, interval: Duration) -> Self {
        Self {
            guard,
            client,
            interval,
        }
    }

    /// Runs until `stop` fires, probing every `interval`. Errors are logged
    /// and returned to the caller through `on_fenced` rather than panicking
    /// the task, matching the crate-wide pattern of cancellable background
    /// workers driven by a `watch` stop channel.
    pub async fn run(self, mut stop: watch::Receiver<bool>, on_fenced: impl Fn(StoreError) + Send + 'static) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.guard.fenced_multi(self.client.as_ref(), vec![]).await {
                        tracing::warn!(error = %err, "liveness probe failed");
                        on_fenced(StoreError::Coordination(err));
                    } else {
                        tracing::debug!("liveness probe ok");
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        tracing::info!("liveness prober stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::fake::FakeCoordinationClient;
    use crate::core::client::CreateMode;
    use crate::core::fencing::FencingMode;
    use crate::core::layout::paths::Layout;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn prober_stops_on_signal() {
        let layout = Layout::new("/rmstore");
        let client = Arc::new(FakeCoordinationClient::new());
        client
            .create(
                &layout.state_root(),
                vec![],
                vec![crate::core::client::AclEntry::world_all()],
                CreateMode::Persistent,
            )
            .await
            .unwrap();
        let guard = Arc::new(FencingGuard::new(layout, FencingMode::SelfManaged));
        let prober = LivenessProber::new(guard, client, Duration::from_millis(5));
        let (stop_tx, stop_rx) = watch::channel(false);
        let fenced_flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&fenced_flag);
        let handle = tokio::spawn(prober.run(stop_rx, move |_err| {
            flag_clone.store(true, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!fenced_flag.load(Ordering::SeqCst));
    }
}
