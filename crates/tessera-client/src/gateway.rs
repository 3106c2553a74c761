//! Session-scoped, lazily acquired write capability.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::capability::CapabilityProvider;
use crate::error::EditError;

type Acquisition<C> = Shared<BoxFuture<'static, Result<Arc<C>, EditError>>>;

enum Slot<C> {
    Empty,
    Acquiring(Acquisition<C>),
    Ready(Arc<C>),
}

/// Hands out one capability per session.
///
/// Concurrent callers share a single in-flight acquisition, so the user is
/// prompted at most once. A failed acquisition is forgotten; the next
/// request starts a new one.
pub struct WriteGateway<P: CapabilityProvider> {
    provider: Arc<P>,
    slot: Mutex<Slot<P::Capability>>,
}

impl<P: CapabilityProvider> WriteGateway<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            slot: Mutex::new(Slot::Empty),
        }
    }

    pub async fn acquire(&self) -> Result<Arc<P::Capability>, EditError> {
        let acquisition = {
            let mut slot = self.slot.lock().await;
            match &*slot {
                Slot::Ready(capability) => return Ok(Arc::clone(capability)),
                Slot::Acquiring(acquisition) => {
                    debug!("Joining capability acquisition in flight");
                    acquisition.clone()
                }
                Slot::Empty => {
                    debug!("Acquiring capability");
                    let provider = Arc::clone(&self.provider);
                    let acquisition = async move { provider.connect().await.map(Arc::new) }
                        .boxed()
                        .shared();
                    *slot = Slot::Acquiring(acquisition.clone());
                    acquisition
                }
            }
        };

        let result = acquisition.clone().await;

        let mut slot = self.slot.lock().await;
        // Only the acquisition still in the slot may settle it
        if let Slot::Acquiring(current) = &*slot {
            if current.ptr_eq(&acquisition) {
                *slot = match &result {
                    Ok(capability) => {
                        info!("Capability acquired");
                        Slot::Ready(Arc::clone(capability))
                    }
                    Err(e) => {
                        info!("Capability acquisition failed: {}", e);
                        Slot::Empty
                    }
                };
            }
        }

        result
    }

    /// The capability, if one has been acquired.
    pub async fn current(&self) -> Option<Arc<P::Capability>> {
        match &*self.slot.lock().await {
            Slot::Ready(capability) => Some(Arc::clone(capability)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockLedger, MockProvider};
    use tessera_core::{Color, GridDimensions};

    fn ledger() -> Arc<MockLedger> {
        Arc::new(MockLedger::new(GridDimensions::new(2, 2), Color::WHITE))
    }

    #[tokio::test]
    async fn concurrent_acquires_prompt_once() {
        let (provider, handle) = MockProvider::new(ledger(), [1; 32]);
        handle.hold_connect();
        let gateway = Arc::new(WriteGateway::new(provider));

        let first = tokio::spawn({
            let gateway = Arc::clone(&gateway);
            async move { gateway.acquire().await }
        });
        let second = tokio::spawn({
            let gateway = Arc::clone(&gateway);
            async move { gateway.acquire().await }
        });

        // Let both callers reach the in-flight acquisition before releasing it
        handle.wait_for_connects(1).await;
        tokio::task::yield_now().await;
        handle.release_connect();

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(handle.connect_count(), 1);

        // Later calls reuse the stored capability
        let third = gateway.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first, &third));
        assert_eq!(handle.connect_count(), 1);
    }

    #[tokio::test]
    async fn failures_are_shared_then_forgotten() {
        let (provider, handle) = MockProvider::new(ledger(), [1; 32]);
        handle.fail_connect(EditError::CapabilityDenied);
        let gateway = WriteGateway::new(provider);

        assert_eq!(gateway.acquire().await.err(), Some(EditError::CapabilityDenied));
        assert!(gateway.current().await.is_none());

        handle.allow_connect();
        assert!(gateway.acquire().await.is_ok());
        assert_eq!(handle.connect_count(), 2);
        assert!(gateway.current().await.is_some());
    }

    #[tokio::test]
    async fn missing_environment() {
        let (provider, handle) = MockProvider::new(ledger(), [1; 32]);
        handle.fail_connect(EditError::EnvironmentMissing);
        let gateway = WriteGateway::new(provider);

        assert_eq!(
            gateway.acquire().await.err(),
            Some(EditError::EnvironmentMissing)
        );
    }
}
