//! Auth-readiness gate.

use tokio::sync::OnceCell;

use super::IdentityProvider;

/// Waits, once, for the identity provider to hydrate its local session.
///
/// The first caller triggers a single session read; concurrent callers await
/// that same read. After it settles, successfully or not, the gate stays open
/// for good.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    ready: OnceCell<()>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure_ready(&self, provider: &dyn IdentityProvider) {
        self.ready
            .get_or_init(|| async {
                match provider.get_session().await {
                    Ok(session) => tracing::debug!(
                        provider = provider.name(),
                        has_session = session.is_some(),
                        "Auth state ready"
                    ),
                    Err(e) => tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "Initial session read failed, continuing"
                    ),
                }
            })
            .await;
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, Session};
    use crate::{Error, Result};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowProvider {
        reads: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl IdentityProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn get_session(&self) -> Result<Option<Session>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                Err(Error::provider("storage unavailable"))
            } else {
                Ok(None)
            }
        }

        async fn get_user(&self) -> Result<Option<Identity>> {
            Ok(None)
        }

        async fn refresh_session(&self) -> Result<Option<Session>> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_read() {
        let provider = Arc::new(SlowProvider {
            reads: AtomicUsize::new(0),
            fail: false,
        });
        let gate = Arc::new(ReadinessGate::new());

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let provider = provider.clone();
                tokio::spawn(async move { gate.ensure_ready(provider.as_ref()).await })
            })
            .collect();
        for waiter in waiters {
            waiter.await.unwrap();
        }

        assert!(gate.is_ready());
        assert_eq!(provider.reads.load(Ordering::SeqCst), 1);

        gate.ensure_ready(provider.as_ref()).await;
        assert_eq!(provider.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_read_still_opens_gate() {
        let provider = SlowProvider {
            reads: AtomicUsize::new(0),
            fail: true,
        };
        let gate = ReadinessGate::new();

        gate.ensure_ready(&provider).await;
        gate.ensure_ready(&provider).await;

        assert!(gate.is_ready());
        assert_eq!(provider.reads.load(Ordering::SeqCst), 1);
    }
}
