//! Tests for the handle pool
//!
//! These tests verify reuse, exhaustion, wake-up on release and
//! teardown of the bounded handle pool.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use crate::error::ErrorKind;
    use crate::pool::{HandlePool, PoolConfig};
    use crate::tests::support::{FakeFactory, FakeHandle};

    fn config(max_size: usize, timeout_ms: u64) -> PoolConfig {
        PoolConfig {
            max_size,
            acquire_timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_released_handle_is_reused() {
        let factory = Arc::new(FakeFactory::new());
        let pool = HandlePool::new(factory.clone(), config(2, 100));

        let first = assert_ok!(pool.acquire().await);
        pool.release(&first);
        let second = assert_ok!(pool.acquire().await);

        assert_eq!(first.id(), second.id());
        assert_eq!(factory.created_count(), 1);

        let status = pool.status();
        assert_eq!(status.size, 1);
        assert_eq!(status.in_use, 1);
        assert_eq!(status.handles[0].leases, 2);
        assert_eq!(status.created_total, 1);
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_max_size() {
        let factory = Arc::new(FakeFactory::new());
        let pool = HandlePool::new(factory.clone(), config(2, 50));

        let _a = assert_ok!(pool.acquire().await);
        let _b = assert_ok!(pool.acquire().await);
        let err = assert_err!(pool.acquire().await.map(|h| h.id().to_string()));

        assert_eq!(err.kind(), ErrorKind::AcquisitionTimeout);
        assert_eq!(factory.created_count(), 2);
        assert_eq!(pool.status().size, 2);
    }

    #[tokio::test]
    async fn test_release_wakes_waiter() {
        let factory = Arc::new(FakeFactory::new());
        let pool = Arc::new(HandlePool::new(factory, config(1, 2_000)));

        let held = assert_ok!(pool.acquire().await);
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.map(|h| h.id().to_string()) })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.release(&held);

        let id = assert_ok!(assert_ok!(waiter.await));
        assert_eq!(id, held.id());
    }

    #[tokio::test]
    async fn test_factory_failure_frees_slot() {
        let factory = Arc::new(FakeFactory::failing(1));
        let pool = HandlePool::new(factory.clone(), config(1, 100));

        let err = assert_err!(pool.acquire().await.map(|h| h.id().to_string()));
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(pool.status().creating, 0);

        let handle = assert_ok!(pool.acquire().await);
        assert_eq!(handle.id(), "handle-1");
    }

    #[tokio::test]
    async fn test_cancelled_creation_frees_slot() {
        let factory = Arc::new(FakeFactory::with_delay(Duration::from_millis(200)));
        let pool = HandlePool::new(factory, config(1, 500));

        let cancelled = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(cancelled.is_err());

        let status = pool.status();
        assert_eq!(status.creating, 0);
        assert_eq!(status.size, 0);
    }

    #[tokio::test]
    async fn test_lease_releases_on_drop() {
        let factory = Arc::new(FakeFactory::new());
        let pool = HandlePool::new(factory, config(1, 50));

        {
            let lease = assert_ok!(pool.lease().await);
            assert_eq!(lease.id(), "handle-1");
            assert_eq!(pool.status().in_use, 1);
        }

        assert_eq!(pool.status().idle, 1);
        assert_ok!(pool.acquire().await);
    }

    #[tokio::test]
    async fn test_release_of_unknown_handle_is_noop() {
        let factory = Arc::new(FakeFactory::new());
        let pool = HandlePool::new(factory, config(1, 50));

        let leased = assert_ok!(pool.acquire().await);
        let stranger: Arc<dyn crate::core::CadHandle> = Arc::new(FakeHandle::new("stranger"));
        pool.release(&stranger);
        assert_eq!(pool.status().in_use, 1);

        pool.release(&leased);
        pool.release(&leased);
        let status = pool.status();
        assert_eq!(status.in_use, 0);
        assert_eq!(status.idle, 1);
    }

    #[tokio::test]
    async fn test_release_matches_handle_identity_not_id() {
        let factory = Arc::new(FakeFactory::with_shared_id("cad"));
        let pool = HandlePool::new(factory, config(2, 50));

        let first = assert_ok!(pool.acquire().await);
        let second = assert_ok!(pool.acquire().await);
        pool.release(&second);

        let next = assert_ok!(pool.acquire().await);
        assert!(Arc::ptr_eq(&next, &second));
        assert!(!Arc::ptr_eq(&next, &first));

        let err = assert_err!(pool.acquire().await.map(|h| h.id().to_string()));
        assert_eq!(err.kind(), ErrorKind::AcquisitionTimeout);
    }

    #[tokio::test]
    async fn test_destroy_disconnects_everything() {
        let factory = Arc::new(FakeFactory::new());
        let pool = HandlePool::new(factory.clone(), config(2, 50));

        let a = assert_ok!(pool.acquire().await);
        let b = assert_ok!(pool.acquire().await);
        pool.release(&a);

        assert_ok!(pool.destroy().await);

        for handle in factory.created() {
            assert_eq!(handle.disconnect_count(), 1);
        }
        let status = pool.status();
        assert!(status.closed);
        assert_eq!(status.size, 0);

        pool.release(&b);
        let err = assert_err!(pool.acquire().await.map(|h| h.id().to_string()));
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
