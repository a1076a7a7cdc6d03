use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use common::UserId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per user, created on demand.
#[derive(Default)]
pub(crate) struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub(crate) async fn acquire(&self, user_id: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() >= PRUNE_THRESHOLD {
                // Entries only the map refers to have no holder or waiter.
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(user_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let locks = Arc::new(UserLocks::default());
        let user = UserId::new("u1");
        let guard = locks.acquire(&user).await;

        let waiter = {
            let locks = locks.clone();
            let user = user.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&user).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::default();
        let _a = locks.acquire(&UserId::new("a")).await;
        let _b = locks.acquire(&UserId::new("b")).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = UserLocks::default();
        for n in 0..PRUNE_THRESHOLD {
            drop(locks.acquire(&UserId::new(format!("u{n}"))).await);
        }
        let _g = locks.acquire(&UserId::new("last")).await;
        assert_eq!(locks.len(), 1);
    }
}
