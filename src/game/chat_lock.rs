//! C9: per-chat serialization of `GameEngine` operations (§4.9). A map
//! `chat_id → mutex`, created on first use, guarded by a small auxiliary
//! registry mutex distinct from the per-chat mutex itself (§5) — the same
//! create-if-absent-then-release-the-registry-lock shape the reference
//! service uses for `ALL_USERS_MAP`/`GAME_MAP`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct ChatLockTable {
    registry: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLockTable {
    pub fn new() -> Self {
        ChatLockTable {
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the per-chat lock, creating it if this is the chat's first
    /// ever `Process` call. The returned guard holds the lock for as long as
    /// it's alive; drop it to release.
    pub async fn lock(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let chat_mutex = {
            let mut registry = self.registry.lock().await;
            registry
                .entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        chat_mutex.lock_owned().await
    }
}

impl Default for ChatLockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_chat_serializes_concurrent_callers() {
        let table = Arc::new(ChatLockTable::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let t1 = {
            let table = table.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _guard = table.lock(1).await;
                tokio::time::sleep(Duration::from_millis(30)).await;
                order.lock().await.push(1);
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let t2 = {
            let table = table.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _guard = table.lock(1).await;
                order.lock().await.push(2);
            })
        };

        t1.await.unwrap();
        t2.await.unwrap();
        assert_eq!(*order.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn different_chats_make_progress_in_parallel() {
        let table = Arc::new(ChatLockTable::new());
        let _g1 = table.lock(1).await;
        // A lock on a different chat must not block on chat 1's guard.
        let acquired = tokio::time::timeout(Duration::from_millis(100), table.lock(2)).await;
        assert!(acquired.is_ok());
    }
}
