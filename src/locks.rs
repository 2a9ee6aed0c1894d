//! Per-game serialization of generations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type LockMap = HashMap<String, Arc<Mutex<()>>>;

/// One async mutex per game id.
///
/// Holding a [`GameGuard`] means no other generation for that game is in
/// flight. Waiters queue in FIFO order. An entry lives only while someone
/// holds or waits on it.
#[derive(Debug, Default, Clone)]
pub struct GameLocks {
    locks: Arc<StdMutex<LockMap>>,
}

/// Held for the duration of one generation.
#[derive(Debug)]
pub struct GameGuard {
    game_id: String,
    locks: Arc<StdMutex<LockMap>>,
    _guard: OwnedMutexGuard<()>,
}

impl GameGuard {
    pub fn game_id(&self) -> &str {
        &self.game_id
    }
}

impl Drop for GameGuard {
    fn drop(&mut self) {
        let mut locks = lock_map(&self.locks);
        // The map and this guard account for two references; more means a waiter.
        if locks
            .get(&self.game_id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.game_id);
        }
    }
}

fn lock_map(locks: &StdMutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, game_id: &str) -> Arc<Mutex<()>> {
        lock_map(&self.locks)
            .entry(game_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn guard(&self, game_id: &str, guard: OwnedMutexGuard<()>) -> GameGuard {
        GameGuard {
            game_id: game_id.to_string(),
            locks: self.locks.clone(),
            _guard: guard,
        }
    }

    /// Wait until no other generation holds `game_id`, then hold it.
    pub async fn acquire(&self, game_id: &str) -> GameGuard {
        let lock = self.entry(game_id);
        debug!(game_id, "waiting for game lock");
        let guard = lock.lock_owned().await;
        self.guard(game_id, guard)
    }

    /// Hold `game_id` only if it is free right now.
    pub fn try_acquire(&self, game_id: &str) -> Option<GameGuard> {
        let lock = self.entry(game_id);
        match lock.try_lock_owned() {
            Ok(guard) => Some(self.guard(game_id, guard)),
            Err(_) => None,
        }
    }

    /// Number of games currently held or waited on.
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
