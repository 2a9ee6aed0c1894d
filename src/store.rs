//! Storage collaborator for games, versions, messages and token usage.
//!
//! The orchestrator only talks to [`GameStore`]. [`MemoryStore`] keeps
//! everything in process and backs the tests and demos.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::error::GenerationError;
use crate::types::{Game, GameMessage, GameVersion, TokenUsageRecord};

/// Failures reported by a [`GameStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique record already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The underlying storage failed.
    #[error("storage failure: {0}")]
    Backend(String),
}

impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        GenerationError::persistence(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence surface the orchestrator needs.
///
/// Implementations must be safe to call again after a failure: inserts of
/// token usage are guarded by [`StoreError::Conflict`] instead of
/// duplicating.
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn get_game(&self, game_id: &str) -> StoreResult<Option<Game>>;

    async fn insert_game(&self, game: Game) -> StoreResult<()>;

    async fn insert_message(&self, message: GameMessage) -> StoreResult<()>;

    async fn update_message_response(&self, message_id: &str, response: &str) -> StoreResult<()>;

    /// Highest version number stored for the game, if any.
    async fn latest_version_number(&self, game_id: &str) -> StoreResult<Option<u32>>;

    async fn insert_version(&self, version: GameVersion) -> StoreResult<()>;

    async fn update_game_current_code(
        &self,
        game_id: &str,
        code: &str,
        version_number: u32,
    ) -> StoreResult<()>;

    async fn query_token_usage(
        &self,
        game_id: &str,
        message_id: &str,
    ) -> StoreResult<Option<TokenUsageRecord>>;

    /// Insert a record. Fails with [`StoreError::Conflict`] if one exists
    /// for the same `(game_id, message_id)`.
    async fn insert_token_usage(&self, record: TokenUsageRecord) -> StoreResult<()>;

    async fn update_token_usage(&self, record: TokenUsageRecord) -> StoreResult<()>;
}

#[derive(Debug, Default)]
struct Tables {
    games: HashMap<String, Game>,
    messages: HashMap<String, GameMessage>,
    versions: Vec<GameVersion>,
    token_usage: HashMap<(String, String), TokenUsageRecord>,
    /// Remaining injected failures per operation name.
    failures: HashMap<&'static str, u32>,
}

impl Tables {
    fn check_failure(&mut self, op: &'static str) -> StoreResult<()> {
        match self.failures.get_mut(op) {
            Some(n) if *n > 0 => {
                *n -= 1;
                Err(StoreError::Backend(format!("injected failure in {}", op)))
            }
            _ => Ok(()),
        }
    }
}

/// In-process [`GameStore`].
///
/// # Example
///
/// ```
/// use artifact_forge::store::{GameStore, MemoryStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// assert!(store.get_game("missing").await.unwrap().is_none());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls of operation `op` fail with
    /// [`StoreError::Backend`]. `op` is the trait method name.
    pub async fn fail_next(&self, op: &'static str, count: u32) {
        self.tables.lock().await.failures.insert(op, count);
    }

    /// All versions of a game, ordered by version number.
    pub async fn versions(&self, game_id: &str) -> Vec<GameVersion> {
        let tables = self.tables.lock().await;
        let mut versions: Vec<_> = tables
            .versions
            .iter()
            .filter(|v| v.game_id == game_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version_number);
        versions
    }

    pub async fn message(&self, message_id: &str) -> Option<GameMessage> {
        self.tables.lock().await.messages.get(message_id).cloned()
    }

    /// Messages of a game, oldest first.
    pub async fn messages(&self, game_id: &str) -> Vec<GameMessage> {
        let tables = self.tables.lock().await;
        let mut messages: Vec<_> = tables
            .messages
            .values()
            .filter(|m| m.game_id == game_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    pub async fn token_records(&self) -> Vec<TokenUsageRecord> {
        self.tables.lock().await.token_usage.values().cloned().collect()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn get_game(&self, game_id: &str) -> StoreResult<Option<Game>> {
        let mut tables = self.tables.lock().await;
        tables.check_failure("get_game")?;
        Ok(tables.games.get(game_id).cloned())
    }

    async fn insert_game(&self, game: Game) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.check_failure("insert_game")?;
        if tables.games.contains_key(&game.id) {
            return Err(StoreError::Conflict(format!("game {}", game.id)));
        }
        tables.games.insert(game.id.clone(), game);
        Ok(())
    }

    async fn insert_message(&self, message: GameMessage) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.check_failure("insert_message")?;
        tables.messages.insert(message.id.clone(), message);
        Ok(())
    }

    async fn update_message_response(&self, message_id: &str, response: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.check_failure("update_message_response")?;
        let message = tables
            .messages
            .get_mut(message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", message_id)))?;
        message.response = Some(response.to_string());
        Ok(())
    }

    async fn latest_version_number(&self, game_id: &str) -> StoreResult<Option<u32>> {
        let mut tables = self.tables.lock().await;
        tables.check_failure("latest_version_number")?;
        Ok(tables
            .versions
            .iter()
            .filter(|v| v.game_id == game_id)
            .map(|v| v.version_number)
            .max())
    }

    async fn insert_version(&self, version: GameVersion) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.check_failure("insert_version")?;
        let duplicate = tables
            .versions
            .iter()
            .any(|v| v.game_id == version.game_id && v.version_number == version.version_number);
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "version {} of game {}",
                version.version_number, version.game_id
            )));
        }
        tables.versions.push(version);
        Ok(())
    }

    async fn update_game_current_code(
        &self,
        game_id: &str,
        code: &str,
        version_number: u32,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.check_failure("update_game_current_code")?;
        let game = tables
            .games
            .get_mut(game_id)
            .ok_or_else(|| StoreError::NotFound(format!("game {}", game_id)))?;
        game.code = code.to_string();
        game.current_version = version_number;
        Ok(())
    }

    async fn query_token_usage(
        &self,
        game_id: &str,
        message_id: &str,
    ) -> StoreResult<Option<TokenUsageRecord>> {
        let mut tables = self.tables.lock().await;
        tables.check_failure("query_token_usage")?;
        Ok(tables
            .token_usage
            .get(&(game_id.to_string(), message_id.to_string()))
            .cloned())
    }

    async fn insert_token_usage(&self, record: TokenUsageRecord) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.check_failure("insert_token_usage")?;
        let key = (record.game_id.clone(), record.message_id.clone());
        if tables.token_usage.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "token usage for game {} message {}",
                key.0, key.1
            )));
        }
        tables.token_usage.insert(key, record);
        Ok(())
    }

    async fn update_token_usage(&self, record: TokenUsageRecord) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.check_failure("update_token_usage")?;
        let key = (record.game_id.clone(), record.message_id.clone());
        match tables.token_usage.get_mut(&key) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "token usage for game {} message {}",
                key.0, key.1
            ))),
        }
    }
}
