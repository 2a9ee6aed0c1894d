//! Token-usage estimation and reconciliation.
//!
//! Exactly one [`TokenUsageRecord`] exists per `(game_id, message_id)`.
//! [`reconcile`] inserts it if absent and updates it otherwise;
//! [`ensure_final_tracking`] retries that and, as a last resort, forces an
//! insert with estimated counts.

use tracing::{debug, info, warn};

use crate::backend::BackoffConfig;
use crate::error::{GenerationError, Result};
use crate::store::{GameStore, StoreError};
use crate::stream::Usage;
use crate::types::{ModelType, TokenUsage, TokenUsageRecord};

/// Estimate tokens from text length: `ceil(chars / 4)`.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Merge provider-reported usage with estimates.
///
/// Non-zero reported values win; missing or zero ones are estimated from the
/// prompt and content.
#[must_use]
pub fn resolve_usage(reported: Usage, prompt: &str, content: &str) -> TokenUsage {
    let mut estimated = false;
    let mut pick = |value: Option<u64>, text: &str| match value {
        Some(v) if v > 0 => v,
        _ => {
            estimated = true;
            estimate_tokens(text)
        }
    };
    let input_tokens = pick(reported.input_tokens, prompt);
    let output_tokens = pick(reported.output_tokens, content);
    TokenUsage {
        input_tokens,
        output_tokens,
        estimated,
    }
}

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Inserted,
    Updated,
    /// Every regular attempt failed; an estimated record was inserted.
    ForcedEstimate,
}

/// Identity and text of the generation being accounted.
#[derive(Debug, Clone)]
pub struct TrackingRequest {
    pub game_id: String,
    pub message_id: String,
    pub model_type: ModelType,
    pub prompt: String,
    pub content: String,
}

impl TrackingRequest {
    /// The record carrying `usage`.
    pub fn record(&self, usage: TokenUsage) -> TokenUsageRecord {
        TokenUsageRecord {
            game_id: self.game_id.clone(),
            message_id: self.message_id.clone(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            model_type: self.model_type,
            prompt: self.prompt.clone(),
        }
    }

    /// Counts estimated from text length only.
    pub fn estimate(&self) -> TokenUsage {
        resolve_usage(Usage::default(), &self.prompt, &self.content)
    }
}

/// Insert the record if none exists for its pair, else update it.
///
/// An insert that loses a race to a concurrent writer falls back to update.
pub async fn reconcile(store: &dyn GameStore, record: TokenUsageRecord) -> Result<Reconciled> {
    let existing = store
        .query_token_usage(&record.game_id, &record.message_id)
        .await?;

    if existing.is_some() {
        store.update_token_usage(record).await?;
        return Ok(Reconciled::Updated);
    }

    match store.insert_token_usage(record.clone()).await {
        Ok(()) => Ok(Reconciled::Inserted),
        Err(StoreError::Conflict(reason)) => {
            debug!(%reason, "token usage inserted concurrently, updating instead");
            store.update_token_usage(record).await?;
            Ok(Reconciled::Updated)
        }
        Err(e) => Err(e.into()),
    }
}

/// Reconcile with retries, then force an estimated insert.
pub async fn ensure_final_tracking(
    store: &dyn GameStore,
    request: &TrackingRequest,
    usage: TokenUsage,
    backoff: &BackoffConfig,
) -> Result<Reconciled> {
    let attempts = backoff.total_attempts();
    let mut last_error = None;

    for attempt in 0..attempts {
        match reconcile(store, request.record(usage)).await {
            Ok(outcome) => {
                info!(
                    game_id = %request.game_id,
                    message_id = %request.message_id,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    estimated = usage.estimated,
                    ?outcome,
                    "token usage recorded"
                );
                return Ok(outcome);
            }
            Err(e) => {
                warn!(attempt = attempt + 1, attempts, error = %e, "token usage reconciliation failed");
                last_error = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                }
            }
        }
    }

    let estimate = request.estimate();
    warn!(
        game_id = %request.game_id,
        input_tokens = estimate.input_tokens,
        output_tokens = estimate.output_tokens,
        "forcing estimated token usage insert"
    );
    match store.insert_token_usage(request.record(estimate)).await {
        Ok(()) => Ok(Reconciled::ForcedEstimate),
        Err(e) => Err(GenerationError::persistence(format!(
            "token usage could not be recorded: {} (last attempt: {})",
            e,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio_test::assert_ok;

    fn request() -> TrackingRequest {
        TrackingRequest {
            game_id: "g".into(),
            message_id: "m".into(),
            model_type: ModelType::Anthropic,
            prompt: "a".repeat(10),
            content: "b".repeat(21),
        }
    }

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("ééééé"), 2);
    }

    #[test]
    fn test_resolve_prefers_reported() {
        let reported = Usage {
            input_tokens: Some(100),
            output_tokens: Some(0),
        };
        let usage = resolve_usage(reported, "abcd", "abcdefgh");
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 2);
        assert!(usage.estimated);

        let full = Usage {
            input_tokens: Some(1),
            output_tokens: Some(2),
        };
        assert!(!resolve_usage(full, "", "").estimated);
    }

    #[tokio::test]
    async fn test_reconcile_twice_keeps_one_record() {
        let store = MemoryStore::new();
        let req = request();
        let first = req.record(TokenUsage {
            input_tokens: 3,
            output_tokens: 6,
            estimated: true,
        });
        let second = req.record(TokenUsage {
            input_tokens: 30,
            output_tokens: 60,
            estimated: false,
        });

        assert_eq!(reconcile(&store, first).await.unwrap(), Reconciled::Inserted);
        assert_eq!(reconcile(&store, second).await.unwrap(), Reconciled::Updated);

        let records = store.token_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].input_tokens, 30);
        assert_eq!(records[0].output_tokens, 60);
    }

    #[tokio::test]
    async fn test_reconcile_existing_updates() {
        let store = MemoryStore::new();
        let req = request();
        assert_ok!(store.insert_token_usage(req.record(req.estimate())).await);
        let outcome = reconcile(&store, req.record(req.estimate())).await.unwrap();
        assert_eq!(outcome, Reconciled::Updated);
    }

    #[tokio::test]
    async fn test_reconcile_propagates_store_failure() {
        let store = MemoryStore::new();
        store.fail_next("insert_token_usage", 1).await;
        let req = request();
        let err = reconcile(&store, req.record(req.estimate())).await.unwrap_err();
        assert!(matches!(err, GenerationError::Persistence { .. }));
    }

    #[tokio::test]
    async fn test_ensure_tracking_retries_then_succeeds() {
        let store = MemoryStore::new();
        store.fail_next("query_token_usage", 2).await;
        let req = request();
        let outcome = ensure_final_tracking(&store, &req, req.estimate(), &BackoffConfig::immediate(2))
            .await
            .unwrap();
        assert_eq!(outcome, Reconciled::Inserted);
        assert_eq!(store.token_records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_tracking_forces_estimate() {
        let store = MemoryStore::new();
        store.fail_next("query_token_usage", 3).await;
        let req = request();
        let reported = TokenUsage {
            input_tokens: 999,
            output_tokens: 999,
            estimated: false,
        };
        let outcome = ensure_final_tracking(&store, &req, reported, &BackoffConfig::immediate(2))
            .await
            .unwrap();
        assert_eq!(outcome, Reconciled::ForcedEstimate);

        let records = store.token_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].input_tokens, 3);
        assert_eq!(records[0].output_tokens, 6);
    }

    #[tokio::test]
    async fn test_ensure_tracking_gives_up() {
        let store = MemoryStore::new();
        store.fail_next("query_token_usage", 3).await;
        store.fail_next("insert_token_usage", 1).await;
        let req = request();
        let err = ensure_final_tracking(&store, &req, req.estimate(), &BackoffConfig::immediate(2))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Persistence { .. }));
    }
}
