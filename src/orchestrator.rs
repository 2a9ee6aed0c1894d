//! End-to-end generation: request, stream, retry, normalize, persist, account.
//!
//! ```text
//! Idle ─► Requesting ─► Streaming/Buffering ─► Normalizing ─► Persisting ─► Complete
//!            ▲                 │
//!            └── Retrying ◄────┘ (transient failure, attempts left)
//!                              │
//!                              └─► Failed, or soft success with partial content
//! ```

use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{extract_json_content, extract_json_usage, GenerationRequest, ResponseBody};
use crate::context::GenerationCtx;
use crate::error::{GenerationError, Result};
use crate::events::{emit, Event};
use crate::locks::GameLocks;
use crate::normalize::build_artifact;
use crate::observability::log_generation_complete;
use crate::store::{StoreError, StoreResult};
use crate::stream::{StreamAssembler, Usage};
use crate::tokens::{ensure_final_tracking, resolve_usage, TrackingRequest};
use crate::types::{GameMessage, GameVersion, GeneratedArtifact, ModelType, TokenUsage};

/// Input of one chat turn against an existing game.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub game_id: String,
    pub message: String,
    pub image_url: Option<String>,
    /// Overrides the game's model for this turn.
    pub model_type: Option<ModelType>,
}

impl GenerateParams {
    pub fn new(game_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            message: message.into(),
            image_url: None,
            model_type: None,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model_type: ModelType) -> Self {
        self.model_type = Some(model_type);
        self
    }
}

/// Raw text of a generation before normalization.
#[derive(Debug, Clone)]
pub struct GeneratedContent {
    pub content: String,
    /// Provider-reported counts, possibly empty.
    pub usage: Usage,
    pub attempts: u32,
    /// `true` when every attempt failed and partial content was used.
    pub partial: bool,
    /// Terminal view of the last attempt.
    pub terminal: Vec<String>,
}

/// Result of [`Orchestrator::generate`].
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub artifact: GeneratedArtifact,
    pub version_number: u32,
    pub message_id: String,
    pub usage: TokenUsage,
    pub attempts: u32,
    pub partial: bool,
    pub terminal: Vec<String>,
}

/// Output of one successful attempt.
struct AttemptOutput {
    content: String,
    usage: Usage,
}

/// Drives generations for one application.
///
/// Generations for the same game are serialized; different games run
/// concurrently.
///
/// # Example
///
/// ```no_run
/// use artifact_forge::{GenerateParams, GenerationCtx, Orchestrator};
///
/// # async fn run() -> artifact_forge::Result<()> {
/// let orchestrator = Orchestrator::new(GenerationCtx::builder("http://localhost:3000").build());
/// let outcome = orchestrator
///     .generate(GenerateParams::new("game-id", "add a score counter"))
///     .await?;
/// println!("version {}", outcome.version_number);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Orchestrator {
    ctx: GenerationCtx,
    locks: GameLocks,
}

impl Orchestrator {
    pub fn new(ctx: GenerationCtx) -> Self {
        Self {
            ctx,
            locks: GameLocks::new(),
        }
    }

    pub fn ctx(&self) -> &GenerationCtx {
        &self.ctx
    }

    pub fn locks(&self) -> &GameLocks {
        &self.locks
    }

    /// Generate a new version of a game from one chat message.
    ///
    /// Waits for any other generation of the same game to finish first.
    pub async fn generate(&self, params: GenerateParams) -> Result<GenerationOutcome> {
        let started = Instant::now();
        emit(
            &self.ctx.event_handler,
            Event::GenerationStart {
                game_id: Some(params.game_id.clone()),
                backend: self.ctx.backend.name(),
            },
        );

        let mut attempts = 0;
        let result = {
            let _guard = self.locks.acquire(&params.game_id).await;
            self.generate_locked(&params, &mut attempts).await
        };

        match result {
            Ok(outcome) => {
                log_generation_complete(
                    &params.game_id,
                    &outcome.usage,
                    outcome.attempts,
                    started.elapsed(),
                );
                emit(
                    &self.ctx.event_handler,
                    Event::GenerationEnd {
                        ok: true,
                        attempts: outcome.attempts,
                    },
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(game_id = %params.game_id, attempts, error = %e, "generation failed");
                emit(
                    &self.ctx.event_handler,
                    Event::GenerationEnd { ok: false, attempts },
                );
                Err(e)
            }
        }
    }

    async fn generate_locked(
        &self,
        params: &GenerateParams,
        attempts: &mut u32,
    ) -> Result<GenerationOutcome> {
        self.ctx.check_cancelled()?;

        let store = &self.ctx.store;
        let game = store
            .get_game(&params.game_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("game {}", params.game_id)))?;
        let model_type = params.model_type.unwrap_or(game.model_type);

        let message = GameMessage {
            id: Uuid::new_v4().to_string(),
            game_id: game.id.clone(),
            message: params.message.clone(),
            response: None,
            image_url: params.image_url.clone(),
            model_type,
            created_at: Utc::now(),
        };
        let message_id = message.id.clone();
        store.insert_message(message).await?;

        let mut request = GenerationRequest::new(game.prompt.clone(), model_type)
            .with_game(game.id.clone())
            .with_message(params.message.clone());
        if let Some(ref url) = params.image_url {
            request = request.with_image(url.clone());
        }
        if model_type.wants_thinking() {
            request = request.with_thinking_budget(self.ctx.config.thinking_budget);
        }
        if !game.code.trim().is_empty() {
            request.current_code = Some(game.code.clone());
        }

        let generated = self.run_attempts(&request, attempts).await?;

        let default_instructions = format!("Generated with {}.", model_type.as_str());
        let artifact = build_artifact(&generated.content, &default_instructions);
        let version_number = self.persist(&game.id, &message_id, &artifact).await?;
        info!(game_id = %game.id, version_number, partial = generated.partial, "version saved");

        let tracking = TrackingRequest {
            game_id: game.id.clone(),
            message_id: message_id.clone(),
            model_type,
            prompt: params.message.clone(),
            content: generated.content.clone(),
        };
        let usage = resolve_usage(generated.usage, &tracking.prompt, &tracking.content);
        self.track_usage(&tracking, usage).await;

        Ok(GenerationOutcome {
            artifact,
            version_number,
            message_id,
            usage,
            attempts: generated.attempts,
            partial: generated.partial,
            terminal: generated.terminal,
        })
    }

    /// Run attempts until one succeeds, retries run out, or the caller cancels.
    ///
    /// Each retry gets the longest partial content seen so far. When no
    /// attempt succeeds, partial content longer than
    /// [`GeneratorConfig::partial_threshold`](crate::GeneratorConfig::partial_threshold)
    /// is returned as a soft success.
    pub async fn generate_content(&self, request: &GenerationRequest) -> Result<GeneratedContent> {
        let mut attempts = 0;
        self.run_attempts(request, &mut attempts).await
    }

    /// Attempt loop behind [`generate_content`](Self::generate_content).
    ///
    /// `attempts` is kept current so callers see how many requests were made
    /// even when the loop ends in an error.
    async fn run_attempts(
        &self,
        request: &GenerationRequest,
        attempts: &mut u32,
    ) -> Result<GeneratedContent> {
        let config = &self.ctx.config;
        let max_attempts = config.retry.total_attempts();
        let mut partial: Option<String> = None;
        let mut attempt = 0;

        let (last_error, terminal) = loop {
            self.ctx.check_cancelled()?;
            attempt += 1;
            *attempts = attempt;
            emit(
                &self.ctx.event_handler,
                Event::AttemptStart {
                    attempt,
                    max_attempts,
                },
            );
            debug!(attempt, max_attempts, backend = self.ctx.backend.name(), "starting attempt");

            let mut req = request.clone();
            req.partial_content = partial.clone();
            let mut assembler = StreamAssembler::new();

            let result = match tokio::time::timeout(
                config.attempt_timeout,
                self.attempt(&req, &mut assembler),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout(config.attempt_timeout)),
            };

            let err = match result {
                Ok(output) => {
                    return Ok(GeneratedContent {
                        content: output.content,
                        usage: output.usage,
                        attempts: attempt,
                        partial: false,
                        terminal: assembler.finish().terminal,
                    });
                }
                Err(e) => e,
            };

            if assembler.content_len() > partial.as_ref().map_or(0, |p| p.chars().count()) {
                partial = Some(assembler.content().to_string());
            }

            if matches!(err, GenerationError::Cancelled) {
                return Err(err);
            }
            // Stream errors were already shown by the assembler.
            if !matches!(err, GenerationError::Stream { .. }) {
                self.notice(&mut assembler, &format!("Error: {}", err));
            }

            if !err.is_transient() || attempt >= max_attempts {
                warn!(attempt, error = %err, transient = err.is_transient(), "giving up on generation");
                break (err, assembler.finish().terminal);
            }

            let retry_after = match err {
                GenerationError::HttpError { retry_after, .. } => retry_after,
                _ => None,
            };
            let delay = config.retry.delay_with_hint(attempt - 1, retry_after);
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying generation");
            self.notice(&mut assembler, "Retrying...");
            emit(
                &self.ctx.event_handler,
                Event::TransportRetry {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: err.to_string(),
                },
            );
            sleep_unless_zero(delay).await;
        };

        if let Some(content) = partial.filter(|p| p.chars().count() > config.partial_threshold) {
            let chars = content.chars().count();
            warn!(chars, error = %last_error, "using partial content after failed attempts");
            emit(&self.ctx.event_handler, Event::PartialRecovery { chars });
            let mut terminal = terminal;
            terminal.push(format!("> Using partial content ({} characters)", chars));
            return Ok(GeneratedContent {
                content,
                usage: Usage::default(),
                attempts: attempt,
                partial: true,
                terminal,
            });
        }

        if last_error.is_transient() {
            Err(GenerationError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(last_error),
            })
        } else {
            Err(last_error)
        }
    }

    /// One request, consumed to the end.
    async fn attempt(
        &self,
        request: &GenerationRequest,
        assembler: &mut StreamAssembler,
    ) -> Result<AttemptOutput> {
        let body = self
            .ctx
            .backend
            .send(&self.ctx.client, &self.ctx.base_url, request)
            .await?;

        match body {
            ResponseBody::EventStream(mut chunks) => {
                while let Some(chunk) = chunks.next().await {
                    self.ctx.check_cancelled()?;
                    let outcome = assembler.feed(&chunk?)?;
                    for chunk in outcome.tokens {
                        emit(&self.ctx.event_handler, Event::Token { chunk });
                    }
                    self.emit_lines(assembler, &outcome.changed_lines);
                    if outcome.done {
                        break;
                    }
                }
                if assembler.content().is_empty() {
                    return Err(GenerationError::Network(
                        "stream closed before any content arrived".to_string(),
                    ));
                }
                Ok(AttemptOutput {
                    content: assembler.content().to_string(),
                    usage: assembler.usage(),
                })
            }
            ResponseBody::Json(value) => {
                let content = extract_json_content(&value)
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        GenerationError::Other("response contained no content".to_string())
                    })?;
                emit(
                    &self.ctx.event_handler,
                    Event::Token {
                        chunk: content.clone(),
                    },
                );
                self.notice(assembler, "Content generation completed!");
                Ok(AttemptOutput {
                    content,
                    usage: extract_json_usage(&value),
                })
            }
        }
    }

    /// Save an artifact as the game's next version.
    ///
    /// Creates the version, points the game at it, and records the
    /// instructions as the message's response. Returns the new version
    /// number. On failure the artifact is attached to the error so the
    /// caller can call this again without regenerating.
    pub async fn persist(
        &self,
        game_id: &str,
        message_id: &str,
        artifact: &GeneratedArtifact,
    ) -> Result<u32> {
        self.persist_inner(game_id, message_id, artifact)
            .await
            .map_err(|e| {
                error!(game_id, error = %e, "persisting version failed");
                GenerationError::Persistence {
                    message: e.to_string(),
                    artifact: Some(Box::new(artifact.clone())),
                }
            })
    }

    async fn persist_inner(
        &self,
        game_id: &str,
        message_id: &str,
        artifact: &GeneratedArtifact,
    ) -> StoreResult<u32> {
        let store = &self.ctx.store;
        let version_number = store.latest_version_number(game_id).await?.unwrap_or(0) + 1;
        store
            .insert_version(GameVersion {
                id: Uuid::new_v4().to_string(),
                game_id: game_id.to_string(),
                version_number,
                code: artifact.html.clone(),
                instructions: artifact.instructions.clone(),
                created_at: Utc::now(),
            })
            .await?;
        store
            .update_game_current_code(game_id, &artifact.html, version_number)
            .await?;
        store
            .update_message_response(message_id, &artifact.instructions)
            .await?;
        Ok(version_number)
    }

    /// Token accounting never fails a generation that produced a version.
    async fn track_usage(&self, tracking: &TrackingRequest, usage: TokenUsage) {
        match ensure_final_tracking(
            self.ctx.store.as_ref(),
            tracking,
            usage,
            &self.ctx.config.tracking,
        )
        .await
        {
            Ok(_) => emit(
                &self.ctx.event_handler,
                Event::TokenUsageRecorded {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    estimated: usage.estimated,
                },
            ),
            Err(e) => error!(game_id = %tracking.game_id, error = %e, "token usage was not recorded"),
        }
    }

    fn notice(&self, assembler: &mut StreamAssembler, text: &str) {
        if let Some(index) = assembler.notice(text) {
            self.emit_lines(assembler, &[index]);
        }
    }

    fn emit_lines(&self, assembler: &StreamAssembler, indices: &[usize]) {
        if self.ctx.event_handler.is_none() {
            return;
        }
        let lines = assembler.terminal().lines();
        for &index in indices {
            if let Some(line) = lines.get(index) {
                emit(
                    &self.ctx.event_handler,
                    Event::TerminalLine {
                        index,
                        line: line.clone(),
                    },
                );
            }
        }
    }
}

async fn sleep_unless_zero(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
