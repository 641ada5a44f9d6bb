//! Asynchronous completion pipeline
//!
//! Appending a user message schedules one completion run. Runs are queued on a
//! bounded channel and executed by a dispatcher task that caps how many calls
//! to the completion capability are in flight at once. Each run ends in a
//! [`CompletionReport`] broadcast to subscribers and counted in [`PipelineStats`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chatline_llm::{CompletionRequest, LlmService};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::domain::context::{ContextWindow, GenerationSettings};
use crate::domain::entities::Message;
use crate::domain::state::{
    CompletionEvent, CompletionFailure, CompletionState, CompletionStateMachine,
};
use crate::repository::ConversationsRepositories;

/// Reports buffered per subscriber before slow receivers start lagging
const REPORT_BUFFER: usize = 256;

/// The user message a completion run answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionTrigger {
    pub conversation_id: Uuid,
    pub owner_id: Uuid,
    pub message_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("completion queue is full")]
    QueueFull,

    #[error("completion pipeline is shut down")]
    Closed,
}

/// Accepts completion runs without waiting for them
pub trait CompletionScheduler: Send + Sync {
    fn schedule(&self, trigger: CompletionTrigger) -> Result<(), ScheduleError>;
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub generation: GenerationSettings,
    /// Upper bound on a single capability call
    pub timeout: Duration,
    pub queue_capacity: usize,
    pub concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            generation: GenerationSettings::default(),
            timeout: Duration::from_secs(30),
            queue_capacity: 256,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Completed {
        message_id: Uuid,
    },
    Failed {
        failure: CompletionFailure,
        reason: String,
    },
}

/// Terminal result of one completion run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionReport {
    pub trigger: CompletionTrigger,
    #[serde(flatten)]
    pub outcome: CompletionOutcome,
}

impl CompletionReport {
    pub fn state(&self) -> CompletionState {
        match self.outcome {
            CompletionOutcome::Completed { .. } => CompletionState::Completed,
            CompletionOutcome::Failed { .. } => CompletionState::Failed,
        }
    }

    pub fn failure(&self) -> Option<CompletionFailure> {
        match self.outcome {
            CompletionOutcome::Completed { .. } => None,
            CompletionOutcome::Failed { failure, .. } => Some(failure),
        }
    }
}

/// Running counters for the pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    scheduled: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    quota_exceeded: AtomicU64,
    generation_error: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub scheduled: u64,
    pub rejected: u64,
    pub completed: u64,
    pub quota_exceeded: u64,
    pub generation_error: u64,
}

impl PipelineStatsSnapshot {
    /// Runs accepted but not yet finished
    pub fn pending(&self) -> u64 {
        self.scheduled
            .saturating_sub(self.completed + self.quota_exceeded + self.generation_error)
    }
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            quota_exceeded: self.quota_exceeded.load(Ordering::Relaxed),
            generation_error: self.generation_error.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &CompletionOutcome) {
        let counter = match outcome {
            CompletionOutcome::Completed { .. } => &self.completed,
            CompletionOutcome::Failed {
                failure: CompletionFailure::QuotaExceeded,
                ..
            } => &self.quota_exceeded,
            CompletionOutcome::Failed {
                failure: CompletionFailure::GenerationError,
                ..
            } => &self.generation_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle to a running pipeline; cheap to clone
#[derive(Clone)]
pub struct CompletionPipeline {
    queue: mpsc::Sender<CompletionTrigger>,
    reports: broadcast::Sender<CompletionReport>,
    stats: Arc<PipelineStats>,
}

impl CompletionPipeline {
    /// Spawn the dispatcher task.
    ///
    /// The dispatcher exits once every handle is dropped and the queue is
    /// drained, after waiting for runs already in flight.
    pub fn start(
        repos: ConversationsRepositories,
        llm: Arc<dyn LlmService>,
        settings: PipelineSettings,
    ) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let (reports, _) = broadcast::channel(REPORT_BUFFER);
        let stats = Arc::new(PipelineStats::default());

        let worker = CompletionWorker {
            repos,
            llm,
            settings,
            reports: reports.clone(),
            stats: stats.clone(),
        };
        let handle = tokio::spawn(worker.dispatch(receiver));

        (
            Self {
                queue,
                reports,
                stats,
            },
            handle,
        )
    }

    /// Receive the report of every run finishing after this call
    pub fn subscribe(&self) -> broadcast::Receiver<CompletionReport> {
        self.reports.subscribe()
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }
}

impl CompletionScheduler for CompletionPipeline {
    fn schedule(&self, trigger: CompletionTrigger) -> Result<(), ScheduleError> {
        // Counted before sending so a fast run never finishes ahead of its count
        self.stats.scheduled.fetch_add(1, Ordering::Relaxed);

        self.queue.try_send(trigger).map_err(|e| {
            self.stats.scheduled.fetch_sub(1, Ordering::Relaxed);
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => ScheduleError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => ScheduleError::Closed,
            }
        })?;

        tracing::debug!(
            conversation_id = %trigger.conversation_id,
            message_id = %trigger.message_id,
            "Completion scheduled"
        );
        Ok(())
    }
}

struct CompletionWorker {
    repos: ConversationsRepositories,
    llm: Arc<dyn LlmService>,
    settings: PipelineSettings,
    reports: broadcast::Sender<CompletionReport>,
    stats: Arc<PipelineStats>,
}

impl CompletionWorker {
    async fn dispatch(self, mut receiver: mpsc::Receiver<CompletionTrigger>) {
        let worker = Arc::new(self);
        let permits = Arc::new(Semaphore::new(worker.settings.concurrency.max(1)));
        let mut runs = JoinSet::new();

        while let Some(trigger) = receiver.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };

            let worker = worker.clone();
            runs.spawn(async move {
                let _permit = permit;
                worker.run(trigger).await;
            });

            while let Some(joined) = runs.try_join_next() {
                log_join_failure(joined);
            }
        }

        while let Some(joined) = runs.join_next().await {
            log_join_failure(joined);
        }
        tracing::info!("Completion pipeline stopped");
    }

    async fn run(&self, trigger: CompletionTrigger) {
        let mut state = CompletionState::Scheduled;

        let outcome = match self.prepare(&trigger).await {
            Err(reason) => {
                state = advance(state, CompletionEvent::Fail);
                CompletionOutcome::Failed {
                    failure: CompletionFailure::GenerationError,
                    reason,
                }
            }
            Ok(request) => {
                state = advance(state, CompletionEvent::Dispatch);
                let outcome = self.generate(&trigger, request).await;
                let event = match outcome {
                    CompletionOutcome::Completed { .. } => CompletionEvent::Succeed,
                    CompletionOutcome::Failed { .. } => CompletionEvent::Fail,
                };
                state = advance(state, event);
                outcome
            }
        };

        self.finish(trigger, state, outcome);
    }

    /// Load the transcript and build the request for this trigger
    async fn prepare(&self, trigger: &CompletionTrigger) -> Result<CompletionRequest, String> {
        let transcript = self
            .repos
            .messages
            .list_by_conversation(trigger.conversation_id)
            .await
            .map_err(|e| format!("failed to load transcript: {e}"))?;

        let window = ContextWindow::for_trigger(&transcript, trigger.message_id)
            .map_err(|e| format!("cannot build context window: {e}"))?;

        Ok(window.into_request(self.settings.generation))
    }

    async fn generate(
        &self,
        trigger: &CompletionTrigger,
        request: CompletionRequest,
    ) -> CompletionOutcome {
        let response =
            match tokio::time::timeout(self.settings.timeout, self.llm.complete(request)).await {
                Err(_) => {
                    return CompletionOutcome::Failed {
                        failure: CompletionFailure::GenerationError,
                        reason: format!(
                            "completion timed out after {}s",
                            self.settings.timeout.as_secs_f32()
                        ),
                    }
                }
                Ok(Err(e)) => {
                    return CompletionOutcome::Failed {
                        failure: CompletionFailure::classify(&e),
                        reason: e.to_string(),
                    }
                }
                Ok(Ok(response)) => response,
            };

        let reply = match Message::new_assistant(
            trigger.conversation_id,
            trigger.owner_id,
            response.content,
        ) {
            Ok(reply) => reply,
            Err(_) => {
                return CompletionOutcome::Failed {
                    failure: CompletionFailure::GenerationError,
                    reason: "completion returned no text".to_string(),
                }
            }
        };

        // The conversation may have been deleted while the call was in flight
        match self
            .repos
            .conversations
            .find_owned(trigger.conversation_id, trigger.owner_id)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                return CompletionOutcome::Failed {
                    failure: CompletionFailure::GenerationError,
                    reason: "conversation no longer exists".to_string(),
                }
            }
            Err(e) => {
                return CompletionOutcome::Failed {
                    failure: CompletionFailure::GenerationError,
                    reason: format!("failed to check conversation: {e}"),
                }
            }
        }

        let stored = match self.repos.messages.create(&reply).await {
            Ok(stored) => stored,
            Err(e) => {
                return CompletionOutcome::Failed {
                    failure: CompletionFailure::GenerationError,
                    reason: format!("failed to store reply: {e}"),
                }
            }
        };

        if let Err(e) = self
            .repos
            .conversations
            .touch(trigger.conversation_id, Utc::now())
            .await
        {
            tracing::warn!(
                error = %e,
                conversation_id = %trigger.conversation_id,
                "Failed to refresh conversation activity after reply"
            );
        }

        tracing::debug!(
            model = %response.model,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Completion usage"
        );

        CompletionOutcome::Completed {
            message_id: stored.id,
        }
    }

    fn finish(&self, trigger: CompletionTrigger, state: CompletionState, outcome: CompletionOutcome) {
        match &outcome {
            CompletionOutcome::Completed { message_id } => tracing::info!(
                conversation_id = %trigger.conversation_id,
                trigger_id = %trigger.message_id,
                reply_id = %message_id,
                state = %state,
                "Completion stored"
            ),
            CompletionOutcome::Failed {
                failure: CompletionFailure::QuotaExceeded,
                reason,
            } => tracing::warn!(
                conversation_id = %trigger.conversation_id,
                trigger_id = %trigger.message_id,
                state = %state,
                reason = %reason,
                "Completion refused: quota exceeded"
            ),
            CompletionOutcome::Failed {
                failure: CompletionFailure::GenerationError,
                reason,
            } => tracing::error!(
                conversation_id = %trigger.conversation_id,
                trigger_id = %trigger.message_id,
                state = %state,
                reason = %reason,
                "Completion failed"
            ),
        }

        self.stats.record(&outcome);
        // No subscribers is fine
        let _ = self.reports.send(CompletionReport { trigger, outcome });
    }
}

fn advance(state: CompletionState, event: CompletionEvent) -> CompletionState {
    match CompletionStateMachine::transition(state, event) {
        Ok(next) => next,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring invalid completion transition");
            state
        }
    }
}

#[mutants::skip] // Logging only
fn log_join_failure(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Completion run aborted");
    }
}
