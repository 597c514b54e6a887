//! Session state controller for the two generation workflows
//!
//! One controller owns a session: the reference bundle, the question-batch workflow and
//! the response-draft workflow. Each workflow runs
//! prompt -> model -> extraction -> (fallback) -> publish, strictly one at a time: a second
//! trigger while one is in flight is rejected with [`WarRoomError::InFlight`] and leaves the
//! published state untouched. The workflows share nothing mutable besides reading the
//! bundle, so they progress independently.
//!
//! Model and extraction failures are swallowed into a fallback artifact (flagged via
//! [`Generated::was_fallback`]) unless `fallback_on_error` is off, in which case the
//! workflow publishes [`GenerationState::Failed`] and the error is returned.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::traits::{ModelError, TextGenerator};
use crate::config::{Config, GenerationConfig};
use crate::error::{Result, WarRoomError};
use crate::extract::{ExtractionError, extract_questions, extract_response};
use crate::fallback;
use crate::ingest::TabularIngestor;
use crate::prompts::{
    build_question_prompt, build_question_prompt_with_context, build_response_prompt,
};
use crate::reference::{self, DataSources, ReferenceDataBundle};
use crate::schemas::{Question, QuestionBatch, ResponseDraft};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    Questions,
    Response,
}

impl Workflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::Questions => "question",
            Workflow::Response => "response",
        }
    }
}

/// A published artifact and where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generated<T> {
    pub id: Uuid,
    pub artifact: T,
    /// True when the artifact is the canned substitute, not model output
    pub was_fallback: bool,
    /// The swallowed failure behind a fallback
    pub fallback_reason: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl<T> Generated<T> {
    fn model(artifact: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact,
            was_fallback: false,
            fallback_reason: None,
            generated_at: Utc::now(),
        }
    }

    fn fallback(artifact: T, reason: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact,
            was_fallback: true,
            fallback_reason: Some(reason),
            generated_at: Utc::now(),
        }
    }
}

/// Lifecycle of one workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum GenerationState<T> {
    Idle,
    Loading,
    Ready(Generated<T>),
    Failed(String),
}

impl<T> GenerationState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, GenerationState::Loading)
    }

    pub fn ready(&self) -> Option<&Generated<T>> {
        match self {
            GenerationState::Ready(g) => Some(g),
            _ => None,
        }
    }
}

/// Availability of the reference bundle
#[derive(Debug, Clone)]
pub enum DataStatus {
    NotLoaded,
    Available(Arc<ReferenceDataBundle>),
    Unavailable(String),
}

struct Slot<T> {
    state: GenerationState<T>,
    in_flight: bool,
    /// Bumped whenever an in-flight result must no longer be published
    epoch: u64,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            state: GenerationState::Idle,
            in_flight: false,
            epoch: 0,
        }
    }
}

#[derive(Default)]
struct ResponseWorkflow {
    slot: Slot<ResponseDraft>,
    selected: Option<Question>,
}

impl ResponseWorkflow {
    /// Record `question` as current; a different question supersedes the draft
    fn select(&mut self, question: Question) {
        let same = self
            .selected
            .as_ref()
            .is_some_and(|s| s.id == question.id && s.question == question.question);
        if !same {
            self.slot.epoch += 1;
            self.slot.state = GenerationState::Idle;
            debug!("Selected question {}; response state -> Idle", question.id);
        }
        self.selected = Some(question);
    }
}

trait HasSlot<T> {
    fn slot(&mut self) -> &mut Slot<T>;
}

impl<T> HasSlot<T> for Slot<T> {
    fn slot(&mut self) -> &mut Slot<T> {
        self
    }
}

impl HasSlot<ResponseDraft> for ResponseWorkflow {
    fn slot(&mut self) -> &mut Slot<ResponseDraft> {
        &mut self.slot
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a workflow in flight for its lifetime. Dropped without `finish` (the caller's
/// future was cancelled) it clears the flag and returns a `Loading` state to `Idle`.
struct InFlightGuard<'a, W: HasSlot<T>, T> {
    cell: &'a Mutex<W>,
    workflow: Workflow,
    epoch: u64,
    finished: bool,
    _artifact: std::marker::PhantomData<fn() -> T>,
}

impl<'a, W: HasSlot<T>, T: Clone> InFlightGuard<'a, W, T> {
    /// Under one lock: reject if in flight, run `prepare`, then enter `Loading`
    fn begin<R>(
        cell: &'a Mutex<W>,
        workflow: Workflow,
        prepare: impl FnOnce(&mut W) -> Result<R>,
    ) -> Result<(Self, R)> {
        let mut w = lock(cell);
        if w.slot().in_flight {
            debug!("{} generation already in flight, ignoring trigger", workflow.as_str());
            return Err(WarRoomError::InFlight {
                workflow: workflow.as_str().to_string(),
            });
        }
        let prepared = prepare(&mut w)?;
        let slot = w.slot();
        slot.in_flight = true;
        slot.state = GenerationState::Loading;
        debug!("{} state -> Loading", workflow.as_str());
        let guard = Self {
            cell,
            workflow,
            epoch: slot.epoch,
            finished: false,
            _artifact: std::marker::PhantomData,
        };
        Ok((guard, prepared))
    }

    /// Publish the outcome unless the workflow moved on while this call was in flight
    fn finish(mut self, outcome: Result<Generated<T>>) -> Result<Generated<T>> {
        self.finished = true;
        let mut w = lock(self.cell);
        let slot = w.slot();
        slot.in_flight = false;
        if slot.epoch != self.epoch {
            info!(
                "Discarding stale {} result; selection changed while in flight",
                self.workflow.as_str()
            );
            return Err(WarRoomError::Superseded {
                workflow: self.workflow.as_str().to_string(),
            });
        }
        slot.state = match &outcome {
            Ok(generated) => GenerationState::Ready(generated.clone()),
            Err(e) => GenerationState::Failed(e.to_string()),
        };
        debug!(
            "{} state -> {}",
            self.workflow.as_str(),
            if outcome.is_ok() { "Ready" } else { "Failed" }
        );
        outcome
    }
}

impl<W: HasSlot<T>, T> Drop for InFlightGuard<'_, W, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut w = lock(self.cell);
        let slot = w.slot();
        slot.in_flight = false;
        if slot.epoch == self.epoch && slot.state.is_loading() {
            slot.state = GenerationState::Idle;
        }
        warn!("{} generation abandoned before completion", self.workflow.as_str());
    }
}

/// Owns one session's generation lifecycle
pub struct SessionController {
    generator: Arc<dyn TextGenerator>,
    config: GenerationConfig,
    model_timeout: Duration,
    fetch_timeout: Duration,
    data: RwLock<DataStatus>,
    questions: Mutex<Slot<QuestionBatch>>,
    response: Mutex<ResponseWorkflow>,
}

impl SessionController {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        config: GenerationConfig,
        model_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            config,
            model_timeout,
            fetch_timeout: reference::DEFAULT_FETCH_TIMEOUT,
            data: RwLock::new(DataStatus::NotLoaded),
            questions: Mutex::new(Slot::default()),
            response: Mutex::new(ResponseWorkflow::default()),
        }
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self::new(
            generator,
            config.generation.clone(),
            Duration::from_millis(config.model.timeout_ms),
        )
        .with_fetch_timeout(Duration::from_millis(config.data.fetch_timeout_ms))
    }

    /// Budget for each `http(s)` reference source
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Install an already-loaded bundle, replacing any previous one
    pub fn with_bundle(self, bundle: ReferenceDataBundle) -> Self {
        self.set_data(DataStatus::Available(Arc::new(bundle)));
        self
    }

    fn set_data(&self, status: DataStatus) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Load all four tables. On failure the session is marked data-unavailable and the
    /// error is returned; there is no automatic retry and no fallback bundle.
    pub async fn load_reference_data(
        &self,
        sources: &DataSources,
        ingestor: TabularIngestor,
    ) -> Result<Arc<ReferenceDataBundle>> {
        match reference::load_with_timeout(sources, ingestor, self.fetch_timeout).await {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                self.set_data(DataStatus::Available(bundle.clone()));
                Ok(bundle)
            }
            Err(e) => {
                warn!("Reference data unavailable: {}", e);
                self.set_data(DataStatus::Unavailable(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn data_status(&self) -> DataStatus {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn bundle(&self) -> Option<Arc<ReferenceDataBundle>> {
        match self.data_status() {
            DataStatus::Available(bundle) => Some(bundle),
            _ => None,
        }
    }

    pub fn question_state(&self) -> GenerationState<QuestionBatch> {
        lock(&self.questions).state.clone()
    }

    pub fn response_state(&self) -> GenerationState<ResponseDraft> {
        lock(&self.response).slot.state.clone()
    }

    pub fn selected_question(&self) -> Option<Question> {
        lock(&self.response).selected.clone()
    }

    /// Generate a new batch of `count` questions (clamped to the configured range),
    /// replacing the previous batch.
    pub async fn generate_questions(&self, count: usize) -> Result<Generated<QuestionBatch>> {
        let count = self.config.clamp_count(count);
        let (guard, ()) = InFlightGuard::begin(&self.questions, Workflow::Questions, |_| Ok(()))?;

        let prompt = match (self.config.include_reference_context, self.bundle()) {
            (true, Some(bundle)) => {
                build_question_prompt_with_context(count, &bundle, self.config.context_rows)
            }
            _ => build_question_prompt(count),
        };
        info!("Generating {} questions", count);

        let outcome = self
            .run_pipeline(Workflow::Questions, &prompt, extract_questions)
            .await;
        let outcome = self.resolve(Workflow::Questions, outcome, fallback::sample_questions);
        guard.finish(outcome)
    }

    /// Record `question` as the current selection. Selecting a different question
    /// supersedes its draft, including one still in flight.
    pub fn select_question(&self, question: Question) {
        lock(&self.response).select(question);
    }

    /// Select `question` and draft its response
    pub async fn generate_response(&self, question: Question) -> Result<Generated<ResponseDraft>> {
        let (guard, question) =
            InFlightGuard::begin(&self.response, Workflow::Response, |w: &mut ResponseWorkflow| {
                w.select(question.clone());
                Ok(question)
            })?;
        self.draft_response(guard, question).await
    }

    /// Draft a response for the current selection
    pub async fn generate_response_for_selected(&self) -> Result<Generated<ResponseDraft>> {
        let (guard, question) =
            InFlightGuard::begin(&self.response, Workflow::Response, |w: &mut ResponseWorkflow| {
                w.selected.clone().ok_or(WarRoomError::NoQuestionSelected)
            })?;
        self.draft_response(guard, question).await
    }

    async fn draft_response(
        &self,
        guard: InFlightGuard<'_, ResponseWorkflow, ResponseDraft>,
        question: Question,
    ) -> Result<Generated<ResponseDraft>> {
        info!("Drafting response for question {}", question.id);
        let prompt = build_response_prompt(&question);
        let outcome = self
            .run_pipeline(Workflow::Response, &prompt, extract_response)
            .await;
        let outcome = self.resolve(Workflow::Response, outcome, || {
            fallback::sample_response(&question)
        });
        guard.finish(outcome)
    }

    /// Drop the current batch, selection and draft. Rejected while either workflow is in flight.
    pub fn clear_questions(&self) -> Result<()> {
        let mut questions = lock(&self.questions);
        let mut response = lock(&self.response);
        for (busy, workflow) in [
            (questions.in_flight, Workflow::Questions),
            (response.slot.in_flight, Workflow::Response),
        ] {
            if busy {
                return Err(WarRoomError::InFlight {
                    workflow: workflow.as_str().to_string(),
                });
            }
        }
        questions.state = GenerationState::Idle;
        questions.epoch += 1;
        response.selected = None;
        response.slot.state = GenerationState::Idle;
        response.slot.epoch += 1;
        debug!("Cleared questions, selection and response");
        Ok(())
    }

    /// prompt -> model (bounded by the boundary timeout) -> extraction
    async fn run_pipeline<T>(
        &self,
        workflow: Workflow,
        prompt: &str,
        extract: fn(&str) -> std::result::Result<T, ExtractionError>,
    ) -> Result<T> {
        let started = Instant::now();
        let reply = tokio::time::timeout(self.model_timeout, self.generator.invoke(prompt)).await;
        let raw = match reply {
            Ok(reply) => reply?,
            Err(_) => {
                return Err(ModelError::Timeout {
                    timeout_ms: self.model_timeout.as_millis() as u64,
                }
                .into());
            }
        };
        debug!(
            "{} reply from {} after {}ms ({} chars)",
            workflow.as_str(),
            self.generator.model_name(),
            started.elapsed().as_millis(),
            raw.len()
        );
        Ok(extract(&raw)?)
    }

    /// Apply the fallback policy to a pipeline outcome
    fn resolve<T>(
        &self,
        workflow: Workflow,
        outcome: Result<T>,
        fallback: impl FnOnce() -> T,
    ) -> Result<Generated<T>> {
        match outcome {
            Ok(artifact) => Ok(Generated::model(artifact)),
            Err(e) if self.config.fallback_on_error && e.is_generation_failure() => {
                warn!("{} generation failed, using fallback: {}", workflow.as_str(), e);
                Ok(Generated::fallback(fallback(), e.to_string()))
            }
            Err(e) => {
                warn!("{} generation failed: {}", workflow.as_str(), e);
                Err(e)
            }
        }
    }
}
