//! Session controller behaviour: fallback totality, workflow isolation, in-flight guard,
//! stale-selection discard and strict mode.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use earnings_war_room::clients::{ModelError, TextGenerator};
use earnings_war_room::config::GenerationConfig;
use earnings_war_room::fallback;
use earnings_war_room::ingest::parse;
use earnings_war_room::reference::ReferenceDataBundle;
use earnings_war_room::schemas::{Category, Question, RiskLevel};
use earnings_war_room::session::DataStatus;
use earnings_war_room::{GenerationState, SessionController, WarRoomError};

const QUESTION_MARKER: &str = "equity research analyst";

const TWO_QUESTIONS: &str = r#"Here are the questions:
```json
[
  {"id": "a1", "question": "Why is NRR falling?", "category": "Growth", "difficulty": "Hard", "context": "consumption"},
  {"id": "a2", "question": "How do you beat Databricks?", "category": "Competition", "difficulty": "Very Hard", "context": "share"}
]
```"#;

const DRAFT: &str = r#"{"talking_points": ["p1"], "key_metrics": ["m1"], "response_text": "Thanks.", "risk_level": "Low", "follow_up_concerns": []}"#;

enum Reply {
    Text(String),
    Fail(u16),
}

/// Replies in order; records every prompt
#[derive(Default)]
struct Scripted {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Text(t)) => Ok(t),
            Some(Reply::Fail(status)) => Err(ModelError::Http {
                status,
                body: "upstream failure".into(),
            }),
            None => Err(ModelError::Network {
                message: "script exhausted".into(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Holds each call until the test releases a permit
struct Gated {
    gate: Semaphore,
}

impl Gated {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
        }
    }

    fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }
}

#[async_trait]
impl TextGenerator for Gated {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        let permit = self.gate.acquire().await.map_err(|e| ModelError::Network {
            message: e.to_string(),
        })?;
        permit.forget();
        if prompt.contains(QUESTION_MARKER) {
            Ok(TWO_QUESTIONS.to_string())
        } else {
            Ok(DRAFT.to_string())
        }
    }

    fn model_name(&self) -> &str {
        "gated"
    }
}

/// Never replies within any reasonable timeout
struct Stalled;

#[async_trait]
impl TextGenerator for Stalled {
    async fn invoke(&self, _prompt: &str) -> Result<String, ModelError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(String::new())
    }

    fn model_name(&self) -> &str {
        "stalled"
    }
}

fn session(generator: Arc<dyn TextGenerator>) -> SessionController {
    SessionController::new(generator, GenerationConfig::default(), Duration::from_secs(5))
}

fn strict_session(generator: Arc<dyn TextGenerator>) -> SessionController {
    let config = GenerationConfig {
        fallback_on_error: false,
        ..GenerationConfig::default()
    };
    SessionController::new(generator, config, Duration::from_secs(5))
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn valid_reply_is_published_as_model_output() {
    let s = session(Arc::new(Scripted::new(vec![Reply::Text(TWO_QUESTIONS.into())])));
    let batch = s.generate_questions(2).await.unwrap();

    assert!(!batch.was_fallback);
    assert!(batch.fallback_reason.is_none());
    assert_eq!(batch.artifact.len(), 2);
    assert_eq!(batch.artifact[1].category, Category::Competition);
    assert_eq!(s.question_state(), GenerationState::Ready(batch));
}

#[tokio::test]
async fn model_failure_falls_back_to_sample_questions() {
    let s = session(Arc::new(Scripted::new(vec![Reply::Fail(500)])));
    let batch = s.generate_questions(5).await.unwrap();

    assert!(batch.was_fallback);
    assert_eq!(batch.artifact, fallback::sample_questions());
    assert!(batch.fallback_reason.unwrap().contains("500"));
    assert!(s.question_state().ready().is_some());
}

#[tokio::test]
async fn unparseable_reply_falls_back_for_both_workflows() {
    let s = session(Arc::new(Scripted::new(vec![
        Reply::Text("I'd rather not.".into()),
        Reply::Text("{\"talking_points\": [".into()),
    ])));

    let batch = s.generate_questions(3).await.unwrap();
    assert!(batch.was_fallback);
    assert!(!batch.artifact.is_empty());

    let question = batch.artifact[0].clone();
    let draft = s.generate_response(question.clone()).await.unwrap();
    assert!(draft.was_fallback);
    assert_eq!(draft.artifact, fallback::sample_response(&question));
    assert_eq!(draft.artifact.risk_level, RiskLevel::Medium);
}

#[tokio::test]
async fn model_timeout_terminates_loading() {
    let s = SessionController::new(
        Arc::new(Stalled),
        GenerationConfig::default(),
        Duration::from_millis(50),
    );
    let batch = s.generate_questions(5).await.unwrap();
    assert!(batch.was_fallback);
    assert!(batch.fallback_reason.unwrap().contains("timed out"));
    assert!(!s.question_state().is_loading());
}

#[tokio::test]
async fn strict_mode_publishes_failure() {
    let s = strict_session(Arc::new(Scripted::new(vec![
        Reply::Fail(529),
        Reply::Text("no json".into()),
    ])));

    let err = s.generate_questions(5).await.unwrap_err();
    assert!(matches!(err, WarRoomError::Model(ModelError::Http { status: 529, .. })));
    assert!(matches!(s.question_state(), GenerationState::Failed(msg) if msg.contains("529")));

    let err = s
        .generate_response(Question::ad_hoc("Why?"))
        .await
        .unwrap_err();
    assert!(err.is_generation_failure());
    assert!(matches!(s.response_state(), GenerationState::Failed(_)));
}

#[tokio::test]
async fn workflows_do_not_touch_each_other() {
    let s = session(Arc::new(Scripted::new(vec![
        Reply::Text(DRAFT.into()),
        Reply::Fail(503),
    ])));

    let draft = s.generate_response(Question::ad_hoc("Margins?")).await.unwrap();
    assert!(!draft.was_fallback);
    assert_eq!(s.question_state(), GenerationState::Idle);

    let batch = s.generate_questions(5).await.unwrap();
    assert!(batch.was_fallback);
    assert_eq!(s.response_state(), GenerationState::Ready(draft));
}

#[tokio::test]
async fn second_trigger_while_loading_is_rejected() {
    let gated = Arc::new(Gated::new());
    let s = Arc::new(session(gated.clone()));

    let first = tokio::spawn({
        let s = s.clone();
        async move { s.generate_questions(2).await }
    });
    wait_until(|| s.question_state().is_loading()).await;

    let err = s.generate_questions(2).await.unwrap_err();
    assert!(matches!(err, WarRoomError::InFlight { .. }));
    assert!(s.question_state().is_loading());

    gated.release(1);
    let batch = first.await.unwrap().unwrap();
    assert_eq!(batch.artifact.len(), 2);
    assert_eq!(s.question_state(), GenerationState::Ready(batch));
}

#[tokio::test]
async fn response_can_run_while_questions_load() {
    let gated = Arc::new(Gated::new());
    let s = Arc::new(session(gated.clone()));

    let questions = tokio::spawn({
        let s = s.clone();
        async move { s.generate_questions(2).await }
    });
    wait_until(|| s.question_state().is_loading()).await;

    let response = tokio::spawn({
        let s = s.clone();
        async move { s.generate_response(Question::ad_hoc("FCF?")).await }
    });
    wait_until(|| s.response_state().is_loading()).await;

    gated.release(2);
    assert!(!questions.await.unwrap().unwrap().was_fallback);
    assert!(!response.await.unwrap().unwrap().was_fallback);
}

#[tokio::test]
async fn stale_response_is_discarded_after_reselection() {
    let gated = Arc::new(Gated::new());
    let s = Arc::new(session(gated.clone()));
    let q1 = Question::ad_hoc("First?");
    let q2 = Question {
        id: "q2".into(),
        ..Question::ad_hoc("Second?")
    };

    let pending = tokio::spawn({
        let s = s.clone();
        let q1 = q1.clone();
        async move { s.generate_response(q1).await }
    });
    wait_until(|| s.response_state().is_loading()).await;

    s.select_question(q2.clone());
    assert_eq!(s.response_state(), GenerationState::Idle);

    gated.release(1);
    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, WarRoomError::Superseded { .. }));
    assert_eq!(s.response_state(), GenerationState::Idle);
    assert_eq!(s.selected_question(), Some(q2));

    gated.release(1);
    let fresh = s.generate_response_for_selected().await.unwrap();
    assert_eq!(s.response_state(), GenerationState::Ready(fresh));
}

#[tokio::test]
async fn reselecting_same_question_keeps_draft() {
    let s = session(Arc::new(Scripted::new(vec![Reply::Text(DRAFT.into())])));
    let q = Question::ad_hoc("Same?");
    let draft = s.generate_response(q.clone()).await.unwrap();

    s.select_question(q);
    assert_eq!(s.response_state(), GenerationState::Ready(draft));
}

#[tokio::test]
async fn response_without_selection_is_an_error() {
    let s = session(Arc::new(Scripted::default()));
    let err = s.generate_response_for_selected().await.unwrap_err();
    assert!(matches!(err, WarRoomError::NoQuestionSelected));
    assert_eq!(s.response_state(), GenerationState::Idle);
}

#[tokio::test]
async fn abandoned_call_returns_to_idle() {
    let gated = Arc::new(Gated::new());
    let s = Arc::new(session(gated.clone()));

    let pending = tokio::spawn({
        let s = s.clone();
        async move { s.generate_questions(2).await }
    });
    wait_until(|| s.question_state().is_loading()).await;

    pending.abort();
    let _ = pending.await;
    assert_eq!(s.question_state(), GenerationState::Idle);

    gated.release(1);
    assert!(s.generate_questions(2).await.is_ok());
}

#[tokio::test]
async fn clear_questions_resets_batch_and_selection() {
    let s = session(Arc::new(Scripted::new(vec![
        Reply::Text(TWO_QUESTIONS.into()),
        Reply::Text(DRAFT.into()),
    ])));
    let batch = s.generate_questions(2).await.unwrap();
    s.generate_response(batch.artifact[0].clone()).await.unwrap();

    s.clear_questions().unwrap();
    assert_eq!(s.question_state(), GenerationState::Idle);
    assert_eq!(s.response_state(), GenerationState::Idle);
    assert_eq!(s.selected_question(), None);
}

#[tokio::test]
async fn clear_questions_rejected_while_loading() {
    let gated = Arc::new(Gated::new());
    let s = Arc::new(session(gated.clone()));

    let pending = tokio::spawn({
        let s = s.clone();
        async move { s.generate_questions(2).await }
    });
    wait_until(|| s.question_state().is_loading()).await;

    assert!(matches!(
        s.clear_questions(),
        Err(WarRoomError::InFlight { .. })
    ));
    gated.release(1);
    pending.await.unwrap().unwrap();
}

#[tokio::test]
async fn reference_context_reaches_question_prompt() {
    let scripted = Arc::new(Scripted::new(vec![Reply::Text(TWO_QUESTIONS.into())]));
    let config = GenerationConfig {
        include_reference_context: true,
        ..GenerationConfig::default()
    };
    let bundle = ReferenceDataBundle::new(
        parse("FISCAL_QUARTER,FISCAL_YEAR,NRR_PERCENT\nQ3,2026,125\nQ3,2025,127\n"),
        Vec::new(),
        Vec::new(),
        parse("COMPANY,HEADLINE,SUMMARY\nMongoDB,Atlas grows 26%,Raised guidance\n"),
    );
    let s = SessionController::new(scripted.clone(), config, Duration::from_secs(5))
        .with_bundle(bundle);
    assert!(matches!(s.data_status(), DataStatus::Available(_)));

    s.generate_questions(2).await.unwrap();
    let prompts = scripted.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Reference Data"));
    assert!(prompts[0].contains("MongoDB: Atlas grows 26%"));
}

#[tokio::test]
async fn count_is_clamped_into_configured_range() {
    let scripted = Arc::new(Scripted::new(vec![Reply::Text(TWO_QUESTIONS.into())]));
    let s = session(scripted.clone());
    s.generate_questions(0).await.unwrap();

    let prompts = scripted.prompts.lock().unwrap();
    assert!(prompts[0].contains("generate 1 tough, specific questions"));
}
