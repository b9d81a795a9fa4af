//! Session lifecycle for one simulation screen.
//!
//! The machine is a pure transition function: [`SimulationSession::handle`]
//! takes an event, updates the transcript and state, and returns the
//! [`Effect`]s the host must carry out. Network effects are executed with
//! [`perform`], whose result is fed back in as the next event. Entering
//! `AwaitingResponse` or `Analyzing` is what guarantees a single outstanding
//! request: every event that would start another one is rejected there.

use crate::api::{ApiError, SimulationBackend};
use crate::models::{ExchangeRequest, Feedback};
use crate::state::{Transcript, Turn};
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CONNECTION_FAILURE_TEXT: &str = "Sorry, there was a connection issue.";
pub const ANALYZING_ANNOUNCEMENT: &str = "Analyzing your performance. One moment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    AwaitingResponse,
    Analyzing,
    Concluded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A finalized user utterance from the input controller.
    Utterance(String),
    /// The user asked to end the session and get feedback.
    EndRequested,
    ResponseReceived(String),
    ResponseFailed(ApiError),
    AnalysisReceived(Feedback),
    AnalysisFailed(ApiError),
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Utterance(_) => "utterance",
            SessionEvent::EndRequested => "end request",
            SessionEvent::ResponseReceived(_) => "response",
            SessionEvent::ResponseFailed(_) => "response failure",
            SessionEvent::AnalysisReceived(_) => "analysis",
            SessionEvent::AnalysisFailed(_) => "analysis failure",
        }
    }
}

/// Work the host carries out on behalf of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Respond(ExchangeRequest),
    Analyze(ExchangeRequest),
    /// Speak an AI-authored line. Fire-and-forget.
    Vocalize(String),
    /// Show a blocking notice to the user.
    Notify(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{event} is not accepted while {state:?}")]
pub struct Rejected {
    pub state: SessionState,
    pub event: &'static str,
}

pub struct SimulationSession {
    id: SessionId,
    scenario_id: i64,
    state: SessionState,
    transcript: Transcript,
    feedback: Option<Feedback>,
    vocalize: bool,
}

impl SimulationSession {
    pub fn new(scenario_id: i64, greeting: &str, vocalize: bool) -> Self {
        let session = Self {
            id: SessionId::new(),
            scenario_id,
            state: SessionState::Active,
            transcript: Transcript::seeded(greeting),
            feedback: None,
            vocalize,
        };
        info!(session_id = %session.id, scenario_id, "Simulation session started");
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn scenario_id(&self) -> i64 {
        self.scenario_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    /// A request to the backend is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            SessionState::AwaitingResponse | SessionState::Analyzing
        )
    }

    pub fn set_vocalize(&mut self, vocalize: bool) {
        self.vocalize = vocalize;
    }

    /// Effects to run when the screen opens: speaking the greeting.
    pub fn opening_effects(&self) -> Vec<Effect> {
        match self.transcript.last() {
            Some(greeting) if self.vocalize => vec![Effect::Vocalize(greeting.text.clone())],
            _ => Vec::new(),
        }
    }

    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<Effect>, Rejected> {
        let name = event.name();
        let effects = match (self.state, event) {
            (SessionState::Active, SessionEvent::Utterance(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(Vec::new());
                }
                self.push(Turn::user(text));
                self.state = SessionState::AwaitingResponse;
                vec![Effect::Respond(self.exchange_request())]
            }
            (SessionState::AwaitingResponse, SessionEvent::ResponseReceived(text)) => {
                self.state = SessionState::Active;
                if text.trim().is_empty() {
                    warn!(session_id = %self.id, "Backend returned an empty response");
                    self.ai_says(CONNECTION_FAILURE_TEXT.to_string())
                } else {
                    self.ai_says(text)
                }
            }
            (SessionState::AwaitingResponse, SessionEvent::ResponseFailed(err)) => {
                warn!(session_id = %self.id, error = %err, "Respond call failed");
                self.state = SessionState::Active;
                self.ai_says(CONNECTION_FAILURE_TEXT.to_string())
            }
            (SessionState::Active, SessionEvent::EndRequested) => {
                self.state = SessionState::Analyzing;
                let mut effects = Vec::new();
                if self.vocalize {
                    effects.push(Effect::Vocalize(ANALYZING_ANNOUNCEMENT.to_string()));
                }
                effects.push(Effect::Analyze(self.exchange_request()));
                effects
            }
            (SessionState::Analyzing, SessionEvent::AnalysisReceived(feedback)) => {
                info!(
                    session_id = %self.id,
                    goal_achieved = feedback.goal_achieved,
                    "Session concluded"
                );
                self.feedback = Some(feedback);
                self.state = SessionState::Concluded;
                Vec::new()
            }
            (SessionState::Analyzing, SessionEvent::AnalysisFailed(err)) => {
                warn!(session_id = %self.id, error = %err, "Analyze call failed");
                self.state = SessionState::Active;
                vec![Effect::Notify(format!("Analysis Error: {}", err))]
            }
            (state, _) => {
                debug!(session_id = %self.id, ?state, event = name, "Event rejected");
                return Err(Rejected { state, event: name });
            }
        };
        Ok(effects)
    }

    fn ai_says(&mut self, text: String) -> Vec<Effect> {
        self.push(Turn::ai(text.clone()));
        if self.vocalize {
            vec![Effect::Vocalize(text)]
        } else {
            Vec::new()
        }
    }

    fn push(&mut self, turn: Turn) {
        // Callers only pass non-blank text.
        if let Err(e) = self.transcript.append(turn) {
            warn!(session_id = %self.id, error = %e, "Dropped malformed turn");
        }
    }

    fn exchange_request(&self) -> ExchangeRequest {
        ExchangeRequest {
            conversation: self.transcript.snapshot().to_vec(),
            scenario_id: self.scenario_id,
        }
    }
}

/// Executes a network effect and returns the event that reports its outcome.
///
/// `Vocalize` and `Notify` are host concerns and yield `None`.
pub async fn perform(effect: &Effect, backend: &dyn SimulationBackend) -> Option<SessionEvent> {
    match effect {
        Effect::Respond(request) => Some(match backend.respond(request).await {
            Ok(text) => SessionEvent::ResponseReceived(text),
            Err(err) => SessionEvent::ResponseFailed(err),
        }),
        Effect::Analyze(request) => Some(match backend.analyze(request).await {
            Ok(feedback) => SessionEvent::AnalysisReceived(feedback),
            Err(err) => SessionEvent::AnalysisFailed(err),
        }),
        Effect::Vocalize(_) | Effect::Notify(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::simulation::MockSimulationBackend;
    use crate::state::Speaker;
    use std::collections::BTreeMap;

    const GREETING: &str = "Hello...";

    fn feedback(goal_achieved: bool) -> Feedback {
        Feedback {
            goal_achieved,
            keywords_usage: vec!["budget".into()],
            feedback_on_goal: Some("Confident.".into()),
            overall_assessment: "Great work!".into(),
            scores: BTreeMap::new(),
        }
    }

    /// Applies `event` and runs every resulting network effect to completion.
    async fn drive(
        session: &mut SimulationSession,
        backend: &MockSimulationBackend,
        event: SessionEvent,
    ) -> Vec<Effect> {
        let mut host_effects = Vec::new();
        let mut pending = vec![event];
        while let Some(event) = pending.pop() {
            let Ok(effects) = session.handle(event) else {
                continue;
            };
            for effect in effects {
                match perform(&effect, backend).await {
                    Some(next) => pending.push(next),
                    None => host_effects.push(effect),
                }
            }
        }
        host_effects
    }

    #[test]
    fn test_new_session_is_active_with_seed_turn() {
        let session = SimulationSession::new(1, GREETING, false);
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.transcript().snapshot(), &[Turn::ai(GREETING)]);
        assert!(session.feedback().is_none());
        assert!(session.opening_effects().is_empty());
    }

    #[test]
    fn test_opening_effects_speak_greeting() {
        let session = SimulationSession::new(1, GREETING, true);
        assert_eq!(
            session.opening_effects(),
            vec![Effect::Vocalize(GREETING.to_string())]
        );
    }

    #[test]
    fn test_utterance_moves_to_awaiting_and_requests_response() {
        let mut session = SimulationSession::new(9, GREETING, false);
        let effects = session
            .handle(SessionEvent::Utterance("I'd like a quote".into()))
            .unwrap();

        assert_eq!(session.state(), SessionState::AwaitingResponse);
        assert_eq!(
            effects,
            vec![Effect::Respond(ExchangeRequest {
                conversation: vec![Turn::ai(GREETING), Turn::user("I'd like a quote")],
                scenario_id: 9,
            })]
        );
    }

    #[test]
    fn test_blank_utterance_is_silently_ignored() {
        let mut session = SimulationSession::new(1, GREETING, false);
        assert_eq!(session.handle(SessionEvent::Utterance("  ".into())), Ok(vec![]));
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.transcript().len(), 1);
    }

    #[test]
    fn test_busy_session_rejects_new_work() {
        let mut session = SimulationSession::new(1, GREETING, false);
        session
            .handle(SessionEvent::Utterance("first".into()))
            .unwrap();

        let rejected = session
            .handle(SessionEvent::Utterance("second".into()))
            .unwrap_err();
        assert_eq!(rejected.state, SessionState::AwaitingResponse);
        assert!(session.handle(SessionEvent::EndRequested).is_err());
        assert_eq!(session.transcript().len(), 2);

        session
            .handle(SessionEvent::ResponseReceived("ok".into()))
            .unwrap();
        session.handle(SessionEvent::EndRequested).unwrap();
        assert_eq!(session.state(), SessionState::Analyzing);
        assert!(session
            .handle(SessionEvent::Utterance("third".into()))
            .is_err());
        assert_eq!(session.transcript().len(), 3);
    }

    #[test]
    fn test_stray_results_are_rejected() {
        let mut session = SimulationSession::new(1, GREETING, false);
        assert!(session
            .handle(SessionEvent::ResponseReceived("late".into()))
            .is_err());
        assert!(session
            .handle(SessionEvent::AnalysisReceived(feedback(true)))
            .is_err());
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.transcript().len(), 1);
        assert!(session.feedback().is_none());
    }

    #[test]
    fn test_empty_response_becomes_connection_failure_turn() {
        let mut session = SimulationSession::new(1, GREETING, false);
        session.handle(SessionEvent::Utterance("hi".into())).unwrap();
        session
            .handle(SessionEvent::ResponseReceived(" ".into()))
            .unwrap();
        assert_eq!(
            session.transcript().last(),
            Some(&Turn::ai(CONNECTION_FAILURE_TEXT))
        );
    }

    #[tokio::test]
    async fn test_quote_exchange_scenario() {
        let mut backend = MockSimulationBackend::new();
        backend
            .expect_respond()
            .withf(|req| req.conversation.len() == 2 && req.scenario_id == 5)
            .times(1)
            .returning(|_| Ok("Sure, what's your budget?".to_string()));

        let mut session = SimulationSession::new(5, GREETING, false);
        drive(
            &mut session,
            &backend,
            SessionEvent::Utterance("I'd like a quote".into()),
        )
        .await;

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(
            session.transcript().snapshot(),
            &[
                Turn::ai(GREETING),
                Turn::user("I'd like a quote"),
                Turn::ai("Sure, what's your budget?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_transcript_grows_by_pairs_and_alternates() {
        for exchanges in 0..6usize {
            let mut backend = MockSimulationBackend::new();
            backend
                .expect_respond()
                .times(exchanges)
                .returning(|req| Ok(format!("reply {}", req.conversation.len())));

            let mut session = SimulationSession::new(1, GREETING, false);
            for i in 0..exchanges {
                drive(&mut session, &backend, SessionEvent::Utterance(format!("line {i}"))).await;
            }

            let turns = session.transcript().snapshot();
            assert_eq!(turns.len(), 1 + 2 * exchanges);
            for (i, turn) in turns.iter().enumerate().skip(1) {
                let expected = if i % 2 == 1 { Speaker::User } else { Speaker::Ai };
                assert_eq!(turn.speaker, expected, "turn {i}");
            }
        }
    }

    #[tokio::test]
    async fn test_failed_respond_appends_apology_and_returns_to_active() {
        let mut backend = MockSimulationBackend::new();
        backend
            .expect_respond()
            .times(1)
            .returning(|_| Err(ApiError::Unreachable("connection refused".into())));

        let mut session = SimulationSession::new(1, GREETING, true);
        let host_effects = drive(&mut session, &backend, SessionEvent::Utterance("hello".into())).await;

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.transcript().len(), 3);
        assert_eq!(
            session.transcript().last(),
            Some(&Turn::ai(CONNECTION_FAILURE_TEXT))
        );
        assert_eq!(
            host_effects,
            vec![Effect::Vocalize(CONNECTION_FAILURE_TEXT.to_string())]
        );
    }

    #[tokio::test]
    async fn test_successful_analysis_concludes_session() {
        let mut backend = MockSimulationBackend::new();
        backend
            .expect_analyze()
            .times(1)
            .returning(|_| Ok(feedback(true)));
        backend.expect_respond().never();

        let mut session = SimulationSession::new(1, GREETING, false);
        drive(&mut session, &backend, SessionEvent::EndRequested).await;

        assert_eq!(session.state(), SessionState::Concluded);
        assert!(session.feedback().unwrap().goal_achieved);

        // Further submissions are no-ops.
        let before = session.transcript().len();
        drive(&mut session, &backend, SessionEvent::Utterance("one more".into())).await;
        assert!(session.handle(SessionEvent::EndRequested).is_err());
        assert_eq!(session.transcript().len(), before);
        assert_eq!(session.state(), SessionState::Concluded);
    }

    #[tokio::test]
    async fn test_failed_analysis_is_recoverable() {
        let mut backend = MockSimulationBackend::new();
        let mut calls = 0;
        backend.expect_analyze().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(ApiError::Server {
                    status: 404,
                    message: "Scenario not found".into(),
                })
            } else {
                Ok(feedback(false))
            }
        });

        let mut session = SimulationSession::new(1, GREETING, true);
        let host_effects = drive(&mut session, &backend, SessionEvent::EndRequested).await;

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.transcript().len(), 1);
        assert!(session.feedback().is_none());
        assert_eq!(
            host_effects,
            vec![
                Effect::Vocalize(ANALYZING_ANNOUNCEMENT.to_string()),
                Effect::Notify("Analysis Error: Scenario not found".to_string()),
            ]
        );

        drive(&mut session, &backend, SessionEvent::EndRequested).await;
        assert_eq!(session.state(), SessionState::Concluded);
        assert!(!session.feedback().unwrap().goal_achieved);
    }
}
