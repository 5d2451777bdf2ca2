//! Coach facade: top-level API for the mathesis engine.
//!
//! `Coach` owns the session store and an *optional* concept-graph capability,
//! injected at construction. Every operation validates session ownership
//! before touching state; graph side writes go through the best-effort path
//! in [`crate::materialize`] so a graph outage never blocks the learner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CoachConfig, connect_graph};
use crate::error::{CoachError, GraphError, MathesisResult};
use crate::graph::{ConceptStore, UserGraph};
use crate::materialize;
use crate::plan::{Grade, LearningPlan, UploadEdge, UploadNode};
use crate::progression;
use crate::session::{
    AttemptRecord, LlmConfigRecord, SessionRecord, SessionStore, SessionSummary,
};

/// Result of materializing a plan for a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskOutcome {
    pub session_id: String,
    pub question_id: String,
    pub created_at: DateTime<Utc>,
    pub plan: LearningPlan,
    pub unlocked_order: u32,
}

/// A session's current plan and unlock state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanView {
    pub session_id: String,
    pub plan: LearningPlan,
    pub unlocked_order: u32,
}

/// Result of one graded submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub node_id: String,
    pub order: u32,
    pub grade: Grade,
    pub unlocked_order: u32,
    pub finished: bool,
}

/// Generator connection settings with the secret masked for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmPublicConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub api_key_masked: String,
}

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_TEMPERATURE: f64 = 0.2;

fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len == 0 {
        String::new()
    } else if len <= 8 {
        "*".repeat(len)
    } else {
        let head: String = key.chars().take(3).collect();
        let tail: String = key.chars().skip(len - 4).collect();
        format!("{head}{}{tail}", "*".repeat(len - 7))
    }
}

/// The mathesis learning-progression engine.
pub struct Coach {
    sessions: SessionStore,
    graph: Option<Arc<dyn ConceptStore>>,
}

impl Coach {
    /// Assemble a coach from its parts.
    pub fn new(sessions: SessionStore, graph: Option<Arc<dyn ConceptStore>>) -> Self {
        Self { sessions, graph }
    }

    /// Open the session store and connect the configured graph engine.
    pub fn open(config: &CoachConfig) -> MathesisResult<Self> {
        let sessions = SessionStore::open(&config.store.data_dir)
            .map_err(crate::error::MathesisError::Session)?;
        let graph = connect_graph(config);
        Ok(Self::new(sessions, graph))
    }

    /// Whether a concept-graph capability was constructed at startup.
    pub fn graph_enabled(&self) -> bool {
        self.graph.is_some()
    }

    fn graph_ref(&self) -> Option<&dyn ConceptStore> {
        self.graph.as_deref()
    }

    /// Load a session and verify it belongs to the caller.
    fn require_session(&self, session_id: &str, user_id: &str) -> Result<SessionRecord, CoachError> {
        let session = self
            .sessions
            .get_session(session_id)?
            .ok_or_else(|| CoachError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        if session.user_id != user_id {
            return Err(CoachError::Forbidden {
                session_id: session_id.to_string(),
            });
        }
        Ok(session)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub fn create_session(&self, user_id: &str) -> Result<SessionRecord, CoachError> {
        Ok(self.sessions.create_session(user_id)?)
    }

    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, CoachError> {
        Ok(self.sessions.list_sessions(user_id)?)
    }

    // -----------------------------------------------------------------------
    // Plans
    // -----------------------------------------------------------------------

    /// Record a question and materialize its externally generated plan:
    /// persist the body, reset the unlock order, mirror concepts best-effort.
    pub fn ask(
        &self,
        session_id: &str,
        user_id: &str,
        question: &str,
        topic_hint: Option<&str>,
        plan: LearningPlan,
    ) -> Result<AskOutcome, CoachError> {
        self.require_session(session_id, user_id)?;
        let question_row = self
            .sessions
            .record_question(session_id, question, topic_hint)?;
        let unlocked =
            materialize::materialize_plan(&self.sessions, self.graph_ref(), user_id, session_id, &plan)?;
        Ok(AskOutcome {
            session_id: session_id.to_string(),
            question_id: question_row.question_id,
            created_at: question_row.created_at,
            plan,
            unlocked_order: unlocked,
        })
    }

    pub fn get_plan(&self, session_id: &str, user_id: &str) -> Result<PlanView, CoachError> {
        let session = self.require_session(session_id, user_id)?;
        let plan = self
            .sessions
            .get_plan(session_id)?
            .ok_or_else(|| CoachError::PlanNotFound {
                session_id: session_id.to_string(),
            })?;
        Ok(PlanView {
            session_id: session_id.to_string(),
            plan: plan.plan,
            unlocked_order: session.unlocked_order,
        })
    }

    // -----------------------------------------------------------------------
    // Submissions
    // -----------------------------------------------------------------------

    /// Record a graded attempt against an unlocked node and advance the
    /// unlock order on a pass.
    ///
    /// `passed` on the supplied grade is advisory only; it is recomputed as
    /// `score >= pass_score` for the targeted node.
    pub fn submit(
        &self,
        session_id: &str,
        user_id: &str,
        node_id: &str,
        answer: &str,
        mut grade: Grade,
    ) -> Result<SubmitOutcome, CoachError> {
        let session = self.require_session(session_id, user_id)?;
        let plan = self
            .sessions
            .get_plan(session_id)?
            .ok_or_else(|| CoachError::PlanNotFound {
                session_id: session_id.to_string(),
            })?;

        let node = plan
            .plan
            .nodes
            .iter()
            .find(|n| n.node_id == node_id)
            .ok_or_else(|| CoachError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;

        progression::check_unlocked(node.order, session.unlocked_order)?;

        grade.passed = grade.score >= node.pass_score;

        self.sessions.insert_attempt(
            session_id,
            user_id,
            node_id,
            node.order,
            answer,
            grade.score,
            grade.passed,
            &grade.feedback,
        )?;

        let mut unlocked = session.unlocked_order;
        if grade.passed {
            unlocked = progression::advance(unlocked, node.order, true);
            self.sessions.set_unlocked_order(session_id, unlocked)?;
            materialize::push_practice(self.graph_ref(), user_id, &node.title, grade.score, true);
        }

        let finished = progression::finished(unlocked, plan.plan.max_order());
        Ok(SubmitOutcome {
            node_id: node_id.to_string(),
            order: node.order,
            grade,
            unlocked_order: unlocked,
            finished,
        })
    }

    /// The session's attempts in creation order, owner-checked.
    pub fn attempt_history(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Vec<AttemptRecord>, CoachError> {
        self.require_session(session_id, user_id)?;
        Ok(self.sessions.attempts(session_id)?)
    }

    // -----------------------------------------------------------------------
    // Graph passthrough
    // -----------------------------------------------------------------------

    pub fn graph(&self, user_id: &str) -> Result<UserGraph, CoachError> {
        let graph = self.graph_ref().ok_or(GraphError::Unavailable)?;
        Ok(graph.get_graph(user_id)?)
    }

    pub fn upload_graph(
        &self,
        user_id: &str,
        nodes: &[UploadNode],
        edges: &[UploadEdge],
    ) -> Result<(), CoachError> {
        let graph = self.graph_ref().ok_or(GraphError::Unavailable)?;
        Ok(graph.upload_graph(user_id, nodes, edges)?)
    }

    // -----------------------------------------------------------------------
    // Generator config
    // -----------------------------------------------------------------------

    /// The stored generator settings with the key masked, or defaults.
    pub fn llm_config(&self) -> Result<LlmPublicConfig, CoachError> {
        let stored = self.sessions.llm_config()?;
        Ok(match stored {
            Some(cfg) => LlmPublicConfig {
                base_url: cfg.base_url,
                model: cfg.model,
                temperature: cfg.temperature,
                api_key_masked: mask_key(&cfg.api_key),
            },
            None => LlmPublicConfig {
                base_url: DEFAULT_LLM_BASE_URL.to_string(),
                model: DEFAULT_LLM_MODEL.to_string(),
                temperature: DEFAULT_LLM_TEMPERATURE,
                api_key_masked: String::new(),
            },
        })
    }

    /// Store generator settings. A blank `api_key` preserves the stored one.
    pub fn set_llm_config(
        &self,
        base_url: &str,
        api_key: &str,
        model: &str,
        temperature: f64,
    ) -> Result<LlmPublicConfig, CoachError> {
        let stored_key = self
            .sessions
            .llm_config()?
            .map(|c| c.api_key)
            .unwrap_or_default();
        let api_key = if api_key.trim().is_empty() {
            stored_key
        } else {
            api_key.to_string()
        };
        self.sessions.set_llm_config(&LlmConfigRecord {
            base_url: base_url.to_string(),
            api_key,
            model: model.to_string(),
            temperature,
            updated_at: Utc::now(),
        })?;
        self.llm_config()
    }
}
