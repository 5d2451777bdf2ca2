//! Plan materialization: turning a generated plan into durable state.
//!
//! The sequencing contract is (1) persist the plan body, (2) set the unlock
//! order, (3) push concepts/edges to the graph store. Steps 1–2 are
//! authoritative; step 3 is best-effort — a graph failure must never roll
//! back progression, so it is logged and swallowed in exactly one place
//! ([`best_effort`]), which the passing-grade practice push shares.
//!
//! The steps run sequentially but without a cross-step lock: a concurrent
//! graph read may observe the plan persisted before the graph caught up.
//! That is an accepted race, not a bug.

use crate::error::{GraphResult, SessionError};
use crate::graph::ConceptStore;
use crate::plan::LearningPlan;
use crate::progression;
use crate::session::SessionStore;

/// Persist a freshly generated plan and reset progression for it.
///
/// Returns the new unlock order. Any prior unlock progress for the session is
/// discarded — regeneration restarts the walk at node 1.
pub fn materialize_plan(
    sessions: &SessionStore,
    graph: Option<&dyn ConceptStore>,
    user_id: &str,
    session_id: &str,
    plan: &LearningPlan,
) -> Result<u32, SessionError> {
    sessions.upsert_plan(session_id, plan)?;
    let unlocked = progression::initial_unlock(plan.nodes.len());
    sessions.set_unlocked_order(session_id, unlocked)?;

    if let Some(graph) = graph {
        best_effort(
            "plan concept upsert",
            user_id,
            graph.upsert_plan_concepts(user_id, session_id, &plan.nodes),
        );
    }

    tracing::info!(
        user = %user_id,
        session = %session_id,
        nodes = plan.nodes.len(),
        unlocked,
        "plan materialized"
    );
    Ok(unlocked)
}

/// Mirror a passing attempt into the graph's PRACTICED edge, best-effort.
pub fn push_practice(
    graph: Option<&dyn ConceptStore>,
    user_id: &str,
    concept_title: &str,
    score: u8,
    passed: bool,
) {
    if let Some(graph) = graph {
        best_effort(
            "practice update",
            user_id,
            graph.update_practice(user_id, concept_title, score, passed),
        );
    }
}

/// The single result-swallowing point for graph side writes.
fn best_effort(op: &str, user_id: &str, result: GraphResult<()>) {
    if let Err(error) = result {
        tracing::warn!(user = %user_id, error = %error, "graph {op} failed, continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::graph::{MemoryStore, UserGraph};
    use crate::identity::IdentityConfig;
    use crate::plan::{PlanNode, UploadEdge, UploadNode};
    use crate::scoring::ScoringConfig;
    use tempfile::TempDir;

    /// Engine whose writes always fail, standing in for an unreachable backend.
    struct DownStore;

    impl ConceptStore for DownStore {
        fn ensure_schema(&self) -> GraphResult<()> {
            Err(GraphError::Request {
                message: "connection refused".into(),
            })
        }
        fn upsert_plan_concepts(&self, _: &str, _: &str, _: &[PlanNode]) -> GraphResult<()> {
            Err(GraphError::Request {
                message: "connection refused".into(),
            })
        }
        fn update_practice(&self, _: &str, _: &str, _: u8, _: bool) -> GraphResult<()> {
            Err(GraphError::Request {
                message: "connection refused".into(),
            })
        }
        fn upload_graph(&self, _: &str, _: &[UploadNode], _: &[UploadEdge]) -> GraphResult<()> {
            Err(GraphError::Request {
                message: "connection refused".into(),
            })
        }
        fn get_graph(&self, _: &str) -> GraphResult<UserGraph> {
            Err(GraphError::Request {
                message: "connection refused".into(),
            })
        }
    }

    fn plan(titles: &[&str]) -> LearningPlan {
        LearningPlan {
            outline: "o".into(),
            nodes: titles
                .iter()
                .enumerate()
                .map(|(i, t)| PlanNode {
                    node_id: format!("n{}", i + 1),
                    order: (i + 1) as u32,
                    title: t.to_string(),
                    knowledge_goal: String::new(),
                    practice_task: String::new(),
                    hint_code: String::new(),
                    grading_rubric: vec![],
                    pass_score: 70,
                })
                .collect(),
        }
    }

    #[test]
    fn materialization_sets_unlock_and_pushes_graph() {
        let dir = TempDir::new().unwrap();
        let sessions = SessionStore::open(dir.path()).unwrap();
        let graph = MemoryStore::new(IdentityConfig::default(), ScoringConfig::default());
        let s = sessions.create_session("u1").unwrap();

        let unlocked =
            materialize_plan(&sessions, Some(&graph), "u1", &s.session_id, &plan(&["A", "B"]))
                .unwrap();
        assert_eq!(unlocked, 1);
        assert_eq!(
            sessions.get_session(&s.session_id).unwrap().unwrap().unlocked_order,
            1
        );
        assert_eq!(graph.get_graph("u1").unwrap().nodes.len(), 2);
    }

    #[test]
    fn empty_plan_unlocks_nothing() {
        let dir = TempDir::new().unwrap();
        let sessions = SessionStore::open(dir.path()).unwrap();
        let s = sessions.create_session("u1").unwrap();
        let unlocked = materialize_plan(&sessions, None, "u1", &s.session_id, &plan(&[])).unwrap();
        assert_eq!(unlocked, 0);
    }

    #[test]
    fn graph_failure_does_not_roll_back_progression() {
        let dir = TempDir::new().unwrap();
        let sessions = SessionStore::open(dir.path()).unwrap();
        let s = sessions.create_session("u1").unwrap();

        let unlocked = materialize_plan(
            &sessions,
            Some(&DownStore),
            "u1",
            &s.session_id,
            &plan(&["A", "B", "C"]),
        )
        .unwrap();
        assert_eq!(unlocked, 1);
        assert!(sessions.get_plan(&s.session_id).unwrap().is_some());
    }

    #[test]
    fn practice_push_swallows_backend_failure() {
        // Must not panic or error.
        push_practice(Some(&DownStore), "u1", "Ownership", 90, true);
        push_practice(None, "u1", "Ownership", 90, true);
    }
}
