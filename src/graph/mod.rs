//! The per-user concept graph: one contract, three engines.
//!
//! [`ConceptStore`] is the capability set the rest of the system depends on.
//! Three engines satisfy it identically:
//!
//! - [`memory::MemoryStore`] — in-process DashMap engine for tests and dev
//! - [`cypher::CypherStore`] — native graph database over its HTTP
//!   transaction endpoint (parameterized Cypher, basic auth)
//! - [`postgrest::PostgrestStore`] — relational store behind a PostgREST
//!   endpoint (`on_conflict` merge upserts, column-selected reads)
//!
//! Engines produce raw [`ConceptRow`]/[`EdgeRow`] data; brightness annotation
//! and per-user edge scoping run through the shared [`assemble_graph`] path so
//! every engine renders the same output for the same stored state.

pub mod cypher;
pub mod memory;
pub mod postgrest;

pub use cypher::CypherStore;
pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GraphResult;
use crate::plan::{PlanNode, UploadEdge, UploadNode};
use crate::scoring::ScoringConfig;

/// Typed, directed concept-to-concept edge kind.
///
/// Anything other than the literal `PREREQ` token (case-insensitive)
/// normalizes to `REL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    #[serde(rename = "PREREQ")]
    Prereq,
    #[serde(rename = "REL")]
    Rel,
}

impl EdgeKind {
    /// Normalize a caller-supplied type token. `None` defaults to `PREREQ`.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            None => EdgeKind::Prereq,
            Some(t) if t.trim().eq_ignore_ascii_case("PREREQ") => EdgeKind::Prereq,
            Some(_) => EdgeKind::Rel,
        }
    }

    /// Wire token for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Prereq => "PREREQ",
            EdgeKind::Rel => "REL",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// The capability set
// ---------------------------------------------------------------------------

/// Capability set for the per-user concept graph, engine-independent.
///
/// All writes are idempotent merges: replaying the same plan or upload must
/// not duplicate concepts or edges. Practice updates must serialize per
/// (user, concept) inside the storage engine so concurrent submissions never
/// lose an attempts increment.
pub trait ConceptStore: Send + Sync {
    /// Idempotently create uniqueness constraints and supporting indexes.
    /// Called once at startup; safe to call repeatedly.
    fn ensure_schema(&self) -> GraphResult<()>;

    /// Merge a plan's titled nodes as concepts with SEEN edges from the user,
    /// chaining PREREQ edges between consecutive nodes. Nodes with empty
    /// titles are skipped. Safe to replay against the same plan.
    fn upsert_plan_concepts(
        &self,
        user_id: &str,
        session_id: &str,
        nodes: &[PlanNode],
    ) -> GraphResult<()>;

    /// Merge the PRACTICED edge for one graded attempt: increment attempts,
    /// refresh last_practice_at/last_score/last_passed, and fold the score
    /// into the edge's mastery EMA.
    fn update_practice(
        &self,
        user_id: &str,
        concept_title: &str,
        score: u8,
        passed: bool,
    ) -> GraphResult<()>;

    /// Bulk merge of caller-supplied nodes and edges. Entries without a
    /// resolvable name are silently skipped.
    fn upload_graph(
        &self,
        user_id: &str,
        nodes: &[UploadNode],
        edges: &[UploadEdge],
    ) -> GraphResult<()>;

    /// The user's graph: every concept the user has seen or practiced,
    /// annotated with brightness, plus PREREQ/REL edges between them.
    fn get_graph(&self, user_id: &str) -> GraphResult<UserGraph>;
}

// ---------------------------------------------------------------------------
// Raw engine rows and rendered output
// ---------------------------------------------------------------------------

/// A concept as read back from an engine, before annotation.
#[derive(Debug, Clone)]
pub struct ConceptRow {
    pub id: String,
    pub name: String,
    pub level: Option<i64>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_practice_at: Option<DateTime<Utc>>,
    pub mastery_score: Option<f64>,
}

/// An edge as read back from an engine.
#[derive(Debug, Clone)]
pub struct EdgeRow {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

/// A rendered concept node with its visualization weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConcept {
    pub id: String,
    pub name: String,
    pub level: Option<i64>,
    pub brightness: f64,
    pub last_practice_at: Option<DateTime<Utc>>,
    pub mastery_score: Option<f64>,
}

/// A rendered concept-to-concept edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

/// One user's rendered concept graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserGraph {
    pub nodes: Vec<GraphConcept>,
    pub edges: Vec<GraphEdge>,
}

/// Shared row-to-graph assembly: annotate brightness and scope edges.
///
/// Brightness prefers `last_practice_at` over `last_seen_at`. Edges whose
/// source is not among the user's concepts are dropped, so concepts reachable
/// only through other users' edges never leak into the output.
pub fn assemble_graph(
    rows: Vec<ConceptRow>,
    edges: Vec<EdgeRow>,
    scoring: &ScoringConfig,
    now: DateTime<Utc>,
) -> UserGraph {
    let ids: std::collections::HashSet<String> = rows.iter().map(|r| r.id.clone()).collect();

    let nodes = rows
        .into_iter()
        .map(|r| {
            let last = r.last_practice_at.or(r.last_seen_at);
            GraphConcept {
                brightness: scoring.brightness(last, now),
                id: r.id,
                name: r.name,
                level: r.level,
                last_practice_at: r.last_practice_at,
                mastery_score: r.mastery_score,
            }
        })
        .collect();

    let edges = edges
        .into_iter()
        .filter(|e| ids.contains(&e.source))
        .map(|e| GraphEdge {
            source: e.source,
            target: e.target,
            kind: e.kind,
        })
        .collect();

    UserGraph { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(id: &str, practiced: Option<DateTime<Utc>>, seen: Option<DateTime<Utc>>) -> ConceptRow {
        ConceptRow {
            id: id.into(),
            name: id.to_uppercase(),
            level: Some(1),
            last_seen_at: seen,
            last_practice_at: practiced,
            mastery_score: None,
        }
    }

    #[test]
    fn edge_kind_normalization() {
        assert_eq!(EdgeKind::from_token(None), EdgeKind::Prereq);
        assert_eq!(EdgeKind::from_token(Some("prereq")), EdgeKind::Prereq);
        assert_eq!(EdgeKind::from_token(Some("PREREQ")), EdgeKind::Prereq);
        assert_eq!(EdgeKind::from_token(Some("related")), EdgeKind::Rel);
        assert_eq!(EdgeKind::from_token(Some("")), EdgeKind::Rel);
    }

    #[test]
    fn assembly_prefers_practice_timestamp() {
        let now = Utc::now();
        let scoring = ScoringConfig::default();
        // Practiced just now but seen long ago: brightness must reflect practice.
        let g = assemble_graph(
            vec![row("a", Some(now), Some(now - Duration::days(300)))],
            vec![],
            &scoring,
            now,
        );
        assert!((g.nodes[0].brightness - 1.0).abs() < 1e-9);
    }

    #[test]
    fn assembly_uses_baseline_without_activity() {
        let now = Utc::now();
        let g = assemble_graph(vec![row("a", None, None)], vec![], &ScoringConfig::default(), now);
        assert!((g.nodes[0].brightness - 0.12).abs() < f64::EPSILON);
    }

    #[test]
    fn assembly_drops_edges_from_foreign_sources() {
        let now = Utc::now();
        let edges = vec![
            EdgeRow {
                source: "a".into(),
                target: "b".into(),
                kind: EdgeKind::Prereq,
            },
            EdgeRow {
                source: "zz".into(),
                target: "a".into(),
                kind: EdgeKind::Rel,
            },
        ];
        let g = assemble_graph(
            vec![row("a", None, Some(now)), row("b", None, Some(now))],
            edges,
            &ScoringConfig::default(),
            now,
        );
        assert_eq!(g.edges.len(), 1);
        assert_eq!(g.edges[0].source, "a");
    }
}
