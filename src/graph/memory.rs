//! In-process concept graph engine backed by DashMap.
//!
//! Satisfies the same [`ConceptStore`] contract as the remote engines, which
//! makes it the substrate for the contract tests and an explicit dev backend.
//! All data is lost on process exit.
//!
//! Per-(user, concept) serialization comes from DashMap's entry API: a merge
//! holds the shard lock for the key while it reads and rewrites the record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::GraphResult;
use crate::graph::{
    ConceptRow, ConceptStore, EdgeKind, EdgeRow, UserGraph, assemble_graph,
};
use crate::identity::IdentityConfig;
use crate::plan::{PlanNode, UploadEdge, UploadNode};
use crate::scoring::ScoringConfig;

#[derive(Debug, Clone)]
struct SeenEdge {
    last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PracticedEdge {
    attempts: u64,
    last_practice_at: DateTime<Utc>,
    last_score: u8,
    last_passed: bool,
    mastery_score: f64,
}

#[derive(Debug, Clone)]
struct ConceptRecord {
    name: String,
    level: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    seen: Option<SeenEdge>,
    practiced: Option<PracticedEdge>,
}

/// Concurrent in-memory concept graph, sharded by (user, concept id).
#[derive(Debug, Default)]
pub struct MemoryStore {
    identity: IdentityConfig,
    scoring: ScoringConfig,
    concepts: DashMap<(String, String), ConceptRecord>,
    edges: DashMap<String, BTreeSet<(String, String, EdgeKind)>>,
}

impl MemoryStore {
    pub fn new(identity: IdentityConfig, scoring: ScoringConfig) -> Self {
        Self {
            identity,
            scoring,
            concepts: DashMap::new(),
            edges: DashMap::new(),
        }
    }

    /// Merge-create a concept, setting `created_at` only on first creation.
    fn merge_concept(&self, user_id: &str, name: &str, level: Option<i64>, now: DateTime<Utc>) -> String {
        let cid = self.identity.concept_id(name);
        let key = (user_id.to_string(), cid.clone());
        let mut entry = self.concepts.entry(key).or_insert_with(|| ConceptRecord {
            name: name.to_string(),
            level,
            created_at: now,
            updated_at: now,
            seen: None,
            practiced: None,
        });
        entry.name = name.to_string();
        if level.is_some() {
            entry.level = level;
        }
        entry.updated_at = now;
        cid
    }

    fn mark_seen(&self, user_id: &str, cid: &str, now: DateTime<Utc>) {
        if let Some(mut rec) = self.concepts.get_mut(&(user_id.to_string(), cid.to_string())) {
            rec.seen = Some(SeenEdge { last_seen_at: now });
        }
    }

    fn merge_edge(&self, user_id: &str, source: &str, target: &str, kind: EdgeKind) {
        self.edges
            .entry(user_id.to_string())
            .or_default()
            .insert((source.to_string(), target.to_string(), kind));
    }

    /// Total concept-to-concept edges for a user (test introspection).
    pub fn edge_count(&self, user_id: &str) -> usize {
        self.edges.get(user_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Attempts recorded on a concept's PRACTICED edge (test introspection).
    pub fn practiced_attempts(&self, user_id: &str, concept_title: &str) -> Option<u64> {
        let cid = self.identity.concept_id(concept_title);
        self.concepts
            .get(&(user_id.to_string(), cid))
            .and_then(|r| r.practiced.as_ref().map(|p| p.attempts))
    }

    /// Last score recorded on a concept's PRACTICED edge (test introspection).
    pub fn practiced_last_score(&self, user_id: &str, concept_title: &str) -> Option<u8> {
        let cid = self.identity.concept_id(concept_title);
        self.concepts
            .get(&(user_id.to_string(), cid))
            .and_then(|r| r.practiced.as_ref().map(|p| p.last_score))
    }
}

impl ConceptStore for MemoryStore {
    fn ensure_schema(&self) -> GraphResult<()> {
        // Uniqueness is structural: the maps are keyed by (user, concept id).
        Ok(())
    }

    fn upsert_plan_concepts(
        &self,
        user_id: &str,
        session_id: &str,
        nodes: &[PlanNode],
    ) -> GraphResult<()> {
        let now = Utc::now();
        let mut chain: Vec<String> = Vec::new();
        for node in nodes {
            let title = node.title.trim();
            if title.is_empty() {
                continue;
            }
            let cid = self.merge_concept(user_id, title, Some(i64::from(node.order)), now);
            self.mark_seen(user_id, &cid, now);
            chain.push(cid);
        }
        for pair in chain.windows(2) {
            self.merge_edge(user_id, &pair[0], &pair[1], EdgeKind::Prereq);
        }
        tracing::debug!(
            user = %user_id,
            session = %session_id,
            concepts = chain.len(),
            "merged plan concepts"
        );
        Ok(())
    }

    fn update_practice(
        &self,
        user_id: &str,
        concept_title: &str,
        score: u8,
        passed: bool,
    ) -> GraphResult<()> {
        let now = Utc::now();
        let title = concept_title.trim();
        let cid = self.merge_concept(user_id, title, None, now);

        // Entry lock covers the read-modify-write, so concurrent practice
        // updates for the same (user, concept) serialize here.
        let key = (user_id.to_string(), cid);
        if let Some(mut rec) = self.concepts.get_mut(&key) {
            let prior = rec.practiced.as_ref().map(|p| p.mastery_score);
            let attempts = rec.practiced.as_ref().map(|p| p.attempts).unwrap_or(0);
            rec.practiced = Some(PracticedEdge {
                attempts: attempts + 1,
                last_practice_at: now,
                last_score: score,
                last_passed: passed,
                mastery_score: self.scoring.update_mastery(prior, score),
            });
        }
        Ok(())
    }

    fn upload_graph(
        &self,
        user_id: &str,
        nodes: &[UploadNode],
        edges: &[UploadEdge],
    ) -> GraphResult<()> {
        let now = Utc::now();
        for node in nodes {
            let Some(name) = node.resolved_name() else {
                continue;
            };
            let cid = self.merge_concept(user_id, name, node.level, now);
            self.mark_seen(user_id, &cid, now);
        }
        for edge in edges {
            let Some((from, to)) = edge.resolved_endpoints() else {
                continue;
            };
            let kind = EdgeKind::from_token(edge.kind.as_deref());
            let source = self.identity.concept_id(from);
            let target = self.identity.concept_id(to);
            self.merge_edge(user_id, &source, &target, kind);
        }
        Ok(())
    }

    fn get_graph(&self, user_id: &str) -> GraphResult<UserGraph> {
        let rows: Vec<ConceptRow> = self
            .concepts
            .iter()
            .filter(|entry| {
                let (uid, _) = entry.key();
                uid == user_id && (entry.seen.is_some() || entry.practiced.is_some())
            })
            .map(|entry| {
                let (_, cid) = entry.key();
                ConceptRow {
                    id: cid.clone(),
                    name: entry.name.clone(),
                    level: entry.level,
                    last_seen_at: entry.seen.as_ref().map(|s| s.last_seen_at),
                    last_practice_at: entry.practiced.as_ref().map(|p| p.last_practice_at),
                    mastery_score: entry.practiced.as_ref().map(|p| p.mastery_score),
                }
            })
            .collect();

        let edges: Vec<EdgeRow> = self
            .edges
            .get(user_id)
            .map(|set| {
                set.iter()
                    .map(|(source, target, kind)| EdgeRow {
                        source: source.clone(),
                        target: target.clone(),
                        kind: *kind,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(assemble_graph(rows, edges, &self.scoring, Utc::now()))
    }
}
