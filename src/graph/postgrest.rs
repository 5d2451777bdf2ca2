//! Relational-REST engine: concept rows behind a PostgREST endpoint.
//!
//! Concepts live in a `user_concepts` table keyed on `(user_id, concept_id)`
//! and edges in `user_edges` keyed on `(user_id, source_id, target_id, type)`.
//! Upserts are `POST`s with an `on_conflict=` directive and the
//! `Prefer: resolution=merge-duplicates` header; reads are `GET`s with
//! column-selection query parameters filtered by `user_id`.
//!
//! A plain row upsert cannot express `attempts + 1`, so the practice update
//! calls the `record_practice` SQL function (see `schema/postgrest.sql`) whose
//! body is a single `INSERT .. ON CONFLICT .. DO UPDATE` — the engine-native
//! conditional merge that keeps concurrent submissions from losing counts.
//! The EMA weights travel as arguments so the constants stay in
//! [`ScoringConfig`].

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::error::{GraphError, GraphResult};
use crate::graph::{
    ConceptRow, ConceptStore, EdgeKind, EdgeRow, UserGraph, assemble_graph,
};
use crate::identity::IdentityConfig;
use crate::plan::{PlanNode, UploadEdge, UploadNode};
use crate::scoring::ScoringConfig;

/// Connection settings for the PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Project base URL; `/rest/v1` is appended for resource paths.
    pub url: String,
    /// API key, sent as both `apikey` and bearer token.
    pub key: String,
}

/// [`ConceptStore`] engine over a REST-exposed relational store.
pub struct PostgrestStore {
    config: PostgrestConfig,
    identity: IdentityConfig,
    scoring: ScoringConfig,
    http: ureq::Agent,
}

impl PostgrestStore {
    pub fn new(config: PostgrestConfig, identity: IdentityConfig, scoring: ScoringConfig) -> Self {
        Self {
            config,
            identity,
            scoring,
            http: ureq::Agent::new(),
        }
    }

    fn rest(&self, path: &str) -> String {
        format!("{}/rest/v1{path}", self.config.url.trim_end_matches('/'))
    }

    fn request(&self, req: ureq::Request) -> ureq::Request {
        req.set("apikey", &self.config.key)
            .set("Authorization", &format!("Bearer {}", self.config.key))
    }

    /// Merge-upsert rows into a table; no-op for an empty batch.
    fn upsert(&self, path: &str, rows: &[Value]) -> GraphResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.request(self.http.post(&self.rest(path)))
            .set("Prefer", "resolution=merge-duplicates,return=minimal")
            .send_json(json!(rows))
            .map_err(|e| GraphError::Backend {
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn get_rows(&self, path: &str) -> GraphResult<Vec<Value>> {
        let resp = self
            .request(self.http.get(&self.rest(path)))
            .call()
            .map_err(|e| GraphError::Request {
                message: e.to_string(),
            })?;
        let body: Value = resp.into_json().map_err(|e| GraphError::Response {
            message: format!("failed to parse JSON: {e}"),
        })?;
        body.as_array().cloned().ok_or_else(|| GraphError::Response {
            message: "expected a JSON array of rows".into(),
        })
    }

    fn concept_row(
        &self,
        user_id: &str,
        name: &str,
        level: Option<i64>,
        now: &str,
    ) -> Value {
        json!({
            "user_id": user_id,
            "concept_id": self.identity.concept_id(name),
            "name": name,
            "level": level.unwrap_or(0),
            "last_seen_at": now,
            "updated_at": now,
        })
    }

    fn edge_row(&self, user_id: &str, source: &str, target: &str, kind: EdgeKind, now: &str) -> Value {
        json!({
            "user_id": user_id,
            "source_id": source,
            "target_id": target,
            "type": kind.as_str(),
            "updated_at": now,
        })
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00")).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl ConceptStore for PostgrestStore {
    fn ensure_schema(&self) -> GraphResult<()> {
        // The tables are owned by the external database (schema/postgrest.sql);
        // probe that they exist and the key can read them.
        self.get_rows("/user_concepts?select=concept_id&limit=1")?;
        tracing::info!(url = %self.config.url, "relational graph schema probed");
        Ok(())
    }

    fn upsert_plan_concepts(
        &self,
        user_id: &str,
        session_id: &str,
        nodes: &[PlanNode],
    ) -> GraphResult<()> {
        let now = Utc::now().to_rfc3339();
        let concepts: Vec<Value> = nodes
            .iter()
            .filter(|n| !n.title.trim().is_empty())
            .map(|n| self.concept_row(user_id, n.title.trim(), Some(i64::from(n.order)), &now))
            .collect();

        let edges: Vec<Value> = concepts
            .windows(2)
            .map(|pair| {
                self.edge_row(
                    user_id,
                    pair[0]["concept_id"].as_str().unwrap_or_default(),
                    pair[1]["concept_id"].as_str().unwrap_or_default(),
                    EdgeKind::Prereq,
                    &now,
                )
            })
            .collect();

        self.upsert("/user_concepts?on_conflict=user_id,concept_id", &concepts)?;
        self.upsert(
            "/user_edges?on_conflict=user_id,source_id,target_id,type",
            &edges,
        )?;
        tracing::debug!(
            user = %user_id,
            session = %session_id,
            concepts = concepts.len(),
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
        let title = concept_title.trim();
        let args = json!({
            "p_user_id": user_id,
            "p_concept_id": self.identity.concept_id(title),
            "p_name": title,
            "p_score": i64::from(score),
            "p_passed": passed,
            "p_now": Utc::now().to_rfc3339(),
            "p_ema_keep": self.scoring.ema_keep,
            "p_ema_gain": self.scoring.ema_gain,
        });
        self.request(self.http.post(&self.rest("/rpc/record_practice")))
            .send_json(args)
            .map_err(|e| GraphError::Backend {
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn upload_graph(
        &self,
        user_id: &str,
        nodes: &[UploadNode],
        edges: &[UploadEdge],
    ) -> GraphResult<()> {
        let now = Utc::now().to_rfc3339();
        let concepts: Vec<Value> = nodes
            .iter()
            .filter_map(|n| {
                n.resolved_name()
                    .map(|name| self.concept_row(user_id, name, n.level, &now))
            })
            .collect();
        let rels: Vec<Value> = edges
            .iter()
            .filter_map(|e| {
                let (from, to) = e.resolved_endpoints()?;
                Some(self.edge_row(
                    user_id,
                    &self.identity.concept_id(from),
                    &self.identity.concept_id(to),
                    EdgeKind::from_token(e.kind.as_deref()),
                    &now,
                ))
            })
            .collect();

        self.upsert("/user_concepts?on_conflict=user_id,concept_id", &concepts)?;
        self.upsert(
            "/user_edges?on_conflict=user_id,source_id,target_id,type",
            &rels,
        )?;
        Ok(())
    }

    fn get_graph(&self, user_id: &str) -> GraphResult<UserGraph> {
        let concept_rows = self.get_rows(&format!(
            "/user_concepts?user_id=eq.{user_id}\
             &select=concept_id,name,level,last_seen_at,last_practice_at,mastery_score"
        ))?;
        let edge_rows = self.get_rows(&format!(
            "/user_edges?user_id=eq.{user_id}&select=source_id,target_id,type"
        ))?;

        let rows = concept_rows
            .iter()
            .filter_map(|r| {
                Some(ConceptRow {
                    id: r["concept_id"].as_str()?.to_string(),
                    name: r["name"].as_str().unwrap_or_default().to_string(),
                    level: r["level"].as_i64(),
                    last_seen_at: parse_timestamp(&r["last_seen_at"]),
                    last_practice_at: parse_timestamp(&r["last_practice_at"]),
                    mastery_score: r["mastery_score"].as_f64(),
                })
            })
            .collect();

        let edges = edge_rows
            .iter()
            .filter_map(|e| {
                Some(EdgeRow {
                    source: e["source_id"].as_str()?.to_string(),
                    target: e["target_id"].as_str()?.to_string(),
                    kind: EdgeKind::from_token(e["type"].as_str()),
                })
            })
            .collect();

        Ok(assemble_graph(rows, edges, &self.scoring, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PostgrestStore {
        PostgrestStore::new(
            PostgrestConfig {
                url: "https://project.example.co/".into(),
                key: "anon-key".into(),
            },
            IdentityConfig::default(),
            ScoringConfig::default(),
        )
    }

    #[test]
    fn rest_path_construction() {
        assert_eq!(
            store().rest("/user_concepts?limit=1"),
            "https://project.example.co/rest/v1/user_concepts?limit=1"
        );
    }

    #[test]
    fn concept_row_shape() {
        let s = store();
        let row = s.concept_row("u1", "Ownership", Some(2), "2026-01-01T00:00:00+00:00");
        assert_eq!(row["user_id"], "u1");
        assert_eq!(row["concept_id"], json!(s.identity.concept_id("Ownership")));
        assert_eq!(row["level"], 2);
        // Absent level defaults to 0 in the stored row.
        let row = s.concept_row("u1", "Ownership", None, "2026-01-01T00:00:00+00:00");
        assert_eq!(row["level"], 0);
    }

    #[test]
    fn edge_row_carries_wire_type_token() {
        let s = store();
        let row = s.edge_row("u1", "a", "b", EdgeKind::Rel, "2026-01-01T00:00:00+00:00");
        assert_eq!(row["type"], "REL");
    }

    #[test]
    fn upsert_skips_empty_batches() {
        // No HTTP agent call happens for an empty batch, so this cannot fail
        // even without a reachable endpoint.
        assert!(store().upsert("/user_concepts", &[]).is_ok());
    }

    #[test]
    fn timestamp_parsing_accepts_z_suffix() {
        assert!(parse_timestamp(&json!("2026-01-05T10:00:00Z")).is_some());
        assert!(parse_timestamp(&Value::Null).is_none());
    }
}
