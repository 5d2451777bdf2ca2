//! Native graph engine: parameterized Cypher over the HTTP transaction API.
//!
//! Every logical operation is a single `POST {url}/db/{database}/tx/commit`
//! request carrying one or more parameterized statements, authenticated with
//! basic auth. One request per operation means one transaction per operation:
//! the `MERGE`-based practice update is serialized by the database itself.
//!
//! Timestamps are stamped client-side as ISO-8601 UTC strings so this engine
//! feeds the scoring model the same inputs as the relational engine.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{GraphError, GraphResult};
use crate::graph::{
    ConceptRow, ConceptStore, EdgeKind, EdgeRow, UserGraph, assemble_graph,
};
use crate::identity::IdentityConfig;
use crate::plan::{PlanNode, UploadEdge, UploadNode};
use crate::scoring::ScoringConfig;

/// Connection settings for the graph database's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct CypherConfig {
    /// Base URL, e.g. `http://localhost:7474`.
    pub url: String,
    pub user: String,
    pub password: String,
    /// Database name within the server.
    pub database: String,
}

#[derive(Debug, Serialize)]
struct Statement {
    statement: String,
    parameters: Value,
}

impl Statement {
    fn new(statement: &str, parameters: Value) -> Self {
        Self {
            statement: statement.to_string(),
            parameters,
        }
    }
}

/// [`ConceptStore`] engine over a Cypher-speaking graph database.
pub struct CypherStore {
    config: CypherConfig,
    identity: IdentityConfig,
    scoring: ScoringConfig,
    auth_header: String,
    http: ureq::Agent,
}

impl CypherStore {
    pub fn new(config: CypherConfig, identity: IdentityConfig, scoring: ScoringConfig) -> Self {
        let credentials = BASE64.encode(format!("{}:{}", config.user, config.password));
        Self {
            auth_header: format!("Basic {credentials}"),
            config,
            identity,
            scoring,
            http: ureq::Agent::new(),
        }
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.config.url.trim_end_matches('/'),
            self.config.database
        )
    }

    /// Run statements in one implicit transaction and return the raw results.
    fn commit(&self, statements: Vec<Statement>) -> GraphResult<Value> {
        let resp = self
            .http
            .post(&self.commit_url())
            .set("Authorization", &self.auth_header)
            .send_json(json!({ "statements": statements }))
            .map_err(|e| GraphError::Request {
                message: e.to_string(),
            })?;
        let body: Value = resp.into_json().map_err(|e| GraphError::Response {
            message: format!("failed to parse JSON: {e}"),
        })?;

        let errors = body["errors"].as_array().cloned().unwrap_or_default();
        if let Some(first) = errors.first() {
            return Err(GraphError::Backend {
                message: format!(
                    "{}: {}",
                    first["code"].as_str().unwrap_or("unknown"),
                    first["message"].as_str().unwrap_or("")
                ),
            });
        }
        Ok(body)
    }

    /// Rows of the statement at `index`, each row a JSON array of columns.
    fn rows(body: &Value, index: usize) -> Vec<Vec<Value>> {
        body["results"][index]["data"]
            .as_array()
            .map(|data| {
                data.iter()
                    .filter_map(|d| d["row"].as_array().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn merge_user(user_id: &str) -> Statement {
        Statement::new("MERGE (u:User {id:$uid})", json!({ "uid": user_id }))
    }

    fn merge_concept(cid: &str, name: &str, level: Option<i64>, now: &str) -> Statement {
        match level {
            Some(level) => Statement::new(
                "MERGE (c:Concept {id:$id}) \
                 SET c.name=$name, c.level=$level, c.updated_at=$now \
                 ON CREATE SET c.created_at=$now",
                json!({ "id": cid, "name": name, "level": level, "now": now }),
            ),
            None => Statement::new(
                "MERGE (c:Concept {id:$id}) \
                 ON CREATE SET c.name=$name, c.created_at=$now, c.updated_at=$now \
                 ON MATCH SET c.updated_at=$now",
                json!({ "id": cid, "name": name, "now": now }),
            ),
        }
    }

    fn merge_seen(user_id: &str, cid: &str, now: &str) -> Statement {
        Statement::new(
            "MATCH (u:User {id:$uid}), (c:Concept {id:$cid}) \
             MERGE (u)-[r:SEEN]->(c) \
             SET r.last_seen_at=$now",
            json!({ "uid": user_id, "cid": cid, "now": now }),
        )
    }

    fn merge_concept_edge(source: &str, target: &str, kind: EdgeKind) -> Statement {
        // Relationship types cannot be parameterized; the kind is a closed
        // two-token enum, never caller text.
        let statement = format!(
            "MATCH (a:Concept {{id:$a}}), (b:Concept {{id:$b}}) MERGE (a)-[:{kind}]->(b)"
        );
        Statement {
            statement,
            parameters: json!({ "a": source, "b": target }),
        }
    }
}

fn iso_now() -> (DateTime<Utc>, String) {
    let now = Utc::now();
    (now, now.to_rfc3339())
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl ConceptStore for CypherStore {
    fn ensure_schema(&self) -> GraphResult<()> {
        // Schema statements cannot share a transaction with data statements,
        // and some servers refuse batching them; commit each on its own.
        let ddl = [
            "CREATE CONSTRAINT IF NOT EXISTS FOR (u:User) REQUIRE u.id IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (c:Concept) REQUIRE c.id IS UNIQUE",
            "CREATE INDEX IF NOT EXISTS FOR (c:Concept) ON (c.name)",
        ];
        for statement in ddl {
            self.commit(vec![Statement::new(statement, json!({}))])?;
        }
        tracing::info!(url = %self.config.url, "graph schema ensured");
        Ok(())
    }

    fn upsert_plan_concepts(
        &self,
        user_id: &str,
        session_id: &str,
        nodes: &[PlanNode],
    ) -> GraphResult<()> {
        let (_, now) = iso_now();
        let mut statements = vec![Self::merge_user(user_id)];
        let mut chain: Vec<String> = Vec::new();
        for node in nodes {
            let title = node.title.trim();
            if title.is_empty() {
                continue;
            }
            let cid = self.identity.concept_id(title);
            statements.push(Self::merge_concept(
                &cid,
                title,
                Some(i64::from(node.order)),
                &now,
            ));
            statements.push(Self::merge_seen(user_id, &cid, &now));
            chain.push(cid);
        }
        for pair in chain.windows(2) {
            statements.push(Self::merge_concept_edge(&pair[0], &pair[1], EdgeKind::Prereq));
        }
        self.commit(statements)?;
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
        let (_, now) = iso_now();
        let title = concept_title.trim();
        let cid = self.identity.concept_id(title);
        // Attempts increment and EMA run inside the MERGE, so two concurrent
        // submissions for the same pair serialize on the node lock.
        let practice = Statement::new(
            "MATCH (u:User {id:$uid}), (c:Concept {id:$cid}) \
             MERGE (u)-[r:PRACTICED]->(c) \
             ON CREATE SET r.attempts=0, r.mastery_score=0.0 \
             SET r.attempts = r.attempts + 1, \
                 r.last_practice_at = $now, \
                 r.last_score = $score, \
                 r.last_passed = $passed, \
                 r.mastery_score = coalesce(r.mastery_score, 0.0) * $keep + ($score / 100.0) * $gain",
            json!({
                "uid": user_id,
                "cid": cid,
                "now": now,
                "score": i64::from(score),
                "passed": passed,
                "keep": self.scoring.ema_keep,
                "gain": self.scoring.ema_gain,
            }),
        );
        self.commit(vec![
            Self::merge_user(user_id),
            Self::merge_concept(&cid, title, None, &now),
            practice,
        ])?;
        Ok(())
    }

    fn upload_graph(
        &self,
        user_id: &str,
        nodes: &[UploadNode],
        edges: &[UploadEdge],
    ) -> GraphResult<()> {
        let (_, now) = iso_now();
        let mut statements = vec![Self::merge_user(user_id)];
        for node in nodes {
            let Some(name) = node.resolved_name() else {
                continue;
            };
            let cid = self.identity.concept_id(name);
            statements.push(Self::merge_concept(&cid, name, node.level, &now));
            statements.push(Self::merge_seen(user_id, &cid, &now));
        }
        for edge in edges {
            let Some((from, to)) = edge.resolved_endpoints() else {
                continue;
            };
            let kind = EdgeKind::from_token(edge.kind.as_deref());
            statements.push(Self::merge_concept_edge(
                &self.identity.concept_id(from),
                &self.identity.concept_id(to),
                kind,
            ));
        }
        self.commit(statements)?;
        Ok(())
    }

    fn get_graph(&self, user_id: &str) -> GraphResult<UserGraph> {
        let nodes_stmt = Statement::new(
            "MATCH (u:User {id:$uid})-[:SEEN|PRACTICED]->(c:Concept) \
             OPTIONAL MATCH (u)-[p:PRACTICED]->(c) \
             OPTIONAL MATCH (u)-[v:SEEN]->(c) \
             RETURN DISTINCT \
               c.id AS id, \
               c.name AS name, \
               c.level AS level, \
               p.last_practice_at AS last_practice_at, \
               v.last_seen_at AS last_seen_at, \
               p.mastery_score AS mastery_score",
            json!({ "uid": user_id }),
        );
        let edges_stmt = Statement::new(
            "MATCH (u:User {id:$uid})-[:SEEN|PRACTICED]->(a:Concept) \
             MATCH (a)-[r:PREREQ|REL]->(b:Concept) \
             RETURN DISTINCT a.id AS source, b.id AS target, type(r) AS type",
            json!({ "uid": user_id }),
        );
        let body = self.commit(vec![nodes_stmt, edges_stmt])?;

        let rows = Self::rows(&body, 0)
            .into_iter()
            .filter_map(|row| {
                Some(ConceptRow {
                    id: row.first()?.as_str()?.to_string(),
                    name: row.get(1)?.as_str().unwrap_or_default().to_string(),
                    level: row.get(2).and_then(Value::as_i64),
                    last_practice_at: row.get(3).and_then(parse_timestamp),
                    last_seen_at: row.get(4).and_then(parse_timestamp),
                    mastery_score: row.get(5).and_then(Value::as_f64),
                })
            })
            .collect();

        let edges = Self::rows(&body, 1)
            .into_iter()
            .filter_map(|row| {
                Some(EdgeRow {
                    source: row.first()?.as_str()?.to_string(),
                    target: row.get(1)?.as_str()?.to_string(),
                    kind: EdgeKind::from_token(row.get(2).and_then(Value::as_str)),
                })
            })
            .collect();

        Ok(assemble_graph(rows, edges, &self.scoring, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CypherStore {
        CypherStore::new(
            CypherConfig {
                url: "http://localhost:7474/".into(),
                user: "neo4j".into(),
                password: "secret".into(),
                database: "neo4j".into(),
            },
            IdentityConfig::default(),
            ScoringConfig::default(),
        )
    }

    #[test]
    fn commit_url_strips_trailing_slash() {
        assert_eq!(
            store().commit_url(),
            "http://localhost:7474/db/neo4j/tx/commit"
        );
    }

    #[test]
    fn auth_header_is_basic() {
        assert!(store().auth_header.starts_with("Basic "));
    }

    #[test]
    fn rows_extraction_from_tx_response() {
        let body = json!({
            "results": [
                { "columns": ["id"], "data": [ {"row": ["a"]}, {"row": ["b"]} ] }
            ],
            "errors": []
        });
        let rows = CypherStore::rows(&body, 0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], json!("a"));
        assert!(CypherStore::rows(&body, 1).is_empty());
    }

    #[test]
    fn edge_statement_interpolates_only_closed_tokens() {
        let s = CypherStore::merge_concept_edge("a", "b", EdgeKind::Rel);
        assert!(s.statement.contains("[:REL]"));
        let s = CypherStore::merge_concept_edge("a", "b", EdgeKind::Prereq);
        assert!(s.statement.contains("[:PREREQ]"));
    }

    #[test]
    fn timestamp_parsing_tolerates_nulls() {
        assert!(parse_timestamp(&Value::Null).is_none());
        assert!(parse_timestamp(&json!("not a date")).is_none());
        assert!(parse_timestamp(&json!("2026-01-05T10:00:00+00:00")).is_some());
    }
}
