//! The relational session boundary, backed by redb.
//!
//! Sessions, questions, plans, attempts, and the LLM generator config live in
//! redb tables as JSON rows with ISO-8601 UTC timestamps. Every operation
//! opens one short-lived transaction and releases it immediately; reads use
//! MVCC snapshots. Attempts are append-only — history is never rewritten.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::plan::LearningPlan;

const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
const QUESTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("questions");
const PLANS: TableDefinition<&str, &[u8]> = TableDefinition::new("plans");
const ATTEMPTS: TableDefinition<&str, &[u8]> = TableDefinition::new("attempts");
const LLM_CONFIG: TableDefinition<&str, &[u8]> = TableDefinition::new("llm_config");

/// Composite-key separator; sorts below all printable characters.
const SEP: char = '\x1f';

/// Placeholder title until the first question arrives.
const NEW_SESSION_TITLE: &str = "New session";

/// Visible length the derived session title is truncated to.
const TITLE_MAX_CHARS: usize = 28;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One user's conversation thread and its unlock state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Highest plan-node order the user may attempt; 0 = nothing unlocked.
    pub unlocked_order: u32,
}

/// Session listing row, ordered by recency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A recorded learner question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question_id: String,
    pub session_id: String,
    pub question: String,
    pub topic_hint: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The persisted plan body; replaced wholesale on regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    #[serde(flatten)]
    pub plan: LearningPlan,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of one graded submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_id: String,
    pub session_id: String,
    pub user_id: String,
    pub node_id: String,
    /// The unlock-relevant order value at submission time.
    pub node_order: u32,
    pub answer: String,
    pub score: u8,
    pub passed: bool,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

/// Connection settings for the external plan generator, persisted as a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfigRecord {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub updated_at: DateTime<Utc>,
}

/// Derive a session title from the question: whitespace collapsed,
/// truncated to a fixed visible length with an ellipsis marker.
pub fn derive_title(question: &str) -> String {
    let collapsed = question.split_whitespace().collect::<Vec<_>>().join(" ");
    let chars: Vec<char> = collapsed.chars().collect();
    if chars.len() > TITLE_MAX_CHARS {
        let mut title: String = chars[..TITLE_MAX_CHARS].iter().collect();
        title.push('…');
        title
    } else {
        collapsed
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Durable session store using redb.
pub struct SessionStore {
    db: Arc<Database>,
}

impl SessionStore {
    /// Open or create the store in the given directory.
    pub fn open(data_dir: &Path) -> SessionResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| SessionError::Io { source: e })?;
        let db_path = data_dir.join("mathesis.redb");
        let db = Database::create(&db_path).map_err(|e| SessionError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;
        let store = Self { db: Arc::new(db) };
        // Touch every table so later read transactions never see them absent.
        let txn = store.begin_write()?;
        for table in [SESSIONS, QUESTIONS, PLANS, ATTEMPTS, LLM_CONFIG] {
            txn.open_table(table).map_err(|e| SessionError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
        }
        store.commit(txn)?;
        Ok(store)
    }

    fn begin_write(&self) -> SessionResult<redb::WriteTransaction> {
        self.db.begin_write().map_err(|e| SessionError::Redb {
            message: format!("begin_write failed: {e}"),
        })
    }

    fn commit(&self, txn: redb::WriteTransaction) -> SessionResult<()> {
        txn.commit().map_err(|e| SessionError::Redb {
            message: format!("commit failed: {e}"),
        })
    }

    fn put_json<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> SessionResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| SessionError::Serialization {
            message: e.to_string(),
        })?;
        let txn = self.begin_write()?;
        {
            let mut t = txn.open_table(table).map_err(|e| SessionError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            t.insert(key, bytes.as_slice())
                .map_err(|e| SessionError::Redb {
                    message: format!("insert failed: {e}"),
                })?;
        }
        self.commit(txn)
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> SessionResult<Option<T>> {
        let txn = self.db.begin_read().map_err(|e| SessionError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let t = txn.open_table(table).map_err(|e| SessionError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let Some(guard) = t.get(key).map_err(|e| SessionError::Redb {
            message: format!("get failed: {e}"),
        })?
        else {
            return Ok(None);
        };
        serde_json::from_slice(guard.value())
            .map(Some)
            .map_err(|e| SessionError::Serialization {
                message: e.to_string(),
            })
    }

    /// All values whose key starts with `{prefix}{SEP}`, in key order.
    fn scan_prefix<T: for<'de> Deserialize<'de>>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        prefix: &str,
    ) -> SessionResult<Vec<T>> {
        let start = format!("{prefix}{SEP}");
        let end = format!("{prefix}\x20");
        let txn = self.db.begin_read().map_err(|e| SessionError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let t = txn.open_table(table).map_err(|e| SessionError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let mut out = Vec::new();
        let range = t
            .range(start.as_str()..end.as_str())
            .map_err(|e| SessionError::Redb {
                message: format!("range failed: {e}"),
            })?;
        for item in range {
            let (_, value) = item.map_err(|e| SessionError::Redb {
                message: format!("range iteration failed: {e}"),
            })?;
            let parsed =
                serde_json::from_slice(value.value()).map_err(|e| SessionError::Serialization {
                    message: e.to_string(),
                })?;
            out.push(parsed);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub fn create_session(&self, user_id: &str) -> SessionResult<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: NEW_SESSION_TITLE.to_string(),
            created_at: now,
            updated_at: now,
            unlocked_order: 0,
        };
        self.put_json(SESSIONS, &record.session_id, &record)?;
        Ok(record)
    }

    pub fn get_session(&self, session_id: &str) -> SessionResult<Option<SessionRecord>> {
        self.get_json(SESSIONS, session_id)
    }

    /// The user's sessions, newest activity first.
    pub fn list_sessions(&self, user_id: &str) -> SessionResult<Vec<SessionSummary>> {
        let txn = self.db.begin_read().map_err(|e| SessionError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let t = txn.open_table(SESSIONS).map_err(|e| SessionError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let mut sessions: Vec<SessionRecord> = Vec::new();
        let iter = t.iter().map_err(|e| SessionError::Redb {
            message: format!("iteration failed: {e}"),
        })?;
        for item in iter {
            let (_, value) = item.map_err(|e| SessionError::Redb {
                message: format!("iteration failed: {e}"),
            })?;
            let record: SessionRecord =
                serde_json::from_slice(value.value()).map_err(|e| SessionError::Serialization {
                    message: e.to_string(),
                })?;
            if record.user_id == user_id {
                sessions.push(record);
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions
            .into_iter()
            .map(|s| SessionSummary {
                session_id: s.session_id,
                title: s.title,
                created_at: s.created_at,
                updated_at: s.updated_at,
            })
            .collect())
    }

    fn update_session(
        &self,
        session_id: &str,
        mutate: impl FnOnce(&mut SessionRecord),
    ) -> SessionResult<()> {
        let Some(mut record) = self.get_session(session_id)? else {
            return Ok(());
        };
        mutate(&mut record);
        record.updated_at = Utc::now();
        self.put_json(SESSIONS, session_id, &record)
    }

    pub fn set_unlocked_order(&self, session_id: &str, unlocked: u32) -> SessionResult<()> {
        self.update_session(session_id, |s| s.unlocked_order = unlocked)
    }

    // -----------------------------------------------------------------------
    // Questions
    // -----------------------------------------------------------------------

    /// Record a question. The first question of a session also derives the
    /// session title; later questions only bump `updated_at`.
    pub fn record_question(
        &self,
        session_id: &str,
        question: &str,
        topic_hint: Option<&str>,
    ) -> SessionResult<QuestionRecord> {
        let now = Utc::now();
        let record = QuestionRecord {
            question_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            question: question.to_string(),
            topic_hint: topic_hint.map(str::to_string),
            created_at: now,
        };
        let first = self
            .scan_prefix::<QuestionRecord>(QUESTIONS, session_id)?
            .is_empty();
        let key = format!(
            "{session_id}{SEP}{:020}{SEP}{}",
            now.timestamp_micros(),
            record.question_id
        );
        self.put_json(QUESTIONS, &key, &record)?;
        self.update_session(session_id, |s| {
            if first {
                s.title = derive_title(question);
            }
        })?;
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Plans
    // -----------------------------------------------------------------------

    /// Persist the plan body, replacing any previous plan wholesale.
    pub fn upsert_plan(&self, session_id: &str, plan: &LearningPlan) -> SessionResult<()> {
        let record = PlanRecord {
            plan: plan.clone(),
            created_at: Utc::now(),
        };
        self.put_json(PLANS, session_id, &record)
    }

    pub fn get_plan(&self, session_id: &str) -> SessionResult<Option<PlanRecord>> {
        self.get_json(PLANS, session_id)
    }

    // -----------------------------------------------------------------------
    // Attempts
    // -----------------------------------------------------------------------

    /// Append one graded submission. Attempts are never updated or deleted.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_attempt(
        &self,
        session_id: &str,
        user_id: &str,
        node_id: &str,
        node_order: u32,
        answer: &str,
        score: u8,
        passed: bool,
        feedback: &str,
    ) -> SessionResult<AttemptRecord> {
        let now = Utc::now();
        let record = AttemptRecord {
            attempt_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            node_id: node_id.to_string(),
            node_order,
            answer: answer.to_string(),
            score,
            passed,
            feedback: feedback.to_string(),
            created_at: now,
        };
        let key = format!(
            "{session_id}{SEP}{:020}{SEP}{}",
            now.timestamp_micros(),
            record.attempt_id
        );
        self.put_json(ATTEMPTS, &key, &record)?;
        Ok(record)
    }

    /// The session's attempts in creation order.
    pub fn attempts(&self, session_id: &str) -> SessionResult<Vec<AttemptRecord>> {
        self.scan_prefix(ATTEMPTS, session_id)
    }

    // -----------------------------------------------------------------------
    // LLM config
    // -----------------------------------------------------------------------

    pub fn llm_config(&self) -> SessionResult<Option<LlmConfigRecord>> {
        self.get_json(LLM_CONFIG, "default")
    }

    pub fn set_llm_config(&self, record: &LlmConfigRecord) -> SessionResult<()> {
        self.put_json(LLM_CONFIG, "default", record)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> SessionStore {
        SessionStore::open(dir.path()).unwrap()
    }

    fn sample_plan(titles: &[&str]) -> LearningPlan {
        LearningPlan {
            outline: "outline".into(),
            nodes: titles
                .iter()
                .enumerate()
                .map(|(i, t)| crate::plan::PlanNode {
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
    fn create_and_get_session() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let s = store.create_session("u1").unwrap();
        assert_eq!(s.unlocked_order, 0);
        assert_eq!(s.title, NEW_SESSION_TITLE);
        let loaded = store.get_session(&s.session_id).unwrap().unwrap();
        assert_eq!(loaded.user_id, "u1");
    }

    #[test]
    fn list_sessions_scoped_and_recency_ordered() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let a = store.create_session("u1").unwrap();
        let b = store.create_session("u1").unwrap();
        store.create_session("u2").unwrap();

        // Touching `a` makes it the most recent.
        store.set_unlocked_order(&a.session_id, 1).unwrap();

        let listed = store.list_sessions("u1").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id, a.session_id);
        assert_eq!(listed[1].session_id, b.session_id);
    }

    #[test]
    fn first_question_derives_title() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let s = store.create_session("u1").unwrap();
        store
            .record_question(&s.session_id, "  how   does async IO work?  ", None)
            .unwrap();
        let loaded = store.get_session(&s.session_id).unwrap().unwrap();
        assert_eq!(loaded.title, "how does async IO work?");

        // A second question leaves the title alone.
        store
            .record_question(&s.session_id, "something else entirely", None)
            .unwrap();
        let loaded = store.get_session(&s.session_id).unwrap().unwrap();
        assert_eq!(loaded.title, "how does async IO work?");
    }

    #[test]
    fn title_truncation_is_char_based() {
        let long = "a".repeat(40);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), 29);
        assert!(title.ends_with('…'));
        assert_eq!(derive_title("short"), "short");
    }

    #[test]
    fn plan_replaced_wholesale() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let s = store.create_session("u1").unwrap();
        store
            .upsert_plan(&s.session_id, &sample_plan(&["A", "B", "C"]))
            .unwrap();
        store.upsert_plan(&s.session_id, &sample_plan(&["X"])).unwrap();
        let plan = store.get_plan(&s.session_id).unwrap().unwrap();
        assert_eq!(plan.plan.nodes.len(), 1);
        assert_eq!(plan.plan.nodes[0].title, "X");
    }

    #[test]
    fn attempts_are_append_only_and_ordered() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let s = store.create_session("u1").unwrap();
        for (i, score) in [55u8, 80, 92].iter().enumerate() {
            store
                .insert_attempt(
                    &s.session_id,
                    "u1",
                    "n1",
                    1,
                    &format!("answer {i}"),
                    *score,
                    *score >= 70,
                    "feedback",
                )
                .unwrap();
        }
        let attempts = store.attempts(&s.session_id).unwrap();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].score, 55);
        assert_eq!(attempts[2].score, 92);
        assert!(!attempts[0].passed);
        assert!(attempts[2].passed);
    }

    #[test]
    fn persistence_across_reopens() {
        let dir = TempDir::new().unwrap();
        let session_id = {
            let store = open_store(&dir);
            let s = store.create_session("u1").unwrap();
            store.set_unlocked_order(&s.session_id, 2).unwrap();
            s.session_id
        };
        let store = open_store(&dir);
        let loaded = store.get_session(&session_id).unwrap().unwrap();
        assert_eq!(loaded.unlocked_order, 2);
    }

    #[test]
    fn llm_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.llm_config().unwrap().is_none());
        store
            .set_llm_config(&LlmConfigRecord {
                base_url: "https://api.example.com".into(),
                api_key: "sk-secret".into(),
                model: "gpt-4o-mini".into(),
                temperature: 0.2,
                updated_at: Utc::now(),
            })
            .unwrap();
        let cfg = store.llm_config().unwrap().unwrap();
        assert_eq!(cfg.model, "gpt-4o-mini");
    }
}
