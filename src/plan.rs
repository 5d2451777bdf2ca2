//! Plan, grade, and bulk-upload data contracts.
//!
//! These are the wire shapes exchanged with the external plan generator and
//! grader, plus the lenient node/edge shapes accepted for user graph uploads.
//! The generator owns plan content; mathesis only persists and gates it.

use serde::{Deserialize, Serialize};

/// One ordered knowledge node of a learning plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub node_id: String,
    /// 1-based position in the plan.
    pub order: u32,
    pub title: String,
    #[serde(default)]
    pub knowledge_goal: String,
    #[serde(default)]
    pub practice_task: String,
    /// Transfer-hint snippet shown to the learner (not the answer).
    #[serde(default)]
    pub hint_code: String,
    /// Points the grader is told to look for.
    #[serde(default)]
    pub grading_rubric: Vec<String>,
    #[serde(default = "default_pass_score")]
    pub pass_score: u8,
}

pub(crate) fn default_pass_score() -> u8 {
    70
}

/// An externally generated plan: outline plus ordered nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPlan {
    #[serde(default)]
    pub outline: String,
    #[serde(default)]
    pub nodes: Vec<PlanNode>,
}

impl LearningPlan {
    /// Highest node order present, or 0 for an empty plan.
    pub fn max_order(&self) -> u32 {
        self.nodes.iter().map(|n| n.order).max().unwrap_or(0)
    }
}

/// An externally produced grade for one submission.
///
/// `passed` is advisory: the core always recomputes it as
/// `score >= pass_score` for the graded node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grade {
    pub score: u8,
    pub passed: bool,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

// ---------------------------------------------------------------------------
// Bulk upload shapes
// ---------------------------------------------------------------------------

/// A caller-supplied graph node for bulk upload.
///
/// Accepts `name` or `title`; entries resolving to an empty name are skipped
/// rather than rejected — partial success is expected for bulk import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub level: Option<i64>,
}

impl UploadNode {
    /// Resolve the display name, preferring `name` over `title`.
    pub fn resolved_name(&self) -> Option<&str> {
        first_nonempty(&self.name, &self.title)
    }
}

/// A caller-supplied edge for bulk upload.
///
/// Accepts `from`/`source` and `to`/`target` name pairs; any `type` other
/// than `PREREQ` (case-insensitive) is normalized to `REL`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadEdge {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

fn first_nonempty<'a>(a: &'a Option<String>, b: &'a Option<String>) -> Option<&'a str> {
    for candidate in [a, b] {
        if let Some(s) = candidate {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

impl UploadEdge {
    /// Resolve both endpoint names, or `None` if either is missing.
    pub fn resolved_endpoints(&self) -> Option<(&str, &str)> {
        let from = first_nonempty(&self.from, &self.source)?;
        let to = first_nonempty(&self.to, &self.target)?;
        Some((from, to))
    }
}
