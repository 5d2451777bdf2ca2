// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # mathesis
//!
//! A learning-progression engine. Externally generated learning plans are
//! materialized into a per-session unlock sequence, and every graded attempt
//! is mirrored into a per-user concept graph scored with time-decayed
//! "brightness" and an exponential-moving-average mastery estimate.
//!
//! ## Architecture
//!
//! - **Identity** (`identity`): content-addressed concept ids (SHA-256 prefix)
//! - **Scoring** (`scoring`): brightness decay + EMA mastery update
//! - **Concept graph** (`graph`): one [`graph::ConceptStore`] contract, three
//!   engines — in-memory, Cypher-over-HTTP, PostgREST
//! - **Sessions** (`session`): redb-backed sessions/questions/plans/attempts
//! - **Progression** (`progression`): the unlock-order state machine
//! - **Coach** (`coach`): the facade tying the stores together
//!
//! ## Library usage
//!
//! ```no_run
//! use mathesis::coach::Coach;
//! use mathesis::config::CoachConfig;
//!
//! let coach = Coach::open(&CoachConfig::default()).unwrap();
//! let session = coach.create_session("user-1").unwrap();
//! println!("{}", session.session_id);
//! ```

pub mod coach;
pub mod config;
pub mod error;
pub mod graph;
pub mod identity;
pub mod materialize;
pub mod plan;
pub mod progression;
pub mod scoring;
pub mod session;
