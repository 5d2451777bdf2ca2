//! Rich diagnostic error types for the mathesis engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly
//! what went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the mathesis engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum MathesisError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Progression(#[from] ProgressionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Coach(#[from] CoachError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Session store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(mathesis::session::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(mathesis::session::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption — try running with a fresh data directory. \
             If the problem persists, file a bug report."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(mathesis::session::serde),
        help(
            "Failed to serialize or deserialize a stored record. \
             This usually means the stored data format has changed between versions."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Concept graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("no concept graph engine is configured")]
    #[diagnostic(
        code(mathesis::graph::unavailable),
        help(
            "The graph capability was not constructed at startup. Set \
             `[graph] engine` in the config to \"cypher\", \"postgrest\" or \
             \"memory\" and provide the matching connection section."
        )
    )]
    Unavailable,

    #[error("graph request failed: {message}")]
    #[diagnostic(
        code(mathesis::graph::request),
        help("Is the graph database reachable? Check the configured URL and credentials.")
    )]
    Request { message: String },

    #[error("unexpected response from graph backend: {message}")]
    #[diagnostic(
        code(mathesis::graph::response),
        help("The backend answered with a shape this client does not understand. Version mismatch?")
    )]
    Response { message: String },

    #[error("graph backend rejected the operation: {message}")]
    #[diagnostic(
        code(mathesis::graph::backend),
        help(
            "The backend accepted the connection but refused the statement. \
             Check that `ensure_schema` ran and the credentials allow writes."
        )
    )]
    Backend { message: String },
}

/// Result type for concept graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

// ---------------------------------------------------------------------------
// Progression errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ProgressionError {
    #[error("node order {order} is locked (unlocked up to {unlocked})")]
    #[diagnostic(
        code(mathesis::progression::locked_node),
        help(
            "Nodes unlock in plan order. Pass the currently unlocked node first; \
             failing attempts may be retried without limit."
        )
    )]
    LockedNode { order: u32, unlocked: u32 },
}

// ---------------------------------------------------------------------------
// Coach (facade) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CoachError {
    #[error("session not found: {session_id}")]
    #[diagnostic(
        code(mathesis::coach::session_not_found),
        help("Create a session first with `mathesis session create`.")
    )]
    SessionNotFound { session_id: String },

    #[error("no plan recorded for session {session_id}")]
    #[diagnostic(
        code(mathesis::coach::plan_not_found),
        help("Materialize a plan first with `ask` before requesting or submitting nodes.")
    )]
    PlanNotFound { session_id: String },

    #[error("node not found in plan: {node_id}")]
    #[diagnostic(
        code(mathesis::coach::node_not_found),
        help("The node id must match one of the plan's nodes. List them with `plan show`.")
    )]
    NodeNotFound { node_id: String },

    #[error("session {session_id} does not belong to the calling user")]
    #[diagnostic(
        code(mathesis::coach::forbidden),
        help("Sessions are scoped to the user id that created them.")
    )]
    Forbidden { session_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Progression(#[from] ProgressionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(mathesis::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(mathesis::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(mathesis::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for functions returning mathesis results.
pub type MathesisResult<T> = std::result::Result<T, MathesisError>;
