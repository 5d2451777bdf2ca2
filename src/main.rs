//! mathesis CLI: learning-progression engine.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use mathesis::coach::Coach;
use mathesis::config::CoachConfig;
use mathesis::plan::{Grade, LearningPlan, UploadEdge, UploadNode};

#[derive(Parser)]
#[command(name = "mathesis", version, about = "Learning-progression engine")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "mathesis.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and initialize the data directory.
    Init,

    /// Manage sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Record a question and materialize an externally generated plan.
    Ask {
        #[arg(long)]
        session: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        question: String,
        /// Optional topic hint recorded alongside the question.
        #[arg(long)]
        topic: Option<String>,
        /// Path to the generated plan JSON ({"outline": ..., "nodes": [...]}).
        #[arg(long)]
        plan_file: PathBuf,
    },

    /// Show a session's plan and unlock state.
    Plan {
        #[arg(long)]
        session: String,
        #[arg(long)]
        user: String,
    },

    /// Submit an externally graded answer for a plan node.
    Submit {
        #[arg(long)]
        session: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        node: String,
        #[arg(long)]
        answer: String,
        /// Path to the grade JSON ({"score": ..., "feedback": ..., ...}).
        #[arg(long)]
        grade_file: PathBuf,
    },

    /// List a session's graded attempts.
    History {
        #[arg(long)]
        session: String,
        #[arg(long)]
        user: String,
    },

    /// Inspect or upload the user's concept graph.
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Inspect or update the plan generator's connection settings.
    Llm {
        #[command(subcommand)]
        action: LlmAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a session for a user.
    Create {
        #[arg(long)]
        user: String,
    },
    /// List a user's sessions, newest activity first.
    List {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Print the user's concept graph as JSON.
    Show {
        #[arg(long)]
        user: String,
    },
    /// Bulk-merge nodes/edges from a JSON file ({"nodes": [...], "edges": [...]}).
    Upload {
        #[arg(long)]
        user: String,
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum LlmAction {
    /// Show the stored settings with the key masked.
    Show,
    /// Store new settings; a blank --api-key keeps the stored secret.
    Set {
        #[arg(long)]
        base_url: String,
        #[arg(long, default_value = "")]
        api_key: String,
        #[arg(long)]
        model: String,
        #[arg(long, default_value = "0.2")]
        temperature: f64,
    },
}

#[derive(serde::Deserialize)]
struct GraphUploadFile {
    #[serde(default)]
    nodes: Vec<UploadNode>,
    #[serde(default)]
    edges: Vec<UploadEdge>,
}

fn load_config(path: &PathBuf) -> Result<CoachConfig> {
    if path.exists() {
        Ok(CoachConfig::load(path)?)
    } else {
        Ok(CoachConfig::default())
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            if !cli.config.exists() {
                config.save(&cli.config)?;
                println!("Wrote default config to {}", cli.config.display());
            }
            let coach = Coach::open(&config)?;
            println!(
                "Initialized mathesis at {} (graph engine: {})",
                config.store.data_dir.display(),
                if coach.graph_enabled() {
                    config.graph.engine.as_str()
                } else {
                    "absent"
                }
            );
        }

        Commands::Session { action } => {
            let coach = Coach::open(&config)?;
            match action {
                SessionAction::Create { user } => {
                    let session = coach.create_session(&user)?;
                    println!("{}", session.session_id);
                }
                SessionAction::List { user } => {
                    let sessions = coach.list_sessions(&user)?;
                    if sessions.is_empty() {
                        println!("No sessions for {user}.");
                    } else {
                        for s in sessions {
                            println!("{}  {}  {}", s.session_id, s.updated_at, s.title);
                        }
                    }
                }
            }
        }

        Commands::Ask {
            session,
            user,
            question,
            topic,
            plan_file,
        } => {
            let coach = Coach::open(&config)?;
            let content = std::fs::read_to_string(&plan_file).into_diagnostic()?;
            let plan: LearningPlan = serde_json::from_str(&content).into_diagnostic()?;
            let outcome = coach.ask(&session, &user, &question, topic.as_deref(), plan)?;
            println!(
                "Plan materialized: {} nodes, unlocked order {}",
                outcome.plan.nodes.len(),
                outcome.unlocked_order
            );
            for node in &outcome.plan.nodes {
                println!("  {}. {} ({})", node.order, node.title, node.node_id);
            }
        }

        Commands::Plan { session, user } => {
            let coach = Coach::open(&config)?;
            let view = coach.get_plan(&session, &user)?;
            println!("Outline: {}", view.plan.outline);
            println!("Unlocked order: {}", view.unlocked_order);
            for node in &view.plan.nodes {
                let state = if node.order <= view.unlocked_order {
                    "unlocked"
                } else {
                    "locked"
                };
                println!("  {}. {} ({}) [{}]", node.order, node.title, node.node_id, state);
            }
        }

        Commands::Submit {
            session,
            user,
            node,
            answer,
            grade_file,
        } => {
            let coach = Coach::open(&config)?;
            let content = std::fs::read_to_string(&grade_file).into_diagnostic()?;
            let grade: Grade = serde_json::from_str(&content).into_diagnostic()?;
            let outcome = coach.submit(&session, &user, &node, &answer, grade)?;
            println!(
                "Node {} (order {}): score {}, {}",
                outcome.node_id,
                outcome.order,
                outcome.grade.score,
                if outcome.grade.passed { "passed" } else { "failed" }
            );
            println!("Unlocked order: {}", outcome.unlocked_order);
            if outcome.finished {
                println!("Plan finished.");
            }
        }

        Commands::History { session, user } => {
            let coach = Coach::open(&config)?;
            let attempts = coach.attempt_history(&session, &user)?;
            if attempts.is_empty() {
                println!("No attempts recorded.");
            } else {
                for a in attempts {
                    println!(
                        "{}  node {} (order {})  score {}  {}",
                        a.created_at,
                        a.node_id,
                        a.node_order,
                        a.score,
                        if a.passed { "passed" } else { "failed" }
                    );
                }
            }
        }

        Commands::Graph { action } => {
            let coach = Coach::open(&config)?;
            match action {
                GraphAction::Show { user } => {
                    let graph = coach.graph(&user)?;
                    let json = serde_json::to_string_pretty(&graph).into_diagnostic()?;
                    println!("{json}");
                }
                GraphAction::Upload { user, file } => {
                    let content = std::fs::read_to_string(&file).into_diagnostic()?;
                    let upload: GraphUploadFile =
                        serde_json::from_str(&content).into_diagnostic()?;
                    coach.upload_graph(&user, &upload.nodes, &upload.edges)?;
                    println!(
                        "Merged {} nodes and {} edges for {user}",
                        upload.nodes.len(),
                        upload.edges.len()
                    );
                }
            }
        }

        Commands::Llm { action } => {
            let coach = Coach::open(&config)?;
            let cfg = match action {
                LlmAction::Show => coach.llm_config()?,
                LlmAction::Set {
                    base_url,
                    api_key,
                    model,
                    temperature,
                } => coach.set_llm_config(&base_url, &api_key, &model, temperature)?,
            };
            println!("base_url:    {}", cfg.base_url);
            println!("model:       {}", cfg.model);
            println!("temperature: {}", cfg.temperature);
            println!("api_key:     {}", cfg.api_key_masked);
        }
    }

    Ok(())
}
