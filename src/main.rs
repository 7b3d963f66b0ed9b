//! supportmind CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use supportmind::{
    app::AppContext,
    commands::{
        cmd_ask, cmd_draft, cmd_init, cmd_list_events, cmd_review, cmd_scan_gaps, cmd_status,
        print_answer, print_draft, print_events, print_init, print_review, print_scan_stats,
        print_status, AskCommandOptions, DraftRequest, ReviewVerdict,
    },
    config::Config,
    error::Result,
};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "supportmind")]
#[command(version, about = "Self-learning support knowledge CLI", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Ask the copilot a support question
    Ask {
        /// The question to answer
        question: String,

        /// Maximum number of fused results
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Exclude KB articles from retrieval
        #[arg(long)]
        no_kb: bool,

        /// Exclude scripts from retrieval
        #[arg(long)]
        no_scripts: bool,

        /// Exclude resolved tickets from retrieval
        #[arg(long)]
        no_tickets: bool,

        /// Report a knowledge gap when confidence falls below this value
        #[arg(long)]
        report_below: Option<f32>,
    },

    /// Detect and report knowledge gaps
    Gaps {
        #[command(subcommand)]
        action: GapsAction,
    },

    /// Generate a KB draft for an event, ticket, or question
    Draft {
        /// Learning event to draft for (draft is attached to it)
        #[arg(long)]
        event: Option<String>,

        /// Ticket number to draft from
        #[arg(long)]
        ticket: Option<String>,

        /// Free-form question to draft from
        #[arg(long)]
        question: Option<String>,
    },

    /// Approve or reject a learning event
    Review {
        /// Learning event ID
        event_id: String,

        /// Verdict to apply
        #[arg(value_enum)]
        verdict: ReviewVerdict,

        /// Replacement title (approve only)
        #[arg(long)]
        title: Option<String>,

        /// Replacement body (approve only)
        #[arg(long)]
        body: Option<String>,

        /// Reviewer notes
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// List learning events
    Events {
        /// Filter by status (pending, approved, rejected)
        #[arg(long)]
        status: Option<String>,
    },

    /// Show system status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum GapsAction {
    /// Scan resolved cases for missing KB coverage
    Scan {
        /// Similarity threshold override
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Report a question the copilot could not answer confidently
    Report {
        /// The unanswered question
        question: String,

        /// Confidence the copilot reported
        #[arg(long, default_value = "0.0")]
        confidence: f32,

        /// Conversation or session the question came from
        #[arg(long)]
        conversation: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let path = cmd_init(cli.config.as_deref(), force)?;
        print_init(&path);
        return Ok(());
    }

    // Handle completions command (doesn't need config or data)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "supportmind", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration and build the shared context
    let config = Config::load(cli.config.as_deref())?;
    let ctx = AppContext::bootstrap(config).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ask {
            question,
            limit,
            no_kb,
            no_scripts,
            no_tickets,
            report_below,
        } => {
            let options = AskCommandOptions {
                include_kb: !no_kb,
                include_scripts: !no_scripts,
                include_tickets: !no_tickets,
                top_k: limit,
                report_below,
            };
            let outcome = cmd_ask(&ctx, &question, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_answer(&outcome);
            }
        }

        Commands::Gaps { action } => match action {
            GapsAction::Scan { threshold } => {
                let stats = cmd_scan_gaps(&ctx, threshold).await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    print_scan_stats(&stats);
                }
            }
            GapsAction::Report {
                question,
                confidence,
                conversation,
            } => {
                let event = ctx
                    .workflow
                    .report_gap(&question, confidence, conversation.as_deref())
                    .await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&event)?);
                } else {
                    println!("\n📌 Reported gap {} for review", event.event_id);
                }
            }
        },

        Commands::Draft {
            event,
            ticket,
            question,
        } => {
            let request = DraftRequest {
                event_id: event,
                ticket_number: ticket,
                question,
            };
            let outcome = cmd_draft(&ctx, request).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_draft(&outcome);
            }
        }

        Commands::Review {
            event_id,
            verdict,
            title,
            body,
            notes,
        } => {
            let outcome = cmd_review(
                &ctx,
                &event_id,
                verdict,
                title.as_deref(),
                body.as_deref(),
                &notes,
            )
            .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_review(&outcome);
            }
        }

        Commands::Events { status } => {
            let list = cmd_list_events(&ctx, status.as_deref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                print_events(&list);
            }
        }

        Commands::Status => {
            let report = cmd_status(&ctx).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status(&report);
            }
        }
    }

    Ok(())
}
