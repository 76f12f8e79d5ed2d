//! Crew - multi-agent orchestration from the command line
//!
//! - `crew templates` lists specialist roles
//! - `crew access <type>` shows a role's effective tool access
//! - `crew delegate <source> <target>` checks a delegation
//! - `crew demo` wires a small crew end to end

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crew_core::{AgentRegistry, CrewConfig};

mod demo;

/// Crew - multi-agent orchestration core
#[derive(Parser)]
#[command(name = "crew")]
#[command(about = "Inspect and exercise a crew of cooperating agents", long_about = None)]
struct Cli {
    /// Configuration file (missing file = defaults)
    #[arg(long, global = true, default_value = "crew.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List specialist templates
    Templates,

    /// Show the effective tool access for an agent type
    Access {
        /// Agent type, e.g. `research-worker`
        agent_type: String,
    },

    /// Check whether one agent type may delegate to another
    Delegate {
        source: String,
        target: String,

        /// Workflow currently running
        #[arg(long)]
        workflow: Option<String>,
    },

    /// Run a small supervisor + specialist session
    ///
    /// Registers two agents, runs a grouped tool batch, routes a task between
    /// the agents and asks for a confirmation on stdin.
    Demo {
        /// Seconds to wait for the confirmation answer
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = CrewConfig::load(&cli.config).await?;
    let registry = AgentRegistry::from_config(&config);

    match cli.command {
        Commands::Templates => {
            for template in registry.get_specialist_templates() {
                let identity = &template.identity;
                println!(
                    "{:<22} {} {} ({})",
                    template.type_name, identity.tag, identity.name, identity.role
                );
                if !identity.description.is_empty() {
                    println!("{:<22} {}", "", identity.description);
                }
            }
        }
        Commands::Access { agent_type } => {
            if registry.get_specialist_template(&agent_type).is_none() {
                tracing::warn!(agent_type = %agent_type, "Unknown agent type, showing fallback access");
            }
            let access = registry.get_tool_access_for_type(&agent_type);
            println!("{}", serde_json::to_string_pretty(&access)?);
        }
        Commands::Delegate {
            source,
            target,
            workflow,
        } => match registry.can_delegate(&source, &target, workflow.as_deref()) {
            Ok(_) => println!("allowed: {} -> {}", source, target),
            Err(e) => {
                println!("denied: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Demo { timeout_secs } => {
            demo::run(config, registry, std::time::Duration::from_secs(timeout_secs)).await?;
        }
    }

    Ok(())
}
