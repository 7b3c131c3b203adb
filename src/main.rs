use acp_agents::commands::{
    AppContext, ask, build_index, dispatch, resolve_home, serve_agents, serve_mcp, show_status,
};
use acp_agents::config::{run_interactive_config, show_config};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "acp-agents")]
#[command(about = "RAG-grounded insurance, health and doctor-search agents over ACP and MCP")]
#[command(version)]
struct Cli {
    /// Application home holding config.toml, the policy document and the index
    #[arg(long, global = true, env = "ACP_AGENTS_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the LLM, Ollama and document settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build the vector index from the policy document
    Index {
        /// Ignore any existing snapshot and re-embed every chunk
        #[arg(long)]
        rebuild: bool,
    },
    /// Ask the policy agent a question
    Ask {
        question: String,
        /// Print the retrieved chunks before the answer
        #[arg(long)]
        show_context: bool,
    },
    /// Show configuration, index and upstream service status
    Status,
    /// Host the policy, health and doctor agents over HTTP
    Serve {
        /// Listen port (defaults to agents.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Start the MCP tool server on stdio
    Mcp,
    /// Route a query across the agents of one or more ACP servers
    Dispatch {
        query: String,
        /// ACP server to discover agents from; repeatable
        #[arg(long = "agent-url")]
        agent_urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; keys may already be in the environment
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let home = resolve_home(cli.home)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&home)?;
            } else {
                run_interactive_config(&home)?;
            }
        }
        Commands::Index { rebuild } => {
            build_index(&AppContext::load(home)?, rebuild).await?;
        }
        Commands::Ask {
            question,
            show_context,
        } => {
            ask(&AppContext::load(home)?, &question, show_context).await?;
        }
        Commands::Status => {
            show_status(&AppContext::load(home)?).await?;
        }
        Commands::Serve { port } => {
            serve_agents(&AppContext::load(home)?, port).await?;
        }
        Commands::Mcp => {
            serve_mcp(&AppContext::load(home)?).await?;
        }
        Commands::Dispatch { query, agent_urls } => {
            dispatch(&AppContext::load(home)?, &query, agent_urls).await?;
        }
    }

    Ok(())
}
