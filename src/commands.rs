use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::agents::builtin::{DOCTOR_AGENT, HEALTH_AGENT, POLICY_AGENT};
use crate::agents::dispatcher::DISPATCHER_TEMPERATURE;
use crate::agents::{
    AcpClient, CapabilityRegistry, Dispatcher, DoctorAgent, HealthAgent, PolicyAgent,
};
use crate::config::Config;
use crate::doctors::DoctorDirectory;
use crate::embeddings::{EmbeddingProvider, OllamaClient};
use crate::index::snapshot::{self, read_manifest};
use crate::llm::{ChatClient, CompletionProvider};
use crate::rag::{IndexOrigin, QueryEngine, initialize_index};

/// Home given on the command line, else `$ACP_AGENTS_HOME` or `~/.acp-agents`
#[inline]
pub fn resolve_home(home: Option<PathBuf>) -> Result<PathBuf> {
    match home {
        Some(home) => Ok(home),
        None => Config::default_home().context("Cannot determine the application home directory"),
    }
}

/// Configuration plus the providers built from it, shared by every command.
/// The chat client needs an API key, so it is created on first use.
#[derive(Debug)]
pub struct AppContext {
    pub config: Config,
    embedder: Arc<OllamaClient>,
    chat: OnceLock<Arc<ChatClient>>,
}

impl AppContext {
    #[inline]
    pub fn load(home: PathBuf) -> Result<Self> {
        let config = Config::load(&home)
            .with_context(|| format!("Failed to load configuration from {}", home.display()))?;
        let embedder =
            Arc::new(OllamaClient::new(&config.ollama).context("Invalid Ollama settings")?);

        Ok(Self {
            config,
            embedder,
            chat: OnceLock::new(),
        })
    }

    #[inline]
    pub fn embedder(&self) -> Arc<OllamaClient> {
        Arc::clone(&self.embedder)
    }

    /// Chat client using the configured model and temperature
    #[inline]
    pub fn chat_client(&self) -> Result<Arc<ChatClient>> {
        if let Some(client) = self.chat.get() {
            return Ok(Arc::clone(client));
        }

        let client = ChatClient::new(&self.config.llm).with_context(|| {
            format!(
                "Set {} (or add it to .env) to call the LLM",
                self.config.llm.api_key_env
            )
        })?;
        Ok(Arc::clone(self.chat.get_or_init(|| Arc::new(client))))
    }

    #[inline]
    pub fn doctor_directory(&self) -> Arc<DoctorDirectory> {
        Arc::new(DoctorDirectory::new(&self.config.doctors))
    }

    /// Load or build the index, then wrap it in a query engine
    #[inline]
    pub async fn query_engine(&self, force_rebuild: bool) -> Result<(Arc<QueryEngine>, IndexOrigin)> {
        let embedder = self.embedder();
        let completer: Arc<dyn CompletionProvider> = self.chat_client()?;

        let (index, origin) = initialize_index(&self.config, embedder.as_ref(), force_rebuild)
            .await
            .context("Failed to prepare the vector index")?;

        let engine = QueryEngine::new(
            Arc::new(index),
            embedder,
            completer,
            &self.config.retrieval,
        )?;

        Ok((Arc::new(engine), origin))
    }

    /// Registry holding the policy, health and doctor agents
    #[inline]
    pub async fn local_registry(&self) -> Result<CapabilityRegistry> {
        let (engine, _) = self.query_engine(false).await?;

        let chat = self.chat_client()?;
        let health_llm: Arc<dyn CompletionProvider> = Arc::new(
            ChatClient::clone(&chat).with_temperature(self.config.agents.health_temperature),
        );
        let doctor_llm: Arc<dyn CompletionProvider> = chat;

        Ok(local_registry(
            engine,
            health_llm,
            doctor_llm,
            self.doctor_directory(),
            &self.config.doctors.default_state,
        ))
    }

    /// Explicit URLs, else the configured ones, else the local agent server
    #[inline]
    pub fn agent_urls(&self, explicit: Vec<String>) -> Vec<String> {
        if !explicit.is_empty() {
            return explicit;
        }
        if !self.config.agents.remote_urls.is_empty() {
            return self.config.agents.remote_urls.clone();
        }
        vec![format!(
            "http://{}:{}",
            self.config.agents.host, self.config.agents.port
        )]
    }
}

#[inline]
pub fn local_registry(
    engine: Arc<QueryEngine>,
    health_llm: Arc<dyn CompletionProvider>,
    doctor_llm: Arc<dyn CompletionProvider>,
    directory: Arc<DoctorDirectory>,
    default_state: &str,
) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(PolicyAgent::new(engine)));
    registry.register(Arc::new(HealthAgent::new(health_llm)));
    registry.register(Arc::new(DoctorAgent::new(
        doctor_llm,
        directory,
        default_state,
    )));
    registry
}

/// Build (or load) the index and report what was done
#[inline]
pub async fn build_index(ctx: &AppContext, rebuild: bool) -> Result<()> {
    let embedder = ctx.embedder();

    let (index, origin) = initialize_index(&ctx.config, embedder.as_ref(), rebuild)
        .await
        .context("Indexing failed")?;

    let snapshot_path = ctx.config.snapshot_path();
    match origin {
        IndexOrigin::Built => println!(
            "✅ Indexed {} chunks ({}-dimensional, model {}) into {}",
            index.len(),
            index.dimension(),
            embedder.model(),
            snapshot_path.display()
        ),
        IndexOrigin::Loaded => println!(
            "✅ Snapshot at {} is up to date ({} chunks). Use --rebuild to re-index.",
            snapshot_path.display(),
            index.len()
        ),
    }

    Ok(())
}

/// Answer one question against the policy document
#[inline]
pub async fn ask(ctx: &AppContext, question: &str, show_context: bool) -> Result<()> {
    let (engine, _) = ctx.query_engine(false).await?;
    println!("{}", answer_text(&engine, question, show_context).await);
    Ok(())
}

/// The answer to `question`, preceded by the retrieved chunks when
/// `show_context` is set. Retrieval and completion failures are reported in
/// the text.
#[inline]
pub async fn answer_text(engine: &QueryEngine, question: &str, show_context: bool) -> String {
    if !show_context {
        return engine.answer(question).await;
    }

    let retrieved = match engine.retrieve(question).await {
        Ok(retrieved) => retrieved,
        Err(e) => {
            warn!("Retrieval failed: {}", e);
            return format!("Error processing request: {e}");
        }
    };

    let mut text = String::from("Retrieved context:\n");
    for (rank, hit) in retrieved.hits.iter().enumerate() {
        let _ = writeln!(
            text,
            "  {}. page {} chunk {} (distance {:.4})",
            rank + 1,
            hit.chunk.page + 1,
            hit.chunk.chunk_index,
            hit.distance
        );
    }
    text.push('\n');

    match engine.generate(question, &retrieved).await {
        Ok(answer) => text.push_str(&answer),
        Err(e) => {
            warn!("Completion failed: {}", e);
            let _ = write!(text, "Error processing request: {e}");
        }
    }
    text
}

/// Report configuration, snapshot and upstream health
#[inline]
pub async fn show_status(ctx: &AppContext) -> Result<()> {
    let config = &ctx.config;

    println!("📊 ACP Agents Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("⚙️  Configuration:");
    println!("   📁 Home: {}", config.get_base_dir().display());
    let config_file = config.config_file_path();
    if config_file.is_file() {
        println!("   ✅ Config file: {}", config_file.display());
    } else {
        println!("   ℹ️  Config file: not found, using defaults");
    }

    println!();
    println!("📄 Source Document:");
    let document_path = config.document_path();
    if document_path.is_file() {
        println!("   ✅ {}", document_path.display());
    } else {
        println!("   ❌ Missing: {}", document_path.display());
    }

    println!();
    println!("🔍 Vector Snapshot:");
    let snapshot_path = config.snapshot_path();
    match read_manifest(&snapshot_path) {
        Ok(manifest) => {
            println!("   ✅ {}", snapshot_path.display());
            println!("   📊 Chunks: {}", manifest.chunk_count);
            println!(
                "   🔢 Dimension: {} (model {})",
                manifest.dimension, manifest.model
            );
            println!(
                "   🕒 Created: {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if manifest.dimension != config.ollama.embedding_dimension as usize {
                println!(
                    "   ⚠️  Configured dimension is {}; the index will be rebuilt on next start",
                    config.ollama.embedding_dimension
                );
            }
        }
        Err(e) => println!("   ❌ {e}"),
    }
    let orphans = snapshot::orphaned_staging_dirs(&snapshot_path);
    if !orphans.is_empty() {
        println!(
            "   🧹 {} interrupted write(s) will be cleaned up on next persist",
            orphans.len()
        );
    }

    println!();
    println!("🤖 Ollama Status:");
    let client = ctx.embedder();
    match crate::http::run_blocking(move || client.health_check()).await {
        Ok(()) => println!(
            "   ✅ Connected ({}:{}), model {}",
            config.ollama.host, config.ollama.port, config.ollama.model
        ),
        Err(e) => println!("   ⚠️  Unhealthy: {e:#}"),
    }

    println!();
    println!("🧠 LLM:");
    println!("   🌐 Endpoint: {}", config.llm.base_url);
    println!("   📋 Model: {}", config.llm.model);
    match config.llm.api_key() {
        Ok(_) => println!("   ✅ API key found in {}", config.llm.api_key_env),
        Err(e) => println!("   ❌ {e}"),
    }

    println!();
    println!("🩺 Doctor directory: {}", config.doctors.source_url);

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'acp-agents index' to build the vector index");
    println!("   • Use 'acp-agents serve' to host the agents over HTTP");
    println!("   • Use 'acp-agents mcp' to start the MCP tool server on stdio");

    Ok(())
}

/// Host the local agents until Ctrl-C
#[inline]
pub async fn serve_agents(ctx: &AppContext, port: Option<u16>) -> Result<()> {
    let registry = ctx.local_registry().await?;

    let host = ctx.config.agents.host.as_str();
    let port = port.unwrap_or(ctx.config.agents.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;

    info!(
        "Serving {}, {} and {} on {}",
        POLICY_AGENT, HEALTH_AGENT, DOCTOR_AGENT, addr
    );
    crate::agents::serve(Arc::new(registry), addr).await
}

/// Serve MCP on stdio. Stdout carries protocol frames only.
#[inline]
pub async fn serve_mcp(ctx: &AppContext) -> Result<()> {
    let server = crate::mcp::doctor_server(ctx.doctor_directory());
    eprintln!(
        "MCP server ready on stdio with tools: {}",
        server.tool_names().join(", ")
    );

    tokio::select! {
        result = server.serve_stdio() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt signal, shutting down MCP server");
        }
    }

    Ok(())
}

/// Route one query across the agents advertised by `agent_urls`
#[inline]
pub async fn dispatch(ctx: &AppContext, query: &str, agent_urls: Vec<String>) -> Result<()> {
    let clients = ctx
        .agent_urls(agent_urls)
        .iter()
        .map(|url| {
            AcpClient::new(url).map(|client| client.with_timeout(ctx.config.llm.timeout()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut registry = CapabilityRegistry::new();
    if registry.discover(&clients).await == 0 {
        warn!("No agents discovered; the dispatcher can only answer directly");
    }

    let llm = ChatClient::clone(&*ctx.chat_client()?)
        .with_model(ctx.config.dispatcher_model())
        .with_temperature(DISPATCHER_TEMPERATURE);

    let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(llm))
        .with_max_steps(ctx.config.agents.dispatcher_max_steps);

    println!("{}", dispatcher.run_to_text(query).await);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::index::VectorIndex;
    use crate::test_support::{StubCompleter, StubEmbedder, chunk};
    use tempfile::TempDir;

    #[test]
    fn explicit_home_wins() {
        let home = resolve_home(Some(PathBuf::from("/tmp/agents-home"))).expect("resolves");
        assert_eq!(home, PathBuf::from("/tmp/agents-home"));
    }

    #[test]
    fn agent_urls_fall_back_to_local_server() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let mut ctx = AppContext::load(temp_dir.path().to_path_buf()).expect("loads defaults");
        ctx.config.agents.remote_urls.clear();

        assert_eq!(
            ctx.agent_urls(Vec::new()),
            vec![format!("http://127.0.0.1:{}", ctx.config.agents.port)]
        );

        ctx.config.agents.remote_urls = vec!["http://agents.internal:8001".to_string()];
        assert_eq!(ctx.agent_urls(Vec::new()), vec!["http://agents.internal:8001"]);

        assert_eq!(
            ctx.agent_urls(vec!["http://other:9000".to_string()]),
            vec!["http://other:9000"]
        );
    }

    fn engine_with(embedder: StubEmbedder, llm: StubCompleter) -> QueryEngine {
        let text = "Physiotherapy is covered for 20 sessions.";
        let vector = StubEmbedder::new(4).vector_for(text);
        let index = VectorIndex::from_parts("stub-embed", vec![chunk(0, 0, text)], vec![vector])
            .expect("valid parts");
        QueryEngine::new(
            Arc::new(index),
            Arc::new(embedder),
            Arc::new(llm),
            &RetrievalConfig::default(),
        )
        .expect("engine builds")
    }

    #[tokio::test]
    async fn question_embedding_failure_is_answered_as_text() {
        for show_context in [false, true] {
            let engine = engine_with(
                StubEmbedder::failing(4),
                StubCompleter::answering("unused"),
            );

            let text = answer_text(&engine, "Is physio covered?", show_context).await;

            assert!(
                text.starts_with("Error processing request: Embedding error:"),
                "unexpected text: {text}"
            );
        }
    }

    #[tokio::test]
    async fn context_is_listed_before_the_answer() {
        let engine = engine_with(StubEmbedder::new(4), StubCompleter::answering("Yes."));

        let text = answer_text(&engine, "Is physio covered?", true).await;

        assert!(text.starts_with("Retrieved context:\n  1. page 1 chunk 0"));
        assert!(text.ends_with("\n\nYes."));
    }

    #[tokio::test]
    async fn completion_failure_follows_the_context() {
        let engine = engine_with(StubEmbedder::new(4), StubCompleter::failing("rate limited"));

        let text = answer_text(&engine, "Is physio covered?", true).await;

        assert!(text.starts_with("Retrieved context:"));
        assert!(text.contains("Error processing request: Completion error: rate limited"));
    }

    #[test]
    fn providers_are_built_once() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let ctx = AppContext::load(temp_dir.path().to_path_buf()).expect("loads defaults");

        assert!(Arc::ptr_eq(&ctx.embedder(), &ctx.embedder()));
    }

    #[test]
    fn local_registry_hosts_three_agents() {
        let embedder = Arc::new(StubEmbedder::new(4));
        let index = VectorIndex::from_parts("stub-embed", vec![chunk(0, 0, "text")], vec![
            embedder.vector_for("text"),
        ])
        .expect("valid parts");
        let llm: Arc<dyn CompletionProvider> = Arc::new(StubCompleter::answering("ok"));
        let engine = QueryEngine::new(
            Arc::new(index),
            embedder,
            Arc::clone(&llm),
            &RetrievalConfig::default(),
        )
        .expect("engine builds");

        let registry = local_registry(
            Arc::new(engine),
            Arc::clone(&llm),
            llm,
            Arc::new(DoctorDirectory::new(&crate::config::DoctorsConfig::default())),
            "GA",
        );

        assert_eq!(
            registry.names(),
            vec![DOCTOR_AGENT, HEALTH_AGENT, POLICY_AGENT]
        );
    }
}
