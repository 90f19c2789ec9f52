mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lf_core::{Engine, EngineConfig, export_json, import_json, millis_to_iso8601};
use lf_store::config::CONFIG_FILE;
use lf_store::{default_base_dir, load_config, open_data_dir};
use rmcp::service::ServerInitializeError;
use rmcp::{ServiceExt, transport::stdio};

#[derive(Parser)]
#[command(name = "lf", about = "Phrase knowledge-graph engine CLI and MCP server")]
struct Cli {
    /// Config file (default: config.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio transport
    Serve,

    /// Respond to text (the text is learned too)
    Respond {
        /// Text to respond to
        text: String,
    },

    /// Teach that RESPONSE follows PROMPT
    Learn {
        prompt: String,
        response: String,
    },

    /// Show graph statistics
    Stats,

    /// List training pairs, most recent first
    Memories {
        /// Maximum number of entries
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the global field state
    Field,

    /// List every node
    Nodes,

    /// List rarely used, weakly stable nodes
    Unstable,

    /// Extract keywords from text
    Tag {
        text: String,
    },

    /// Erase all nodes, edges, field state and training log
    Clear,

    /// Export state to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// Import state from a JSON file
    Import {
        /// Input file path
        path: PathBuf,
    },
}

fn data_dir() -> PathBuf {
    default_base_dir()
}

fn engine_config(cli: &Cli) -> Result<EngineConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir().join(CONFIG_FILE));
    load_config(&path).with_context(|| format!("failed to load config {}", path.display()))
}

fn open_engine(cli: &Cli) -> Result<Engine> {
    let config = engine_config(cli)?;
    let dir = data_dir();
    let store = open_data_dir(&dir)
        .with_context(|| format!("failed to open store in {}", dir.display()))?;
    Ok(Engine::open(config, Box::new(store)))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve => cmd_serve(&cli).await,
        Commands::Respond { text } => cmd_respond(&cli, text),
        Commands::Learn { prompt, response } => cmd_learn(&cli, prompt, response),
        Commands::Stats => cmd_stats(&cli),
        Commands::Memories { limit } => cmd_memories(&cli, *limit),
        Commands::Field => cmd_field(&cli),
        Commands::Nodes => cmd_nodes(&cli),
        Commands::Unstable => cmd_unstable(&cli),
        Commands::Tag { text } => cmd_tag(&cli, text),
        Commands::Clear => cmd_clear(&cli),
        Commands::Export { path } => cmd_export(&cli, path),
        Commands::Import { path } => cmd_import(&cli, path),
    }
}

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let engine = open_engine(cli)?;
    tracing::info!(data_dir = %data_dir().display(), "starting MCP server");

    let service = match server::LfServer::new(engine).serve(stdio()).await {
        Ok(service) => service,
        // stdin closed before the handshake finished
        Err(ServerInitializeError::ConnectionClosed(during)) => {
            tracing::debug!(%during, "client went away before initialization");
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to start MCP server"),
    };
    service.waiting().await?;
    Ok(())
}

fn cmd_respond(cli: &Cli, text: &str) -> Result<()> {
    let mut engine = open_engine(cli)?;
    println!("{}", engine.respond(text));

    if cli.verbose {
        let stats = engine.stats();
        eprintln!(
            "--- nodes={}, edges={}, u={:.4}, phase={} ---",
            stats.total_nodes, stats.total_edges, stats.field_value, stats.phase
        );
    }
    Ok(())
}

fn cmd_learn(cli: &Cli, prompt: &str, response: &str) -> Result<()> {
    let mut engine = open_engine(cli)?;
    engine.learn_from(prompt, response);
    let stats = engine.stats();
    println!(
        "learned. nodes={}, phrases={}, edges={}",
        stats.total_nodes, stats.phrase_nodes, stats.total_edges
    );
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let engine = open_engine(cli)?;
    let stats = engine.stats();

    println!("phase:      {}", stats.phase);
    println!("nodes:      {}", stats.total_nodes);
    println!("phrases:    {}", stats.phrase_nodes);
    println!("words:      {}", stats.word_nodes);
    println!("edges:      {}", stats.total_edges);
    println!("field:      {:.4}", stats.field_value);
    println!("curvature:  {:.4}", stats.curvature);
    println!("stability:  {:.4}", stats.stability);
    println!("memories:   {}", engine.memories().len());
    Ok(())
}

fn cmd_memories(cli: &Cli, limit: usize) -> Result<()> {
    let engine = open_engine(cli)?;
    let memories = engine.memories();
    if memories.is_empty() {
        println!("(no memories)");
        return Ok(());
    }
    for m in memories.iter().take(limit) {
        println!(
            "{}  {} -> {}",
            millis_to_iso8601(m.timestamp),
            m.prompt,
            m.response
        );
    }
    Ok(())
}

fn cmd_field(cli: &Cli) -> Result<()> {
    let engine = open_engine(cli)?;
    let json = serde_json::to_string_pretty(engine.field_state())
        .context("failed to serialize field state")?;
    println!("{json}");
    Ok(())
}

fn cmd_nodes(cli: &Cli) -> Result<()> {
    let engine = open_engine(cli)?;
    for node in engine.nodes() {
        println!(
            "{}  {:<11}  stability={:.2}  usage={:.1}  {}",
            node.id,
            node.kind.as_str(),
            node.weights.stability,
            node.weights.usage,
            node.content
        );
    }
    Ok(())
}

fn cmd_unstable(cli: &Cli) -> Result<()> {
    let engine = open_engine(cli)?;
    let nodes = engine.unstable_nodes();
    if nodes.is_empty() {
        println!("(no unstable nodes)");
    }
    for node in nodes {
        println!(
            "{}  stability={:.2}  usage={:.1}  {}",
            node.id, node.weights.stability, node.weights.usage, node.content
        );
    }
    Ok(())
}

fn cmd_tag(cli: &Cli, text: &str) -> Result<()> {
    let config = engine_config(cli)?;
    let engine = Engine::new(config);
    println!("{}", engine.tag(text).join(" "));
    Ok(())
}

fn cmd_clear(cli: &Cli) -> Result<()> {
    let mut engine = open_engine(cli)?;
    engine.clear_memory();
    println!("cleared");
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path) -> Result<()> {
    let engine = open_engine(cli)?;
    let json = export_json(&engine.snapshot()).context("failed to serialize state")?;
    std::fs::write(path, &json).with_context(|| format!("failed to write {}", path.display()))?;

    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot = import_json(&json).context("failed to parse JSON")?;

    let mut engine = open_engine(cli)?;
    engine.import(snapshot).context("invalid snapshot")?;

    let stats = engine.stats();
    println!(
        "imported from {}. nodes={}, edges={}, memories={}",
        path.display(),
        stats.total_nodes,
        stats.total_edges,
        engine.memories().len()
    );
    Ok(())
}
