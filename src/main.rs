//! `orla-server` entry point.
//!
//! Parses the CLI, loads configuration, discovers tools, and starts
//! either the HTTP or stdio transport (spec §4.7).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use orla_server::clock::system_clock;
use orla_server::config::{self, ServerConfig};
use orla_server::discovery;
use orla_server::registry::ToolsRegistry;
use orla_server::server::{Orchestrator, ServerInfo};

/// MCP server that publishes locally installed executables as typed,
/// callable tools.
#[derive(Parser)]
#[command(name = "orla-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server name reported in MCP `initialize` responses.
    #[arg(long, global = true, default_value = "orla-server")]
    name: String,

    /// Watch the tools directory and hot-reload on change.
    #[arg(long, global = true)]
    watch: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve over stdio (default transport, used by MCP Inspector and
    /// local development).
    Stdio,
    /// Serve over HTTP.
    Http {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate configuration and tool discovery without serving.
    Validate,
    /// Print discovered tools as JSON and exit.
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let server_config = match &cli.config {
        Some(path) => config::load(path)?,
        None => config::build_config(config::apply_env_overrides(config::RawConfig::default()))?,
    };

    init_tracing(&server_config);

    let tools_dir = server_config
        .tools_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("./tools"));
    let install_dir = home_tools_dir();

    match cli.command.unwrap_or(Commands::Stdio) {
        Commands::Validate => {
            let registry = discover(&tools_dir, &install_dir, &server_config)?;
            eprintln!("ok: {} tool(s) discovered", registry.len());
            Ok(())
        }
        Commands::Tools => {
            let registry = discover(&tools_dir, &install_dir, &server_config)?;
            let tools = registry.list();
            let tools: Vec<_> = tools.iter().map(std::sync::Arc::as_ref).collect();
            println!("{}", serde_json::to_string_pretty(&tools)?);
            Ok(())
        }
        Commands::Stdio => {
            let orchestrator = build_orchestrator(&cli.name, &tools_dir, &install_dir, &server_config).await?;
            maybe_watch(cli.watch, &tools_dir, &install_dir, &orchestrator);
            orla_server::server::stdio::serve(orchestrator).await?;
            Ok(())
        }
        Commands::Http { host, port } => {
            let orchestrator = build_orchestrator(&cli.name, &tools_dir, &install_dir, &server_config).await?;
            maybe_watch(cli.watch, &tools_dir, &install_dir, &orchestrator);
            let port = port.unwrap_or(server_config.port);
            orla_server::server::http::serve(orchestrator, &host, port).await?;
            Ok(())
        }
    }
}

fn discover(
    tools_dir: &std::path::Path,
    install_dir: &std::path::Path,
    config: &ServerConfig,
) -> anyhow::Result<ToolsRegistry> {
    if !config.tools_registry.is_empty() {
        return Ok(ToolsRegistry::from_map(config.tools_registry.clone()));
    }
    let dir_scan = discovery::scan_tools_dir(tools_dir)?;
    let install_scan = discovery::scan_install_dir(install_dir);
    Ok(ToolsRegistry::from_map(discovery::merge(dir_scan, install_scan)))
}

async fn build_orchestrator(
    name: &str,
    tools_dir: &std::path::Path,
    install_dir: &std::path::Path,
    config: &ServerConfig,
) -> anyhow::Result<Arc<Orchestrator>> {
    let registry = discover(tools_dir, install_dir, config)?;
    let info = ServerInfo {
        name: name.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let orchestrator = Orchestrator::new(registry, config.clone(), system_clock(), info).await;
    Ok(Arc::new(orchestrator))
}

fn maybe_watch(
    enabled: bool,
    tools_dir: &std::path::Path,
    install_dir: &std::path::Path,
    orchestrator: &Arc<Orchestrator>,
) {
    if !enabled {
        return;
    }
    let paths = vec![tools_dir.to_path_buf(), install_dir.to_path_buf()];
    orla_server::watcher::spawn(
        paths,
        tools_dir.to_path_buf(),
        install_dir.to_path_buf(),
        Arc::clone(orchestrator),
    );
}

fn home_tools_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".orla/tools")
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
