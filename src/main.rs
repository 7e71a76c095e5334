//! Switchboard MCP Server
//!
//! Serves registered tools, resources, and prompts to MCP clients over stdio
//! or HTTP.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use switchboard_mcp::builtin::register_builtins;
use switchboard_mcp::config::{Args, Config};
use switchboard_mcp::discovery::watcher::DiscoveryWatcher;
use switchboard_mcp::discovery::Discovery;
use switchboard_mcp::registry::{Registry, StaticFactory};
use switchboard_mcp::server::McpServer;
use switchboard_mcp::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logging goes to stderr; stdout belongs to the stdio transport.
    let default_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let config = Config::load(args).context("failed to load configuration")?;

    info!("Switchboard MCP Server v{}", VERSION);
    info!("Workspace: {}", config.workspace.display());
    info!("Transport: {}", config.transport);

    // The factory resolves discovered class identifiers. The standalone
    // binary ships it empty; embedding hosts seed it with constructors.
    let factory = Arc::new(StaticFactory::new());
    let registry = Arc::new(Registry::with_factory(factory.clone()));

    if config.no_builtins {
        info!("built-in components disabled");
    } else {
        register_builtins(&registry, &config.workspace)
            .context("failed to register built-in components")?;
        info!(
            "Registered {} built-in components",
            registry.counts().total()
        );
    }

    let mut watcher = None;
    if !config.discover.is_empty() {
        let discovery = Arc::new(Discovery::new().with_factory(factory));
        let discovered = discovery.discover(&config.discover);
        let summary = discovery.register_discovered(&discovered, &registry);
        info!(
            found = discovered.total(),
            registered = summary.registered,
            failed = summary.failed.len(),
            "component discovery finished"
        );

        if config.watch {
            let mut started =
                DiscoveryWatcher::new(discovery, registry.clone(), config.discover.clone());
            started
                .start()
                .context("failed to start discovery watcher")?;
            watcher = Some(started);
        }
    }

    let server = McpServer::new(config, registry);
    server.initialize().await?;
    server.run().await?;

    if let Some(mut watcher) = watcher {
        watcher.stop().await;
    }

    Ok(())
}
