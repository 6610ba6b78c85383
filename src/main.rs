use clap::{Parser, Subcommand};
use contour_traffic_router::config::PluginConfig;
use contour_traffic_router::{ContourPlugin, RouteStore, TrafficRouterPlugin};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Contour traffic router: canary weight shifting for HTTPProxy resources
#[derive(Parser)]
#[command(name = "contour-traffic-router", version, about)]
struct Cli {
    /// Path to configuration file (.hcl)
    #[arg(short, long, default_value = "router.hcl")]
    config: String,

    /// Override listen address (e.g., 127.0.0.1:3030)
    #[arg(short, long)]
    listen: Option<String>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Serve from an in-memory store instead of the cluster
    #[arg(long)]
    memory_store: bool,

    /// Seed the in-memory store with HTTPProxy objects from a JSON file (object or array)
    #[arg(long, requires = "memory_store")]
    seed: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file without starting the router
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long, default_value = "router.hcl")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> contour_traffic_router::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Validate { config: config_path }) = &cli.command {
        return validate_config(config_path).await;
    }

    let config_exists = std::path::Path::new(&cli.config).exists();
    let mut config = if config_exists {
        PluginConfig::from_file(&cli.config).await?
    } else {
        PluginConfig::default()
    };
    if let Some(listen) = &cli.listen {
        config.listen = listen.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("contour-traffic-router v{}", env!("CARGO_PKG_VERSION"));
    if config_exists {
        tracing::info!(config = cli.config, "Loaded configuration");
    } else {
        tracing::warn!(config = cli.config, "Config file not found, using defaults");
    }

    if cli.memory_store {
        let store = contour_traffic_router::MemoryRouteStore::new();
        if let Some(seed) = &cli.seed {
            let count = seed_store(&store, seed).await?;
            tracing::info!(path = seed, objects = count, "Seeded in-memory store");
        }
        return run(store, &config).await;
    }

    run_cluster(&config).await
}

#[cfg(feature = "kube")]
async fn run_cluster(config: &PluginConfig) -> contour_traffic_router::Result<()> {
    let k8s = config.kubernetes.clone().unwrap_or_default();
    let store = contour_traffic_router::store::KubeRouteStore::connect(&k8s).await?;
    run(store, config).await
}

#[cfg(not(feature = "kube"))]
async fn run_cluster(_config: &PluginConfig) -> contour_traffic_router::Result<()> {
    Err(contour_traffic_router::RouterError::Config(
        "built without the `kube` feature; use --memory-store".to_string(),
    ))
}

async fn run<S: RouteStore + 'static>(
    store: S,
    config: &PluginConfig,
) -> contour_traffic_router::Result<()> {
    let plugin = Arc::new(
        ContourPlugin::new(store)
            .with_plugin_key(config.plugin_key.clone())
            .with_capture(config.capture_updates),
    );

    let init = plugin.init().await;
    if !init.is_ok() {
        return Err(contour_traffic_router::RouterError::Store(init.error_string));
    }

    let addr = config.listen_addr()?;
    tokio::select! {
        result = contour_traffic_router::server::start_plugin_server(addr, plugin) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    }
}

async fn seed_store(
    store: &contour_traffic_router::MemoryRouteStore,
    path: &str,
) -> contour_traffic_router::Result<usize> {
    let content = tokio::fs::read_to_string(path).await?;
    let objects = match serde_json::from_str::<serde_json::Value>(&content)? {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };
    let count = objects.len();
    for object in objects {
        store.insert(object).await?;
    }
    Ok(count)
}

/// Validate a configuration file and print diagnostics
async fn validate_config(path: &str) -> contour_traffic_router::Result<()> {
    use std::path::Path;

    if !Path::new(path).exists() {
        eprintln!("✗ Config file not found: {}", path);
        std::process::exit(1);
    }

    let config = match PluginConfig::from_file(path).await {
        Ok(c) => {
            println!("✓ Config parsed successfully ({})", path);
            c
        }
        Err(e) => {
            eprintln!("✗ Parse error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("✗ Validation error: {}", e);
        std::process::exit(1);
    }

    println!("✓ Configuration is valid");
    println!();
    println!("  Listen:      {}", config.listen);
    println!("  Log level:   {}", config.log_level);
    println!("  Plugin key:  {}", config.plugin_key);
    println!("  Capture:     {}", config.capture_updates);
    match &config.kubernetes {
        Some(k8s) => println!(
            "  Kubernetes:  kubeconfig={} context={}",
            k8s.kubeconfig.as_deref().unwrap_or("(default)"),
            k8s.context.as_deref().unwrap_or("(current)")
        ),
        None => println!("  Kubernetes:  inferred from environment"),
    }

    Ok(())
}
