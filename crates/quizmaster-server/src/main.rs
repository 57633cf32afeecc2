use std::env;

use quizmaster_server::ServerBuilder;
use quizmaster_server::config::loader::load_config;

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From QUIZMASTER_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (quizmaster.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (QUIZMASTER_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present; optional for local development.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    // Initialize tracing early with the default level
    quizmaster_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    quizmaster_server::observability::apply_logging_level(&cfg.logging.level);

    let (server, background) = match ServerBuilder::new().with_config(cfg).build() {
        Ok(built) => built,
        Err(e) => {
            // Schedule misconfiguration and broken backends fail fast here.
            eprintln!("Startup error: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "Server exited with error");
        background.shutdown();
        std::process::exit(1);
    }

    background.shutdown();
}

fn resolve_config_path() -> (String, ConfigSource) {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|a| a == "--config")
        && let Some(path) = args.get(pos + 1)
    {
        return (path.clone(), ConfigSource::CliArgument);
    }

    if let Ok(path) = env::var("QUIZMASTER_CONFIG") {
        return (path, ConfigSource::EnvironmentVariable);
    }

    ("quizmaster.toml".to_string(), ConfigSource::Default)
}
