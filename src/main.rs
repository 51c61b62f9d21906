use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use guildbot::application::errors::{BotError, ConfigError};
use guildbot::application::services::BotRuntime;
use guildbot::infrastructure::adapters::ConsoleGateway;
use guildbot::infrastructure::config::Config;

#[derive(Parser)]
#[command(name = "guildbot")]
#[command(about = "A plugin-based guild chat bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot on the console gateway
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => run_bot(&cli.config),
        Commands::Version => {
            println!("guildbot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(&cli.config),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins over `logging.level`
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_target(false).with_env_filter(filter).init();
}

fn load_config(path: &str) -> Result<Config, ConfigError> {
    let mut config = if Path::new(path).exists() {
        Config::load(path)?
    } else {
        Config::load_env()
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn run_bot(config_path: &str) -> Result<(), BotError> {
    let config = load_config(config_path)?;
    init_logging(&config.logging.level);
    tracing::info!("Starting {}", config.bot.name);

    let console = config
        .adapters
        .console
        .clone()
        .filter(|c| c.enabled)
        .ok_or_else(|| ConfigError::MissingField("adapters.console".to_string()))?;

    let rt = tokio::runtime::Runtime::new().map_err(|e| BotError::Internal(e.to_string()))?;
    rt.block_on(async {
        let gateway = Arc::new(ConsoleGateway::new(&config.bot.name, console));
        let runtime = BotRuntime::start(&config, gateway.clone()).await?;

        let token = runtime.shutdown_token();
        let inbound = gateway.spawn_reader(token.clone());
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received");
                token.cancel();
            }
        });

        runtime.run(inbound).await
    })
}

fn init_config(path: &str) -> Result<(), BotError> {
    if Path::new(path).exists() {
        return Err(ConfigError::InvalidValue(format!("{} already exists", path)).into());
    }
    Config::default().save(path)?;
    println!("Wrote default config to {}; adjust as needed.", path);
    Ok(())
}
