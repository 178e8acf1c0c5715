use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use runtime::{AppConfig, CliArgs};
use std::path::PathBuf;

mod session;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Blog Demo - drives a scripted reader/author session through the live-sync core
#[derive(Parser)]
#[command(name = "blog-demo")]
#[command(about = "Blog Demo - realtime blog client against an in-process data service")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Replace all posts with the demo set before starting
    #[arg(long)]
    seed_demo: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scripted session
    Run,
    /// Check configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        verbose: cli.verbose,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;

    // Apply CLI overrides (verbosity / demo seeding)
    config.apply_cli_overrides(&args);
    if cli.seed_demo {
        config.module_section_mut(session::POSTS_MODULE)["seed_demo_data"] =
            serde_json::Value::Bool(true);
    }

    // Initialize logging
    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::init_logging_from_config(&logging_config, &config.home_dir());
    tracing::info!("Blog demo starting");

    // Print config and exit if requested
    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => session::run(&config).await,
        Commands::Check => check_config(&config),
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");

    // Module sections must deserialize into their typed configs.
    let posts: blog_posts::config::BlogPostsConfig = config.module_config(session::POSTS_MODULE)?;
    tracing::debug!(?posts, "blog_posts config is valid");

    tracing::info!("Configuration is valid");
    println!("Configuration check passed");
    println!("{}", config.to_yaml()?);
    Ok(())
}
