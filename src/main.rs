use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use lifeline::{HealthMonitor, LifelineConfig, Orchestrator, SimulatedComponent, SupervisorOptions};

#[derive(Parser, Debug)]
#[command(name = "lifeline")]
#[command(about = "Dependency-aware lifecycle supervisor")]
#[command(version)]
#[command(long_about = "Starts a set of interdependent components level by level, \
rolls back on startup failure and stops everything in reverse order on SIGINT/SIGTERM. \
Components are declared in a TOML configuration file.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "lifeline.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting anything")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - resolve the graph but don't start components
    #[arg(long, help = "Print startup levels and shutdown order, then exit")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting lifeline v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match LifelineConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let orchestrator = Arc::new(Orchestrator::with_options(SupervisorOptions::from(
        &config.supervisor,
    )));
    for component in &config.components {
        orchestrator.register_component(Arc::new(SimulatedComponent::new(component.clone())))?;
    }

    if args.dry_run {
        orchestrator.validate_dependencies()?;
        for (level, names) in orchestrator.startup_levels()?.iter().enumerate() {
            println!("level {}: {}", level, names.join(", "));
        }
        println!("shutdown: {}", orchestrator.shutdown_order()?.join(", "));
        println!("✓ Dry run completed successfully");
        return Ok(());
    }

    let token = CancellationToken::new();
    orchestrator.start(&token).await.map_err(|e| {
        error!("Failed to start components: {}", e);
        e
    })?;

    let monitor = HealthMonitor::new(orchestrator.clone(), config.health_interval());
    let monitor_token = token.child_token();
    let monitor_handle = monitor.spawn(monitor_token.clone());

    let exit_code = orchestrator.run_until_shutdown(&token).await?;

    monitor_token.cancel();
    if let Err(e) = monitor_handle.await {
        error!("Health monitor task failed: {}", e);
    }

    info!("lifeline exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lifeline={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    use lifeline::{ComponentConfig, RetrySettings};

    let config = LifelineConfig {
        components: vec![
            ComponentConfig {
                name: "database".to_string(),
                dependencies: Vec::new(),
                priority: 0,
                start_delay_ms: 200,
                stop_delay_ms: 100,
                fail_start_attempts: 0,
                fail_stop: false,
                retry: None,
            },
            ComponentConfig {
                name: "api".to_string(),
                dependencies: vec!["database".to_string()],
                priority: 0,
                start_delay_ms: 100,
                stop_delay_ms: 50,
                fail_start_attempts: 1,
                fail_stop: false,
                retry: Some(RetrySettings {
                    max_attempts: 3,
                    initial_delay_ms: 100,
                    max_delay_ms: 5_000,
                    backoff_multiplier: 2.0,
                }),
            },
        ],
        ..LifelineConfig::default()
    };

    println!("# lifeline configuration file");
    println!("# Default supervisor settings with two sample components");
    println!();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
