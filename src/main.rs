use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use scanmark::registry::CodeId;
use scanmark::{HttpRegistry, Registry, ScanmarkConfig};

#[derive(Parser, Debug)]
#[command(name = "scanmark")]
#[command(about = "Camera scan check-in system backed by a code registry")]
#[command(version)]
#[command(long_about = "Issues identifiers as scannable codes, persists them in a registry, \
and reconciles live camera-detected codes against that registry, confirming each code at \
most once per scanning session.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "scanmark.toml", help = "Path to TOML configuration file")]
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

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the registry HTTP server
    Serve,
    /// List capture devices
    Devices,
    /// Run a scanning session against a capture device
    Scan {
        /// Capture device index (defaults to the configured device)
        #[arg(long)]
        device: Option<u32>,
    },
    /// Issue one or more codes
    Add {
        /// Code texts to issue
        #[arg(required = true)]
        texts: Vec<String>,
    },
    /// List all code records
    List,
    /// Confirm a code record by id
    Confirm {
        /// Record id
        id: String,
    },
    /// Delete an unconfirmed code record by id
    Remove {
        /// Record id
        id: String,
    },
    /// Bulk-import code texts from a file (one per line, first column)
    Import {
        /// Path to the code list file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    let config = match ScanmarkConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    config.validate()?;

    let Some(command) = args.command else {
        anyhow::bail!("no command given; run with --help for usage");
    };

    match command {
        Command::Serve => run_server(&config).await,
        Command::Devices => run_devices(&config).await,
        Command::Scan { device } => run_scan(&config, device).await,
        Command::Add { texts } => {
            let registry = HttpRegistry::new(&config.registry)?;
            let report = registry.add_batch(&texts).await;
            for record in &report.issued {
                println!("issued {} ({})", record.text, record.id);
            }
            for failure in &report.failures {
                println!("failed {}: {}", failure.text, failure.error);
            }
            if report.is_clean() {
                Ok(())
            } else {
                anyhow::bail!(
                    "{} of {} texts failed",
                    report.failures.len(),
                    report.issued.len() + report.failures.len()
                )
            }
        }
        Command::List => {
            let registry = HttpRegistry::new(&config.registry)?;
            let records = registry.list().await?;
            for (index, record) in records.iter().enumerate() {
                println!(
                    "{:>4}  {}  {}  {}",
                    index + 1,
                    record.id,
                    if record.confirmed { "confirmed" } else { "pending" },
                    record.text,
                );
            }
            println!("{} records", records.len());
            Ok(())
        }
        Command::Confirm { id } => {
            let registry = HttpRegistry::new(&config.registry)?;
            let record = registry.confirm(&CodeId::from(id)).await?;
            println!("confirmed {} ({})", record.text, record.id);
            Ok(())
        }
        Command::Remove { id } => {
            let registry = HttpRegistry::new(&config.registry)?;
            registry.remove(&CodeId::from(id.clone())).await?;
            println!("deleted {}", id);
            Ok(())
        }
        Command::Import { file } => {
            let registry = HttpRegistry::new(&config.registry)?;
            let report = scanmark::import_file(&file, &registry).await?;
            println!(
                "imported {} of {} texts",
                report.issued.len(),
                report.issued.len() + report.failures.len()
            );
            for failure in &report.failures {
                println!("  {}: {}", failure.text, failure.error);
            }
            Ok(())
        }
    }
}

#[cfg(feature = "server")]
async fn run_server(config: &ScanmarkConfig) -> Result<()> {
    use scanmark::registry::CodeStore;
    use scanmark::RegistryServer;

    let store = Arc::new(CodeStore::new());
    let server = RegistryServer::new(config.server.clone(), store);
    server.serve().await?;
    Ok(())
}

#[cfg(not(feature = "server"))]
async fn run_server(_config: &ScanmarkConfig) -> Result<()> {
    anyhow::bail!("this build does not include the registry server (enable the `server` feature)")
}

#[cfg(feature = "camera")]
async fn run_devices(config: &ScanmarkConfig) -> Result<()> {
    use scanmark::detect::{CameraSource, DetectionSource};

    let source = CameraSource::new(config.scanner.clone());
    let devices = source.enumerate_devices().await?;
    for device in devices {
        println!("{:>2}  {}  {}", device.index, device.path, device.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera"))]
async fn run_devices(_config: &ScanmarkConfig) -> Result<()> {
    anyhow::bail!("this build does not include camera capture (enable the `camera` feature)")
}

#[cfg(feature = "camera")]
async fn run_scan(config: &ScanmarkConfig, device_override: Option<u32>) -> Result<()> {
    use scanmark::detect::{CameraSource, DetectionSource};
    use scanmark::{EventBus, ReconciliationEngine, ScanSession};

    let source = CameraSource::new(config.scanner.clone());
    let registry: Arc<dyn Registry> = Arc::new(HttpRegistry::new(&config.registry)?);

    let mut session =
        ScanSession::bootstrap(registry.as_ref(), config.session.seed_confirmed).await?;

    let devices = source.enumerate_devices().await?;
    let wanted = device_override.unwrap_or(config.scanner.device_index);
    let device = devices
        .iter()
        .find(|descriptor| descriptor.index == wanted)
        .ok_or_else(|| anyhow::anyhow!("capture device {} not found", wanted))?;

    info!(device = %device.label, "starting scan session");
    let mut stream = source.start(device).await?;

    let events = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let mut receiver = events.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            println!("{}", event.description());
        }
    });

    // Ctrl+C stops the capture; in-flight confirms are allowed to finish.
    let cancel = stream.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, stopping scan session");
            cancel.cancel();
        }
    });

    let engine = ReconciliationEngine::new(
        registry,
        Arc::clone(&events),
        config.session.confirm_timeout(),
    );
    let summary = engine.run(&mut session, &mut stream).await;
    printer.abort();

    println!(
        "session summary: {} confirmed, {} duplicates, {} unknown, {} confirm failures, {} decode faults",
        summary.confirmed,
        summary.duplicates,
        summary.unknown,
        summary.confirm_failures,
        summary.decode_faults,
    );

    Ok(())
}

#[cfg(not(feature = "camera"))]
async fn run_scan(_config: &ScanmarkConfig, _device_override: Option<u32>) -> Result<()> {
    anyhow::bail!("this build does not include camera capture (enable the `camera` feature)")
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

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scanmark={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
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
    println!("# Scanmark Configuration File");
    println!("# Default values for all available options");
    println!();
    println!("{}", toml::to_string_pretty(&ScanmarkConfig::default())?);
    Ok(())
}
