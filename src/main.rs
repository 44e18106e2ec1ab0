use anyhow::Result;
use clap::Parser;
use meapis::{MeapisConfig, ProjectRunner};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "meapis")]
#[command(about = "Unattended time-lapse capture station")]
#[command(version)]
#[command(long_about = "Runs one capture project at a time: calibrates focus and exposure \
once per project, then takes a picture every interval with the light switched on around \
each capture. Supports a simulated environment and Raspberry Pi camera hardware.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "meapis.toml", help = "Path to TOML configuration file")]
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

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// List configured projects and exit
    #[arg(long)]
    list_projects: bool,

    /// Start this project instead of the last active one
    #[arg(long, value_name = "NAME")]
    project: Option<String>,

    /// Discard saved calibration of the project about to start
    #[arg(long)]
    recalibrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    let guard = init_logging(&args)?;

    info!("Starting Meapis v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match MeapisConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let runner = ProjectRunner::from_config(&config).map_err(|e| {
        error!("Failed to create project runner: {}", e);
        e
    })?;

    if args.list_projects {
        for name in runner.list_projects().await? {
            println!("{}", name);
        }
        return Ok(());
    }

    if args.recalibrate {
        recalibrate(&runner, args.project.as_deref()).await?;
    }

    runner.start_initial(args.project.as_deref()).await.map_err(|e| {
        error!("Failed to start project: {}", e);
        e
    })?;

    let exit_code = runner.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Meapis exited with code: {}", exit_code);

    // Flush the log file before exiting
    drop(guard);
    std::process::exit(exit_code);
}

/// Drop the saved calibration of the requested project, or of the one
/// named by the active-project marker
async fn recalibrate(runner: &ProjectRunner, requested: Option<&str>) -> Result<()> {
    let name = match requested {
        Some(name) => Some(meapis::project::validate_project_name(name)?),
        None => runner.store().read_active_marker().await?,
    };

    match name {
        Some(name) => {
            if runner.store().clear_calibration(&name).await? {
                info!("Cleared calibration of project '{}'", name);
            } else {
                info!("Project '{}' has no saved calibration", name);
            }
        }
        None => warn!("--recalibrate given but no project is about to start"),
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

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
        .unwrap_or_else(|_| EnvFilter::new(format!("meapis={}", log_level)));

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

    let mut layers = vec![fmt_layer];
    let mut guard = None;

    if let Some(dir) = &args.log_dir {
        std::fs::create_dir_all(dir)?;
        let appender = tracing_appender::rolling::daily(dir, "meapis.log");
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed(),
        );
        guard = Some(worker);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Meapis Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Any value can be overridden with MEAPIS_<SECTION>__<KEY>, e.g. MEAPIS_SYSTEM__ENVIRONMENT=raspi");
    println!();

    let default_config = r#"[system]
# Hardware to drive: "sim" or "raspi"
environment = "sim"
# Directory holding projects/ and the active project marker
data_dir = "data"

[light]
# GPIO line switching the capture light, as an offset on its controller
gpio_line = 17
# Root of the sysfs GPIO interface
sysfs_root = "/sys/class/gpio"
# Controller label; defaults to the header pin controller (pinctrl-bcm2711, pinctrl-rp1)
# chip_label = "pinctrl-rp1"

[camera]
# Still capture command
still_command = "rpicam-still"
# Command used to list cameras and sensor modes
list_command = "rpicam-hello"
# Directory of the stock sensor tuning files; detected from the board when unset
# (rpi/pisp on a Pi 5, rpi/vc4 otherwise)
# tuning_dir = "/usr/share/libcamera/ipa/rpi/vc4"
# Scratch directory for patched tuning files and in-flight captures
staging_dir = "/tmp/meapis"
# Capture timeout handed to the still command, in milliseconds
capture_timeout_ms = 1000

[calibration]
# Autofocus cycles tried per focus pass before giving up
max_autofocus_attempts = 10
# Wait after applying the lens position before metering, in milliseconds
settle_delay_ms = 1000
"#;

    println!("{}", default_config);
}
