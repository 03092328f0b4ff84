//! tamperscope CLI - runtime integrity checks for packaged applications.
//!
//! Runs the check sets against the current process, extracts provisioning
//! documents, and runs the continuous debugger monitor.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tamperscope_core::{
    current_target, extract_document, CheckVerdict, EngineConfig, Environment, HostEnvironment,
    TrustEngine, TrustReport,
};
use tokio::sync::oneshot;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const EXIT_SECURE: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_INSECURE: u8 = 2;

/// tamperscope - runtime integrity checks for packaged applications.
///
/// Reports whether the running environment looks trustworthy:
/// - Signing: binary signed, expected application and organization
/// - Host: no debugger, no jailbreak artifacts
/// - Runtime: no injected modules, hooked functions or tool classes
#[derive(Parser)]
#[command(name = "tamperscope")]
#[command(version = VERSION)]
#[command(about = "Runtime integrity checks for packaged applications")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// JSON config file (defaults to TAMPERSCOPE_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum CheckSet {
    Basic,
    Advanced,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a check set and report
    Check {
        /// Which checks to run
        #[arg(value_enum, default_value_t = CheckSet::All)]
        set: CheckSet,
    },

    /// Print the document embedded in a provisioning container
    Extract {
        /// Container file (e.g. embedded.mobileprovision)
        #[arg(long)]
        container: PathBuf,
    },

    /// Watch for a debugger until one attaches or the duration ends
    Monitor {
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Show build and platform information
    Info,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    secure: bool,
    failure_reasons: Vec<String>,
    verdicts: &'a [CheckVerdict],
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, tamperscope_core::ConfigError> {
    match path {
        Some(path) => EngineConfig::from_json_file(path),
        None => EngineConfig::from_env(),
    }
}

fn print_report(report: &TrustReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        let json = JsonReport {
            secure: report.is_secure(),
            failure_reasons: report.failure_reasons(),
            verdicts: &report.verdicts,
        };
        match serde_json::to_string_pretty(&json) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Failed to serialize report: {e}"),
        }
        return;
    }

    println!("\nINTEGRITY CHECKS");
    println!("================\n");
    for verdict in &report.verdicts {
        if verdict.passed {
            print!("  \x1b[32m[PASS]\x1b[0m {}", verdict.name);
            match &verdict.reason {
                Some(note) => println!(" ({note})"),
                None => println!(),
            }
        } else {
            println!(
                "  \x1b[31m[FAIL]\x1b[0m {}: {}",
                verdict.name,
                verdict.failure_reason().unwrap_or_default()
            );
        }
    }
    println!();
    println!("Summary:");
    if report.is_secure() {
        println!("  \x1b[32m[SECURE]\x1b[0m All {} checks passed", report.verdicts.len());
    } else {
        println!("  \x1b[31m[INSECURE]\x1b[0m {}", report.summary());
    }
}

fn run_check(config: EngineConfig, set: CheckSet, format: OutputFormat) -> u8 {
    let engine = TrustEngine::for_host(config);
    let report = match set {
        CheckSet::Basic => engine.run_basic_checks(),
        CheckSet::Advanced => engine.run_advanced_checks(),
        CheckSet::All => engine.run_all_checks(),
    };
    print_report(&report, format);
    if report.is_secure() {
        EXIT_SECURE
    } else {
        EXIT_INSECURE
    }
}

fn run_extract(container: &Path) -> u8 {
    let bytes = match std::fs::read(container) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("\x1b[31m[ERROR]\x1b[0m Cannot read {}: {e}", container.display());
            return EXIT_FAILURE;
        },
    };
    match extract_document(&bytes) {
        Ok(doc) => match serde_json::to_string_pretty(&doc.to_json()) {
            Ok(text) => {
                println!("{text}");
                EXIT_SECURE
            },
            Err(e) => {
                eprintln!("\x1b[31m[ERROR]\x1b[0m Failed to serialize document: {e}");
                EXIT_FAILURE
            },
        },
        Err(e) => {
            eprintln!("\x1b[31m[ERROR]\x1b[0m {e}");
            EXIT_FAILURE
        },
    }
}

async fn run_monitor(config: EngineConfig, duration: Option<u64>, format: OutputFormat) -> u8 {
    let engine = TrustEngine::for_host(config);
    let (tx, rx) = oneshot::channel();
    let handle = engine.start_continuous_monitor(move |verdict| {
        let _ = tx.send(verdict);
    });

    if format == OutputFormat::Text {
        match duration {
            Some(secs) => println!("Monitoring for a debugger for {secs}s..."),
            None => println!("Monitoring for a debugger..."),
        }
    }

    let detected = match duration {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), rx)
            .await
            .ok()
            .and_then(Result::ok),
        None => rx.await.ok(),
    };
    handle.cancel();
    let exit = handle.join().await;
    tracing::debug!(?exit, "Monitor stopped");

    match (detected, format) {
        (Some(verdict), OutputFormat::Json) => {
            println!(
                "{}",
                serde_json::json!({ "debugger_detected": true, "verdict": verdict })
            );
            EXIT_INSECURE
        },
        (Some(verdict), OutputFormat::Text) => {
            println!(
                "  \x1b[31m[ALERT]\x1b[0m {}",
                verdict.failure_reason().unwrap_or_default()
            );
            EXIT_INSECURE
        },
        (None, OutputFormat::Json) => {
            println!("{}", serde_json::json!({ "debugger_detected": false }));
            EXIT_SECURE
        },
        (None, OutputFormat::Text) => {
            println!("  \x1b[32m[PASS]\x1b[0m No debugger detected");
            EXIT_SECURE
        },
    }
}

fn show_info(config: Option<&EngineConfig>) {
    println!("\nSYSTEM INFORMATION");
    println!("==================\n");
    println!("  Version: {VERSION}");
    println!("  Target:  {}", current_target());
    println!();

    let host = config.map(|c| c.host.clone()).unwrap_or_default();
    let env = HostEnvironment::new(host);
    println!("Capabilities:");
    match env.query_debugger_attached() {
        Ok(_) => println!("  \x1b[32m[OK]\x1b[0m   debugger query"),
        Err(e) => println!("  \x1b[33m[N/A]\x1b[0m  {e}"),
    }
    match env.enumerate_loaded_modules() {
        Ok(modules) => println!("  \x1b[32m[OK]\x1b[0m   module list ({} loaded)", modules.len()),
        Err(e) => println!("  \x1b[33m[N/A]\x1b[0m  {e}"),
    }
    match env.enumerate_live_types() {
        Ok(types) if !types.is_empty() => {
            println!("  \x1b[32m[OK]\x1b[0m   type registry ({} classes)", types.len())
        },
        _ => println!("  \x1b[33m[N/A]\x1b[0m  type registry (no Objective-C runtime)"),
    }
    println!();

    match config {
        Some(config) => {
            println!("Policy:");
            println!("  App ID:       {}", config.policy.expected_app_id);
            println!("  Organization: {}", config.policy.expected_org_id);
            println!(
                "  Monitor:      {}-{} ms",
                config.monitor.min_interval_ms, config.monitor.max_interval_ms
            );
        },
        None => println!("Policy: not configured"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let json_output = cli.format == OutputFormat::Json;

    if json_output {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::ERROR)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_target(false)
            .init();
    }

    let code = match cli.command {
        Some(Commands::Check { set }) => match load_config(cli.config.as_deref()) {
            Ok(config) => run_check(config, set, cli.format),
            Err(e) => {
                eprintln!("\x1b[31m[ERROR]\x1b[0m {e}");
                EXIT_FAILURE
            },
        },
        Some(Commands::Extract { container }) => run_extract(&container),
        Some(Commands::Monitor { duration }) => match load_config(cli.config.as_deref()) {
            Ok(config) => run_monitor(config, duration, cli.format).await,
            Err(e) => {
                eprintln!("\x1b[31m[ERROR]\x1b[0m {e}");
                EXIT_FAILURE
            },
        },
        Some(Commands::Info) => {
            show_info(load_config(cli.config.as_deref()).ok().as_ref());
            EXIT_SECURE
        },
        None => {
            println!("tamperscope {VERSION}");
            println!();
            println!("  tamperscope check [basic|advanced|all]   Run integrity checks");
            println!("  tamperscope extract --container <path>  Print provisioning document");
            println!("  tamperscope monitor [--duration <secs>] Watch for a debugger");
            println!("  tamperscope info                        Show platform capabilities");
            EXIT_SECURE
        },
    };
    ExitCode::from(code)
}
