//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use flow_conformance_harness::core::config::Config;
use flow_conformance_harness::engine::scripted::ScriptedEngine;
use flow_conformance_harness::harness::registry::builtin_table;
use flow_conformance_harness::harness::runner::{RunSummary, Runner};
use flow_conformance_harness::harness::testcase::{Platform, RunOptions, RunOutcome};
use flow_conformance_harness::logger::RunLogger;
use flow_conformance_harness::prelude::{EndpointId, EndpointMetadata, MemoryStore};

/// Flow Conformance Harness — verifies flow results land in the datastore.
#[derive(Debug, Parser)]
#[command(
    name = "fch",
    author,
    version,
    about = "Flow Conformance Harness - fleet result verification",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List the registered conformance tests.
    List(ListArgs),
    /// Run the built-in suite against a simulated fleet.
    Selfcheck(SelfcheckArgs),
    /// View and validate configuration state.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct ListArgs {
    /// Only show tests applicable to this platform.
    #[arg(long, value_name = "PLATFORM", value_parser = parse_platform)]
    platform: Option<Platform>,
}

#[derive(Debug, Clone, Args)]
struct SelfcheckArgs {
    /// Simulated endpoint platform.
    #[arg(long, default_value = "linux", value_name = "PLATFORM", value_parser = parse_platform)]
    platform: Platform,
    /// Number of simulated endpoints.
    #[arg(long, default_value_t = 2, value_name = "N")]
    endpoints: usize,
    /// Use the local-debug execution path (enables local-only flows).
    #[arg(long)]
    local: bool,
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse::<Platform>().map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Suite ran but some tests failed.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::List(args) => run_list(cli, args),
        Command::Selfcheck(args) => run_selfcheck(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn run_list(cli: &Cli, args: &ListArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let table = builtin_table(&config.harness);

    let tests: Vec<_> = table
        .iter()
        .filter(|t| match args.platform {
            Some(platform) => t.platforms.is_empty() || t.platforms.contains(&platform),
            None => true,
        })
        .collect();

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} registered tests:", tests.len());
            println!("  {:<28}  {:<20}  {:<22}  {}", "Name", "Task", "Platforms", "Check");
            println!("  {}", "-".repeat(84));
            for test in &tests {
                let platforms = if test.platforms.is_empty() {
                    "all".to_string()
                } else {
                    test.platforms
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(",")
                };
                println!(
                    "  {:<28}  {:<20}  {:<22}  {:?}{}",
                    test.name,
                    test.task.name,
                    platforms,
                    test.check,
                    if test.local_only { " (local only)" } else { "" },
                );
            }
        }
        OutputMode::Json => {
            let tests_json: Vec<Value> = tests
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "task": t.task.name,
                        "platforms": t.platforms,
                        "check": format!("{:?}", t.check),
                        "local_only": t.local_only,
                    })
                })
                .collect();
            write_json_line(&json!({"command": "list", "tests": tests_json}))?;
        }
    }
    Ok(())
}

/// Build a simulated fleet where every built-in flow behaves correctly, then
/// run the full suite against it. Catches regressions in the harness itself.
fn run_selfcheck(cli: &Cli, args: &SelfcheckArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let store = Arc::new(MemoryStore::new());
    let engine = scripted_fleet(&store);

    let mut targets = Vec::new();
    for i in 1..=args.endpoints.max(1) {
        let endpoint = EndpointId::new(&format!("C.{i:04x}"));
        let metadata = EndpointMetadata {
            last_checkin: chrono::Utc::now(),
            agent_version: 3400,
            config: None,
        };
        let payload = metadata
            .to_json()
            .map_err(|e| CliError::Runtime(e.to_string()))?;
        store.put_file(&endpoint.root(), payload);
        targets.push(endpoint);
    }

    let table = builtin_table(&config.harness);
    let logger = match &config.log.jsonl_path {
        Some(path) => RunLogger::open(path),
        None => RunLogger::discard(),
    };
    let options = RunOptions {
        platform: Some(args.platform),
        use_local_execution: args.local,
        run_as_platform_user: false,
    };

    let mut runner = Runner::new(store.as_ref(), &engine, &table, logger);
    let summary = runner.run(&targets, &options);

    emit_summary(cli, &summary)?;
    if summary.all_passed() {
        Ok(())
    } else {
        Err(CliError::Partial(format!(
            "{} of {} runs failed",
            summary.failed(),
            summary.records.len()
        )))
    }
}

/// Scripted task effects mirroring what well-behaved flows write.
fn scripted_fleet(store: &Arc<MemoryStore>) -> ScriptedEngine {
    let engine = ScriptedEngine::new();

    let s = Arc::clone(store);
    engine.script("Netstat", move |endpoint, _task| {
        s.put_file(
            &endpoint.root().join("fs/os/proc/netstat"),
            b"tcp 0 0 127.0.0.1:22".to_vec(),
        );
        Ok(())
    });

    let s = Arc::clone(store);
    engine.script("ReadSysctl", move |endpoint, _task| {
        s.put_file(
            &endpoint.root().join("fs/os/proc/sys/kernel/hostname"),
            b"selfcheck-host".to_vec(),
        );
        Ok(())
    });

    let s = Arc::clone(store);
    engine.script("FetchAgentBinary", move |endpoint, _task| {
        let root = endpoint.root();
        s.put_file(
            &root.join("binaries/agentd"),
            b"\x7fELF\x02\x01\x01\x00".to_vec(),
        );
        s.put_file(&root.join("binaries/agent.exe"), b"MZ\x90\x00".to_vec());
        Ok(())
    });

    let s = Arc::clone(store);
    engine.script("ListProcesses", move |endpoint, _task| {
        s.put_collection(
            &endpoint.root().join("analysis/ListProcesses"),
            vec![json!({"pid": 1, "name": "init"})],
        );
        Ok(())
    });

    let s = Arc::clone(store);
    engine.script("RawDirectoryListing", move |endpoint, _task| {
        s.put_file(
            &endpoint.root().join("fs/raw/sda1/proc/cmdline"),
            b"BOOT_IMAGE=/vmlinuz".to_vec(),
        );
        Ok(())
    });

    let s = Arc::clone(store);
    engine.script("DebugEcho", move |endpoint, _task| {
        s.put_collection(
            &endpoint.root().join("analysis/DebugEcho"),
            vec![json!({"echo": "ok"})],
        );
        Ok(())
    });

    engine
}

fn emit_summary(cli: &Cli, summary: &RunSummary) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            for record in &summary.records {
                let label = match &record.outcome {
                    RunOutcome::Passed => "PASS".green().bold(),
                    RunOutcome::Failed { .. } => "FAIL".red().bold(),
                    RunOutcome::Skipped { .. } => "SKIP".yellow(),
                };
                print!(
                    "  {label}  {:<28}  {:<8}  {:>6}ms",
                    record.test, record.endpoint, record.duration_ms
                );
                match &record.outcome {
                    RunOutcome::Failed { reason } | RunOutcome::Skipped { reason } => {
                        println!("  {reason}");
                    }
                    RunOutcome::Passed => println!(),
                }
            }
            println!();
            println!(
                "  {} passed, {} failed, {} skipped",
                summary.passed(),
                summary.failed(),
                summary.skipped()
            );
        }
        OutputMode::Json => {
            let records: Vec<Value> = summary
                .records
                .iter()
                .map(|r| {
                    let (status, reason) = match &r.outcome {
                        RunOutcome::Passed => ("passed", None),
                        RunOutcome::Failed { reason } => ("failed", Some(reason.clone())),
                        RunOutcome::Skipped { reason } => ("skipped", Some(reason.clone())),
                    };
                    json!({
                        "test": r.test,
                        "endpoint": r.endpoint.as_str(),
                        "status": status,
                        "reason": reason,
                        "duration_ms": r.duration_ms,
                    })
                })
                .collect();
            let payload = json!({
                "command": "selfcheck",
                "records": records,
                "passed": summary.passed(),
                "failed": summary.failed(),
                "skipped": summary.skipped(),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match args.command.as_ref().unwrap_or(&ConfigCommand::Show) {
        ConfigCommand::Path => {
            let path = cli
                .config
                .as_ref()
                .map_or_else(|| "(defaults; no file)".to_string(), |p| p.display().to_string());
            match output_mode(cli) {
                OutputMode::Human => println!("{path}"),
                OutputMode::Json => {
                    write_json_line(&json!({"command": "config path", "path": path}))?;
                }
            }
            Ok(())
        }
        ConfigCommand::Show => {
            let config = load_config(cli)?;
            match output_mode(cli) {
                OutputMode::Human => {
                    let rendered = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(e.to_string()))?;
                    print!("{rendered}");
                }
                OutputMode::Json => {
                    let payload = serde_json::to_value(&config)?;
                    write_json_line(&json!({"command": "config show", "config": payload}))?;
                }
            }
            Ok(())
        }
        ConfigCommand::Validate => {
            let config = load_config(cli)?;
            config
                .validate()
                .map_err(|e| CliError::User(e.to_string()))?;
            match output_mode(cli) {
                OutputMode::Human => println!("configuration is valid"),
                OutputMode::Json => {
                    write_json_line(&json!({"command": "config validate", "valid": true}))?;
                }
            }
            Ok(())
        }
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("fch {version}");
            if args.verbose {
                println!("package: {package}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "fch",
                "version": version,
                "package": package,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("FCH_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        Some("auto") | None => fallback,
        Some(_) => fallback,
    }
}
