//! SIMPL+ Simulator CLI
//!
//! Command-line interface for running control programs against the
//! simulated hardware and for inspecting how the front end reads them.

mod console;
mod scenario;

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use console::ConsoleObserver;
use scenario::Scenario;
use splus_runtime::{Interpreter, InterpreterHandle, RunOutcome, RuntimeConfig};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "splus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SIMPL+ simulator - run and inspect control programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a program, run Main and service its timers
    Run {
        /// Input .usp source file
        input: PathBuf,

        /// Extra define name for #IF_DEFINED blocks (repeatable)
        #[arg(short = 'D', long = "define", value_name = "NAME")]
        defines: Vec<String>,

        /// TOML scenario with config overrides and timed stimulus
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Use the deterministic virtual clock
        #[arg(long)]
        virtual_clock: bool,

        /// Maximum statements and expressions per run
        #[arg(long)]
        step_limit: Option<u64>,

        /// Keep servicing timers this long after Main returns
        #[arg(long, value_name = "MS")]
        settle_ms: Option<u64>,

        /// Print every output-signal write
        #[arg(long)]
        show_outputs: bool,
    },

    /// Report parse errors without running anything
    Check {
        /// Input .usp files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Extra define name (repeatable)
        #[arg(short = 'D', long = "define", value_name = "NAME")]
        defines: Vec<String>,
    },

    /// Print the token stream of a file
    Tokens {
        input: PathBuf,

        /// Emit JSON instead of one token per line
        #[arg(long)]
        json: bool,
    },

    /// Print the parsed program as JSON
    Ast {
        input: PathBuf,

        #[arg(short = 'D', long = "define", value_name = "NAME")]
        defines: Vec<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

struct RunOptions {
    defines: Vec<String>,
    scenario: Option<PathBuf>,
    virtual_clock: bool,
    step_limit: Option<u64>,
    settle_ms: Option<u64>,
    show_outputs: bool,
}

fn main() {
    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("splus=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            defines,
            scenario,
            virtual_clock,
            step_limit,
            settle_ms,
            show_outputs,
        } => run_program(
            &input,
            RunOptions {
                defines,
                scenario,
                virtual_clock,
                step_limit,
                settle_ms,
                show_outputs,
            },
        ),
        Commands::Check { paths, defines } => run_check(&paths, &defines),
        Commands::Tokens { input, json } => run_tokens(&input, json),
        Commands::Ast { input, defines } => run_ast(&input, &defines),
        Commands::Completions { shell } => {
            run_completions(shell);
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "splus", &mut io::stdout());
}

fn read_source(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))
}

/// Runtime settings: environment, then scenario, then flags
fn build_config(options: &RunOptions, scenario: Option<&Scenario>) -> RuntimeConfig {
    let mut config = RuntimeConfig::from_env();
    if let Some(scenario) = scenario {
        config = scenario.configure(config);
    }
    if options.virtual_clock {
        config = config.with_virtual_clock();
    }
    if let Some(limit) = options.step_limit {
        config = config.with_step_limit(limit);
    }
    config.with_defines(options.defines.iter().cloned())
}

fn run_program(input: &Path, options: RunOptions) -> Result<bool, String> {
    let source = read_source(input)?;
    let scenario = options.scenario.as_deref().map(Scenario::load).transpose()?;
    let config = build_config(&options, scenario.as_ref());
    let virtual_clock = config.clock == splus_runtime::ClockMode::Virtual;

    let mut interp = Interpreter::with_observer(config, ConsoleObserver::new(options.show_outputs));
    let load = interp.load(&source);
    for decl in &load.io_declarations {
        debug!(io_type = ?decl.io_type, name = %decl.name, "signal");
    }

    let timeline = scenario.as_ref().map(Scenario::timeline).unwrap_or_default();
    let last_stimulus = timeline.last().map_or(Duration::ZERO, |(at, _)| *at);
    for (at, stimulus) in timeline {
        interp.schedule_stimulus(at, stimulus);
    }

    install_interrupt_handler(interp.handle());

    let outcome = interp.run_main();
    match &outcome {
        RunOutcome::NoMain => info!("no Main; servicing events only"),
        other => info!(outcome = %other, "Main returned"),
    }

    let settle_ms = options
        .settle_ms
        .or_else(|| scenario.as_ref().and_then(|s| s.settle_ms));
    match settle_ms {
        Some(ms) => interp.advance(Duration::from_millis(ms)),
        None if virtual_clock => interp.settle(),
        // Real clock: at least let scripted stimulus land
        None => {
            let remaining = last_stimulus.saturating_sub(interp.now());
            interp.advance(remaining);
        }
    }

    Ok(!matches!(
        outcome,
        RunOutcome::Failed(_) | RunOutcome::StepLimitExceeded
    ) && load.is_ok())
}

/// First Ctrl-C stops Main at its next step, a second one exits
fn install_interrupt_handler(handle: InterpreterHandle) {
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGINT;
        use signal_hook::iterator::Signals;

        let mut signals = match Signals::new([SIGINT]) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "could not install SIGINT handler");
                return;
            }
        };
        std::thread::Builder::new()
            .name("splus-interrupt".to_string())
            .spawn(move || {
                let mut interrupts = 0;
                for _ in signals.forever() {
                    interrupts += 1;
                    if interrupts > 1 {
                        process::exit(130);
                    }
                    info!("interrupt: stopping Main (again to quit)");
                    handle.stop();
                }
            })
            .ok();
    }

    #[cfg(not(unix))]
    {
        let _ = handle;
    }
}

fn run_check(paths: &[PathBuf], defines: &[String]) -> Result<bool, String> {
    let mut clean = true;
    for path in paths {
        let source = read_source(path)?;
        let parsed = splusc::parse_program(&source, defines);
        for notice in &parsed.notices {
            println!("{}:{}: note: {}", path.display(), notice.line, notice.message);
        }
        for err in &parsed.errors {
            println!("{}:{}:{}: error: {}", path.display(), err.line, err.col, err.message);
        }
        if parsed.is_clean() {
            println!("{}: ok", path.display());
        } else {
            clean = false;
        }
    }
    Ok(clean)
}

fn run_tokens(input: &Path, json: bool) -> Result<bool, String> {
    let source = read_source(input)?;
    let tokens = splusc::tokenize(&source);
    if json {
        let out = serde_json::to_string_pretty(&tokens)
            .map_err(|e| format!("Failed to serialize tokens: {}", e))?;
        println!("{}", out);
        return Ok(true);
    }
    for token in tokens.iter().filter(|t| t.kind != splusc::TokenKind::Newline) {
        println!(
            "{:>4}:{:<3} {:<10} {}",
            token.line,
            token.col,
            format!("{:?}", token.kind),
            token.text
        );
    }
    Ok(true)
}

fn run_ast(input: &Path, defines: &[String]) -> Result<bool, String> {
    let source = read_source(input)?;
    let parsed = splusc::parse_program(&source, defines);
    for err in &parsed.errors {
        eprintln!("{}: {}", input.display(), err);
    }
    let out = serde_json::to_string_pretty(&parsed.program)
        .map_err(|e| format!("Failed to serialize program: {}", e))?;
    println!("{}", out);
    Ok(parsed.is_clean())
}
