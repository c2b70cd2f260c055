//! `ethos-cli` – Ethos Command Line Interface
//!
//! A thin driver around `ethos-runtime`:
//!
//! - `ethos demo [STEPS]` runs a pipeline built from `~/.ethos/config.toml`
//!   against a deterministic synthetic feed and heuristic heads, printing one
//!   line per decision.
//! - `ethos audit` lists the transparency entries stored in the configured
//!   SQLite archive.
//! - `ethos schema` prints the JSON schema of an audit entry or a decision
//!   record.
//! - `ethos config` prints the effective configuration (`--init` writes the
//!   defaults to disk).

mod config;
mod demo;

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use ethos_memory::DecisionArchive;
use ethos_runtime::{Decision, DecisionPipeline};
use ethos_types::{DecisionRecord, TransparencyEntry};
use schemars::schema_for;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ethos", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline on a synthetic feed.
    Demo {
        /// Number of decisions (defaults to `demo_steps` from the config).
        steps: Option<u64>,
    },
    /// List archived transparency entries.
    Audit {
        /// Only show the newest N entries.
        #[arg(short, long)]
        limit: Option<usize>,
        /// Only show denied decisions.
        #[arg(long)]
        denied: bool,
    },
    /// Print a JSON schema.
    Schema {
        #[arg(value_enum, default_value_t = SchemaKind::Entry)]
        kind: SchemaKind,
    },
    /// Print the effective configuration.
    Config {
        /// Write the default configuration if none exists yet.
        #[arg(long)]
        init: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SchemaKind {
    Entry,
    Record,
}

fn main() {
    let cli = Cli::parse();
    let _guard = ethos_runtime::init_tracing("ethos-cli");

    if let Err(e) = run(cli.command) {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Demo { steps } => run_demo(steps),
        Command::Audit { limit, denied } => run_audit(limit, denied),
        Command::Schema { kind } => print_schema(kind),
        Command::Config { init } => show_config(init),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn run_demo(steps: Option<u64>) -> Result<(), String> {
    print_banner();
    let cfg = config::load_effective()?;
    let steps = steps.unwrap_or(cfg.demo_steps);
    let layout = cfg.pipeline.layout;

    let bank = demo::heuristic_bank(&layout).map_err(|e| e.to_string())?;
    let mut pipeline =
        DecisionPipeline::new(&cfg.pipeline, Arc::new(bank)).map_err(|e| e.to_string())?;
    let feed = demo::SyntheticFeed::new(layout);

    if let Some(path) = &cfg.pipeline.archive_path {
        println!("  Archiving decisions to {}", path.bold());
    }
    println!();

    let mut denied = 0u64;
    for step in 1..=steps {
        let frame = feed.frame(step);
        let decision = pipeline
            .decide_and_record(&frame.as_input())
            .map_err(|e| e.to_string())?;
        if !decision.allowed() {
            denied += 1;
        }
        println!("{}", decision_line(&decision));
    }

    println!();
    println!(
        "  {} decisions, {} denied, intrinsic state {:.3}",
        steps.to_string().bold(),
        denied.to_string().red(),
        pipeline.intrinsic_state()
    );
    info!(steps, denied, intrinsic_state = pipeline.intrinsic_state(), "demo finished");
    Ok(())
}

fn run_audit(limit: Option<usize>, denied_only: bool) -> Result<(), String> {
    let cfg = config::load_effective()?;
    let path = cfg.pipeline.archive_path.ok_or_else(|| {
        "no archive configured; set pipeline.archive_path or ETHOS_ARCHIVE_PATH".to_string()
    })?;
    let archive = DecisionArchive::open(&path).map_err(|e| e.to_string())?;

    let entries: Vec<TransparencyEntry> = archive
        .entries()
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|e| !denied_only || !e.allowed)
        .collect();
    let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));

    for entry in &entries[skip..] {
        let line = entry.to_string();
        if entry.allowed {
            println!("{}", line);
        } else {
            println!("{}", line.red());
        }
    }
    println!(
        "\n  {} archived, {} denied ({})",
        archive.entries().map_err(|e| e.to_string())?.len(),
        archive.denied_count().map_err(|e| e.to_string())?,
        path.dimmed()
    );
    Ok(())
}

fn print_schema(kind: SchemaKind) -> Result<(), String> {
    let schema = match kind {
        SchemaKind::Entry => schema_for!(TransparencyEntry),
        SchemaKind::Record => schema_for!(DecisionRecord),
    };
    let json = serde_json::to_string_pretty(&schema).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn show_config(init: bool) -> Result<(), String> {
    let path = config::config_path();
    if init {
        if config::load()?.is_some() {
            println!("  Config already exists at {}", path.display().to_string().bold());
        } else {
            config::save(&config::Config::default())?;
            println!("  {} {}", "Wrote".green(), path.display().to_string().bold());
        }
    }
    let cfg = config::load_effective()?;
    cfg.pipeline.validate().map_err(|e| e.to_string())?;
    println!("# {}", path.display().to_string().dimmed());
    print!("{}", config::to_toml(&cfg)?);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn decision_line(decision: &Decision) -> String {
    let verdict = if decision.allowed() {
        "ALLOWED".green().bold()
    } else {
        "DENIED ".red().bold()
    };
    let reason = if decision.gate.denied_by.is_empty() {
        String::new()
    } else {
        let names: Vec<&str> = decision.gate.denied_by.iter().map(|h| h.name()).collect();
        format!(" by {}", names.join(", ")).yellow().to_string()
    };
    format!(
        "  #{:<4} {}  coherence {:>6.3}  intrinsic {:>7.3}{}",
        decision.seq, verdict, decision.coherence, decision.intrinsic_state, reason
    )
}

fn print_banner() {
    println!();
    println!("{}", r#"   ______  __    "#.bold().cyan());
    println!("{}", r#"  / __/ /_/ /  ___  ___"#.bold().cyan());
    println!("{}", r#" / _// __/ _ \/ _ \(_-<"#.bold().cyan());
    println!("{}", r#"/___/\__/_//_/\___/___/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Ethos".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Safety-gated decision pipeline");
    println!();
}
