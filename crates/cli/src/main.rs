//! tracelens CLI: load an execution trace and inspect it.
//!
//! `tracelens [flags] COMMAND TRACE [args]`
//!
//! Exit codes:
//! - 0: command ran on a fully loaded trace
//! - 1: error (bad path, bad arguments, unknown sequence id, dump target exists)
//! - 2: command ran, but the trace stopped loading at a corrupt chunk

mod commands;
mod format;
mod parse;

use std::io::Write;
use std::process;

use anyhow::{bail, Context};
use tracelens_engine::{
    dump_to_path, spawn_load, Heatmap, InstructionDetails, Trace, TraceLoader, TraceSummary,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use format::{
    format_details, format_dump, format_error, format_events, format_heatmap, format_status,
    format_summary, OutputMode,
};
use parse::{matches_to_action, CliAction, LoadSettings};

const LOG_ENV: &str = "TRACELENS_LOG";

fn main() {
    let matches = build_cli().get_matches();
    let sub = matches.subcommand().map(|(_, m)| m);

    let output_mode = if sub.map_or(false, |m| m.get_flag("json")) {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    init_logging(sub.map_or(0, |m| m.get_count("verbose")));

    let (settings, action) = match matches_to_action(&matches) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", format_error(&e, output_mode));
            process::exit(1);
        }
    };

    let trace = match load(&settings) {
        Ok(trace) => trace,
        Err(e) => {
            eprintln!("{}", format_error(&format!("{:#}", e), output_mode));
            process::exit(1);
        }
    };
    if trace.status().is_failed() {
        eprintln!(
            "(warning) {}: {}; showing the {} instructions loaded before it",
            settings.path.display(),
            format_status(trace.status()),
            trace.len()
        );
    }

    debug!("Running {:?} on {}", action, trace.name());
    match run(&trace, action, output_mode) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
            process::exit(if trace.status().is_failed() { 2 } else { 0 });
        }
        Err(e) => {
            eprintln!("{}", format_error(&format!("{:#}", e), output_mode));
            process::exit(1);
        }
    }
}

fn init_logging(verbosity: u8) {
    let filter = if verbosity > 0 {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(settings: &LoadSettings) -> anyhow::Result<Trace> {
    if !settings.show_progress {
        let loader = TraceLoader::open(&settings.path, settings.options.clone())?;
        return Ok(loader.finish());
    }

    let handle = spawn_load(&settings.path, settings.options.clone())?;
    let total = std::fs::metadata(&settings.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let mut consumed = 0u64;
    let mut stderr = std::io::stderr();
    for progress in handle.progress() {
        consumed += progress.bytes_consumed;
        let _ = write!(
            stderr,
            "\rchunk {:>6}  {:>12}/{} bytes",
            progress.chunk_index, consumed, total
        );
    }
    let _ = writeln!(stderr);
    Ok(handle.join()?)
}

fn run(trace: &Trace, action: CliAction, mode: OutputMode) -> anyhow::Result<String> {
    match action {
        CliAction::Info { total_instructions } => {
            let summary = TraceSummary::new(trace, &total_instructions);
            Ok(format_summary(&summary, trace.status(), mode))
        }
        CliAction::Dump { output, options } => {
            let lines = dump_to_path(trace, &output, options)
                .with_context(|| format!("dump of {} failed", trace.name()))?;
            Ok(format_dump(lines, &output, mode))
        }
        CliAction::Heatmap { limit } => {
            let heatmap = Heatmap::from_index(trace.index());
            let mut rows = heatmap.entries();
            if let Some(limit) = limit {
                rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
                rows.truncate(limit);
            }
            Ok(format_heatmap(&rows, mode))
        }
        CliAction::Events => {
            let events: Vec<_> = trace
                .index()
                .iter_with_events()
                .flat_map(|(record, events)| events.iter().map(move |e| (record.seq_id, e)))
                .collect();
            Ok(format_events(&events, mode))
        }
        CliAction::Show { seq_id } => {
            let record = match trace.get(seq_id) {
                Ok(record) => record,
                Err(e) if e.is_not_found() => bail!(
                    "no instruction at sequence id {} (trace has {})",
                    seq_id,
                    trace.len()
                ),
                Err(e) => return Err(e.into()),
            };
            let details = InstructionDetails::new(record);
            Ok(format_details(&details, trace.events_at(seq_id), mode))
        }
    }
}
