//! ArgMatches → CliAction conversion.
//!
//! Translates clap's parsed arguments into:
//! - `LoadSettings`: how to load the trace (shared by every command)
//! - `CliAction`: what to do with it

use clap::ArgMatches;
use std::path::PathBuf;
use tracelens_engine::{ExportOptions, LoaderOptions};

/// How the trace is loaded.
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub path: PathBuf,
    pub options: LoaderOptions,
    pub show_progress: bool,
}

/// The command to run once the trace is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Info { total_instructions: u64 },
    Dump { output: PathBuf, options: ExportOptions },
    Heatmap { limit: Option<usize> },
    Events,
    Show { seq_id: u64 },
}

/// Convert clap ArgMatches into load settings and an action.
pub fn matches_to_action(matches: &ArgMatches) -> Result<(LoadSettings, CliAction), String> {
    let (sub_name, m) = matches
        .subcommand()
        .ok_or_else(|| "No command provided".to_string())?;

    let settings = load_settings(m)?;
    let action = match sub_name {
        "info" => CliAction::Info {
            total_instructions: parse_number(m, "total-instructions")?.unwrap_or(0),
        },
        "dump" => {
            let options = if m.get_flag("compact") {
                ExportOptions::compact()
            } else {
                ExportOptions::full()
            };
            CliAction::Dump {
                output: PathBuf::from(required(m, "output")?),
                options,
            }
        }
        "heatmap" => CliAction::Heatmap {
            limit: parse_number(m, "limit")?,
        },
        "events" => CliAction::Events,
        "show" => CliAction::Show {
            seq_id: required(m, "seq")?
                .parse()
                .map_err(|e| format!("Invalid sequence id: {}", e))?,
        },
        other => return Err(format!("Unknown command: {}", other)),
    };
    Ok((settings, action))
}

// global flags are read from the subcommand, where clap propagates them
fn load_settings(m: &ArgMatches) -> Result<LoadSettings, String> {
    let mut options = if m.get_count("verbose") >= 2 {
        LoaderOptions::strict()
    } else {
        LoaderOptions::default()
    };
    if m.get_flag("no-verify") {
        options.verify_checksums = false;
    }
    if let Some(max) = parse_number::<u32>(m, "max-chunk-size")? {
        options.max_chunk_size = max;
    }

    Ok(LoadSettings {
        path: PathBuf::from(required(m, "trace")?),
        options,
        show_progress: m.get_flag("progress"),
    })
}

fn required<'a>(m: &'a ArgMatches, name: &str) -> Result<&'a str, String> {
    m.get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| format!("Missing argument: {}", name))
}

fn parse_number<T>(m: &ArgMatches, name: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    m.get_one::<String>(name)
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(|e| format!("Invalid {}: {}", name, e))
}
