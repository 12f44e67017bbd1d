//! clap command tree for the `tracelens` binary.

use clap::{Arg, ArgAction, Command};

/// Build the top-level command.
pub fn build_cli() -> Command {
    Command::new("tracelens")
        .about("Inspect execution traces: load, summarise, dump, and heatmap")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print results as JSON"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Log loader activity to stderr (-vv for every chunk)"),
        )
        .arg(
            Arg::new("no-verify")
                .long("no-verify")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Skip chunk checksum verification"),
        )
        .arg(
            Arg::new("max-chunk-size")
                .long("max-chunk-size")
                .global(true)
                .value_name("BYTES")
                .help("Reject chunks larger than this"),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Show load progress on stderr"),
        )
        .subcommand(
            Command::new("info")
                .about("Summarise a trace: length, unique instructions, coverage")
                .arg(trace_arg())
                .arg(
                    Arg::new("total-instructions")
                        .long("total-instructions")
                        .short('n')
                        .value_name("COUNT")
                        .help("Instruction count of the traced binary (for coverage)"),
                ),
        )
        .subcommand(
            Command::new("dump")
                .about("Write the trace as text lines to a new file")
                .arg(trace_arg())
                .arg(
                    Arg::new("output")
                        .required(true)
                        .value_name("OUTPUT")
                        .help("Destination file (must not exist)"),
                )
                .arg(
                    Arg::new("compact")
                        .long("compact")
                        .action(ArgAction::SetTrue)
                        .help("Only sequence id, address, and opcode per instruction"),
                ),
        )
        .subcommand(
            Command::new("heatmap")
                .about("Hit count and heatmap color per executed address")
                .arg(trace_arg())
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_name("N")
                        .help("Only the N most executed addresses"),
                ),
        )
        .subcommand(
            Command::new("events")
                .about("List events with the sequence id they precede")
                .arg(trace_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("Show one instruction in detail")
                .arg(trace_arg())
                .arg(
                    Arg::new("seq")
                        .required(true)
                        .value_name("SEQ_ID")
                        .help("Sequence id of the instruction"),
                ),
        )
}

fn trace_arg() -> Arg {
    Arg::new("trace")
        .required(true)
        .value_name("TRACE")
        .help("Path to the trace file")
}
