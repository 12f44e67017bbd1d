//! Output formatting for CLI results.
//!
//! Human mode prints the same text an info pane would show; JSON mode
//! prints one pretty-printed document per command.

use serde::Serialize;
use serde_json::json;
use tracelens_core::{SeqId, TraceEvent};
use tracelens_engine::{InstructionDetails, LoadStatus, TraceSummary};

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

pub fn format_status(status: &LoadStatus) -> String {
    match status {
        LoadStatus::Loading => "loading".to_string(),
        LoadStatus::Complete => "complete".to_string(),
        LoadStatus::Failed {
            chunk_index,
            offset,
            reason,
        } => format!(
            "failed at chunk {} (offset {}): {}",
            chunk_index, offset, reason
        ),
        LoadStatus::Interrupted {
            chunk_index,
            message,
        } => format!("interrupted at chunk {}: {}", chunk_index, message),
        LoadStatus::Abandoned { chunks_loaded } => {
            format!("abandoned after {} chunks", chunks_loaded)
        }
    }
}

pub fn format_summary(summary: &TraceSummary, status: &LoadStatus, mode: OutputMode) -> String {
    match mode {
        OutputMode::Human => format!("{}\nStatus:{}", summary, format_status(status)),
        OutputMode::Json => to_json(&json!({
            "summary": summary,
            "status": format_status(status),
        })),
    }
}

pub fn format_details(details: &InstructionDetails, events: &[TraceEvent], mode: OutputMode) -> String {
    match mode {
        OutputMode::Human => {
            let mut out = String::new();
            for event in events {
                out.push_str(&format!("[{}] {}\n", event.tag(), describe_event(event)));
            }
            out.push_str(details.to_string().trim_end());
            out
        }
        OutputMode::Json => to_json(&json!({
            "events": events,
            "instruction": details,
        })),
    }
}

pub fn format_events(events: &[(SeqId, &TraceEvent)], mode: OutputMode) -> String {
    match mode {
        OutputMode::Human => {
            if events.is_empty() {
                return "(no events)".to_string();
            }
            events
                .iter()
                .map(|(seq_id, event)| format!("{:>8}  {:<9} {}", seq_id, event.tag(), describe_event(event)))
                .collect::<Vec<_>>()
                .join("\n")
        }
        OutputMode::Json => to_json(
            &events
                .iter()
                .map(|(seq_id, event)| json!({ "seq_id": seq_id, "event": event }))
                .collect::<Vec<_>>(),
        ),
    }
}

pub fn format_heatmap(rows: &[(u64, u64, u32)], mode: OutputMode) -> String {
    match mode {
        OutputMode::Human => {
            if rows.is_empty() {
                return "(no instructions)".to_string();
            }
            rows.iter()
                .map(|(address, hits, color)| format!("{:#018x}  {:>8}  #{:06x}", address, hits, color))
                .collect::<Vec<_>>()
                .join("\n")
        }
        OutputMode::Json => to_json(
            &rows
                .iter()
                .map(|(address, hits, color)| {
                    json!({
                        "address": address,
                        "hits": hits,
                        "color": format!("#{:06x}", color),
                    })
                })
                .collect::<Vec<_>>(),
        ),
    }
}

pub fn format_dump(lines: u64, output: &std::path::Path, mode: OutputMode) -> String {
    match mode {
        OutputMode::Human => format!("Wrote {} lines to {}", lines, output.display()),
        OutputMode::Json => to_json(&json!({
            "lines": lines,
            "output": output.display().to_string(),
        })),
    }
}

pub fn format_error(message: &str, mode: OutputMode) -> String {
    match mode {
        OutputMode::Human => format!("(error) {}", message),
        OutputMode::Json => to_json(&json!({ "error": message })),
    }
}

fn describe_event(event: &TraceEvent) -> String {
    match event {
        TraceEvent::WaveStart { wave } => format!("wave {}", wave),
        TraceEvent::Exception { kind, handler } => {
            format!("type {} handler {:#x}", kind, handler)
        }
        TraceEvent::ModuleLoad { name } => name.clone(),
        TraceEvent::Unknown { kind } => format!("kind {}", kind),
    }
}
