//! Canonical text form of a trace
//!
//! One line per event and per instruction, tab separated. Events at a
//! sequence id come before the instruction line for that id:
//!
//! ```text
//! module	libc.so.6
//! 0	0x401000	push rbp
//! wave	1
//! 1	0x401001	mov rbp, rsp	R:rsp=0x7ff0	W:rbp=0x7ff0
//! ```
//!
//! Instruction lines always start with the decimal sequence id and the hex
//! address; [`parse_instruction_line`] reads those two back. Tabs, newlines
//! and backslashes inside free text are escaped so every record stays on
//! one line.

use crate::index::TraceIndex;
use crate::trace::Trace;
use std::fs::OpenOptions;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;
use std::time::Instant;
use tracelens_core::{Address, InstructionRecord, Result, SeqId, TraceError, TraceEvent};
use tracing::info;

/// Which optional fields go on instruction lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Register and memory reads/writes
    pub include_accesses: bool,
    /// Next address, wave, syscall, libcall, comment
    pub include_details: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            include_accesses: true,
            include_details: true,
        }
    }
}

impl ExportOptions {
    /// Sequence id, address, opcode only
    pub fn compact() -> Self {
        ExportOptions {
            include_accesses: false,
            include_details: false,
        }
    }

    /// Every field
    pub fn full() -> Self {
        Self::default()
    }
}

/// Renders a trace index as text lines
#[derive(Debug, Clone, Copy)]
pub struct TextExporter<'a> {
    index: &'a TraceIndex,
    options: ExportOptions,
}

impl<'a> TextExporter<'a> {
    /// Create an exporter over an index
    pub fn new(index: &'a TraceIndex, options: ExportOptions) -> Self {
        TextExporter { index, options }
    }

    /// Lines in sequence order, without trailing newlines
    ///
    /// Each call starts a new pass from the first instruction.
    pub fn lines(&self) -> impl Iterator<Item = String> + 'a {
        let TextExporter { index, options } = *self;
        index.iter_with_events().flat_map(move |(record, events)| {
            events
                .iter()
                .map(render_event)
                .chain(std::iter::once(render_instruction(record, options)))
        })
    }

    /// Write every line, newline terminated, returning the line count
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<u64> {
        let mut count = 0u64;
        for line in self.lines() {
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
            count += 1;
        }
        Ok(count)
    }
}

/// Render one event line
pub fn render_event(event: &TraceEvent) -> String {
    match event {
        TraceEvent::WaveStart { wave } => format!("wave\t{}", wave),
        TraceEvent::Exception { kind, handler } => format!("exception\t{}\t{:#x}", kind, handler),
        TraceEvent::ModuleLoad { name } => format!("module\t{}", escape(name)),
        TraceEvent::Unknown { kind } => format!("unknown\t{}", kind),
    }
}

/// Render one instruction line
pub fn render_instruction(record: &InstructionRecord, options: ExportOptions) -> String {
    let mut line = format!(
        "{}\t{:#x}\t{}",
        record.seq_id,
        record.address,
        escape(&record.opcode)
    );

    if options.include_accesses {
        for access in &record.registers {
            line.push_str(&format!(
                "\t{}:{}={:#x}",
                access.kind.tag(),
                escape(&access.name),
                access.value
            ));
        }
        for access in &record.memories {
            line.push_str(&format!(
                "\t{}:@[{:x}]={}",
                access.kind.tag(),
                access.address,
                access.hex_bytes()
            ));
        }
    }

    if options.include_details {
        if let Some(next) = record.next_address {
            line.push_str(&format!("\tnext={:#x}", next));
        }
        if let Some(wave) = record.wave {
            line.push_str(&format!("\twave={}", wave));
        }
        if let Some(syscall) = record.syscall {
            line.push_str(&format!("\tsyscall={}", syscall.id));
        }
        if let Some(libcall) = &record.libcall {
            line.push_str(&format!(
                "\tlibcall={}@{:#x}:{}",
                escape(&libcall.func_name),
                libcall.func_addr,
                if libcall.is_traced { "traced" } else { "untraced" }
            ));
        }
        if let Some(comment) = &record.comment {
            line.push_str(&format!("\tcomment={}", escape(comment)));
        }
    }

    line
}

fn escape(text: &str) -> std::borrow::Cow<'_, str> {
    if !text.contains(['\\', '\t', '\n', '\r']) {
        return std::borrow::Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    std::borrow::Cow::Owned(out)
}

/// Read `(seq_id, address)` back from an instruction line
///
/// Returns `None` for event lines and anything malformed.
pub fn parse_instruction_line(line: &str) -> Option<(SeqId, Address)> {
    let mut fields = line.split('\t');
    let seq_id = fields.next()?.parse().ok()?;
    let address = fields.next()?.strip_prefix("0x")?;
    let address = Address::from_str_radix(address, 16).ok()?;
    Some((seq_id, address))
}

/// Write a trace's text form to a new file
///
/// Fails with `DumpTargetExists` rather than overwrite anything. Returns the
/// number of lines written.
pub fn dump_to_path(trace: &Trace, path: impl AsRef<Path>, options: ExportOptions) -> Result<u64> {
    let path = path.as_ref();
    let started = Instant::now();
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => TraceError::DumpTargetExists(path.to_path_buf()),
            _ => TraceError::Io(e),
        })?;

    let mut out = BufWriter::new(file);
    let lines = TextExporter::new(trace.index(), options).write_to(&mut out)?;
    out.flush()?;

    info!(
        "Dumped {} to {}: {} lines in {:.2}ms",
        trace.name(),
        path.display(),
        lines,
        started.elapsed().as_micros() as f64 / 1000.0
    );
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracelens_core::{Libcall, MemoryAccess, RegisterAccess};

    fn sample_index() -> TraceIndex {
        let mut index = TraceIndex::new();
        index
            .append(
                vec![
                    InstructionRecord::new(0, 0x401000, "push rbp"),
                    InstructionRecord::new(1, 0x401001, "mov rbp, rsp")
                        .with_register(RegisterAccess::read("rsp", 0x7ff0))
                        .with_register(RegisterAccess::write("rbp", 0x7ff0)),
                    InstructionRecord::new(2, 0x401004, "call puts")
                        .with_memory(MemoryAccess::write(0x7fe8, vec![0x09, 0x10]))
                        .with_syscall(1)
                        .with_libcall(Libcall {
                            func_name: "puts".into(),
                            func_addr: 0x400500,
                            is_traced: false,
                        })
                        .with_comment("first\tcall"),
                ],
                vec![
                    (0, TraceEvent::ModuleLoad { name: "libc.so.6".into() }),
                    (1, TraceEvent::WaveStart { wave: 1 }),
                    (
                        1,
                        TraceEvent::Exception {
                            kind: 3,
                            handler: 0x7000,
                        },
                    ),
                    (2, TraceEvent::Unknown { kind: 9 }),
                ],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_events_precede_instruction() {
        let index = sample_index();
        let lines: Vec<String> = TextExporter::new(&index, ExportOptions::compact())
            .lines()
            .collect();
        assert_eq!(
            lines,
            vec![
                "module\tlibc.so.6",
                "0\t0x401000\tpush rbp",
                "wave\t1",
                "exception\t3\t0x7000",
                "1\t0x401001\tmov rbp, rsp",
                "unknown\t9",
                "2\t0x401004\tcall puts",
            ]
        );
    }

    #[test]
    fn test_full_fields() {
        let index = sample_index();
        let exporter = TextExporter::new(&index, ExportOptions::full());
        let lines: Vec<String> = exporter.lines().collect();

        assert_eq!(lines[4], "1\t0x401001\tmov rbp, rsp\tR:rsp=0x7ff0\tW:rbp=0x7ff0");
        assert_eq!(
            lines[6],
            "2\t0x401004\tcall puts\tW:@[7fe8]=0910\tsyscall=1\tlibcall=puts@0x400500:untraced\tcomment=first\\tcall"
        );
    }

    #[test]
    fn test_lines_restartable() {
        let index = sample_index();
        let exporter = TextExporter::new(&index, ExportOptions::default());
        let first: Vec<String> = exporter.lines().collect();
        let second: Vec<String> = exporter.lines().collect();
        assert_eq!(first, second);
        assert_eq!(exporter.lines().take(2).count(), 2);
    }

    #[test]
    fn test_parse_round_trip() {
        let index = sample_index();
        let parsed: Vec<_> = TextExporter::new(&index, ExportOptions::full())
            .lines()
            .filter_map(|line| parse_instruction_line(&line))
            .collect();
        let expected: Vec<_> = index
            .instructions()
            .iter()
            .map(|r| (r.seq_id, r.address))
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_rejects_event_lines() {
        assert_eq!(parse_instruction_line("wave\t1"), None);
        assert_eq!(parse_instruction_line("exception\t3\t0x7000"), None);
        assert_eq!(parse_instruction_line("12\tnothex"), None);
        assert_eq!(parse_instruction_line("12"), None);
        assert_eq!(parse_instruction_line("12\t0xff\tnop"), Some((12, 0xff)));
    }

    #[test]
    fn test_dump_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let trace = Trace::from_index("sample.trace", sample_index());
        let target = dir.path().join("dump.txt");

        let lines = dump_to_path(&trace, &target, ExportOptions::compact()).unwrap();
        assert_eq!(lines, 7);
        let text = std::fs::read_to_string(&target).unwrap();
        assert_eq!(text.lines().count(), 7);
        assert!(text.ends_with("2\t0x401004\tcall puts\n"));

        let err = dump_to_path(&trace, &target, ExportOptions::compact()).unwrap_err();
        assert!(matches!(err, TraceError::DumpTargetExists(_)));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), text);
    }
}
