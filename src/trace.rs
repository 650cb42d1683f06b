//! # Trace reader
//!
//! The disassembly step emits one record per line in the form
//! `<kind>:<address>:<code>` with both numbers in hexadecimal. The kind
//! selects the 16-bit encoding (`t`), the 32-bit encoding (`a`) or an inline
//! data word of a literal pool (`w`).

use crate::isa::InstructionSet;
use log::{trace, warn};
use regex::Regex;
use std::io::{self, BufRead};
use thiserror::Error;

//
// Public Interface
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Instruction(InstructionSet),
    Word,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    pub kind: RecordKind,
    pub address: u32,
    pub code: u32,
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("malformed trace line {line}: {content:?}")]
    Malformed { line: usize, content: String },

    #[error("invalid {field} {value:?} on trace line {line}")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("16-bit record on trace line {line} carries {code:#x}")]
    CodeTooWide { line: usize, code: u32 },

    #[error("failed to read trace")]
    Io(#[from] io::Error),
}

/// Read all records of a trace, skipping blank lines and unknown kinds.
pub fn parse_trace<R: BufRead>(reader: R) -> Result<Vec<TraceRecord>, TraceError> {
    let parser = TraceParser::new();
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if let Some(record) = parser.parse_line(index + 1, &line)? {
            records.push(record);
        }
    }

    trace!("read {} trace records", records.len());

    Ok(records)
}

//
// Private Implementation
//

struct TraceParser {
    record: Regex,
}

impl TraceParser {
    fn new() -> Self {
        Self {
            record: Regex::new(r"^([a-z]):(?:0[xX])?([0-9A-Fa-f]+):(?:0[xX])?([0-9A-Fa-f]+)$")
                .unwrap(),
        }
    }

    fn parse_line(&self, line: usize, content: &str) -> Result<Option<TraceRecord>, TraceError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let captures = self
            .record
            .captures(content)
            .ok_or_else(|| TraceError::Malformed {
                line,
                content: content.to_string(),
            })?;

        let kind = match &captures[1] {
            "t" => RecordKind::Instruction(InstructionSet::Thumb),
            "a" => RecordKind::Instruction(InstructionSet::Arm32),
            "w" => RecordKind::Word,
            other => {
                warn!("skipping trace line {} with unknown kind {:?}", line, other);
                return Ok(None);
            }
        };

        let address = parse_hex(line, "address", &captures[2])?;
        let code = parse_hex(line, "code", &captures[3])?;

        if kind == RecordKind::Instruction(InstructionSet::Thumb) && code > 0xffff {
            return Err(TraceError::CodeTooWide { line, code });
        }

        Ok(Some(TraceRecord {
            kind,
            address,
            code,
        }))
    }
}

fn parse_hex(line: usize, field: &'static str, value: &str) -> Result<u32, TraceError> {
    u32::from_str_radix(value, 16).map_err(|_| TraceError::InvalidNumber {
        line,
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Vec<TraceRecord>, TraceError> {
        parse_trace(input.as_bytes())
    }

    #[test]
    fn reads_all_record_kinds() {
        let records = parse("t:8000:2005\na:8002:f000f804\nw:8008:deadbeef\n").unwrap();

        assert_eq!(
            records,
            vec![
                TraceRecord {
                    kind: RecordKind::Instruction(InstructionSet::Thumb),
                    address: 0x8000,
                    code: 0x2005
                },
                TraceRecord {
                    kind: RecordKind::Instruction(InstructionSet::Arm32),
                    address: 0x8002,
                    code: 0xf000_f804
                },
                TraceRecord {
                    kind: RecordKind::Word,
                    address: 0x8008,
                    code: 0xdead_beef
                },
            ]
        );
    }

    #[test]
    fn skips_blank_lines_and_unknown_kinds() {
        let records = parse("\n  \nx:8000:1\nt:0x8000:0x2005\r\n").unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].code, 0x2005);
    }

    #[test]
    fn malformed_lines_name_their_line_number() {
        let error = parse("t:8000:2005\nt:8002\n").unwrap_err();

        assert!(matches!(error, TraceError::Malformed { line: 2, .. }));
    }

    #[test]
    fn rejects_overflowing_numbers() {
        let error = parse("w:123456789:0\n").unwrap_err();

        assert!(matches!(
            error,
            TraceError::InvalidNumber {
                line: 1,
                field: "address",
                ..
            }
        ));
    }

    #[test]
    fn rejects_wide_code_in_compact_record() {
        let error = parse("t:8000:f000f804\n").unwrap_err();

        assert!(matches!(error, TraceError::CodeTooWide { line: 1, .. }));
    }
}
