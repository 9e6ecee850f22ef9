//! Disassembly-listing parsers.
//!
//! Three input formats are supported, auto-detected from the first
//! non-blank, non-comment line:
//!
//! - **pipe**: `ADDRESS | BYTES | MNEMONIC OPERANDS | COMMENT` debugger
//!   dumps (x64dbg/OllyDbg style)
//! - **dash**: `MODULE+OFFSET - BYTES - MNEMONIC OPERANDS` dumps
//!   (Cheat Engine style)
//! - **hex**: raw whitespace-separated hex, disassembled as x86-32
//!
//! Lines that do not match the active format's schema are skipped
//! silently; an empty parse is a value here and becomes a caller-visible
//! error only in the operation envelopes.

pub mod dash;
pub mod hexstream;
pub mod pipe;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{Result, SigError};
use crate::types::{FormatHint, Instruction, ListingFormat, ParseStats};

/// Probe for the dash schema: `MODULE+OFFSET - ...`.
static DASH_PROBE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.]+\+[0-9A-Fa-f]+\s+-\s+").unwrap());

/// Result of parsing one listing, before statistics are attached.
#[derive(Debug, Clone)]
pub struct ParsedListing {
    /// Instructions in listing order.
    pub instructions: Vec<Instruction>,
    /// Labels in order of appearance.
    pub labels: Vec<String>,
    /// The format that was used.
    pub format: ListingFormat,
    /// Module name from dash listings.
    pub module: Option<String>,
}

/// Detect the listing format from the first meaningful line.
///
/// Blank lines and `//`/`#` comments are skipped. Only the first
/// remaining line is consulted; when it matches nothing, pipe is assumed
/// (its regex will then skip whatever does not fit).
pub fn detect_format(input: &str) -> ListingFormat {
    for line in input.trim().lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
            continue;
        }

        if line.contains(" | ") || line.contains("\t|\t") {
            return ListingFormat::Pipe;
        }

        if DASH_PROBE.is_match(line) {
            return ListingFormat::Dash;
        }

        let stripped: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_hexdigit()) {
            return ListingFormat::Hex;
        }

        break;
    }

    ListingFormat::Pipe
}

/// Parse a listing using the given hint (`Auto` detects).
pub fn parse_listing(input: &str, hint: FormatHint) -> Result<ParsedListing> {
    let format = match hint {
        FormatHint::Auto => detect_format(input),
        FormatHint::Pipe => ListingFormat::Pipe,
        FormatHint::Dash => ListingFormat::Dash,
        FormatHint::Hex => ListingFormat::Hex,
    };

    let parsed = match format {
        ListingFormat::Pipe => pipe::parse(input),
        ListingFormat::Dash => dash::parse(input),
        ListingFormat::Hex => hexstream::parse(input),
    };

    debug!(
        format = %format,
        instructions = parsed.instructions.len(),
        labels = parsed.labels.len(),
        "parsed listing"
    );

    Ok(parsed)
}

/// Resolve a textual format hint, as accepted on the wire and the CLI.
pub fn parse_format_hint(hint: &str) -> Result<FormatHint> {
    match hint {
        "auto" => Ok(FormatHint::Auto),
        "pipe" => Ok(FormatHint::Pipe),
        "dash" => Ok(FormatHint::Dash),
        "hex" => Ok(FormatHint::Hex),
        other => Err(SigError::UnknownFormat {
            hint: other.to_string(),
        }),
    }
}

/// Compute statistics over a parse result.
pub fn parse_stats(instructions: &[Instruction], labels: &[String]) -> ParseStats {
    let mut by_kind = std::collections::BTreeMap::new();
    let mut total_bytes = 0;

    for inst in instructions {
        *by_kind.entry(inst.kind.as_str().to_string()).or_insert(0) += 1;
        total_bytes += inst.size;
    }

    ParseStats {
        total: instructions.len(),
        by_kind,
        labeled: labels.len(),
        total_bytes,
    }
}

/// Decode a column of hex byte pairs.
///
/// Whitespace is stripped; an odd trailing nibble is discarded.
pub(crate) fn parse_byte_column(text: &str) -> Vec<u8> {
    let mut clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if clean.len() % 2 != 0 {
        clean.pop();
    }
    hex::decode(&clean).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detect_pipe() {
        let input = "00B27AB0 | 0F84 79050000 | je apr24.2020.B2802F | Lawnmower_A";
        assert_eq!(detect_format(input), ListingFormat::Pipe);
    }

    #[test]
    fn test_detect_dash() {
        let input = "Apr24.2020.exe+46751D - 0F84 6D010000 - je Apr24.2020.exe+467690";
        assert_eq!(detect_format(input), ListingFormat::Dash);
    }

    #[test]
    fn test_detect_hex() {
        assert_eq!(detect_format("0F 84 79 05 00 00"), ListingFormat::Hex);
        assert_eq!(detect_format("E812345678"), ListingFormat::Hex);
    }

    #[test]
    fn test_detect_skips_comments() {
        let input = "// function prologue\n# more notes\n\n00401000 | 55 | push ebp |";
        assert_eq!(detect_format(input), ListingFormat::Pipe);
    }

    #[test]
    fn test_detect_fallback() {
        assert_eq!(detect_format("not a listing at all"), ListingFormat::Pipe);
        assert_eq!(detect_format(""), ListingFormat::Pipe);
    }

    #[test]
    fn test_format_hint_parsing() {
        assert_eq!(parse_format_hint("auto").unwrap(), FormatHint::Auto);
        assert_eq!(parse_format_hint("hex").unwrap(), FormatHint::Hex);
        assert!(matches!(
            parse_format_hint("elf"),
            Err(SigError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn test_parsed_instruction_invariants() {
        let inputs = [
            ("00B27AB0 | 0F84 79050000 | je apr24.2020.B2802F | Lawnmower_A", FormatHint::Auto),
            ("Apr24.2020.exe+46751D - 0F84 6D010000 - je Apr24.2020.exe+467690", FormatHint::Auto),
            ("0F 84 79 05 00 00 8B 8D 2C FE FF FF", FormatHint::Auto),
        ];

        for (input, hint) in inputs {
            let parsed = parse_listing(input, hint).unwrap();
            assert!(!parsed.instructions.is_empty());
            for inst in &parsed.instructions {
                assert_eq!(inst.size, inst.bytes.len());
                assert_eq!(inst.address.len(), 8);
                assert!(inst
                    .address
                    .chars()
                    .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
                assert_eq!(inst.kind, crate::classify::classify_mnemonic(&inst.mnemonic));
                for &p in &inst.wildcard_positions {
                    assert!(p < inst.size);
                }
            }
        }
    }

    #[test]
    fn test_byte_column() {
        assert_eq!(parse_byte_column("0F84 79050000"), vec![0x0F, 0x84, 0x79, 0x05, 0x00, 0x00]);
        assert_eq!(parse_byte_column("8b 0d"), vec![0x8B, 0x0D]);
        // Odd trailing nibble is dropped.
        assert_eq!(parse_byte_column("0F8"), vec![0x0F]);
        assert_eq!(parse_byte_column(""), Vec::<u8>::new());
    }
}
