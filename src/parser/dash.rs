//! Dash-separated module+offset dump parser.
//!
//! Line schema: `MODULE+OFFSET - BYTES - MNEMONIC OPERANDS`. The module
//! name of the first parsed line is reported for the whole listing, and
//! module-relative memory references in the operand text are rewritten to
//! the `ds:[HEX]` form the analyzers understand.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classify::{assess_volatility, classify_mnemonic};
use crate::encoding::analyze_wildcard_positions;
use crate::types::{Instruction, ListingFormat};

use super::{parse_byte_column, ParsedListing};
use super::pipe::zero_pad_address;

/// Module+offset - bytes - mnemonic operands.
static LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^([\w.]+\+[0-9A-Fa-f]+)\s*-\s*   # module+offset
        ([0-9A-Fa-f\s]+?)\s*-\s*         # bytes
        ([a-zA-Z]+)\s*                   # mnemonic
        (.*)$                            # operands
        ",
    )
    .unwrap()
});

/// Parse a dash-format listing. Non-matching lines are skipped.
pub fn parse(input: &str) -> ParsedListing {
    let mut instructions = Vec::new();
    let mut module_name: Option<String> = None;
    let mut module_ref: Option<Regex> = None;

    for line in input.trim().lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
            continue;
        }

        let Some(caps) = LINE.captures(line) else {
            continue;
        };

        let raw_address = caps.get(1).map_or("", |m| m.as_str()).to_string();
        let (address, detected_module) = split_module_address(&raw_address);

        if let Some(module) = detected_module {
            if module_name.is_none() {
                // [MODULE+HEX] -> ds:[HEX]
                let pattern = format!(r"\[{}\+([0-9A-Fa-f]+)\]", regex::escape(&module));
                module_ref = Regex::new(&pattern).ok();
                module_name = Some(module);
            }
        }

        let bytes = parse_byte_column(caps.get(2).map_or("", |m| m.as_str()));
        let mnemonic = caps.get(3).map_or("", |m| m.as_str()).to_lowercase();
        let operands = caps.get(4).map_or("", |m| m.as_str()).trim().to_string();

        let operands_normalized = module_ref
            .as_ref()
            .map(|re| re.replace_all(&operands, "ds:[$1]").into_owned())
            .filter(|norm| *norm != operands);

        let analysis_text = operands_normalized.as_deref().unwrap_or(&operands);
        let kind = classify_mnemonic(&mnemonic);
        let volatility = assess_volatility(kind, analysis_text);
        let wildcard_positions = analyze_wildcard_positions(&bytes, analysis_text);

        let size = bytes.len();
        instructions.push(Instruction {
            address,
            raw_address: Some(raw_address),
            bytes,
            mnemonic,
            operands,
            operands_normalized,
            label: None,
            comment: None,
            kind,
            size,
            volatility,
            wildcard_positions,
        });
    }

    ParsedListing {
        instructions,
        labels: Vec::new(),
        format: ListingFormat::Dash,
        module: module_name,
    }
}

/// Split `Module.exe+4A12` into the padded offset and the module name.
fn split_module_address(raw: &str) -> (String, Option<String>) {
    match raw.split_once('+') {
        Some((module, offset)) => (zero_pad_address(offset), Some(module.to_string())),
        None => (raw.to_string(), None),
    }
}
