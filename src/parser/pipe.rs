//! Pipe-separated debugger dump parser.
//!
//! Line schema: `ADDRESS | BYTES | MNEMONIC OPERANDS | OPTIONAL_COMMENT`.
//! A trailing comment that is a bare identifier is promoted to a label.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classify::{assess_volatility, classify_mnemonic};
use crate::encoding::analyze_wildcard_positions;
use crate::types::{Instruction, ListingFormat};

use super::{parse_byte_column, ParsedListing};

/// Address | bytes | mnemonic operands | optional comment. The mnemonic
/// group admits digits (movzx, cvtsi2sd); operands run to the next pipe.
static LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^([0-9A-Fa-f]+)\s*\|\s*       # address
        ([0-9A-Fa-f\s]+?)\s*\|\s*     # bytes
        ([a-zA-Z0-9]+)\s*             # mnemonic
        ([^|]*?)\s*                   # operands
        (?:\|\s*(.*))?$               # optional comment
        ",
    )
    .unwrap()
});

/// Bare identifier: comment text promoted to a label.
static LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Parse a pipe-format listing. Non-matching lines are skipped.
pub fn parse(input: &str) -> ParsedListing {
    let mut instructions = Vec::new();
    let mut labels = Vec::new();

    for line in input.trim().lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
            continue;
        }

        let Some(caps) = LINE.captures(line) else {
            continue;
        };

        let address = zero_pad_address(caps.get(1).map_or("", |m| m.as_str()));
        let bytes = parse_byte_column(caps.get(2).map_or("", |m| m.as_str()));
        let mnemonic = caps.get(3).map_or("", |m| m.as_str()).to_lowercase();
        let operands = caps.get(4).map_or("", |m| m.as_str()).trim().to_string();
        let comment = caps
            .get(5)
            .map(|m| m.as_str().trim().to_string())
            .filter(|c| !c.is_empty());

        let label = comment
            .as_deref()
            .filter(|c| LABEL.is_match(c))
            .map(str::to_string);
        if let Some(ref l) = label {
            labels.push(l.clone());
        }

        let kind = classify_mnemonic(&mnemonic);
        let volatility = assess_volatility(kind, &operands);
        let wildcard_positions = analyze_wildcard_positions(&bytes, &operands);

        let size = bytes.len();
        instructions.push(Instruction {
            address,
            raw_address: None,
            bytes,
            mnemonic,
            operands,
            operands_normalized: None,
            label,
            comment,
            kind,
            size,
            volatility,
            wildcard_positions,
        });
    }

    ParsedListing {
        instructions,
        labels,
        format: ListingFormat::Pipe,
        module: None,
    }
}

/// Uppercase and zero-pad an address to 8 hex digits.
pub(crate) fn zero_pad_address(addr: &str) -> String {
    format!("{:0>8}", addr.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstructionKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_labeled_conditional_jump() {
        let listing = parse("00B27AB0 | 0F84 79050000 | je apr24.2020.B2802F | Lawnmower_A");
        assert_eq!(listing.instructions.len(), 1);
        assert_eq!(listing.labels, vec!["Lawnmower_A"]);

        let inst = &listing.instructions[0];
        assert_eq!(inst.address, "00B27AB0");
        assert_eq!(inst.bytes, vec![0x0F, 0x84, 0x79, 0x05, 0x00, 0x00]);
        assert_eq!(inst.mnemonic, "je");
        assert_eq!(inst.kind, InstructionKind::ConditionalJump);
        assert_eq!(inst.wildcard_positions, vec![2, 3, 4, 5]);
        assert_eq!(inst.label.as_deref(), Some("Lawnmower_A"));
        assert_eq!(inst.size, 6);
    }

    #[test]
    fn test_stack_frame_mov() {
        let listing = parse("00B27AB6 | 8B8D 2CFEFFFF | mov ecx,dword ptr ss:[ebp-1D4] |");
        let inst = &listing.instructions[0];
        assert_eq!(inst.kind, InstructionKind::Mov);
        // ModR/M 8D: mod=2, rm=5 => disp32 at offsets 2..=5.
        assert_eq!(inst.wildcard_positions, vec![2, 3, 4, 5]);
        assert!(inst.label.is_none());
    }

    #[test]
    fn test_short_address_padded() {
        let listing = parse("401000 | C3 | ret |");
        assert_eq!(listing.instructions[0].address, "00401000");
    }

    #[test]
    fn test_comment_that_is_not_a_label() {
        let listing = parse("00B27AB0 | 90 | nop | health check here");
        let inst = &listing.instructions[0];
        assert_eq!(inst.comment.as_deref(), Some("health check here"));
        assert!(inst.label.is_none());
        assert!(listing.labels.is_empty());
    }

    #[test]
    fn test_garbage_lines_skipped() {
        let listing = parse("garbage\n00401000 | 55 | push ebp |\nmore garbage");
        assert_eq!(listing.instructions.len(), 1);
        assert_eq!(listing.instructions[0].mnemonic, "push");
    }

    #[test]
    fn test_mnemonic_with_digits() {
        let listing = parse("00401000 | 0FB6 45 F8 | movzx eax,byte ptr ss:[ebp-8] |");
        assert_eq!(listing.instructions[0].mnemonic, "movzx");
        assert_eq!(listing.instructions[0].kind, InstructionKind::Mov);
    }
}
