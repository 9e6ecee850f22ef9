//! Raw hex parser.
//!
//! The whole blob is treated as x86-32 machine code starting at address
//! zero and run through the iced-x86 decoder; mnemonic and operand text
//! come from its Intel-syntax formatter. Decoding stops at the first
//! invalid instruction. Undecodable input yields an empty listing, which
//! the operation envelopes surface as the no-instructions error.

use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction as DecodedInstruction,
    IntelFormatter};

use crate::classify::{assess_volatility, classify_mnemonic};
use crate::encoding::analyze_wildcard_positions;
use crate::types::{Instruction, ListingFormat};

use super::ParsedListing;

/// Parse a raw hex blob. Invalid hex yields an empty listing.
pub fn parse(input: &str) -> ParsedListing {
    let clean: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    let code = match hex::decode(&clean) {
        Ok(code) => code,
        Err(_) => {
            return ParsedListing {
                instructions: Vec::new(),
                labels: Vec::new(),
                format: ListingFormat::Hex,
                module: None,
            }
        }
    };

    let instructions = disassemble(&code);

    ParsedListing {
        instructions,
        labels: Vec::new(),
        format: ListingFormat::Hex,
        module: None,
    }
}

/// Disassemble x86-32 code at nominal address 0.
fn disassemble(code: &[u8]) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut decoder = Decoder::with_ip(32, code, 0, DecoderOptions::NONE);
    let mut formatter = IntelFormatter::new();
    let mut decoded = DecodedInstruction::default();

    while decoder.can_decode() {
        decoder.decode_out(&mut decoded);
        if decoded.is_invalid() {
            break;
        }

        let start = decoded.ip() as usize;
        let bytes = code[start..start + decoded.len()].to_vec();

        let mut mnemonic = String::new();
        formatter.format_mnemonic(&decoded, &mut mnemonic);
        let mnemonic = mnemonic.to_lowercase();

        let mut operands = String::new();
        formatter.format_all_operands(&decoded, &mut operands);

        let kind = classify_mnemonic(&mnemonic);
        let volatility = assess_volatility(kind, &operands);
        let wildcard_positions = analyze_wildcard_positions(&bytes, &operands);

        let size = bytes.len();
        instructions.push(Instruction {
            address: format!("{:08X}", decoded.ip()),
            raw_address: None,
            bytes,
            mnemonic,
            operands,
            operands_normalized: None,
            label: None,
            comment: None,
            kind,
            size,
            volatility,
            wildcard_positions,
        });
    }

    instructions
}
