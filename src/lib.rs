//! Sigsmith - byte-pattern signature synthesis for x86-32 binaries.
//!
//! Given a short disassembly listing (or a raw byte stream), this library
//! identifies the byte positions inside each instruction that are likely
//! to drift between builds (relative jump/call displacements, stack-frame
//! displacements, absolute addresses, immediates, struct offsets) and
//! emits a family of candidate search patterns mixing concrete bytes with
//! `??` wildcards, ranked by expected uniqueness and stability.
//!
//! # Features
//!
//! - **Format detection**: pipe-separated debugger dumps, dash-separated
//!   module+offset dumps, and raw hex are recognized automatically
//! - **Encoding analysis**: ModR/M/SIB-aware classification of volatile
//!   bytes in x86-32 encodings
//! - **Strategy matrix**: nine wildcard presets, eleven context windows
//!   and eight anchor shifts per target, with near-duplicate suppression
//! - **Smart anchors**: per-instruction stability/uniqueness/context
//!   scoring and stable-region detection
//! - **Exporters**: AOB, pattern+mask, IDA Python, Cheat Engine, C/C++
//!   header, x64dbg
//!
//! # Quick Start
//!
//! ```rust
//! use sigsmith::{parse, FormatHint};
//!
//! let listing = "00B27AB0 | 0F84 79050000 | je target.B2802F | Entry";
//! let parsed = parse(listing, FormatHint::Auto)?;
//! assert_eq!(parsed.instructions.len(), 1);
//! assert_eq!(parsed.instructions[0].wildcard_positions, vec![2, 3, 4, 5]);
//! # Ok::<(), sigsmith::SigError>(())
//! ```
//!
//! The core is purely functional over in-memory values: parsing produces
//! instructions, generation consumes them read-only, and no state is
//! shared across requests.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod classify;
pub mod encoding;
pub mod error;
pub mod export;
pub mod generator;
pub mod parser;
pub mod smart;
pub mod types;

pub use error::{Result, SigError};
pub use export::{ExportFormat, SignatureMap};
pub use smart::{SmartAnalysisResult, SmartTarget, StableRegion};
pub use types::{
    AnalyzeOutput, BulkSelector, FormatHint, GenerateOutput, GeneratedSignature, Instruction,
    InstructionKind, ListingFormat, ParseOutput, ParseStats, SignatureOptions, Stability,
    TargetSelection, Volatility, VolatilityLevel, WildcardKind, WildcardReason, WildcardRules,
};

use tracing::debug;

/// Maximum number of synthetic recommendations from [`analyze`].
const MAX_RECOMMENDED_TARGETS: usize = 10;

/// Minimum smart-analysis score for a target to be generated for.
const SMART_GENERATE_MIN_SCORE: f64 = 45.0;

/// Parse a disassembly listing into analyzed instructions.
///
/// # Errors
///
/// [`SigError::NoInstructions`] when no line survives parsing.
pub fn parse(input_text: &str, format: FormatHint) -> Result<ParseOutput> {
    let parsed = parser::parse_listing(input_text, format)?;

    if parsed.instructions.is_empty() {
        return Err(SigError::NoInstructions);
    }

    let stats = parser::parse_stats(&parsed.instructions, &parsed.labels);

    Ok(ParseOutput {
        instructions: parsed.instructions,
        labels: parsed.labels,
        format: parsed.format,
        module: parsed.module,
        stats,
    })
}

/// Parse a listing and recommend targets.
///
/// Recommendations are all labels; lacking labels, up to ten `jump@ADDR`
/// / `call@ADDR` names (which the target selector resolves directly).
///
/// # Errors
///
/// [`SigError::NoInstructions`] when no line survives parsing.
pub fn analyze(input_text: &str, format: FormatHint) -> Result<AnalyzeOutput> {
    let parsed = parse(input_text, format)?;

    let mut recommended: Vec<String> = parsed
        .instructions
        .iter()
        .filter_map(|inst| inst.label.clone())
        .collect();

    if recommended.is_empty() {
        for inst in &parsed.instructions {
            match inst.kind {
                InstructionKind::ConditionalJump | InstructionKind::UnconditionalJump => {
                    recommended.push(format!("jump@{}", inst.address));
                }
                InstructionKind::Call => {
                    recommended.push(format!("call@{}", inst.address));
                }
                _ => {}
            }
            if recommended.len() >= MAX_RECOMMENDED_TARGETS {
                break;
            }
        }
    }

    Ok(AnalyzeOutput {
        stats: parsed.stats,
        recommended_targets: recommended,
        format: parsed.format,
        module: parsed.module,
    })
}

/// Generate signature variants for the selected targets.
///
/// # Errors
///
/// [`SigError::NoInstructions`] on an empty instruction slice,
/// [`SigError::NoTargets`] when the selection resolves to nothing.
pub fn generate(
    instructions: &[Instruction],
    targets: &TargetSelection,
    options: &SignatureOptions,
) -> Result<GenerateOutput> {
    if instructions.is_empty() {
        return Err(SigError::NoInstructions);
    }

    let resolved = generator::targets::find_targets(instructions, targets);
    if resolved.is_empty() {
        return Err(SigError::NoTargets);
    }

    Ok(generate_for(instructions, &resolved, options))
}

/// Generate signatures anchored at the first instruction.
///
/// Useful when the pasted listing starts exactly at the code of interest.
///
/// # Errors
///
/// [`SigError::NoInstructions`] on an empty instruction slice.
pub fn generate_targeted(
    instructions: &[Instruction],
    options: &SignatureOptions,
) -> Result<GenerateOutput> {
    let Some(first) = instructions.first() else {
        return Err(SigError::NoInstructions);
    };

    let name = first
        .label
        .clone()
        .unwrap_or_else(|| format!("target@{}", first.address));

    Ok(generate_for(instructions, &[(0, name)], options))
}

/// Parse a listing and generate signatures in one call.
///
/// When the selection matches nothing the operation falls back to
/// `all_labeled` (if the listing has labels) or `all_jumps`.
///
/// # Errors
///
/// [`SigError::NoInstructions`] when parsing yields nothing,
/// [`SigError::NoTargets`] when even the fallback selections are empty.
pub fn batch(
    input_text: &str,
    format: FormatHint,
    targets: &TargetSelection,
    options: &SignatureOptions,
) -> Result<GenerateOutput> {
    let parsed = parse(input_text, format)?;

    let mut resolved = generator::targets::find_targets(&parsed.instructions, targets);
    if resolved.is_empty() {
        let fallback = if parsed.labels.is_empty() {
            TargetSelection::Bulk(BulkSelector::AllJumps)
        } else {
            TargetSelection::Bulk(BulkSelector::AllLabeled)
        };
        debug!(?fallback, "target selection empty, using fallback");
        resolved = generator::targets::find_targets(&parsed.instructions, &fallback);
    }

    if resolved.is_empty() {
        return Err(SigError::NoTargets);
    }

    Ok(generate_for(&parsed.instructions, &resolved, options))
}

/// Score every instruction as a signature anchor.
///
/// Empty input yields an empty result rather than an error.
pub fn smart_analyze(instructions: &[Instruction], max_targets: usize) -> SmartAnalysisResult {
    smart::analyze_instructions(instructions, max_targets)
}

/// Analyze, pick the best anchors and generate for them.
///
/// Analysis runs with `max_targets = 2 * top_n`; of the first `top_n`
/// candidates, those scoring at least 45 are generated for, named
/// `MNEMONIC@ADDR`.
///
/// # Errors
///
/// [`SigError::NoInstructions`] on empty input, [`SigError::NoTargets`]
/// when no candidate scores high enough or generation yields nothing.
pub fn smart_generate(
    instructions: &[Instruction],
    options: &SignatureOptions,
    top_n: usize,
) -> Result<GenerateOutput> {
    if instructions.is_empty() {
        return Err(SigError::NoInstructions);
    }

    let analysis = smart::analyze_instructions(instructions, top_n * 2);
    if analysis.top_targets.is_empty() {
        return Err(SigError::NoTargets);
    }

    let mut signatures = SignatureMap::new();
    let mut targets_processed = 0;
    let mut total_variants = 0;

    for target in analysis.top_targets.iter().take(top_n) {
        if target.score < SMART_GENERATE_MIN_SCORE {
            continue;
        }

        let name = if target.mnemonic.is_empty() {
            format!("smart@{}", target.address)
        } else {
            format!("{}@{}", target.mnemonic, target.address)
        };

        let variants =
            generator::generate_signatures(instructions, target.instruction_index, options);
        if !variants.is_empty() {
            total_variants += variants.len();
            targets_processed += 1;
            signatures.insert(name, variants);
        }
    }

    if signatures.is_empty() {
        return Err(SigError::NoTargets);
    }

    Ok(GenerateOutput {
        signatures,
        targets_processed,
        total_variants,
    })
}

/// Render signatures in an export format.
pub fn export(signatures: &SignatureMap, format: ExportFormat, module_name: &str) -> String {
    export::export_signatures(signatures, format, module_name)
}

/// Run generation for already-resolved targets.
fn generate_for(
    instructions: &[Instruction],
    resolved: &[(usize, String)],
    options: &SignatureOptions,
) -> GenerateOutput {
    let mut signatures = SignatureMap::new();
    let mut total_variants = 0;

    for (idx, name) in resolved {
        let variants = generator::generate_signatures(instructions, *idx, options);
        if !variants.is_empty() {
            total_variants += variants.len();
            signatures.insert(name.clone(), variants);
        }
    }

    GenerateOutput {
        signatures,
        targets_processed: resolved.len(),
        total_variants,
    }
}

/// Get version information for this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::PIPE_SAMPLE;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_parse_envelope() {
        let out = parse(PIPE_SAMPLE, FormatHint::Auto).unwrap();
        assert_eq!(out.format, ListingFormat::Pipe);
        assert_eq!(out.stats.total, 11);
        assert_eq!(out.stats.labeled, 2);
        assert_eq!(out.labels, vec!["Lawnmower_A", "Lawnmower_B"]);
        assert_eq!(out.stats.by_kind["conditional_jump"], 2);
        assert_eq!(out.stats.by_kind["mov"], 5);
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert!(matches!(
            parse("// nothing here", FormatHint::Auto),
            Err(SigError::NoInstructions)
        ));
    }

    #[test]
    fn test_analyze_prefers_labels() {
        let out = analyze(PIPE_SAMPLE, FormatHint::Auto).unwrap();
        assert_eq!(out.recommended_targets, vec!["Lawnmower_A", "Lawnmower_B"]);
    }

    #[test]
    fn test_analyze_synthesizes_jump_names() {
        let listing = "\
00401000 | 0F84 12345678 | je somewhere |
00401006 | E8 12345678 | call something |";
        let out = analyze(listing, FormatHint::Auto).unwrap();
        assert_eq!(
            out.recommended_targets,
            vec!["jump@00401000", "call@00401006"]
        );
    }

    #[test]
    fn test_generate_with_labels() {
        let parsed = parse(PIPE_SAMPLE, FormatHint::Auto).unwrap();
        let options = SignatureOptions {
            min_length: 15,
            max_length: 50,
            variants: 5,
            ..SignatureOptions::default()
        };
        let out = generate(
            &parsed.instructions,
            &TargetSelection::Bulk(BulkSelector::AllLabeled),
            &options,
        )
        .unwrap();

        assert_eq!(out.targets_processed, 2);
        assert!(out.signatures.contains_key("Lawnmower_A"));
        assert_eq!(
            out.total_variants,
            out.signatures.values().map(Vec::len).sum::<usize>()
        );
    }

    #[test]
    fn test_generate_no_targets() {
        let parsed = parse(PIPE_SAMPLE, FormatHint::Auto).unwrap();
        let result = generate(
            &parsed.instructions,
            &TargetSelection::List(vec!["Missing".into()]),
            &SignatureOptions::default(),
        );
        assert!(matches!(result, Err(SigError::NoTargets)));
    }

    #[test]
    fn test_generate_targeted_names_first_instruction() {
        let parsed = parse(PIPE_SAMPLE, FormatHint::Auto).unwrap();
        let options = SignatureOptions {
            min_length: 15,
            ..SignatureOptions::default()
        };
        let out = generate_targeted(&parsed.instructions, &options).unwrap();
        assert_eq!(out.targets_processed, 1);
        assert!(out.signatures.contains_key("Lawnmower_A"));
    }

    #[test]
    fn test_batch_falls_back_to_jumps() {
        // No labels: selection of a missing label falls back to all_jumps.
        let listing = "\
00401000 | 0F84 12345678 | je somewhere |
00401006 | 8B45 F8 | mov eax,dword ptr ss:[ebp-8] |
00401009 | 33C0 | xor eax,eax |
0040100B | 50 | push eax |
0040100C | C3 | ret |";
        let options = SignatureOptions {
            min_length: 8,
            ..SignatureOptions::default()
        };
        let out = batch(
            listing,
            FormatHint::Auto,
            &TargetSelection::List(vec!["Missing".into()]),
            &options,
        )
        .unwrap();
        assert!(out.signatures.keys().any(|k| k.starts_with("jump_")));
    }

    #[test]
    fn test_smart_generate_produces_named_targets() {
        let parsed = parse(PIPE_SAMPLE, FormatHint::Auto).unwrap();
        let options = SignatureOptions {
            min_length: 15,
            max_length: 50,
            variants: 5,
            ..SignatureOptions::default()
        };
        let out = smart_generate(&parsed.instructions, &options, 3).unwrap();

        assert!(out.targets_processed >= 1);
        assert!(out.targets_processed <= 3);
        for name in out.signatures.keys() {
            assert!(name.contains('@'));
        }
    }

    #[test]
    fn test_hex_roundtrip_through_envelope() {
        let out = parse("E8 12 34 56 78", FormatHint::Auto).unwrap();
        assert_eq!(out.format, ListingFormat::Hex);
        assert_eq!(out.instructions[0].kind, InstructionKind::Call);
        assert_eq!(out.instructions[0].wildcard_positions, vec![1, 2, 3, 4]);
    }
}
