//! Multi-strategy signature generation.
//!
//! For one target instruction the generator runs window construction
//! under a matrix of strategies:
//!
//! - nine named wildcard-rule presets (from wildcarding only relative
//!   offsets up to wildcarding every recognized volatile field),
//! - eleven context variations that re-anchor the window with different
//!   amounts of leading context,
//! - eight anchor shifts that retarget onto a stable neighbor.
//!
//! Candidates that are more than 75% similar to an already kept one are
//! dropped, the survivors are ranked by uniqueness, and the top
//! `options.variants` are returned.

pub mod similarity;
pub mod targets;

use tracing::debug;

use crate::encoding::PositionSets;
use crate::types::{
    GeneratedSignature, Instruction, InstructionKind, SignatureOptions, Stability, WildcardKind,
    WildcardReason, WildcardRules,
};

/// Context variations: `(context_before, context_after)` pairs.
///
/// The second component is carried through the options record for
/// downstream consumers; window construction reads only the first.
const CONTEXT_VARIATIONS: [(usize, usize); 11] = [
    // Forward only (good for finding code after target)
    (0, 10),
    (0, 15),
    (0, 20),
    (0, 30),
    (0, 40),
    // Mixed context (balanced approach)
    (2, 12),
    (3, 18),
    (5, 25),
    // More backward context (anchoring before target)
    (5, 10),
    (8, 15),
    (10, 20),
];

/// Anchor shifts tried around the target.
const ANCHOR_SHIFTS: [isize; 8] = [-4, -3, -2, -1, 1, 2, 3, 4];

/// Kinds an anchor shift may land on.
const STABLE_ANCHOR_KINDS: [InstructionKind; 5] = [
    InstructionKind::Mov,
    InstructionKind::Compare,
    InstructionKind::Logic,
    InstructionKind::Arithmetic,
    InstructionKind::Stack,
];

/// Similarity threshold: candidates within `1 - threshold` of a kept one
/// are considered duplicates.
const DEDUP_THRESHOLD: f64 = 0.25;

/// The named rule presets, in emission order. `Conservative` is the
/// caller's own rule set and is substituted at generation time.
fn rule_presets(caller: WildcardRules) -> Vec<(&'static str, WildcardRules)> {
    vec![
        (
            "Minimal",
            WildcardRules {
                relative_jumps: true,
                relative_calls: true,
                stack_offsets: false,
                global_addresses: false,
                immediates: false,
                struct_offsets: false,
                memory_displacements: false,
            },
        ),
        ("Conservative", caller),
        (
            "Balanced",
            WildcardRules {
                relative_jumps: true,
                relative_calls: true,
                stack_offsets: true,
                global_addresses: true,
                immediates: false,
                struct_offsets: true,
                memory_displacements: false,
            },
        ),
        (
            "Aggressive",
            WildcardRules {
                relative_jumps: true,
                relative_calls: true,
                stack_offsets: true,
                global_addresses: true,
                immediates: true,
                struct_offsets: true,
                memory_displacements: true,
            },
        ),
        (
            "Stack Focus",
            WildcardRules {
                relative_jumps: true,
                relative_calls: true,
                stack_offsets: true,
                global_addresses: false,
                immediates: false,
                struct_offsets: false,
                memory_displacements: false,
            },
        ),
        (
            "Global Focus",
            WildcardRules {
                relative_jumps: true,
                relative_calls: true,
                stack_offsets: false,
                global_addresses: true,
                immediates: false,
                struct_offsets: false,
                memory_displacements: false,
            },
        ),
        (
            "Memory Heavy",
            WildcardRules {
                relative_jumps: true,
                relative_calls: true,
                stack_offsets: true,
                global_addresses: true,
                immediates: false,
                struct_offsets: true,
                memory_displacements: true,
            },
        ),
        (
            "Max Stability",
            WildcardRules {
                relative_jumps: true,
                relative_calls: true,
                stack_offsets: true,
                global_addresses: true,
                immediates: true,
                struct_offsets: true,
                memory_displacements: true,
            },
        ),
        (
            "Immediates Only",
            WildcardRules {
                relative_jumps: true,
                relative_calls: true,
                stack_offsets: false,
                global_addresses: false,
                immediates: true,
                struct_offsets: false,
                memory_displacements: false,
            },
        ),
    ]
}

/// Generate ranked signature variants for one target instruction.
///
/// Out-of-range `target_idx` or windows that never reach `min_length`
/// simply produce fewer (possibly zero) variants; this function does not
/// fail.
pub fn generate_signatures(
    instructions: &[Instruction],
    target_idx: usize,
    options: &SignatureOptions,
) -> Vec<GeneratedSignature> {
    let options = options.clamped();
    let mut variants = Vec::new();

    // Rule-set presets.
    for (name, rules) in rule_presets(options.wildcard_rules) {
        if let Some(v) = generate_with_rules(instructions, target_idx, rules, &options, name) {
            variants.push(v);
        }
    }

    // Context variations re-run the caller's rules with different
    // leading context.
    for (ctx_before, ctx_after) in CONTEXT_VARIATIONS {
        let modified = SignatureOptions {
            context_before: ctx_before,
            context_after: ctx_after,
            ..options.clone()
        };
        let name = format!("Context {}/{}", ctx_before, ctx_after);
        if let Some(v) =
            generate_with_rules(instructions, target_idx, options.wildcard_rules, &modified, &name)
        {
            variants.push(v);
        }
    }

    // Anchor shifting onto nearby stable instructions.
    for shift in ANCHOR_SHIFTS {
        let Some(shifted_idx) = target_idx.checked_add_signed(shift) else {
            continue;
        };
        if shifted_idx >= instructions.len() {
            continue;
        }
        if !STABLE_ANCHOR_KINDS.contains(&instructions[shifted_idx].kind) {
            continue;
        }
        let name = format!("Anchor {:+}", shift);
        if let Some(v) =
            generate_with_rules(instructions, shifted_idx, options.wildcard_rules, &options, &name)
        {
            variants.push(v);
        }
    }

    let candidates = variants.len();
    let mut unique = similarity::deduplicate(variants, DEDUP_THRESHOLD);

    // Rank by uniqueness; the sort is stable so earlier strategies win ties.
    unique.sort_by(|a, b| {
        b.uniqueness_score
            .partial_cmp(&a.uniqueness_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    unique.truncate(options.variants);

    debug!(
        target_idx,
        candidates,
        kept = unique.len(),
        "generated signature variants"
    );

    unique
}

/// One byte of the accumulated window.
struct WindowByte {
    value: u8,
    /// Offset within the originating instruction.
    offset: usize,
    /// Index of the originating instruction.
    inst: usize,
}

/// Run window construction and wildcard evaluation for one rule set.
///
/// Returns `None` when the target is out of range or the window never
/// reaches `min_length`.
pub fn generate_with_rules(
    instructions: &[Instruction],
    target_idx: usize,
    rules: WildcardRules,
    options: &SignatureOptions,
    strategy: &str,
) -> Option<GeneratedSignature> {
    if target_idx >= instructions.len() {
        return None;
    }

    let start_idx = target_idx.saturating_sub(options.context_before);

    // Accumulate bytes instruction by instruction until max_length.
    let mut window: Vec<WindowByte> = Vec::with_capacity(options.max_length);
    let mut idx = start_idx;
    'outer: while idx < instructions.len() {
        for (offset, &value) in instructions[idx].bytes.iter().enumerate() {
            if window.len() >= options.max_length {
                break 'outer;
            }
            window.push(WindowByte {
                value,
                offset,
                inst: idx,
            });
        }
        idx += 1;
    }

    if window.len() < options.min_length {
        return None;
    }

    let target_length = options.min_length.max(window.len().min(options.max_length));
    window.truncate(target_length);

    // Rule position sets, one per instruction that contributes bytes.
    let first_inst = window.first()?.inst;
    let last_inst = window.last()?.inst;
    let sets: Vec<PositionSets> = (first_inst..=last_inst)
        .map(|i| PositionSets::for_instruction(&instructions[i]))
        .collect();

    let mut pattern_bytes: Vec<Option<u8>> = Vec::with_capacity(window.len());
    let mut wildcard_positions: Vec<usize> = Vec::new();
    let mut wildcard_reasons: Vec<WildcardReason> = Vec::new();

    for (i, wb) in window.iter().enumerate() {
        let inst = &instructions[wb.inst];
        let inst_sets = &sets[wb.inst - first_inst];
        let in_primary = inst.wildcard_positions.contains(&wb.offset);

        // Rules are evaluated in a fixed order and short-circuit on the
        // first match.
        let reason = if in_primary
            && matches!(
                inst.kind,
                InstructionKind::ConditionalJump | InstructionKind::UnconditionalJump
            )
            && rules.relative_jumps
        {
            Some(WildcardKind::RelativeJump)
        } else if in_primary && inst.kind == InstructionKind::Call && rules.relative_calls {
            Some(WildcardKind::RelativeCall)
        } else if rules.stack_offsets && inst_sets.stack.contains(&wb.offset) {
            Some(WildcardKind::StackOffset)
        } else if rules.global_addresses && inst_sets.global.contains(&wb.offset) {
            Some(WildcardKind::GlobalAddress)
        } else if rules.immediates && inst_sets.immediate.contains(&wb.offset) {
            Some(WildcardKind::Immediate)
        } else if rules.struct_offsets && inst_sets.struct_offset.contains(&wb.offset) {
            Some(WildcardKind::StructOffset)
        } else {
            None
        };

        match reason {
            Some(kind) => {
                pattern_bytes.push(None);
                wildcard_positions.push(i);
                wildcard_reasons.push(WildcardReason {
                    position: i,
                    reason: kind,
                    detail: kind.detail().to_string(),
                    instruction_address: Some(inst.address.clone()),
                });
            }
            None => pattern_bytes.push(Some(wb.value)),
        }
    }

    let pattern = render_pattern(&pattern_bytes);
    let mask: String = pattern_bytes
        .iter()
        .map(|b| if b.is_none() { '?' } else { 'x' })
        .collect();

    let wildcard_count = wildcard_positions.len();
    let total_bytes = pattern_bytes.len();
    let uniqueness_score = calculate_uniqueness(&pattern_bytes);
    let stability = calculate_stability(wildcard_count, total_bytes, &instructions[target_idx]);

    let start_address = Some(instructions[first_inst].address.clone());
    let end_address = Some(instructions[last_inst].address.clone());

    let description = describe_strategy(strategy, rules, wildcard_count, total_bytes);
    let summary = summarize_wildcards(&wildcard_reasons, strategy);

    Some(GeneratedSignature {
        pattern,
        mask,
        bytes: pattern_bytes,
        description,
        length: total_bytes,
        wildcard_count,
        wildcard_positions,
        wildcard_reasons,
        uniqueness_score,
        stability,
        start_address,
        end_address,
        strategy: strategy.to_string(),
        summary,
    })
}

/// Render pattern bytes as space-separated `HH`/`??` tokens.
pub fn render_pattern(bytes: &[Option<u8>]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            Some(v) => format!("{:02X}", v),
            None => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uniqueness heuristic in `[0, 1]`, rounded to two decimals.
///
/// Concrete-byte ratio, plus a length bonus capped at 0.2, minus a
/// penalty for the longest wildcard run capped at 0.3.
pub fn calculate_uniqueness(pattern_bytes: &[Option<u8>]) -> f64 {
    let total = pattern_bytes.len();
    if total == 0 {
        return 0.0;
    }

    let wildcards = pattern_bytes.iter().filter(|b| b.is_none()).count();
    let concrete = total - wildcards;

    let base = concrete as f64 / total as f64;
    let length_bonus = (total as f64 / 50.0).min(0.2);
    let consecutive_penalty = (max_consecutive_wildcards(pattern_bytes) as f64 / 10.0).min(0.3);

    let score = (base + length_bonus - consecutive_penalty).clamp(0.0, 1.0);
    (score * 100.0).round() / 100.0
}

/// Longest run of wildcards in the pattern.
fn max_consecutive_wildcards(pattern_bytes: &[Option<u8>]) -> usize {
    let mut max_run = 0;
    let mut current = 0;
    for b in pattern_bytes {
        if b.is_none() {
            current += 1;
            max_run = max_run.max(current);
        } else {
            current = 0;
        }
    }
    max_run
}

/// Stability rating from the wildcard ratio and the target's operand
/// volatility.
fn calculate_stability(
    wildcard_count: usize,
    total_bytes: usize,
    target: &Instruction,
) -> Stability {
    let ratio = if total_bytes > 0 {
        wildcard_count as f64 / total_bytes as f64
    } else {
        0.0
    };
    let operand_high = target.volatility.operand == crate::types::VolatilityLevel::High;

    if ratio >= 0.3 && operand_high {
        Stability::High
    } else if ratio >= 0.15 || operand_high {
        Stability::Medium
    } else {
        Stability::Low
    }
}

/// Human-readable strategy description.
fn describe_strategy(
    strategy: &str,
    rules: WildcardRules,
    wildcard_count: usize,
    total_bytes: usize,
) -> String {
    let mut parts = vec![strategy.to_string()];

    let mut wildcarded = Vec::new();
    if rules.relative_jumps {
        wildcarded.push("jumps");
    }
    if rules.relative_calls {
        wildcarded.push("calls");
    }
    if rules.stack_offsets {
        wildcarded.push("stack");
    }
    if rules.global_addresses {
        wildcarded.push("globals");
    }
    if rules.immediates {
        wildcarded.push("immediates");
    }
    if rules.struct_offsets {
        wildcarded.push("structs");
    }

    if !wildcarded.is_empty() {
        parts.push(format!("wildcards: {}", wildcarded.join(", ")));
    }

    parts.push(format!("{}/{} bytes wildcarded", wildcard_count, total_bytes));
    parts.join(" - ")
}

/// Summary sentence explaining the wildcards of a variant.
fn summarize_wildcards(reasons: &[WildcardReason], strategy: &str) -> String {
    if reasons.is_empty() {
        return "No wildcards needed - all bytes are stable across builds.".to_string();
    }

    let mut parts: Vec<String> = Vec::new();

    match strategy {
        "Minimal" => parts.push("Uses minimal wildcarding for maximum uniqueness.".to_string()),
        "Conservative" => parts.push("Balances stability with uniqueness.".to_string()),
        "Aggressive" => {
            parts.push("Wildcards aggressively for maximum stability across updates.".to_string())
        }
        s if s.starts_with("Context") => {
            parts.push("Adjusted context window for better anchoring.".to_string())
        }
        s if s.starts_with("Anchor") => {
            parts.push("Shifted anchor point to a more stable instruction.".to_string())
        }
        _ => {}
    }

    let count_of = |kind: WildcardKind| reasons.iter().filter(|r| r.reason == kind).count();
    let plural = |n: usize| if n > 1 { "s" } else { "" };

    let mut explanations = Vec::new();
    let n = count_of(WildcardKind::RelativeJump);
    if n > 0 {
        explanations.push(format!(
            "{} byte{} for relative jump offsets (change when code is relocated)",
            n,
            plural(n)
        ));
    }
    let n = count_of(WildcardKind::RelativeCall);
    if n > 0 {
        explanations.push(format!(
            "{} byte{} for relative call targets (function addresses vary)",
            n,
            plural(n)
        ));
    }
    let n = count_of(WildcardKind::StackOffset);
    if n > 0 {
        explanations.push(format!(
            "{} byte{} for stack offsets (local variable positions may change)",
            n,
            plural(n)
        ));
    }
    let n = count_of(WildcardKind::GlobalAddress);
    if n > 0 {
        explanations.push(format!(
            "{} byte{} for global addresses (affected by ASLR/relocation)",
            n,
            plural(n)
        ));
    }
    let n = count_of(WildcardKind::Immediate);
    if n > 0 {
        explanations.push(format!(
            "{} byte{} for immediate values (constants that may change)",
            n,
            plural(n)
        ));
    }
    let n = count_of(WildcardKind::StructOffset);
    if n > 0 {
        explanations.push(format!(
            "{} byte{} for struct offsets (structure layouts may differ)",
            n,
            plural(n)
        ));
    }

    if !explanations.is_empty() {
        parts.push(format!("Wildcarded: {}.", explanations.join("; ")));
    }

    parts.join(" ")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parser;
    use crate::types::FormatHint;
    use pretty_assertions::assert_eq;

    /// Pipe listing shared as a fixture across the generator, smart and
    /// envelope tests.
    pub(crate) const PIPE_SAMPLE: &str = "\
00B27AB0 | 0F84 79050000 | je apr24.2020.B2802F | Lawnmower_A
00B27AB6 | 8B8D 2CFEFFFF | mov ecx,dword ptr ss:[ebp-1D4] |
00B27ABC | 81C1 CC060000 | add ecx,6CC |
00B27AC2 | 898D 34FCFFFF | mov dword ptr ss:[ebp-3CC],ecx |
00B27AC8 | 8B95 34FCFFFF | mov edx,dword ptr ss:[ebp-3CC] |
00B27ACE | 81C2 D6660000 | add edx,66D6 |
00B27AD4 | 8B85 34FCFFFF | mov eax,dword ptr ss:[ebp-3CC] |
00B27ADA | 8B08 | mov ecx,dword ptr ds:[eax] |
00B27ADC | 2BCA | sub ecx,edx |
00B27ADE | 8339 01 | cmp dword ptr ds:[ecx],1 |
00B27AE1 | 0F85 48050000 | jne apr24.2020.B2802F | Lawnmower_B";

    pub(crate) fn sample_instructions() -> Vec<crate::types::Instruction> {
        parser::parse_listing(PIPE_SAMPLE, FormatHint::Auto)
            .unwrap()
            .instructions
    }

    fn test_options() -> SignatureOptions {
        SignatureOptions {
            min_length: 15,
            max_length: 50,
            variants: 5,
            ..SignatureOptions::default()
        }
    }

    #[test]
    fn test_minimal_preset_pattern() {
        let instructions = sample_instructions();
        let rules = rule_presets(WildcardRules::default())
            .into_iter()
            .find(|(name, _)| *name == "Minimal")
            .unwrap()
            .1;
        let sig =
            generate_with_rules(&instructions, 0, rules, &test_options(), "Minimal").unwrap();

        assert!(sig.pattern.starts_with("0F 84 ?? ?? ?? ??"));
        assert!(sig.mask.starts_with("xx????"));
        // Minimal leaves the stack displacement of the following mov concrete.
        assert_eq!(&sig.mask[6..8], "xx");
    }

    #[test]
    fn test_variant_count_and_order() {
        let instructions = sample_instructions();
        let variants = generate_signatures(&instructions, 0, &test_options());

        assert!(!variants.is_empty());
        assert!(variants.len() <= 5);
        for pair in variants.windows(2) {
            assert!(pair[0].uniqueness_score >= pair[1].uniqueness_score);
        }
    }

    #[test]
    fn test_dedup_threshold_holds() {
        let instructions = sample_instructions();
        let variants = generate_signatures(&instructions, 0, &test_options());

        for (i, a) in variants.iter().enumerate() {
            for b in variants.iter().skip(i + 1) {
                let sim = similarity::pattern_similarity(&a.pattern, &b.pattern);
                assert!(sim <= 0.75, "{} vs {} too similar: {}", a.pattern, b.pattern, sim);
            }
        }
    }

    #[test]
    fn test_pattern_mask_alignment() {
        let instructions = sample_instructions();
        for sig in generate_signatures(&instructions, 0, &test_options()) {
            let tokens: Vec<&str> = sig.pattern.split(' ').collect();
            assert_eq!(tokens.len(), sig.mask.len());
            assert_eq!(tokens.len(), sig.bytes.len());
            assert_eq!(tokens.len(), sig.length);
            for (i, token) in tokens.iter().enumerate() {
                let is_wild = *token == "??";
                assert_eq!(is_wild, sig.bytes[i].is_none());
                assert_eq!(is_wild, sig.mask.as_bytes()[i] == b'?');
            }
        }
    }

    #[test]
    fn test_wildcard_monotonicity() {
        let instructions = sample_instructions();
        let presets = rule_presets(WildcardRules::default());
        let minimal = presets.iter().find(|(n, _)| *n == "Minimal").unwrap().1;
        let aggressive = presets.iter().find(|(n, _)| *n == "Aggressive").unwrap().1;

        let min_sig =
            generate_with_rules(&instructions, 0, minimal, &test_options(), "Minimal").unwrap();
        let agg_sig =
            generate_with_rules(&instructions, 0, aggressive, &test_options(), "Aggressive")
                .unwrap();

        // Same window, so positions are comparable: every wildcard of
        // Minimal is a wildcard of Aggressive.
        for pos in &min_sig.wildcard_positions {
            assert!(agg_sig.wildcard_positions.contains(pos));
        }
        assert!(agg_sig.wildcard_count >= min_sig.wildcard_count);
    }

    #[test]
    fn test_out_of_range_target() {
        let instructions = sample_instructions();
        assert!(generate_with_rules(
            &instructions,
            999,
            WildcardRules::default(),
            &test_options(),
            "Conservative"
        )
        .is_none());
        assert!(generate_signatures(&instructions, 999, &test_options()).is_empty());
    }

    #[test]
    fn test_too_short_window() {
        let instructions = sample_instructions();
        // From the final instruction only 6 bytes can accumulate; ask for
        // far more than that.
        let options = SignatureOptions {
            min_length: 100,
            max_length: 200,
            ..SignatureOptions::default()
        };
        assert!(generate_with_rules(
            &instructions,
            10,
            WildcardRules::default(),
            &options,
            "Conservative"
        )
        .is_none());
    }

    #[test]
    fn test_uniqueness_bounds() {
        let instructions = sample_instructions();
        for sig in generate_signatures(&instructions, 0, &test_options()) {
            assert!((0.0..=1.0).contains(&sig.uniqueness_score));
            // Two-decimal rounding.
            let scaled = sig.uniqueness_score * 100.0;
            assert!((scaled - scaled.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_max_consecutive_wildcards() {
        assert_eq!(max_consecutive_wildcards(&[Some(1), None, None, Some(2)]), 2);
        assert_eq!(max_consecutive_wildcards(&[None, None, None]), 3);
        assert_eq!(max_consecutive_wildcards(&[Some(1), Some(2)]), 0);
    }

    #[quickcheck_macros::quickcheck]
    fn prop_uniqueness_bounds(pattern_bytes: Vec<Option<u8>>) -> bool {
        let score = calculate_uniqueness(&pattern_bytes);
        (0.0..=1.0).contains(&score) && {
            let scaled = score * 100.0;
            (scaled - scaled.round()).abs() < 1e-9
        }
    }

    #[test]
    fn test_summary_mentions_reasons() {
        let instructions = sample_instructions();
        let sig = generate_with_rules(
            &instructions,
            0,
            WildcardRules::default(),
            &test_options(),
            "Conservative",
        )
        .unwrap();
        assert!(sig.summary.contains("relative jump offsets"));
        assert!(sig.summary.contains("stack offsets"));
        assert!(sig.description.contains("bytes wildcarded"));
    }
}
