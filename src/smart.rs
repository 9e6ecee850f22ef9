//! Smart anchor analysis.
//!
//! Scores every instruction as a candidate signature anchor along three
//! axes (stability, uniqueness, context quality), each starting at a
//! neutral 50 and clamped to `[0, 100]`, then combines them with fixed
//! weights. Contiguous runs of stable instructions are reported
//! separately so a caller can anchor inside them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Instruction, VolatilityLevel};

/// Mnemonics that are rare enough to make distinctive anchors.
const RARE_MNEMONICS: &[&str] = &[
    "xchg", "bswap", "rol", "ror", "shld", "shrd", "bt", "bts", "btr", "btc", "cpuid", "rdtsc",
    "prefetch", "lfence", "mfence", "sfence", "cvtsi2ss", "cvtsi2sd", "cvtss2sd", "cvtsd2ss",
    "cvttss2si", "cvttsd2si", "comiss", "comisd", "ucomiss", "ucomisd", "pxor", "por", "pand",
    "pandn", "pcmpeqb", "pcmpeqd", "pcmpgtb", "pcmpgtd", "movdqa", "movdqu", "movaps", "movups",
    "movss", "movsd", "shufps", "shufpd", "unpcklps", "unpckhps",
];

/// Mnemonics too common to contribute uniqueness.
const COMMON_MNEMONICS: &[&str] = &[
    "mov", "push", "pop", "add", "sub", "xor", "cmp", "test", "jmp", "je", "jne", "call", "ret",
    "lea", "nop",
];

/// Axis weights for the combined score.
const STABILITY_WEIGHT: f64 = 0.45;
const UNIQUENESS_WEIGHT: f64 = 0.30;
const CONTEXT_WEIGHT: f64 = 0.25;

/// Candidates below this combined score are not reported.
const MIN_REPORTED_SCORE: f64 = 40.0;

/// A recommended signature anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartTarget {
    /// Index into the analyzed instruction slice.
    pub instruction_index: usize,
    pub address: String,
    pub mnemonic: String,
    pub operands: String,
    /// Combined score, 0-100.
    pub score: f64,
    /// Stability axis, 0-100.
    pub stability_score: f64,
    /// Uniqueness axis, 0-100.
    pub uniqueness_score: f64,
    /// Context axis, 0-100.
    pub context_score: f64,
    /// Why this is a good anchor.
    pub reasons: Vec<String>,
    /// Concerns about this anchor.
    pub warnings: Vec<String>,
}

/// A contiguous run of stable instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StableRegion {
    pub start_index: usize,
    pub end_index: usize,
    pub start_address: String,
    pub end_address: String,
    pub avg_score: f64,
    pub byte_count: usize,
}

/// Result of smart analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartAnalysisResult {
    /// Best anchors, ranked by combined score.
    pub top_targets: Vec<SmartTarget>,
    /// Contiguous stable areas.
    pub stable_regions: Vec<StableRegion>,
    /// Overall assessment in prose.
    pub analysis_summary: String,
    pub total_instructions: usize,
    /// Mean stability axis over all instructions, one decimal.
    pub avg_stability: f64,
}

/// Scores and notes for one instruction, before rounding.
struct InstructionScore {
    total: f64,
    stability: f64,
    uniqueness: f64,
    context: f64,
    reasons: Vec<String>,
    warnings: Vec<String>,
}

/// Score one instruction as an anchor candidate.
fn score_instruction(
    inst: &Instruction,
    context_before: &[Instruction],
    context_after: &[Instruction],
    all_instructions: &[Instruction],
) -> InstructionScore {
    let mut stability: f64 = 50.0;
    let mut uniqueness: f64 = 50.0;
    let mut context: f64 = 50.0;
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    // Stability: instruction kind.
    if inst.kind.is_stable() {
        stability += 20.0;
        reasons.push(format!("{} instructions are version-stable", inst.kind));
    } else if inst.kind.is_volatile() {
        stability -= 25.0;
        warnings.push(format!("{} has volatile offsets", inst.kind));
    }

    // Stability: operand volatility.
    match inst.volatility.operand {
        VolatilityLevel::Low => {
            stability += 15.0;
            reasons.push("Operands are stable (registers/small immediates)".to_string());
        }
        VolatilityLevel::High => {
            stability -= 20.0;
            warnings.push("Operands contain volatile addresses".to_string());
        }
        VolatilityLevel::Medium => stability -= 5.0,
    }

    // Stability: opcode volatility.
    match inst.volatility.opcode {
        VolatilityLevel::Low => stability += 10.0,
        VolatilityLevel::High => {
            stability -= 15.0;
            warnings.push("Opcode encoding may vary".to_string());
        }
        VolatilityLevel::Medium => {}
    }

    // Stability: wildcard demand.
    let wildcard_count = inst.wildcard_positions.len();
    if wildcard_count == 0 {
        stability += 15.0;
        reasons.push("No wildcards needed in this instruction".to_string());
    } else if wildcard_count <= 2 {
        stability += 5.0;
    } else {
        stability -= wildcard_count as f64 * 3.0;
        warnings.push(format!("Needs {} wildcards", wildcard_count));
    }

    // Uniqueness: mnemonic rarity.
    let mnemonic = inst.mnemonic.to_lowercase();
    if RARE_MNEMONICS.contains(&mnemonic.as_str()) {
        uniqueness += 25.0;
        reasons.push(format!("{} is a rare/distinctive instruction", inst.mnemonic));
    } else if COMMON_MNEMONICS.contains(&mnemonic.as_str()) {
        uniqueness -= 10.0;
    }

    // Uniqueness: encoding length.
    if inst.size >= 6 {
        uniqueness += 15.0;
        reasons.push(format!(
            "Long instruction ({} bytes) provides unique pattern",
            inst.size
        ));
    } else if inst.size >= 4 {
        uniqueness += 8.0;
    } else if inst.size <= 2 {
        uniqueness -= 10.0;
    }

    // Uniqueness: occurrence count across the whole listing.
    let same_mnemonic = all_instructions
        .iter()
        .filter(|i| i.mnemonic.to_lowercase() == mnemonic)
        .count();
    if same_mnemonic == 1 {
        uniqueness += 20.0;
        reasons.push("Only occurrence of this instruction type".to_string());
    } else if same_mnemonic <= 3 {
        uniqueness += 10.0;
    } else if same_mnemonic > 10 {
        uniqueness -= 15.0;
        warnings.push(format!("Common pattern ({} similar instructions)", same_mnemonic));
    }

    // Context: stable neighbors.
    let stable_before = context_before.iter().filter(|i| i.kind.is_stable()).count();
    let stable_after = context_after.iter().filter(|i| i.kind.is_stable()).count();
    if stable_before >= 2 {
        context += 10.0;
        reasons.push("Good stable context before".to_string());
    }
    if stable_after >= 3 {
        context += 15.0;
        reasons.push("Strong stable context after".to_string());
    }

    // Context: volatile neighbors.
    let volatile_after = context_after.iter().filter(|i| i.kind.is_volatile()).count();
    if volatile_after >= 3 {
        context -= 15.0;
        warnings.push("Many volatile instructions follow".to_string());
    }

    // Context: byte density directly after the anchor.
    let following_bytes: usize = context_after.iter().take(5).map(|i| i.size).sum();
    if following_bytes >= 15 {
        context += 10.0;
        reasons.push(format!(
            "Good byte density ({} bytes in next 5 instructions)",
            following_bytes
        ));
    }

    // Context: listing edges.
    if context_before.len() < 2 {
        context -= 10.0;
        warnings.push("Limited context before".to_string());
    }
    if context_after.len() < 3 {
        context -= 15.0;
        warnings.push("Limited context after".to_string());
    }

    let stability = stability.clamp(0.0, 100.0);
    let uniqueness = uniqueness.clamp(0.0, 100.0);
    let context = context.clamp(0.0, 100.0);

    let total = stability * STABILITY_WEIGHT
        + uniqueness * UNIQUENESS_WEIGHT
        + context * CONTEXT_WEIGHT;

    InstructionScore {
        total,
        stability,
        uniqueness,
        context,
        reasons,
        warnings,
    }
}

/// Analyze all instructions and return the best anchor candidates.
pub fn analyze_instructions(
    instructions: &[Instruction],
    max_targets: usize,
) -> SmartAnalysisResult {
    if instructions.is_empty() {
        return SmartAnalysisResult {
            top_targets: Vec::new(),
            stable_regions: Vec::new(),
            analysis_summary: "No instructions to analyze".to_string(),
            total_instructions: 0,
            avg_stability: 0.0,
        };
    }

    let mut scored: Vec<SmartTarget> = Vec::new();
    let mut stability_scores: Vec<f64> = Vec::new();

    for (i, inst) in instructions.iter().enumerate() {
        let context_before = &instructions[i.saturating_sub(5)..i];
        let context_after = &instructions[(i + 1).min(instructions.len())
            ..(i + 10).min(instructions.len())];

        let score = score_instruction(inst, context_before, context_after, instructions);
        stability_scores.push(score.stability);

        if score.total < MIN_REPORTED_SCORE {
            continue;
        }

        scored.push(SmartTarget {
            instruction_index: i,
            address: inst.address.clone(),
            mnemonic: inst.mnemonic.clone(),
            operands: inst.operands.clone(),
            score: round1(score.total),
            stability_score: round1(score.stability),
            uniqueness_score: round1(score.uniqueness),
            context_score: round1(score.context),
            reasons: score.reasons,
            warnings: score.warnings,
        });
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(max_targets);

    let stable_regions = find_stable_regions(instructions, 3, 60.0);

    let avg_stability = if stability_scores.is_empty() {
        0.0
    } else {
        round1(stability_scores.iter().sum::<f64>() / stability_scores.len() as f64)
    };

    let analysis_summary = build_summary(&scored, &stable_regions, avg_stability);

    debug!(
        total = instructions.len(),
        candidates = scored.len(),
        regions = stable_regions.len(),
        "smart analysis complete"
    );

    SmartAnalysisResult {
        top_targets: scored,
        stable_regions,
        analysis_summary,
        total_instructions: instructions.len(),
        avg_stability,
    }
}

/// Find contiguous regions of stable instructions.
///
/// An instruction belongs to a region when its kind is stable, its
/// operand volatility is not high, and it needs at most two wildcards.
pub fn find_stable_regions(
    instructions: &[Instruction],
    min_region_size: usize,
    stability_threshold: f64,
) -> Vec<StableRegion> {
    let mut regions = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut run_len = 0usize;

    // Synthetic per-instruction score for a stable run.
    const REGION_BASE_SCORE: f64 = 70.0;

    let close_run = |start: Option<usize>, len: usize, regions: &mut Vec<StableRegion>| {
        if let Some(start) = start {
            if len >= min_region_size && REGION_BASE_SCORE >= stability_threshold {
                let end = start + len - 1;
                let byte_count = instructions[start..=end].iter().map(|i| i.size).sum();
                regions.push(StableRegion {
                    start_index: start,
                    end_index: end,
                    start_address: instructions[start].address.clone(),
                    end_address: instructions[end].address.clone(),
                    avg_score: REGION_BASE_SCORE,
                    byte_count,
                });
            }
        }
    };

    for (i, inst) in instructions.iter().enumerate() {
        let is_stable = inst.kind.is_stable()
            && inst.volatility.operand != VolatilityLevel::High
            && inst.wildcard_positions.len() <= 2;

        if is_stable {
            if run_start.is_none() {
                run_start = Some(i);
                run_len = 0;
            }
            run_len += 1;
        } else {
            close_run(run_start.take(), run_len, &mut regions);
            run_len = 0;
        }
    }
    close_run(run_start.take(), run_len, &mut regions);

    regions
}

/// Build the prose summary of an analysis.
fn build_summary(
    top_targets: &[SmartTarget],
    stable_regions: &[StableRegion],
    avg_stability: f64,
) -> String {
    let mut parts = Vec::new();

    if let Some(best) = top_targets.first() {
        parts.push(format!(
            "Best anchor: {} at {} (score: {:.0}/100)",
            best.mnemonic, best.address, best.score
        ));
    }

    if !stable_regions.is_empty() {
        parts.push(format!("Found {} stable region(s)", stable_regions.len()));
        if let Some(largest) = stable_regions.iter().max_by_key(|r| r.byte_count) {
            parts.push(format!(
                "Largest stable region: {} bytes ({} to {})",
                largest.byte_count, largest.start_address, largest.end_address
            ));
        }
    }

    let high_score_count = top_targets.iter().filter(|t| t.score >= 70.0).count();
    if high_score_count >= 3 {
        parts.push(format!("{} excellent anchor candidates found", high_score_count));
    } else if high_score_count == 0 {
        parts.push(
            "Warning: No high-confidence anchors found. Consider providing more context."
                .to_string(),
        );
    }

    if avg_stability < 50.0 {
        parts.push(
            "Overall code stability is low - signatures may need frequent updates".to_string(),
        );
    } else if avg_stability >= 70.0 {
        parts.push("Code appears stable - signatures should be resilient".to_string());
    }

    parts.join(". ")
}

/// Round to one decimal place.
fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
