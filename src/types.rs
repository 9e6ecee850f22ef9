//! Core types for signature synthesis.
//!
//! This module defines the instruction model produced by the parser, the
//! wildcard/option records consumed by the generator, and the generated
//! signature records handed to the exporters. Everything here is plain
//! data: parsing produces instructions, generation reads them and yields
//! signatures, and nothing is mutated across requests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Classification of x86 instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    ConditionalJump,
    UnconditionalJump,
    Call,
    Return,
    Mov,
    Arithmetic,
    Logic,
    Compare,
    Stack,
    Float,
    String,
    Other,
}

impl InstructionKind {
    /// Wire name of the kind (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionKind::ConditionalJump => "conditional_jump",
            InstructionKind::UnconditionalJump => "unconditional_jump",
            InstructionKind::Call => "call",
            InstructionKind::Return => "return",
            InstructionKind::Mov => "mov",
            InstructionKind::Arithmetic => "arithmetic",
            InstructionKind::Logic => "logic",
            InstructionKind::Compare => "compare",
            InstructionKind::Stack => "stack",
            InstructionKind::Float => "float",
            InstructionKind::String => "string",
            InstructionKind::Other => "other",
        }
    }

    /// Kinds whose encodings survive recompilation mostly unchanged.
    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            InstructionKind::Mov
                | InstructionKind::Compare
                | InstructionKind::Logic
                | InstructionKind::Arithmetic
                | InstructionKind::Stack
        )
    }

    /// Kinds carrying relative offsets that drift between builds.
    pub fn is_volatile(&self) -> bool {
        matches!(
            self,
            InstructionKind::ConditionalJump
                | InstructionKind::UnconditionalJump
                | InstructionKind::Call
        )
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How likely a field is to change between builds of the same program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for VolatilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityLevel::Low => write!(f, "low"),
            VolatilityLevel::Medium => write!(f, "medium"),
            VolatilityLevel::High => write!(f, "high"),
        }
    }
}

/// Volatility levels for the two halves of an instruction encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Volatility {
    /// How likely the opcode bytes change.
    pub opcode: VolatilityLevel,
    /// How likely the operand bytes change.
    pub operand: VolatilityLevel,
}

/// A single parsed x86-32 instruction.
///
/// Immutable after parsing: the parser fills every field, including the
/// encoding-derived `wildcard_positions`, and downstream stages only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    /// 8-digit uppercase hex address, zero-padded.
    pub address: String,
    /// Original textual address when the listing used another form
    /// (e.g. `Module.exe+4A12`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_address: Option<String>,
    /// Instruction bytes in encoding order.
    pub bytes: Vec<u8>,
    /// Lowercased opcode name.
    pub mnemonic: String,
    /// Raw operand text as it appeared in the listing.
    pub operands: String,
    /// Operand text with module-relative references rewritten to
    /// `ds:[HEX]`, when the source format required normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operands_normalized: Option<String>,
    /// Label attached to this line, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Trailing comment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Instruction category.
    #[serde(rename = "category")]
    pub kind: InstructionKind,
    /// Byte count; always equals `bytes.len()`.
    pub size: usize,
    /// Opcode/operand volatility assessment.
    pub volatility: Volatility,
    /// Byte offsets (into `bytes`) that encode fields expected to drift
    /// between builds. Sorted and duplicate-free.
    #[serde(default)]
    pub wildcard_positions: Vec<usize>,
}

impl Instruction {
    /// Operand text the analyzers should read: normalized when present.
    pub fn operand_text(&self) -> &str {
        self.operands_normalized.as_deref().unwrap_or(&self.operands)
    }
}

/// Which classes of bytes the generator may replace with wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WildcardRules {
    /// Relative jump offsets (short and near).
    pub relative_jumps: bool,
    /// Relative call offsets.
    pub relative_calls: bool,
    /// `[ebp-X]` / `[esp+X]` stack-frame displacements.
    pub stack_offsets: bool,
    /// Absolute addresses such as `ds:[XXXXXXXX]`.
    pub global_addresses: bool,
    /// Immediate operand values.
    pub immediates: bool,
    /// `[reg+X]` structure-field offsets.
    pub struct_offsets: bool,
    /// Carried on the wire and the CLI for forward compatibility; no
    /// evaluation step consults it.
    pub memory_displacements: bool,
}

impl Default for WildcardRules {
    fn default() -> Self {
        Self {
            relative_jumps: true,
            relative_calls: true,
            stack_offsets: true,
            global_addresses: true,
            immediates: false,
            struct_offsets: false,
            memory_displacements: false,
        }
    }
}

/// Bounds for [`SignatureOptions::min_length`].
pub const MIN_LENGTH_RANGE: (usize, usize) = (8, 100);
/// Bounds for [`SignatureOptions::max_length`].
pub const MAX_LENGTH_RANGE: (usize, usize) = (20, 200);
/// Bounds for [`SignatureOptions::variants`].
pub const VARIANTS_RANGE: (usize, usize) = (1, 50);
/// Bounds for [`SignatureOptions::context_before`].
pub const CONTEXT_BEFORE_RANGE: (usize, usize) = (0, 20);
/// Bounds for [`SignatureOptions::context_after`].
pub const CONTEXT_AFTER_RANGE: (usize, usize) = (0, 50);

/// Options for signature generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureOptions {
    /// Minimum pattern length in bytes; shorter windows are discarded.
    pub min_length: usize,
    /// Maximum pattern length in bytes.
    pub max_length: usize,
    /// Maximum number of variants returned per target.
    pub variants: usize,
    /// Instructions included before the target.
    pub context_before: usize,
    /// Annotation axis carried through generation; window construction
    /// itself reads only `context_before` and `max_length`.
    pub context_after: usize,
    /// Wildcard rule set used by the Conservative strategy and the
    /// context/anchor variations.
    pub wildcard_rules: WildcardRules,
}

impl Default for SignatureOptions {
    fn default() -> Self {
        Self {
            min_length: 20,
            max_length: 50,
            variants: 25,
            context_before: 0,
            context_after: 10,
            wildcard_rules: WildcardRules::default(),
        }
    }
}

impl SignatureOptions {
    /// Copy of these options with every field clamped into its
    /// documented range.
    pub fn clamped(&self) -> Self {
        fn clamp(v: usize, (lo, hi): (usize, usize)) -> usize {
            v.clamp(lo, hi)
        }
        Self {
            min_length: clamp(self.min_length, MIN_LENGTH_RANGE),
            max_length: clamp(self.max_length, MAX_LENGTH_RANGE),
            variants: clamp(self.variants, VARIANTS_RANGE),
            context_before: clamp(self.context_before, CONTEXT_BEFORE_RANGE),
            context_after: clamp(self.context_after, CONTEXT_AFTER_RANGE),
            wildcard_rules: self.wildcard_rules,
        }
    }
}

/// Why a signature byte was wildcarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WildcardKind {
    RelativeJump,
    RelativeCall,
    StackOffset,
    GlobalAddress,
    Immediate,
    StructOffset,
}

impl WildcardKind {
    /// Wire name of the reason tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            WildcardKind::RelativeJump => "relative_jump",
            WildcardKind::RelativeCall => "relative_call",
            WildcardKind::StackOffset => "stack_offset",
            WildcardKind::GlobalAddress => "global_address",
            WildcardKind::Immediate => "immediate",
            WildcardKind::StructOffset => "struct_offset",
        }
    }

    /// Human explanation attached to every wildcard of this kind.
    pub fn detail(&self) -> &'static str {
        match self {
            WildcardKind::RelativeJump => "Relative jump offset - changes when code moves",
            WildcardKind::RelativeCall => {
                "Relative call offset - target address changes between builds"
            }
            WildcardKind::StackOffset => {
                "Stack frame offset [ebp/esp+X] - varies with local variables"
            }
            WildcardKind::GlobalAddress => {
                "Global/absolute address - changes due to ASLR or relocation"
            }
            WildcardKind::Immediate => "Immediate value - may change between versions",
            WildcardKind::StructOffset => {
                "Structure offset [reg+X] - changes if struct layout changes"
            }
        }
    }
}

impl fmt::Display for WildcardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One wildcarded byte position with its justification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WildcardReason {
    /// Byte position in the final pattern.
    pub position: usize,
    /// Reason tag.
    pub reason: WildcardKind,
    /// Human-readable explanation.
    pub detail: String,
    /// Address of the instruction that contributed the byte.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_address: Option<String>,
}

/// Expected resilience of a signature to binary updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    High,
    Medium,
    Low,
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stability::High => write!(f, "high"),
            Stability::Medium => write!(f, "medium"),
            Stability::Low => write!(f, "low"),
        }
    }
}

/// A generated signature variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSignature {
    /// Space-separated byte tokens, `??` for wildcards, e.g.
    /// `0F 84 ?? ?? ?? ?? 8B 8D`.
    pub pattern: String,
    /// `x`/`?` string with one character per pattern token.
    pub mask: String,
    /// Byte values with `None` at wildcard positions.
    pub bytes: Vec<Option<u8>>,
    /// Human-readable description of the strategy and rule set.
    pub description: String,
    /// Total token count.
    pub length: usize,
    /// Number of wildcarded tokens.
    pub wildcard_count: usize,
    /// Positions of wildcards within the pattern.
    pub wildcard_positions: Vec<usize>,
    /// Per-wildcard justification records.
    #[serde(default)]
    pub wildcard_reasons: Vec<WildcardReason>,
    /// Heuristic uniqueness in `[0, 1]`, two decimals.
    pub uniqueness_score: f64,
    /// Heuristic resilience rating.
    pub stability: Stability,
    /// Address of the first contributing instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_address: Option<String>,
    /// Address of the last contributing instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_address: Option<String>,
    /// Name of the strategy that produced this variant.
    #[serde(default)]
    pub strategy: String,
    /// Brief explanation of what was wildcarded and why.
    #[serde(default)]
    pub summary: String,
}

/// Statistics computed from a parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseStats {
    /// Number of parsed instructions.
    pub total: usize,
    /// Instruction counts per kind.
    pub by_kind: BTreeMap<String, usize>,
    /// Number of labels encountered.
    pub labeled: usize,
    /// Sum of instruction sizes.
    pub total_bytes: usize,
}

/// Bulk target selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkSelector {
    /// Every instruction.
    All,
    /// Every labeled instruction.
    AllLabeled,
    /// Every conditional or unconditional jump.
    AllJumps,
    /// Every call.
    AllCalls,
}

/// Target selection: explicit labels/addresses or a bulk selector.
///
/// On the wire this is either a JSON array of strings or one of the
/// literals `"all"`, `"all_labeled"`, `"all_jumps"`, `"all_calls"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSelection {
    /// One of the bulk literals.
    Bulk(BulkSelector),
    /// Explicit labels, addresses, or `jump@ADDR` / `call@ADDR` entries.
    List(Vec<String>),
}

impl Default for TargetSelection {
    fn default() -> Self {
        TargetSelection::Bulk(BulkSelector::AllLabeled)
    }
}

/// Listing format of parser input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingFormat {
    /// `ADDRESS | BYTES | MNEMONIC OPERANDS | COMMENT` debugger dumps.
    Pipe,
    /// `MODULE+OFFSET - BYTES - MNEMONIC OPERANDS` dumps.
    Dash,
    /// Raw whitespace-separated hex.
    Hex,
}

impl fmt::Display for ListingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingFormat::Pipe => write!(f, "pipe"),
            ListingFormat::Dash => write!(f, "dash"),
            ListingFormat::Hex => write!(f, "hex"),
        }
    }
}

/// Format hint accepted by the parser entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FormatHint {
    /// Detect the format from the first meaningful line.
    #[default]
    Auto,
    Pipe,
    Dash,
    Hex,
}

/// Result of parsing a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutput {
    /// Parsed and analyzed instructions, in listing order.
    pub instructions: Vec<Instruction>,
    /// Labels in order of appearance.
    pub labels: Vec<String>,
    /// The format that was detected (or explicitly requested).
    #[serde(rename = "detected_format")]
    pub format: ListingFormat,
    /// Module name, when the listing carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Parse statistics.
    pub stats: ParseStats,
}

/// Result of the analyze operation: statistics plus recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeOutput {
    /// Parse statistics.
    pub stats: ParseStats,
    /// Suggested targets: all labels, or up to ten `kind@ADDR` names.
    pub recommended_targets: Vec<String>,
    /// Detected listing format.
    pub format: ListingFormat,
    /// Module name, when the listing carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

/// Result of a generate operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOutput {
    /// Variants per target name.
    pub signatures: BTreeMap<String, Vec<GeneratedSignature>>,
    /// Number of targets that were resolved.
    pub targets_processed: usize,
    /// Total variant count over all targets.
    pub total_variants: usize,
}
