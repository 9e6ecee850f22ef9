//! Mnemonic classification and volatility assessment.
//!
//! The category table is a fixed, ordered enumeration. Several mnemonics
//! appear in more than one list (scalar SSE arithmetic is both
//! `arithmetic` and `float`, `movsd` is `mov`, `arithmetic`-adjacent and
//! `string`); lookup scans the table in declaration order and the first
//! match wins, so the ordering below is load-bearing.

use crate::types::{InstructionKind, Volatility, VolatilityLevel};

/// Ordered category table. Earlier entries win on overlap.
pub const CATEGORY_TABLE: &[(InstructionKind, &[&str])] = &[
    (
        InstructionKind::ConditionalJump,
        &[
            "je", "jne", "jz", "jnz", "ja", "jae", "jb", "jbe", "jg", "jge", "jl", "jle", "jo",
            "jno", "js", "jns", "jp", "jnp", "jpe", "jpo", "jecxz", "jcxz", "loop", "loope",
            "loopne", "loopz", "loopnz",
        ],
    ),
    (InstructionKind::UnconditionalJump, &["jmp"]),
    (InstructionKind::Call, &["call"]),
    (
        InstructionKind::Return,
        &["ret", "retn", "retf", "iret", "iretd"],
    ),
    (
        InstructionKind::Mov,
        &[
            "mov", "movzx", "movsx", "movss", "movsd", "movaps", "movups", "movdqa", "movdqu",
            "lea", "xchg", "cmove", "cmovne", "cmovz", "cmovnz", "cmova", "cmovae", "cmovb",
            "cmovbe", "cmovg", "cmovge", "cmovl", "cmovle", "cmovo", "cmovno", "cmovs", "cmovns",
            "cmovp", "cmovnp", "movsb", "movsw", "movsd", "movsq",
        ],
    ),
    (
        InstructionKind::Arithmetic,
        &[
            "add", "sub", "mul", "imul", "div", "idiv", "inc", "dec", "neg", "adc", "sbb", "addss",
            "subss", "mulss", "divss", "addsd", "subsd", "mulsd", "divsd",
        ],
    ),
    (
        InstructionKind::Logic,
        &[
            "and", "or", "xor", "not", "shl", "shr", "sal", "sar", "rol", "ror", "rcl", "rcr",
            "bt", "bts", "btr", "btc", "bsf", "bsr",
        ],
    ),
    (
        InstructionKind::Compare,
        &["cmp", "test", "comiss", "comisd", "ucomiss", "ucomisd"],
    ),
    (
        InstructionKind::Stack,
        &[
            "push", "pop", "pusha", "pushad", "popa", "popad", "pushf", "pushfd", "popf", "popfd",
            "enter", "leave",
        ],
    ),
    (
        InstructionKind::Float,
        &[
            "fld", "fst", "fstp", "fadd", "fsub", "fmul", "fdiv", "fcom", "fcomp", "fcompp",
            "fcomi", "fcomip", "fucomi", "fucomip", "fxch", "fild", "fist", "fistp", "finit",
            "fninit", "fstsw", "fnstsw", "fstcw", "fnstcw", "fldcw", "addss", "subss", "mulss",
            "divss", "addsd", "subsd", "mulsd", "divsd", "cvtsi2ss", "cvtsi2sd", "cvtss2si",
            "cvtsd2si", "cvtss2sd", "cvtsd2ss",
        ],
    ),
    (
        InstructionKind::String,
        &[
            "movs", "cmps", "scas", "lods", "stos", "rep", "repe", "repz", "repne", "repnz",
            "movsb", "movsw", "movsd", "cmpsb", "cmpsw", "cmpsd", "scasb", "scasw", "scasd",
            "lodsb", "lodsw", "lodsd", "stosb", "stosw", "stosd",
        ],
    ),
];

/// Classify a mnemonic into its instruction kind.
///
/// Lookup is case-insensitive and depends only on the lowercased
/// mnemonic. Unknown mnemonics classify as [`InstructionKind::Other`].
pub fn classify_mnemonic(mnemonic: &str) -> InstructionKind {
    let lower = mnemonic.to_lowercase();
    for (kind, mnemonics) in CATEGORY_TABLE {
        if mnemonics.contains(&lower.as_str()) {
            return *kind;
        }
    }
    InstructionKind::Other
}

/// Assess how likely the instruction's encoding is to change between
/// builds, from its kind and operand text.
///
/// Opcode bytes are considered stable for everything we classify; the
/// operand side is where relocation, stack layout and struct changes
/// show up.
pub fn assess_volatility(kind: InstructionKind, operands: &str) -> Volatility {
    let opcode = VolatilityLevel::Low;
    let mut operand = VolatilityLevel::Low;

    match kind {
        // Relative offsets move whenever code moves.
        InstructionKind::ConditionalJump | InstructionKind::UnconditionalJump
        | InstructionKind::Call => {
            operand = VolatilityLevel::High;
        }
        InstructionKind::Mov => {
            if operands.contains("ebp") || operands.contains("esp") {
                // Stack frame references.
                operand = VolatilityLevel::High;
            } else if operands.contains("ds:") || operands.contains('[') {
                if operands.contains('+') {
                    // Struct offsets.
                    operand = VolatilityLevel::Medium;
                } else {
                    // Global addresses.
                    operand = VolatilityLevel::High;
                }
            }
        }
        InstructionKind::Arithmetic => {
            if operands.chars().any(|c| c.is_ascii_digit()) {
                operand = VolatilityLevel::Medium;
            }
        }
        _ => {}
    }

    Volatility { opcode, operand }
}
