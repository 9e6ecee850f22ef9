//! x86-32 encoding analysis: which bytes of an instruction hold values
//! that drift between builds.
//!
//! The analyzers here are deliberately narrow. They do not decode full
//! instructions; they recognize the handful of encoding shapes whose
//! operand bytes are known to be volatile (relative control transfers,
//! ModR/M displacements, moffs32 forms, trailing immediates) and report
//! the byte offsets covering those fields. Offsets are always relative to
//! the start of the instruction and clamped to its length.

use crate::types::Instruction;

/// Opcode groups used by the analyzers.
pub mod opcodes {
    /// Short JMP rel8.
    pub const JMP_SHORT: u8 = 0xEB;
    /// CALL rel32.
    pub const CALL_NEAR: u8 = 0xE8;
    /// JMP rel32.
    pub const JMP_NEAR: u8 = 0xE9;
    /// Two-byte escape.
    pub const TWO_BYTE: u8 = 0x0F;
    /// MOV EAX, moffs32.
    pub const MOV_EAX_MOFFS: u8 = 0xA1;
    /// MOV moffs32, EAX.
    pub const MOV_MOFFS_EAX: u8 = 0xA3;

    /// Opcodes followed by a single-byte relative offset: JMP short,
    /// Jcc short, and the LOOP/JECXZ family.
    pub const SHORT_JUMPS: &[u8] = &[
        0xEB, // JMP short
        0x70, 0x71, 0x72, 0x73, 0x74, 0x75, 0x76, 0x77, // Jcc short
        0x78, 0x79, 0x7A, 0x7B, 0x7C, 0x7D, 0x7E, 0x7F, // Jcc short
        0xE0, 0xE1, 0xE2, 0xE3, // LOOPNE, LOOPE, LOOP, JECXZ
    ];

    /// Mandatory/legacy prefixes the ModR/M locator must skip.
    pub const MODRM_PREFIXES: &[u8] = &[0xF2, 0xF3, 0x66];

    /// Second byte of a near conditional jump (0F 80..0F 8F).
    pub fn is_near_jcc(byte: u8) -> bool {
        (0x80..=0x8F).contains(&byte)
    }
}

/// Mnemonics whose trailing bytes are treated as immediates when the
/// second operand is a literal.
const IMMEDIATE_MNEMONICS: &[&str] = &["add", "sub", "cmp", "and", "or", "xor", "test"];

/// Compute the primary wildcard positions for an instruction.
///
/// This is the always-on set stored on [`Instruction::wildcard_positions`]:
/// relative jump/call offsets, stack-frame displacements (when the operand
/// text references `ebp`/`esp`), and absolute addresses (when it
/// references `ds:[...]`). Immediate and struct-offset positions are
/// computed on demand by the generator when those rules are enabled.
pub fn analyze_wildcard_positions(bytes: &[u8], operands: &str) -> Vec<usize> {
    let mut positions = Vec::new();

    let Some(&first) = bytes.first() else {
        return positions;
    };

    // Relative control transfers.
    if opcodes::SHORT_JUMPS.contains(&first) && bytes.len() == 2 {
        positions.push(1);
    } else if (first == opcodes::CALL_NEAR || first == opcodes::JMP_NEAR) && bytes.len() == 5 {
        positions.extend(1..5);
    } else if first == opcodes::TWO_BYTE && bytes.len() >= 2 {
        if opcodes::is_near_jcc(bytes[1]) && bytes.len() == 6 {
            positions.extend(2..6);
        }
    }

    // Memory references.
    if operands.contains("ebp") || operands.contains("esp") {
        positions.extend(stack_displacement_positions(bytes));
    } else if operands.contains("ds:[") || (operands.contains("ds:") && operands.contains('[')) {
        positions.extend(global_address_positions(bytes));
    }

    positions.sort_unstable();
    positions.dedup();
    positions
}

/// Locate the ModR/M byte and return the offsets of its displacement.
///
/// Walks past a two-byte escape (`0F`) or a mandatory prefix (`F2`/`F3`/
/// `66`, optionally followed by `0F`), decodes mod/rm, accounts for a SIB
/// byte (mod != 3, rm == 4), and reports 1 byte for mod == 1, 4 bytes for
/// mod == 2 or the absolute `[disp32]` case (mod == 0, rm == 5). Offsets
/// past the end of the instruction are dropped.
pub fn stack_displacement_positions(bytes: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();

    if bytes.len() < 3 {
        return positions;
    }

    let mut modrm_idx = 1;
    if bytes[0] == opcodes::TWO_BYTE {
        modrm_idx = 2;
    }
    if opcodes::MODRM_PREFIXES.contains(&bytes[0]) {
        modrm_idx = 2;
        if bytes.len() > 2 && bytes[1] == opcodes::TWO_BYTE {
            modrm_idx = 3;
        }
    }

    if modrm_idx >= bytes.len() {
        return positions;
    }

    let modrm = bytes[modrm_idx];
    let mod_bits = (modrm >> 6) & 0x03;
    let rm = modrm & 0x07;

    let mut disp_start = modrm_idx + 1;
    // SIB byte pushes the displacement one byte further.
    if mod_bits != 3 && rm == 4 {
        disp_start += 1;
    }

    let disp_len = match (mod_bits, rm) {
        (1, _) => 1,
        (2, _) => 4,
        (0, 5) => 4, // [disp32] without base
        _ => 0,
    };

    for i in 0..disp_len {
        if disp_start + i < bytes.len() {
            positions.push(disp_start + i);
        }
    }

    positions
}

/// Byte offsets covering an absolute/global address.
///
/// Recognizes the moffs32 forms (`A1`/`A3` + 4-byte address) and ModR/M
/// encodings with mod == 0, rm == 5 (`MOV reg, [disp32]` and friends).
pub fn global_address_positions(bytes: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();

    let Some(&first) = bytes.first() else {
        return positions;
    };

    if (first == opcodes::MOV_EAX_MOFFS || first == opcodes::MOV_MOFFS_EAX) && bytes.len() == 5 {
        positions.extend(1..5);
        return positions;
    }

    if bytes.len() >= 6 {
        let modrm_idx = if first == opcodes::TWO_BYTE { 2 } else { 1 };
        if modrm_idx < bytes.len() {
            let modrm = bytes[modrm_idx];
            let mod_bits = (modrm >> 6) & 0x03;
            let rm = modrm & 0x07;
            if mod_bits == 0 && rm == 5 {
                let disp_start = modrm_idx + 1;
                for i in 0..4 {
                    if disp_start + i < bytes.len() {
                        positions.push(disp_start + i);
                    }
                }
            }
        }
    }

    positions
}

/// Best-effort byte offsets of an immediate operand.
///
/// Only attempted for the common arithmetic/logic mnemonics with a
/// literal second operand (starts with a digit, `0x`, or `-`). The
/// immediate is assumed to sit at the end of the encoding: 4 bytes when
/// the instruction is 6+ bytes, 1 byte when it is 3+.
pub fn immediate_positions(bytes: &[u8], mnemonic: &str, operands: &str) -> Vec<usize> {
    let mut positions = Vec::new();

    if !IMMEDIATE_MNEMONICS.contains(&mnemonic) {
        return positions;
    }

    let parts: Vec<&str> = operands.split(',').collect();
    if parts.len() != 2 {
        return positions;
    }
    let imm = parts[1].trim();
    let looks_immediate = imm.starts_with(|c: char| c.is_ascii_digit())
        || imm.starts_with("0x")
        || imm.starts_with('-');
    if !looks_immediate {
        return positions;
    }

    if bytes.len() >= 6 {
        positions.extend(bytes.len() - 4..bytes.len());
    } else if bytes.len() >= 3 {
        positions.push(bytes.len() - 1);
    }

    positions
}

/// Byte offsets of a `[reg+offset]` structure-field displacement.
///
/// Applies to operand text containing `[` and `+` without `ebp`/`esp`
/// (those are stack frames, handled separately); the displacement is
/// located with the same ModR/M walk as stack displacements.
pub fn struct_offset_positions(bytes: &[u8], operands: &str) -> Vec<usize> {
    if operands.contains('[')
        && operands.contains('+')
        && !operands.contains("ebp")
        && !operands.contains("esp")
    {
        stack_displacement_positions(bytes)
    } else {
        Vec::new()
    }
}

/// Per-instruction position sets the generator's rules draw from.
///
/// Computed once per instruction per window so the byte loop does not
/// re-run the decoders for every byte.
#[derive(Debug, Clone, Default)]
pub struct PositionSets {
    pub stack: Vec<usize>,
    pub global: Vec<usize>,
    pub immediate: Vec<usize>,
    pub struct_offset: Vec<usize>,
}

impl PositionSets {
    /// Compute all rule position sets for one instruction.
    pub fn for_instruction(inst: &Instruction) -> Self {
        Self {
            stack: stack_displacement_positions(&inst.bytes),
            global: global_address_positions(&inst.bytes),
            immediate: immediate_positions(&inst.bytes, &inst.mnemonic, inst.operand_text()),
            struct_offset: struct_offset_positions(&inst.bytes, inst.operand_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_jump() {
        // JE short (74 xx)
        assert_eq!(analyze_wildcard_positions(&[0x74, 0x1C], ""), vec![1]);
        // JMP short
        assert_eq!(analyze_wildcard_positions(&[0xEB, 0xFE], ""), vec![1]);
        // LOOP
        assert_eq!(analyze_wildcard_positions(&[0xE2, 0xF0], ""), vec![1]);
    }

    #[test]
    fn test_near_call_and_jump() {
        assert_eq!(
            analyze_wildcard_positions(&[0xE8, 0x12, 0x34, 0x56, 0x78], ""),
            vec![1, 2, 3, 4]
        );
        assert_eq!(
            analyze_wildcard_positions(&[0xE9, 0x00, 0x01, 0x00, 0x00], ""),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_near_conditional_jump() {
        // JE near: 0F 84 + rel32
        assert_eq!(
            analyze_wildcard_positions(&[0x0F, 0x84, 0x79, 0x05, 0x00, 0x00], ""),
            vec![2, 3, 4, 5]
        );
        // Truncated encoding gets nothing.
        assert_eq!(analyze_wildcard_positions(&[0x0F, 0x84, 0x79], ""), Vec::<usize>::new());
    }

    #[test]
    fn test_stack_displacement_disp32() {
        // mov ecx, dword ptr ss:[ebp-1D4]: ModR/M 8D => mod=2, rm=5,
        // 4-byte displacement at offset 2.
        let bytes = [0x8B, 0x8D, 0x2C, 0xFE, 0xFF, 0xFF];
        assert_eq!(
            analyze_wildcard_positions(&bytes, "ecx,dword ptr ss:[ebp-1D4]"),
            vec![2, 3, 4, 5]
        );
    }

    #[test]
    fn test_stack_displacement_disp8() {
        // mov eax, [ebp-8]: ModR/M 45 => mod=1, rm=5, 1-byte displacement.
        let bytes = [0x8B, 0x45, 0xF8];
        assert_eq!(
            stack_displacement_positions(&bytes),
            vec![2]
        );
    }

    #[test]
    fn test_stack_displacement_sib() {
        // mov eax, [esp+8]: ModR/M 44 (mod=1, rm=4) + SIB 24, disp after SIB.
        let bytes = [0x8B, 0x44, 0x24, 0x08];
        assert_eq!(stack_displacement_positions(&bytes), vec![3]);
    }

    #[test]
    fn test_prefixed_modrm_walk() {
        // movss xmm0, [ebp-4]: F3 0F 10 45 FC => ModR/M at 3, disp8 at 4.
        let bytes = [0xF3, 0x0F, 0x10, 0x45, 0xFC];
        assert_eq!(stack_displacement_positions(&bytes), vec![4]);
    }

    #[test]
    fn test_moffs_global() {
        assert_eq!(
            analyze_wildcard_positions(&[0xA1, 0x40, 0xEF, 0x57, 0x00], "eax,ds:[0057EF40]"),
            vec![1, 2, 3, 4]
        );
        assert_eq!(
            global_address_positions(&[0xA3, 0x40, 0xEF, 0x57, 0x00]),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_modrm_global() {
        // mov ecx, [disp32]: 8B 0D => mod=0, rm=5.
        let bytes = [0x8B, 0x0D, 0x40, 0xEF, 0x57, 0x00];
        assert_eq!(global_address_positions(&bytes), vec![2, 3, 4, 5]);
        assert_eq!(
            analyze_wildcard_positions(&bytes, "ecx,ds:[0057EF40]"),
            vec![2, 3, 4, 5]
        );
    }

    #[test]
    fn test_immediates() {
        // add ecx, 6CC: 81 C1 CC 06 00 00 (6 bytes => trailing imm32)
        let bytes = [0x81, 0xC1, 0xCC, 0x06, 0x00, 0x00];
        assert_eq!(
            immediate_positions(&bytes, "add", "ecx,6CC"),
            vec![2, 3, 4, 5]
        );
        // cmp dword ptr ds:[ecx],1: 83 39 01 (3 bytes => trailing imm8)
        let bytes = [0x83, 0x39, 0x01];
        assert_eq!(
            immediate_positions(&bytes, "cmp", "dword ptr ds:[ecx],1"),
            vec![2]
        );
        // Register-register operands are not immediates.
        assert_eq!(immediate_positions(&[0x2B, 0xCA], "sub", "ecx,edx"), Vec::<usize>::new());
        // Unrelated mnemonics never match.
        assert_eq!(
            immediate_positions(&[0xB8, 0x01, 0x00, 0x00, 0x00], "mov", "eax,1"),
            Vec::<usize>::new()
        );
    }

    #[test]
    fn test_struct_offsets() {
        // mov eax, [ecx+2EC]: 8B 81 EC 02 00 00 => mod=2, 4-byte disp.
        let bytes = [0x8B, 0x81, 0xEC, 0x02, 0x00, 0x00];
        assert_eq!(
            struct_offset_positions(&bytes, "eax,dword ptr ds:[ecx+2EC]"),
            vec![2, 3, 4, 5]
        );
        // Stack frames are excluded.
        assert_eq!(
            struct_offset_positions(&[0x8B, 0x45, 0xF8], "eax,dword ptr ss:[ebp+8]"),
            Vec::<usize>::new()
        );
    }

    #[test]
    fn test_positions_in_range() {
        // Clamping: a claimed disp32 truncated by the listing only yields
        // offsets inside the instruction.
        let bytes = [0x8B, 0x8D, 0x2C, 0xFE];
        for p in stack_displacement_positions(&bytes) {
            assert!(p < bytes.len());
        }
    }

    #[quickcheck_macros::quickcheck]
    fn prop_primary_positions_in_range(bytes: Vec<u8>, operands: String) -> bool {
        analyze_wildcard_positions(&bytes, &operands)
            .iter()
            .all(|&p| p < bytes.len())
    }

    #[quickcheck_macros::quickcheck]
    fn prop_rule_positions_in_range(bytes: Vec<u8>, operands: String) -> bool {
        let in_range = |ps: Vec<usize>| ps.iter().all(|&p| p < bytes.len());
        in_range(stack_displacement_positions(&bytes))
            && in_range(global_address_positions(&bytes))
            && in_range(immediate_positions(&bytes, "cmp", &operands))
            && in_range(struct_offset_positions(&bytes, &operands))
    }

    #[quickcheck_macros::quickcheck]
    fn prop_primary_positions_sorted_unique(bytes: Vec<u8>, operands: String) -> bool {
        let positions = analyze_wildcard_positions(&bytes, &operands);
        positions.windows(2).all(|w| w[0] < w[1])
    }
}
