//! Target resolution.
//!
//! Maps a [`TargetSelection`] onto concrete instruction indices with
//! display names. Explicit selectors that match nothing are skipped
//! silently; an empty overall result becomes an error only in the
//! operation envelopes.

use crate::types::{BulkSelector, Instruction, InstructionKind, TargetSelection};

/// A resolved target: instruction index plus display name.
pub type ResolvedTarget = (usize, String);

/// Resolve a target selection to instruction indices.
///
/// List selectors match on label or address (or, with a `jump@`/`call@`
/// prefix, on the address suffix); only the first matching instruction is
/// taken per selector, in selector order. Bulk selectors emit every
/// matching instruction with a synthesized name.
pub fn find_targets(
    instructions: &[Instruction],
    selection: &TargetSelection,
) -> Vec<ResolvedTarget> {
    let mut targets = Vec::new();

    match selection {
        TargetSelection::List(selectors) => {
            for selector in selectors {
                if let Some(stripped) = selector
                    .strip_prefix("jump@")
                    .or_else(|| selector.strip_prefix("call@"))
                {
                    if let Some(i) = instructions.iter().position(|inst| inst.address == stripped)
                    {
                        targets.push((i, selector.clone()));
                    }
                } else if let Some(i) = instructions
                    .iter()
                    .position(|inst| {
                        inst.label.as_deref() == Some(selector.as_str())
                            || inst.address == *selector
                    })
                {
                    let name = instructions[i]
                        .label
                        .clone()
                        .unwrap_or_else(|| instructions[i].address.clone());
                    targets.push((i, name));
                }
            }
        }
        TargetSelection::Bulk(BulkSelector::AllJumps) => {
            for (i, inst) in instructions.iter().enumerate() {
                if matches!(
                    inst.kind,
                    InstructionKind::ConditionalJump | InstructionKind::UnconditionalJump
                ) {
                    targets.push((i, named(inst, "jump")));
                }
            }
        }
        TargetSelection::Bulk(BulkSelector::AllCalls) => {
            for (i, inst) in instructions.iter().enumerate() {
                if inst.kind == InstructionKind::Call {
                    targets.push((i, named(inst, "call")));
                }
            }
        }
        TargetSelection::Bulk(BulkSelector::AllLabeled) => {
            for (i, inst) in instructions.iter().enumerate() {
                if let Some(ref label) = inst.label {
                    targets.push((i, label.clone()));
                }
            }
        }
        TargetSelection::Bulk(BulkSelector::All) => {
            for (i, inst) in instructions.iter().enumerate() {
                targets.push((i, named(inst, "inst")));
            }
        }
    }

    targets
}

/// Label when present, else `prefix_ADDRESS`.
fn named(inst: &Instruction, prefix: &str) -> String {
    inst.label
        .clone()
        .unwrap_or_else(|| format!("{}_{}", prefix, inst.address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::sample_instructions;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_label_selector() {
        let instructions = sample_instructions();
        let targets = find_targets(
            &instructions,
            &TargetSelection::List(vec!["Lawnmower_B".into()]),
        );
        assert_eq!(targets, vec![(10, "Lawnmower_B".to_string())]);
    }

    #[test]
    fn test_address_selector() {
        let instructions = sample_instructions();
        let targets = find_targets(
            &instructions,
            &TargetSelection::List(vec!["00B27ABC".into()]),
        );
        // Unlabeled instruction resolves under its address.
        assert_eq!(targets, vec![(2, "00B27ABC".to_string())]);
    }

    #[test]
    fn test_prefixed_selector() {
        let instructions = sample_instructions();
        let targets = find_targets(
            &instructions,
            &TargetSelection::List(vec!["jump@00B27AE1".into()]),
        );
        assert_eq!(targets, vec![(10, "jump@00B27AE1".to_string())]);
    }

    #[test]
    fn test_unknown_selector_skipped() {
        let instructions = sample_instructions();
        let targets = find_targets(
            &instructions,
            &TargetSelection::List(vec!["NoSuchLabel".into(), "Lawnmower_A".into()]),
        );
        assert_eq!(targets, vec![(0, "Lawnmower_A".to_string())]);
    }

    #[test]
    fn test_all_jumps() {
        let instructions = sample_instructions();
        let targets = find_targets(&instructions, &TargetSelection::Bulk(BulkSelector::AllJumps));
        // Labeled jumps keep their labels.
        assert_eq!(
            targets,
            vec![
                (0, "Lawnmower_A".to_string()),
                (10, "Lawnmower_B".to_string())
            ]
        );
    }

    #[test]
    fn test_all_labeled() {
        let instructions = sample_instructions();
        let targets =
            find_targets(&instructions, &TargetSelection::Bulk(BulkSelector::AllLabeled));
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_all_synthesizes_names() {
        let instructions = sample_instructions();
        let targets = find_targets(&instructions, &TargetSelection::Bulk(BulkSelector::All));
        assert_eq!(targets.len(), instructions.len());
        assert_eq!(targets[1].1, "inst_00B27AB6");
    }
}
