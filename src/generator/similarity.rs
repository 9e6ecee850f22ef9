//! Pattern similarity and near-duplicate suppression.
//!
//! The strategy matrix produces many overlapping candidates; patterns
//! that only differ in a couple of tokens add no search power. Similarity
//! is computed token-wise and a greedy pass keeps a candidate only when
//! it is sufficiently different from everything already kept.

use crate::types::GeneratedSignature;

/// Token-wise similarity of two patterns in `[0, 1]`.
///
/// Equal tokens count 1.0, a wildcard on either side counts 0.5, anything
/// else 0. The shorter pattern is padded with wildcards, and the sum is
/// divided by the longer token count.
pub fn pattern_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();

    let max_len = tokens_a.len().max(tokens_b.len());
    if max_len == 0 {
        return 1.0;
    }

    let mut matches = 0.0;
    for i in 0..max_len {
        let ta = tokens_a.get(i).copied().unwrap_or("??");
        let tb = tokens_b.get(i).copied().unwrap_or("??");
        if ta == tb {
            matches += 1.0;
        } else if ta == "??" || tb == "??" {
            matches += 0.5;
        }
    }

    matches / max_len as f64
}

/// Greedy near-duplicate suppression.
///
/// Scans candidates in order; a candidate survives when its similarity to
/// every already-kept candidate stays within `1 - threshold`. The first
/// candidate is always kept.
pub fn deduplicate(
    variants: Vec<GeneratedSignature>,
    threshold: f64,
) -> Vec<GeneratedSignature> {
    let mut unique: Vec<GeneratedSignature> = Vec::with_capacity(variants.len());

    for candidate in variants {
        let is_duplicate = unique
            .iter()
            .any(|kept| pattern_similarity(&candidate.pattern, &kept.pattern) > 1.0 - threshold);
        if !is_duplicate {
            unique.push(candidate);
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_patterns() {
        assert_eq!(pattern_similarity("0F 84 ?? ??", "0F 84 ?? ??"), 1.0);
    }

    #[test]
    fn test_one_token_differs() {
        // Six exact matches out of seven tokens.
        let sim = pattern_similarity("0F 84 ?? ?? ?? ?? 8B", "0F 84 ?? ?? ?? ?? 8C");
        assert!((sim - 6.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_wildcard_partial_match() {
        // One exact match + one half match over two tokens.
        let sim = pattern_similarity("0F 84", "0F ??");
        assert!((sim - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_length_mismatch_pads_with_wildcards() {
        // Shorter side is padded: "0F" vs "0F 84" => (1 + 0.5) / 2.
        let sim = pattern_similarity("0F", "0F 84");
        assert!((sim - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_patterns_are_identical() {
        assert_eq!(pattern_similarity("", ""), 1.0);
    }

    fn sig(pattern: &str) -> GeneratedSignature {
        GeneratedSignature {
            pattern: pattern.to_string(),
            mask: String::new(),
            bytes: Vec::new(),
            description: String::new(),
            length: pattern.split_whitespace().count(),
            wildcard_count: 0,
            wildcard_positions: Vec::new(),
            wildcard_reasons: Vec::new(),
            uniqueness_score: 0.5,
            stability: crate::types::Stability::Medium,
            start_address: None,
            end_address: None,
            strategy: String::new(),
            summary: String::new(),
        }
    }

    #[test]
    fn test_dedup_drops_near_duplicate() {
        // 6/7 similarity is above the 0.75 cutoff, so the second is dropped.
        let kept = deduplicate(
            vec![
                sig("0F 84 ?? ?? ?? ?? 8B"),
                sig("0F 84 ?? ?? ?? ?? 8C"),
            ],
            0.25,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].pattern, "0F 84 ?? ?? ?? ?? 8B");
    }

    #[test]
    fn test_dedup_keeps_distinct() {
        let kept = deduplicate(
            vec![
                sig("0F 84 ?? ?? ?? ?? 8B"),
                sig("55 8B EC 83 E4 F8 51"),
            ],
            0.25,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_dedup_preserves_order() {
        let kept = deduplicate(
            vec![sig("AA BB"), sig("CC DD"), sig("AA BB")],
            0.25,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].pattern, "AA BB");
        assert_eq!(kept[1].pattern, "CC DD");
    }

    #[quickcheck_macros::quickcheck]
    fn prop_similarity_bounded_and_symmetric(a: Vec<Option<u8>>, b: Vec<Option<u8>>) -> bool {
        let pa = crate::generator::render_pattern(&a);
        let pb = crate::generator::render_pattern(&b);
        let ab = pattern_similarity(&pa, &pb);
        let ba = pattern_similarity(&pb, &pa);
        (0.0..=1.0).contains(&ab) && (ab - ba).abs() < 1e-9
    }

    #[quickcheck_macros::quickcheck]
    fn prop_self_similarity_is_one(a: Vec<Option<u8>>) -> bool {
        let pa = crate::generator::render_pattern(&a);
        (pattern_similarity(&pa, &pa) - 1.0).abs() < 1e-9
    }
}
