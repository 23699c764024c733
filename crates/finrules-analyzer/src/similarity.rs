//! Token-set similarity

use std::collections::HashSet;

/// Lowercase whitespace-separated tokens
pub fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|` of the token sets of `a` and `b`
///
/// Two empty texts have similarity 0.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a = tokens(a);
    let b = tokens(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_texts() {
        assert_eq!(jaccard_similarity("التحقق من الفاتورة", "التحقق من الفاتورة"), 1.0);
    }

    #[test]
    fn test_disjoint_texts() {
        assert_eq!(jaccard_similarity("صرف الراتب", "مطابقة الفاتورة"), 0.0);
    }

    #[test]
    fn test_case_and_spacing_ignored() {
        assert_eq!(jaccard_similarity("Verify  THE invoice", "verify the\tinvoice"), 1.0);
    }

    #[test]
    fn test_partial_overlap() {
        // {a, b} of {a, b, c, d}
        assert_eq!(jaccard_similarity("a b c", "a b d"), 0.5);
    }

    #[test]
    fn test_empty_texts() {
        assert_eq!(jaccard_similarity("", ""), 0.0);
        assert_eq!(jaccard_similarity("a", "  "), 0.0);
    }

    proptest! {
        /// Property: similarity is symmetric and within [0, 1]
        #[test]
        fn test_similarity_symmetric_and_bounded(a in "[a-e ]{0,30}", b in "[a-e ]{0,30}") {
            let ab = jaccard_similarity(&a, &b);
            prop_assert_eq!(ab, jaccard_similarity(&b, &a));
            prop_assert!((0.0..=1.0).contains(&ab));
        }
    }
}
