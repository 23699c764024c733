//! Obligation-pattern fallback extraction
//!
//! Used when the model is unavailable or its answer cannot be parsed. Each
//! pattern matches an Arabic obligation construction up to the next period.

use regex::Regex;

/// Matches shorter than this many characters are discarded as noise
pub const MIN_RULE_CHARS: usize = 20;

/// Obligation constructions recognised by the fallback
const OBLIGATION_PATTERNS: [&str; 5] = [
    // must ...
    r"يجب\s+[^.]*[.]",
    // not permitted ...
    r"لا\s+يجوز\s+[^.]*[.]",
    // it is required that ...
    r"يشترط\s+[^.]*[.]",
    // verify that ...
    r"التحقق\s+من\s+[^.]*[.]",
    // X is obliged to ...
    r"على\s+[^.]*\s+أن\s+[^.]*[.]",
];

/// Regex-based rule finder
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    patterns: Vec<Regex>,
}

impl PatternExtractor {
    /// Compile the obligation patterns
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = OBLIGATION_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Rule sentences found in `text`, in order of appearance
    ///
    /// A match contained in another match is dropped in favour of the
    /// outer one.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut spans: Vec<(usize, usize)> = self
            .patterns
            .iter()
            .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.end())))
            .collect();

        // Outer matches first: by start, then longest
        spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut kept: Vec<(usize, usize)> = Vec::new();
        for span in spans {
            let contained = kept.iter().any(|k| k.0 <= span.0 && span.1 <= k.1);
            if !contained {
                kept.push(span);
            }
        }

        kept.into_iter()
            .map(|(start, end)| text[start..end].trim().to_string())
            .filter(|rule| rule.chars().count() > MIN_RULE_CHARS)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> PatternExtractor {
        PatternExtractor::new().unwrap()
    }

    #[test]
    fn test_must_sentence_extracted_once() {
        let text = "يجب التحقق من أن مجموع الحسميات لا يتجاوز ثلث الراتب الأساسي.";
        assert_eq!(extractor().extract(text), vec![text.to_string()]);
    }

    #[test]
    fn test_each_construction_recognised() {
        let text = "مقدمة عامة. لا يجوز صرف أي مستخلص قبل اعتماده رسمياً. \
                    يشترط وجود عقد موقع من الطرفين قبل البدء. \
                    على الجهة المختصة أن تراجع الفواتير شهرياً.";
        let rules = extractor().extract(text);
        assert_eq!(rules.len(), 3);
        assert!(rules[0].starts_with("لا يجوز"));
        assert!(rules[1].starts_with("يشترط"));
        assert!(rules[2].starts_with("على الجهة"));
    }

    #[test]
    fn test_short_matches_discarded() {
        assert!(extractor().extract("يجب ذلك.").is_empty());
    }

    #[test]
    fn test_unterminated_sentence_ignored() {
        assert!(extractor().extract("يجب إرفاق جميع المستندات المطلوبة دون نقطة").is_empty());
    }

    #[test]
    fn test_no_patterns_in_plain_text() {
        assert!(extractor().extract("هذا نص وصفي لا يحتوي على أي التزام واضح.").is_empty());
    }
}
