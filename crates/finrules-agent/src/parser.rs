//! Plain-text document parser
//!
//! Handles inline content and local text files. PDF and web sources need an
//! external converter and are reported as unsupported.

use finrules_domain::traits::{DocumentParser, ParseError};
use finrules_domain::{Document, DocumentSource, DocumentType};
use regex::Regex;
use tracing::debug;

/// Parser for text documents with whitespace normalization
pub struct TextParser {
    blank_lines: Regex,
    spaces: Regex,
    rules: Regex,
}

impl TextParser {
    /// Compile the cleaning patterns
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            blank_lines: Regex::new(r"\n\s*\n")?,
            spaces: Regex::new(r" +")?,
            rules: Regex::new(r"[-_]{4,}")?,
        })
    }

    /// Collapse blank-line runs and repeated spaces, drop separator lines, trim
    pub fn clean_text(&self, text: &str) -> String {
        let text = self.blank_lines.replace_all(text, "\n\n");
        let text = self.spaces.replace_all(&text, " ");
        let text = self.rules.replace_all(&text, "");
        text.trim().to_string()
    }
}

impl DocumentParser for TextParser {
    fn parse(&self, document: &Document) -> Result<String, ParseError> {
        let raw = match &document.source {
            None => return Err(ParseError::MissingSource),
            Some(DocumentSource::Url(url)) => {
                return Err(ParseError::Unsupported(format!("remote document {}", url)));
            }
            Some(DocumentSource::Path(path)) if document.document_type == DocumentType::Pdf => {
                return Err(ParseError::Unsupported(format!("pdf file {}", path)));
            }
            Some(DocumentSource::Path(path)) => {
                std::fs::read_to_string(path).map_err(|e| ParseError::Io(format!("{}: {}", path, e)))?
            }
            Some(DocumentSource::Inline(content)) => content.clone(),
        };

        let cleaned = self.clean_text(&raw);
        if cleaned.is_empty() {
            return Err(ParseError::Empty);
        }

        debug!(
            "Parsed '{}': {} chars ({} before cleaning)",
            document.name,
            cleaned.chars().count(),
            raw.chars().count()
        );
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finrules_domain::DocumentDescriptor;

    fn parse(descriptor: DocumentDescriptor) -> Result<String, ParseError> {
        TextParser::new().unwrap().parse(&Document::from_descriptor(&descriptor))
    }

    #[test]
    fn test_clean_text() {
        let parser = TextParser::new().unwrap();
        let cleaned = parser.clean_text("  المادة  الأولى\n\n\n  \nنص   المادة\n------\n");
        assert_eq!(cleaned, "المادة الأولى\n\nنص المادة");
    }

    #[test]
    fn test_inline_content() {
        let text = parse(DocumentDescriptor::inline("نظام", "يجب  الالتزام.")).unwrap();
        assert_eq!(text, "يجب الالتزام.");
    }

    #[test]
    fn test_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.txt");
        std::fs::write(&path, "سطر أول\n\n\nسطر ثان").unwrap();

        let text = parse(DocumentDescriptor::file("policy", path.to_string_lossy())).unwrap();
        assert_eq!(text, "سطر أول\n\nسطر ثان");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = parse(DocumentDescriptor::file("gone", "/nonexistent/finrules/policy.txt"));
        assert!(matches!(result, Err(ParseError::Io(_))));
    }

    #[test]
    fn test_unsupported_sources() {
        let pdf = parse(DocumentDescriptor::file("scan", "/tmp/scan.pdf"));
        assert!(matches!(pdf, Err(ParseError::Unsupported(_))));

        let web = parse(DocumentDescriptor {
            name: "web".to_string(),
            url: Some("https://example.gov/regulation".to_string()),
            ..DocumentDescriptor::default()
        });
        assert!(matches!(web, Err(ParseError::Unsupported(_))));
    }

    #[test]
    fn test_missing_and_empty() {
        let missing = parse(DocumentDescriptor {
            name: "nothing".to_string(),
            ..DocumentDescriptor::default()
        });
        assert_eq!(missing, Err(ParseError::MissingSource));

        assert_eq!(parse(DocumentDescriptor::inline("blank", "  \n----\n ")), Err(ParseError::Empty));
    }
}
