//! Documents - the regulations rules are mined from

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a document
///
/// Generated identifiers are UUIDv7-based, so they sort chronologically and
/// need no coordination between concurrent producers. Chunk ids embed the
/// document id, which keeps them globally unique.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate a fresh identifier of the form `doc_<uuidv7>`
    ///
    /// # Examples
    ///
    /// ```
    /// use finrules_domain::DocumentId;
    ///
    /// let id = DocumentId::generate();
    /// assert!(id.as_str().starts_with("doc_"));
    /// ```
    pub fn generate() -> Self {
        Self(format!("doc_{}", uuid::Uuid::now_v7().simple()))
    }

    /// Wrap a caller-supplied identifier
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of source a document comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// PDF file or URL
    Pdf,
    /// HTML page
    #[serde(alias = "web_page")]
    Web,
    /// Plain text (file or inline)
    Text,
}

impl DocumentType {
    /// Guess the type from a URL or file path
    ///
    /// A `.pdf` suffix wins; any other URL is a web page and any other path
    /// is plain text.
    pub fn detect(url: Option<&str>, file_path: Option<&str>) -> Self {
        if let Some(url) = url {
            if url.to_lowercase().ends_with(".pdf") {
                DocumentType::Pdf
            } else {
                DocumentType::Web
            }
        } else if let Some(path) = file_path {
            if path.to_lowercase().ends_with(".pdf") {
                DocumentType::Pdf
            } else {
                DocumentType::Text
            }
        } else {
            DocumentType::Text
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Web => "web",
            DocumentType::Text => "text",
        };
        f.write_str(s)
    }
}

/// Processing lifecycle of a document
///
/// `Pending → Processing → Indexed | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Created, not yet parsed
    Pending,
    /// Parser is running
    Processing,
    /// Content available
    Indexed,
    /// Parsing failed
    Failed,
}

/// Where the document content comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    /// Remote resource
    Url(String),
    /// Local file
    Path(String),
    /// Content supplied directly by the caller
    Inline(String),
}

/// Batch input entry: `{name, url | file_path | content, type?}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    /// Explicit identifier; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable document name
    pub name: String,

    /// Remote location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Local file location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Inline text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Document type; detected from `url`/`file_path` when absent
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
}

impl DocumentDescriptor {
    /// Descriptor for inline text content
    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: Some(content.into()),
            document_type: Some(DocumentType::Text),
            ..Self::default()
        }
    }

    /// Descriptor for a local file
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Set an explicit document id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Resolve the content source; URL takes precedence over path, path over inline content
    pub fn source(&self) -> Option<DocumentSource> {
        if let Some(url) = &self.url {
            Some(DocumentSource::Url(url.clone()))
        } else if let Some(path) = &self.file_path {
            Some(DocumentSource::Path(path.clone()))
        } else {
            self.content.clone().map(DocumentSource::Inline)
        }
    }
}

/// A document under processing
///
/// Content is populated by the parser and is immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier
    pub id: DocumentId,

    /// Human-readable name
    pub name: String,

    /// Where the content comes from
    pub source: Option<DocumentSource>,

    /// Source kind
    pub document_type: DocumentType,

    /// Parsed text content (empty until parsed)
    pub raw_content: String,

    /// Lifecycle status
    pub status: DocumentStatus,
}

impl Document {
    /// Create a pending document from a batch descriptor
    pub fn from_descriptor(descriptor: &DocumentDescriptor) -> Self {
        let id = descriptor
            .id
            .clone()
            .map(DocumentId::new)
            .unwrap_or_else(DocumentId::generate);
        let document_type = descriptor.document_type.unwrap_or_else(|| {
            DocumentType::detect(descriptor.url.as_deref(), descriptor.file_path.as_deref())
        });

        Self {
            id,
            name: descriptor.name.clone(),
            source: descriptor.source(),
            document_type,
            raw_content: String::new(),
            status: DocumentStatus::Pending,
        }
    }

    /// Source URL, if the document is remote
    pub fn url(&self) -> Option<&str> {
        match &self.source {
            Some(DocumentSource::Url(url)) => Some(url),
            _ => None,
        }
    }
}
