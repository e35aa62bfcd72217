//! Input documents as handed over by the upload/extraction layer.

use serde::{Deserialize, Serialize};

/// Caller-assigned document identifier.
pub type DocumentId = String;

/// Document format, derived from the media type or file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Portable Document Format.
    Pdf,
    /// Word document.
    Docx,
    /// Plain text.
    Txt,
    /// HTML markup.
    Html,
    /// Raster image (photo, screenshot).
    Image,
    /// Output of a document scanner.
    Scan,
    /// Anything else.
    Other,
}

impl MediaKind {
    /// Resolve the kind from a MIME type, falling back to the file extension.
    #[must_use]
    pub fn detect(media_type: &str, file_name: &str) -> Self {
        let kind = Self::from_media_type(media_type);
        if kind == Self::Other {
            Self::from_extension(file_name)
        } else {
            kind
        }
    }

    /// Map a MIME type to a kind.
    #[must_use]
    pub fn from_media_type(media_type: &str) -> Self {
        let media_type = media_type.trim().to_ascii_lowercase();
        match media_type.as_str() {
            "application/pdf" => Self::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/msword" => Self::Docx,
            "text/plain" | "text/markdown" => Self::Txt,
            "text/html" | "application/xhtml+xml" => Self::Html,
            "application/x-scan" | "image/x-scan" => Self::Scan,
            m if m.starts_with("image/") => Self::Image,
            _ => Self::Other,
        }
    }

    /// Map a file extension to a kind.
    #[must_use]
    pub fn from_extension(file_name: &str) -> Self {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Self::Pdf,
            "docx" | "doc" => Self::Docx,
            "txt" | "md" => Self::Txt,
            "html" | "htm" => Self::Html,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => Self::Image,
            "tif" | "tiff" => Self::Scan,
            _ => Self::Other,
        }
    }

    /// Complexity contributed by the format itself.
    #[must_use]
    pub const fn base_complexity(self) -> f64 {
        match self {
            Self::Pdf => 0.5,
            Self::Docx => 0.3,
            Self::Txt => 0.1,
            Self::Html => 0.2,
            Self::Image => 0.8,
            Self::Scan => 0.9,
            Self::Other => 0.5,
        }
    }

    /// Whether the format is cheap, text-like content.
    #[must_use]
    pub const fn is_text_like(self) -> bool {
        matches!(self, Self::Txt | Self::Html)
    }

    /// Whether the format is an image that needs recognition.
    #[must_use]
    pub const fn is_image(self) -> bool {
        matches!(self, Self::Image | Self::Scan)
    }
}

/// Three-step rating used for importance and legal complexity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Low.
    #[default]
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
}

/// Optional hints supplied with a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentFlags {
    /// Text must be recognized from images.
    pub requires_ocr: bool,
    /// Multi-column or otherwise irregular layout.
    pub has_complex_layout: bool,
    /// Contains tables.
    pub has_tables: bool,
    /// Contains embedded images.
    pub has_images: bool,
    /// Caller flagged the document as urgent.
    pub urgent: bool,
    /// Other documents depend on this one.
    pub has_dependencies: bool,
    /// Business importance.
    pub importance: Level,
    /// Legal complexity of the content.
    pub legal_complexity: Level,
}

/// A submitted document. Treated as immutable once handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, unique within a run.
    pub id: DocumentId,
    /// Display name, usually the file name.
    pub name: String,
    /// MIME type as reported by the upload layer.
    pub media_type: String,
    /// Size in bytes; `None` when the upload layer could not determine it.
    pub size_bytes: Option<u64>,
    /// Last modification time in milliseconds since the epoch.
    pub last_modified_ms: Option<u128>,
    /// Raw or previously extracted content.
    pub content: Option<String>,
    /// Processing hints.
    #[serde(default)]
    pub flags: DocumentFlags,
}

impl Document {
    /// Create a document with no content and default flags.
    pub fn new(
        id: impl Into<DocumentId>,
        name: impl Into<String>,
        media_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            media_type: media_type.into(),
            size_bytes: Some(size_bytes),
            last_modified_ms: None,
            content: None,
            flags: DocumentFlags::default(),
        }
    }

    /// Replace the processing hints.
    #[must_use]
    pub fn with_flags(mut self, flags: DocumentFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Attach content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the modification timestamp.
    #[must_use]
    pub const fn with_last_modified(mut self, last_modified_ms: u128) -> Self {
        self.last_modified_ms = Some(last_modified_ms);
        self
    }

    /// Mark the document as needing OCR.
    #[must_use]
    pub const fn requiring_ocr(mut self) -> Self {
        self.flags.requires_ocr = true;
        self
    }

    /// Format of the document.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        MediaKind::detect(&self.media_type, &self.name)
    }
}
