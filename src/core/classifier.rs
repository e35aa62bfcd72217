//! Work item classification: processing type, complexity, priority and
//! cache fingerprint for each submitted document.
//!
//! Classification is pure. Scores are additive, clamped to `[0, 1]` and
//! rounded to two decimals so threshold checks are exact.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::document::{Document, DocumentId, Level, MediaKind};

const MB: u64 = 1024 * 1024;

/// How a document will be processed. Drives batch size and cost estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingType {
    /// Born-digital document with an extractable text layer.
    Electronic,
    /// Image-based document that needs OCR.
    Scanned,
    /// Plain text or markup.
    Text,
    /// Very large or structurally complex document.
    Complex,
}

impl ProcessingType {
    /// All processing types in batching order.
    pub const ALL: [Self; 4] = [Self::Electronic, Self::Scanned, Self::Text, Self::Complex];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Electronic => "electronic",
            Self::Scanned => "scanned",
            Self::Text => "text",
            Self::Complex => "complex",
        }
    }

    const fn base_item_millis(self) -> u64 {
        match self {
            Self::Electronic => 2_000,
            Self::Scanned => 8_000,
            Self::Text => 500,
            Self::Complex => 5_000,
        }
    }

    const fn base_item_memory_mb(self) -> f64 {
        match self {
            Self::Electronic => 20.0,
            Self::Scanned => 80.0,
            Self::Text => 5.0,
            Self::Complex => 50.0,
        }
    }

    /// Expected processing time for one item of this type.
    #[must_use]
    pub fn estimate_duration(self, item: &ClassifiedItem) -> Duration {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (self.base_item_millis() as f64 * (1.0 + item.complexity_score)).round() as u64;
        Duration::from_millis(millis)
    }

    /// Expected peak memory for one item of this type, in MB.
    #[must_use]
    pub fn estimate_memory_mb(self, item: &ClassifiedItem) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let size_mb = item.document.size_bytes.unwrap_or(0) as f64 / MB as f64;
        size_mb.mul_add(2.0, self.base_item_memory_mb())
    }
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse size bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeCategory {
    /// Under 1 MiB.
    Small,
    /// 1 MiB up to 10 MiB.
    Medium,
    /// 10 MiB up to 50 MiB.
    Large,
    /// 50 MiB and above, or unknown.
    VeryLarge,
}

impl SizeCategory {
    /// Bucket for a byte size.
    #[must_use]
    pub const fn from_size(size_bytes: u64) -> Self {
        if size_bytes < MB {
            Self::Small
        } else if size_bytes < 10 * MB {
            Self::Medium
        } else if size_bytes < 50 * MB {
            Self::Large
        } else {
            Self::VeryLarge
        }
    }
}

/// Stable cache key derived from identity, media type, size and modification time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a document.
    #[must_use]
    pub fn of(document: &Document) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(document.id.as_bytes());
        hasher.update(b"|");
        hasher.update(document.media_type.trim().to_ascii_lowercase().as_bytes());
        hasher.update(b"|");
        hasher.update(document.size_bytes.map(|s| s.to_string()).unwrap_or_default().as_bytes());
        hasher.update(b"|");
        hasher.update(document.last_modified_ms.map(|m| m.to_string()).unwrap_or_default().as_bytes());
        let hex = format!("{:x}", hasher.finalize());
        Self(hex[..32].to_string())
    }

    /// Hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document with its derived scheduling attributes. Never mutated after
/// classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedItem {
    /// The submitted document.
    pub document: Document,
    /// Selected processing path.
    pub processing_type: ProcessingType,
    /// Estimated processing difficulty in `[0, 1]`.
    pub complexity_score: f64,
    /// Dispatch priority in `[0, 1]`, higher first.
    pub priority: f64,
    /// Size bucket.
    pub size_category: SizeCategory,
    /// Cache key.
    pub fingerprint: Fingerprint,
    /// Set when metadata was malformed and conservative defaults were used.
    pub warning: Option<String>,
}

impl ClassifiedItem {
    /// Identifier of the wrapped document.
    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.document.id
    }

    /// Expected processing time for this item.
    #[must_use]
    pub fn estimated_duration(&self) -> Duration {
        self.processing_type.estimate_duration(self)
    }

    /// Expected peak memory for this item, in MB.
    #[must_use]
    pub fn estimated_memory_mb(&self) -> f64 {
        self.processing_type.estimate_memory_mb(self)
    }
}

fn round_score(value: f64) -> f64 {
    (value.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

fn complexity(document: &Document, kind: MediaKind, size_bytes: u64) -> f64 {
    let flags = &document.flags;
    let mut score = 0.3 + kind.base_complexity();
    if size_bytes > 10 * MB {
        score += 0.2;
    } else if size_bytes > MB {
        score += 0.1;
    }
    if flags.requires_ocr {
        score += 0.3;
    }
    if flags.has_complex_layout {
        score += 0.2;
    }
    if flags.has_tables {
        score += 0.1;
    }
    if flags.has_images {
        score += 0.1;
    }
    round_score(score)
}

fn priority(document: &Document, size_bytes: Option<u64>) -> f64 {
    let flags = &document.flags;
    let mut score = 0.5;
    score += match flags.importance {
        Level::High => 0.3,
        Level::Medium => 0.1,
        Level::Low => 0.0,
    };
    if flags.urgent {
        score += 0.2;
    }
    if flags.has_dependencies {
        score += 0.1;
    }
    if size_bytes.is_some_and(|s| s < MB) {
        score += 0.1;
    }
    round_score(score)
}

fn select_type(
    document: &Document,
    kind: MediaKind,
    complexity: f64,
    size_category: SizeCategory,
) -> ProcessingType {
    if document.flags.requires_ocr || kind.is_image() || (kind == MediaKind::Pdf && complexity > 0.8) {
        ProcessingType::Scanned
    } else if complexity > 0.8
        || size_category == SizeCategory::VeryLarge
        || document.flags.legal_complexity == Level::High
    {
        ProcessingType::Complex
    } else if kind.is_text_like() && complexity < 0.5 {
        ProcessingType::Text
    } else {
        ProcessingType::Electronic
    }
}

/// Classify a document.
///
/// A document without a size is still classified, with complexity 1.0, the
/// very-large size bucket and a warning on the returned item.
#[must_use]
pub fn classify(document: Document) -> ClassifiedItem {
    let kind = document.kind();
    let (complexity_score, size_category, warning) = match document.size_bytes {
        Some(size) => (complexity(&document, kind, size), SizeCategory::from_size(size), None),
        None => {
            let message = format!("document `{}` has no size; using conservative defaults", document.id);
            warn!(document_id = %document.id, "classification fallback: missing size");
            (1.0, SizeCategory::VeryLarge, Some(message))
        }
    };
    let processing_type = select_type(&document, kind, complexity_score, size_category);
    let priority = priority(&document, document.size_bytes);
    let fingerprint = Fingerprint::of(&document);

    ClassifiedItem {
        document,
        processing_type,
        complexity_score,
        priority,
        size_category,
        fingerprint,
        warning,
    }
}
