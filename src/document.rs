use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::geo::Rect;
use crate::locator::MatchTier;

/// Version shared by a `SourceText` and the `SpatialDocument` extracted from
/// the same revision of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentVersion(pub String);

impl ContentVersion {
    pub fn new(version: impl Into<String>) -> Self {
        ContentVersion(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentVersion {
    fn from(value: &str) -> Self {
        ContentVersion(value.to_string())
    }
}

/// The continuous, reflowed text of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceText {
    pub text: String,
    pub version: ContentVersion,
}

impl SourceText {
    pub fn new(text: impl Into<String>, version: impl Into<ContentVersion>) -> Self {
        Self {
            text: text.into(),
            version: version.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Structural role of an element as reported by the extraction stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Paragraph,
    Heading { level: u8 },
    ListItem,
    Caption,
    Code { lang: Option<String> },
    Table,
    Formula,
    Footnote,
    PageHeader,
    PageFooter,
}

impl ElementKind {
    /// Running headers and footers are usually dropped by the text cleanup
    /// pass, so they should not pull the index cursor far ahead.
    pub fn is_page_furniture(&self) -> bool {
        match self {
            ElementKind::PageHeader | ElementKind::PageFooter => true,
            ElementKind::Paragraph
            | ElementKind::Heading { .. }
            | ElementKind::ListItem
            | ElementKind::Caption
            | ElementKind::Code { .. }
            | ElementKind::Table
            | ElementKind::Formula
            | ElementKind::Footnote => false,
        }
    }
}

impl Default for ElementKind {
    fn default() -> Self {
        ElementKind::Paragraph
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub text: String,
    pub bbox: Rect,
    #[serde(default)]
    pub kind: ElementKind,
}

impl Element {
    pub fn new(text: impl Into<String>, bbox: Rect, kind: ElementKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            bbox,
            kind,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} \"{}\" {:?}", self.kind, self.text, self.bbox)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// Page/element view of a document produced by the extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialDocument {
    pub version: ContentVersion,
    pub pages: Vec<Page>,
}

impl SpatialDocument {
    pub fn new(version: impl Into<ContentVersion>, pages: Vec<Page>) -> Self {
        Self {
            version: version.into(),
            pages,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn page_by_number(&self, number: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.number == number)
    }

    pub fn element_count(&self) -> usize {
        self.pages.iter().map(|p| p.elements.len()).sum()
    }
}

/// Region selected on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialRef {
    pub page: u32,
    pub rects: Vec<Rect>,
}

/// A user anchor. The side the user acted in is authoritative; the engine
/// derives the other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnchorSpan {
    /// `(offset, length)` in the source text.
    #[serde(default)]
    pub text_offset: Option<(usize, usize)>,
    #[serde(default)]
    pub spatial_ref: Option<SpatialRef>,
    #[serde(default)]
    pub anchor_text: String,
}

impl AnchorSpan {
    pub fn from_text(anchor_text: impl Into<String>, text_offset: Option<(usize, usize)>) -> Self {
        Self {
            text_offset,
            spatial_ref: None,
            anchor_text: anchor_text.into(),
        }
    }

    pub fn from_selection(spatial_ref: SpatialRef, anchor_text: impl Into<String>) -> Self {
        Self {
            text_offset: None,
            spatial_ref: Some(spatial_ref),
            anchor_text: anchor_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// `(offset, length)` in the source text.
    pub matched_offset: Option<(usize, usize)>,
    /// Region on the page where the span starts.
    pub matched_spatial: Option<SpatialRef>,
    /// Further page groups when the span crosses a page break.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub continued_on: Vec<SpatialRef>,
    pub confidence: f32,
    pub degraded: bool,
    #[serde(default)]
    pub low_confidence: bool,
    #[serde(default)]
    pub tier: Option<MatchTier>,
}

impl ReconciliationResult {
    /// Nothing usable was found.
    pub fn not_found() -> Self {
        Self {
            matched_offset: None,
            matched_spatial: None,
            continued_on: Vec::new(),
            confidence: 0.0,
            degraded: true,
            low_confidence: false,
            tier: None,
        }
    }

    /// Every page group, first page first.
    pub fn regions(&self) -> impl Iterator<Item = &SpatialRef> {
        self.matched_spatial.iter().chain(self.continued_on.iter())
    }
}
