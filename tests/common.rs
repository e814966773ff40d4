#![allow(dead_code)]

use std::sync::Arc;

use delver_sync::{
    Element, ElementKind, OffsetIndex, Page, Rect, SourceText, SpatialDocument, SyncConfig,
};

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;
pub const MARGIN: f32 = 50.0;
pub const LINE_HEIGHT: f32 = 12.0;
pub const LINE_GAP: f32 = 4.0;
pub const CHAR_WIDTH: f32 = 5.0;

const MAX_LINE_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

/// Lays elements out top to bottom, one per line block, and accumulates the
/// matching source text alongside.
pub struct DocumentBuilder {
    version: String,
    pages: Vec<Page>,
    source: String,
    y: f32,
    last: Option<Rect>,
}

impl DocumentBuilder {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            pages: vec![empty_page(1)],
            source: String::new(),
            y: MARGIN,
            last: None,
        }
    }

    fn page_mut(&mut self) -> &mut Page {
        self.pages.last_mut().expect("builder always has a page")
    }

    fn push_source(&mut self, text: &str, separator: &str) {
        if !self.source.is_empty() {
            self.source.push_str(separator);
        }
        self.source.push_str(text);
    }

    fn place_block(&mut self, text: &str, kind: ElementKind) -> Rect {
        let width = text.chars().count() as f32 * CHAR_WIDTH;
        let lines = (width / MAX_LINE_WIDTH).ceil().max(1.0);
        let bbox = Rect::new(
            MARGIN,
            self.y,
            MARGIN + width.min(MAX_LINE_WIDTH),
            self.y + lines * LINE_HEIGHT,
        );
        self.y = bbox.bottom + LINE_GAP;
        self.page_mut().elements.push(Element::new(text, bbox, kind));
        self.last = Some(bbox);
        bbox
    }

    pub fn paragraph(self, text: &str) -> Self {
        self.element(text, ElementKind::Paragraph)
    }

    pub fn heading(self, text: &str, level: u8) -> Self {
        self.element(text, ElementKind::Heading { level })
    }

    pub fn element(mut self, text: &str, kind: ElementKind) -> Self {
        self.push_source(text, "\n");
        self.place_block(text, kind);
        self
    }

    /// Continue the previous element's line, one char width to its right.
    pub fn inline(mut self, text: &str) -> Self {
        self.push_source(text, " ");
        let prev = self.last.unwrap_or_else(|| Rect::new(MARGIN, MARGIN, MARGIN, MARGIN + LINE_HEIGHT));
        let left = prev.right + CHAR_WIDTH;
        let bbox = Rect::new(
            left,
            prev.top,
            left + text.chars().count() as f32 * CHAR_WIDTH,
            prev.top + LINE_HEIGHT,
        );
        self.page_mut()
            .elements
            .push(Element::new(text, bbox, ElementKind::Paragraph));
        self.last = Some(bbox);
        self
    }

    /// An element that the text cleanup dropped from the source.
    pub fn missing_from_source(mut self, text: &str, kind: ElementKind) -> Self {
        self.place_block(text, kind);
        self
    }

    /// Text present in the source but on no page.
    pub fn source_only(mut self, text: &str) -> Self {
        self.push_source(text, "\n");
        self
    }

    pub fn page_break(mut self) -> Self {
        let number = self.pages.len() as u32 + 1;
        self.pages.push(empty_page(number));
        self.y = MARGIN;
        self.last = None;
        self
    }

    pub fn source_text(&self) -> &str {
        &self.source
    }

    pub fn build(self) -> (Arc<SpatialDocument>, Arc<SourceText>) {
        let version = self.version.as_str();
        (
            Arc::new(SpatialDocument::new(version, self.pages)),
            Arc::new(SourceText::new(self.source, version)),
        )
    }

    pub fn index(self) -> OffsetIndex {
        let (spatial, source) = self.build();
        OffsetIndex::build(spatial, source).expect("index builds")
    }

    pub fn index_with(self, config: &SyncConfig) -> OffsetIndex {
        let (spatial, source) = self.build();
        OffsetIndex::build_with_config(spatial, source, config).expect("index builds")
    }
}

fn empty_page(number: u32) -> Page {
    Page {
        number,
        width: PAGE_WIDTH,
        height: PAGE_HEIGHT,
        elements: Vec::new(),
    }
}

/// Source text covered by `(offset, length)`.
pub fn span_text(index: &OffsetIndex, span: (usize, usize)) -> &str {
    &index.source().as_str()[span.0..span.0 + span.1]
}

/// A short natural-history text used by most tests.
pub fn origin_document() -> DocumentBuilder {
    DocumentBuilder::new("rev-1")
        .heading("Chapter IV", 1)
        .paragraph("The origin of species. Darwin argued that species change over time.")
        .paragraph("Much of the study of natural selection is concerned with heritable variation.")
        .paragraph("Breeders observed phenotypic variation in pigeons and dogs.")
        .paragraph("In drought years the beaks of finches changed with seed size. Rain reversed it.")
}
