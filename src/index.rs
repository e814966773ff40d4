use std::collections::HashMap;
use std::sync::Arc;

use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::config::SyncConfig;
use crate::document::{ContentVersion, Element, Page, SourceText, SpatialDocument, SpatialRef};
use crate::error::{Result, SyncError};
use crate::geo::Rect;
use crate::locator::{CandidateLocator, ExactSearch, Haystack, NeighborhoodSearch, NormalizedSearch};
use crate::logging::SYNC_INDEX;
use crate::normalize::NormalizedText;
use crate::text::{
    byte_offset_of_char, ceil_char_boundary, expand_to_word_end, expand_to_word_start, trim_span,
};

/// Position of an element in its `SpatialDocument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementRef {
    pub page_index: usize,
    pub element_index: usize,
}

/// Where one element's text sits in the source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text_start: usize,
    pub text_end: usize,
    /// Page number, as in `Page::number`.
    pub page: u32,
    pub element_ref: ElementRef,
}

impl IndexEntry {
    pub fn len(&self) -> usize {
        self.text_end - self.text_start
    }

    pub fn is_empty(&self) -> bool {
        self.text_end == self.text_start
    }
}

// Wrapper so element boxes can live in the R-tree
#[derive(Debug, Clone)]
struct SpatialElement {
    page: u32,
    element_ref: ElementRef,
    bbox: Rect,
}

impl RTreeObject for SpatialElement {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bbox.envelope()
    }
}

/// Mapping between source-text offsets and page elements for one content
/// version. Immutable once built; share it behind an `Arc`.
pub struct OffsetIndex {
    version: ContentVersion,
    source: Arc<SourceText>,
    document: Arc<SpatialDocument>,
    normalized: NormalizedText,
    entries: Vec<IndexEntry>,
    unindexed: Vec<ElementRef>,
    element_to_entry: HashMap<ElementRef, usize>,
    spatial: RTree<SpatialElement>,
}

impl OffsetIndex {
    pub fn build(spatial: Arc<SpatialDocument>, source: Arc<SourceText>) -> Result<Self> {
        Self::build_with_config(spatial, source, &SyncConfig::default())
    }

    pub fn build_with_config(
        spatial: Arc<SpatialDocument>,
        source: Arc<SourceText>,
        config: &SyncConfig,
    ) -> Result<Self> {
        if spatial.version != source.version {
            return Err(SyncError::VersionMismatch {
                index: spatial.version.clone(),
                requested: source.version.clone(),
            });
        }
        let _span = info_span!(target: SYNC_INDEX, "build_index", version = %source.version).entered();

        let text = source.as_str();
        let fuzzy = CandidateLocator::empty(config.locator.acceptance_threshold)
            .push_strategy(ExactSearch)
            .push_strategy(NormalizedSearch)
            .push_strategy(NeighborhoodSearch::new(
                config.index.forward_window,
                config.locator.levenshtein_max_chars,
                config.scoring.min_token_chars,
            ));

        let mut entries = Vec::new();
        let mut unindexed = Vec::new();
        let mut element_to_entry = HashMap::new();
        let mut spatial_elements = Vec::with_capacity(spatial.element_count());
        let mut cursor = 0usize;

        for (page_index, page) in spatial.pages.iter().enumerate() {
            for (element_index, element) in page.elements.iter().enumerate() {
                let element_ref = ElementRef {
                    page_index,
                    element_index,
                };
                spatial_elements.push(SpatialElement {
                    page: page.number,
                    element_ref,
                    bbox: element.bbox.normalized(),
                });

                if element.text.trim().is_empty() {
                    debug!(target: SYNC_INDEX, element_id = %element.id, "blank element");
                    unindexed.push(element_ref);
                    continue;
                }

                match place_element(text, cursor, element, &fuzzy, config) {
                    Some((start, end)) => {
                        element_to_entry.insert(element_ref, entries.len());
                        entries.push(IndexEntry {
                            text_start: start,
                            text_end: end,
                            page: page.number,
                            element_ref,
                        });
                        cursor = end;
                    }
                    None => {
                        warn!(
                            target: SYNC_INDEX,
                            element_id = %element.id,
                            page = page.number,
                            kind = ?element.kind,
                            "element not found in source text"
                        );
                        unindexed.push(element_ref);
                    }
                }
            }
        }

        info!(
            target: SYNC_INDEX,
            indexed = entries.len(),
            unindexed = unindexed.len(),
            "index built"
        );

        let normalized = NormalizedText::new(text);
        Ok(Self {
            version: source.version.clone(),
            normalized,
            source,
            document: spatial,
            entries,
            unindexed,
            element_to_entry,
            spatial: RTree::bulk_load(spatial_elements),
        })
    }

    pub fn version(&self) -> &ContentVersion {
        &self.version
    }

    pub fn source(&self) -> &SourceText {
        &self.source
    }

    pub fn document(&self) -> &SpatialDocument {
        &self.document
    }

    pub fn normalized(&self) -> &NormalizedText {
        &self.normalized
    }

    /// The source text as a locator haystack, reusing the cached normalised form.
    pub fn haystack(&self) -> Haystack<'_> {
        Haystack::with_normalized(self.source.as_str(), &self.normalized)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn unindexed(&self) -> &[ElementRef] {
        &self.unindexed
    }

    /// Entries intersecting `[offset, offset + length)`, in document order.
    pub fn overlapping(&self, offset: usize, length: usize) -> &[IndexEntry] {
        let end = offset.saturating_add(length);
        let lo = self.entries.partition_point(|e| e.text_end <= offset);
        let hi = self.entries.partition_point(|e| e.text_start < end);
        if lo >= hi {
            &[]
        } else {
            &self.entries[lo..hi]
        }
    }

    pub fn entry_for(&self, element_ref: ElementRef) -> Option<&IndexEntry> {
        self.element_to_entry
            .get(&element_ref)
            .map(|&i| &self.entries[i])
    }

    pub fn entry_text(&self, entry: &IndexEntry) -> &str {
        &self.source.as_str()[entry.text_start..entry.text_end]
    }

    pub fn page(&self, element_ref: ElementRef) -> Option<&Page> {
        self.document.pages.get(element_ref.page_index)
    }

    pub fn element(&self, element_ref: ElementRef) -> Option<&Element> {
        self.page(element_ref)?.elements.get(element_ref.element_index)
    }

    /// Elements on `page` whose boxes intersect `rect`, in reading order.
    /// Includes elements that could not be indexed.
    pub fn elements_in_region(&self, page: u32, rect: &Rect) -> Vec<ElementRef> {
        let mut hits: Vec<ElementRef> = self
            .spatial
            .locate_in_envelope_intersecting(&rect.normalized().envelope())
            .filter(|e| e.page == page)
            .map(|e| e.element_ref)
            .collect();
        hits.sort();
        hits.dedup();
        hits
    }

    /// Elements under a selection with the fraction of each element's text
    /// the selection covers, in reading order.
    fn selection_coverage(&self, selection: &SpatialRef) -> Vec<(ElementRef, f32, f32)> {
        let mut covered: Vec<(ElementRef, f32, f32)> = Vec::new();
        for rect in &selection.rects {
            for element_ref in self.elements_in_region(selection.page, rect) {
                let Some(element) = self.element(element_ref) else {
                    continue;
                };
                let Some((from, to)) = coverage(&element.bbox.normalized(), &rect.normalized()) else {
                    continue;
                };
                match covered.iter_mut().find(|(r, ..)| *r == element_ref) {
                    Some(entry) => {
                        entry.1 = entry.1.min(from);
                        entry.2 = entry.2.max(to);
                    }
                    None => covered.push((element_ref, from, to)),
                }
            }
        }
        covered.sort_by_key(|(r, ..)| *r);
        covered
    }

    /// Text below a selection, interpolated within each element and widened
    /// to whole words.
    pub fn text_under(&self, selection: &SpatialRef) -> String {
        let mut pieces: Vec<&str> = Vec::new();
        for (element_ref, from, to) in self.selection_coverage(selection) {
            let Some(element) = self.element(element_ref) else {
                continue;
            };
            let text = element.text.trim();
            let (start, end) = char_fraction_span(text, from, to);
            let start = expand_to_word_start(text, start);
            let end = expand_to_word_end(text, end);
            let (start, end) = trim_span(text, start, end);
            if start < end {
                pieces.push(&text[start..end]);
            }
        }
        pieces.join(" ")
    }

    /// Estimated source offset where a selection begins: the first indexed
    /// element under it, plus the interpolated position inside that element.
    pub fn offset_hint(&self, selection: &SpatialRef) -> Option<usize> {
        self.selection_coverage(selection)
            .into_iter()
            .find_map(|(element_ref, from, to)| {
                let entry = self.entry_for(element_ref)?;
                let (start, _) = char_fraction_span(self.entry_text(entry), from, to);
                Some(entry.text_start + start)
            })
    }
}

impl std::fmt::Debug for OffsetIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffsetIndex")
            .field("version", &self.version)
            .field("entries", &self.entries.len())
            .field("unindexed", &self.unindexed.len())
            .finish_non_exhaustive()
    }
}

/// Fraction `(from, to)` of an element's reading order that `rect` covers.
/// A selection spanning most of the element's height is read horizontally;
/// a thinner one picks out lines, so it is read vertically.
fn coverage(bbox: &Rect, rect: &Rect) -> Option<(f32, f32)> {
    if !bbox.intersects(rect) {
        return None;
    }
    let (w, h) = (bbox.width(), bbox.height());
    let top = rect.top.max(bbox.top);
    let bottom = rect.bottom.min(bbox.bottom);
    let vertical = if h > 0.0 { (bottom - top) / h } else { 1.0 };

    if vertical >= 0.8 || h <= 0.0 {
        if w <= 0.0 {
            return Some((0.0, 1.0));
        }
        let from = (rect.left.max(bbox.left) - bbox.left) / w;
        let to = (rect.right.min(bbox.right) - bbox.left) / w;
        Some((from.clamp(0.0, 1.0), to.clamp(0.0, 1.0)))
    } else {
        let from = (top - bbox.top) / h;
        let to = (bottom - bbox.top) / h;
        Some((from.clamp(0.0, 1.0), to.clamp(0.0, 1.0)))
    }
}

/// Byte span of `text` between two fractions of its char count.
fn char_fraction_span(text: &str, from: f32, to: f32) -> (usize, usize) {
    const SLACK: f32 = 1e-3;
    let chars = text.chars().count() as f32;
    let start = byte_offset_of_char(text, (chars * from + SLACK).floor() as usize);
    let end = byte_offset_of_char(text, (chars * to - SLACK).ceil().max(0.0) as usize);
    (start, end.max(start))
}

/// Find an element's text at or after `cursor`.
fn place_element(
    text: &str,
    cursor: usize,
    element: &Element,
    fuzzy: &CandidateLocator,
    config: &SyncConfig,
) -> Option<(usize, usize)> {
    let needle = element.text.trim();
    let window = config.index.forward_window;
    let bounded = element.kind.is_page_furniture()
        || needle.chars().count() < config.index.min_unbounded_len;

    let exact_limit = if bounded {
        ceil_char_boundary(text, cursor + window + needle.len())
    } else {
        text.len()
    };
    if let Some(i) = text[cursor..exact_limit].find(needle) {
        let start = cursor + i;
        return Some((start, start + needle.len()));
    }

    let limit = ceil_char_boundary(text, cursor + window + 2 * needle.len());
    let haystack = Haystack::new(&text[cursor..limit]);
    match fuzzy.locate(&haystack, needle, Some(0)) {
        Ok(Some(m)) if m.score >= fuzzy.acceptance_threshold() => {
            let (start, end) = trim_span(text, cursor + m.offset, cursor + m.end());
            debug!(
                target: SYNC_INDEX,
                element_id = %element.id,
                tier = ?m.tier,
                score = m.score,
                start,
                "placed element fuzzily"
            );
            (start < end).then_some((start, end))
        }
        Ok(_) => None,
        Err(err) => {
            debug!(target: SYNC_INDEX, element_id = %element.id, %err, "fuzzy placement failed");
            None
        }
    }
}
