use ordered_float::OrderedFloat;
use tracing::{debug, trace};

use crate::config::GeometryConfig;
use crate::document::SpatialRef;
use crate::geo::Rect;
use crate::index::OffsetIndex;
use crate::logging::SYNC_GEOMETRY;
use crate::text::{ceil_char_boundary, floor_char_boundary};

/// Turns a text span into highlight rectangles, one group per page.
#[derive(Debug, Clone, Default)]
pub struct GeometryMerger {
    config: GeometryConfig,
}

impl GeometryMerger {
    pub fn new(config: GeometryConfig) -> Self {
        Self { config }
    }

    /// Regions covered by `(offset, length)`, in document order. Elements
    /// only partly covered contribute a horizontal slice proportional to the
    /// covered characters.
    pub fn to_regions(&self, span: (usize, usize), index: &OffsetIndex) -> Vec<SpatialRef> {
        let (offset, length) = span;
        let end = offset.saturating_add(length);
        let mut groups: Vec<SpatialRef> = Vec::new();

        for entry in index.overlapping(offset, length) {
            let (Some(page), Some(element)) = (index.page(entry.element_ref), index.element(entry.element_ref)) else {
                continue;
            };
            let text = index.entry_text(entry);
            let total = text.chars().count().max(1) as f32;
            let from = offset.max(entry.text_start) - entry.text_start;
            let to = end.min(entry.text_end) - entry.text_start;
            let c0 = text[..floor_char_boundary(text, from)].chars().count() as f32 / total;
            let c1 = text[..ceil_char_boundary(text, to)].chars().count() as f32 / total;

            let slice = element.bbox.normalized().horizontal_slice(c0, c1);
            let Some(rect) = slice.clamp_to_page(page.width, page.height) else {
                trace!(target: SYNC_GEOMETRY, element_id = %element.id, "slice empty after clamping");
                continue;
            };

            match groups.iter_mut().find(|g| g.page == page.number) {
                Some(group) => group.rects.push(rect),
                None => groups.push(SpatialRef {
                    page: page.number,
                    rects: vec![rect],
                }),
            }
        }

        for group in &mut groups {
            let before = group.rects.len();
            group.rects = self.merge_rects(std::mem::take(&mut group.rects));
            debug!(
                target: SYNC_GEOMETRY,
                page = group.page,
                before,
                after = group.rects.len(),
                "merged rects"
            );
        }
        groups
    }

    /// Merge boxes that sit on the same line and nearly touch, until no pair
    /// qualifies.
    pub fn merge_rects(&self, mut rects: Vec<Rect>) -> Vec<Rect> {
        loop {
            rects.sort_by_key(|r| (OrderedFloat(r.top), OrderedFloat(r.left)));
            let mut merged: Vec<Rect> = Vec::with_capacity(rects.len());
            let mut changed = false;
            for rect in rects {
                match merged.iter_mut().find(|m| self.same_line(m, &rect)) {
                    Some(target) => {
                        *target = target.union(&rect);
                        changed = true;
                    }
                    None => merged.push(rect),
                }
            }
            rects = merged;
            if !changed {
                return rects;
            }
        }
    }

    fn same_line(&self, a: &Rect, b: &Rect) -> bool {
        let h = a.height().max(b.height());
        if h <= 0.0 {
            return false;
        }
        let gap = a.left.max(b.left) - a.right.min(b.right);
        (a.top - b.top).abs() <= self.config.vertical_tolerance * h
            && (a.bottom - b.bottom).abs() <= self.config.vertical_tolerance * h
            && gap <= self.config.horizontal_gap * h
    }
}

/// Regions for a span with the default merge tolerances.
pub fn to_regions(span: (usize, usize), index: &OffsetIndex) -> Vec<SpatialRef> {
    GeometryMerger::default().to_regions(span, index)
}
