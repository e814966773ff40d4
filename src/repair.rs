use tracing::{debug, trace};

use crate::config::RepairConfig;
use crate::logging::SYNC_REPAIR;
use crate::text::{
    ceil_char_boundary, expand_to_word_end, expand_to_word_start, floor_char_boundary,
    is_whitespace_delimited, occurrences, snap_end, snap_start, trim_span,
};

/// Turns a raw candidate span into one that starts and ends on whole words.
#[derive(Debug, Clone, Default)]
pub struct BoundaryRepairer {
    config: RepairConfig,
}

impl BoundaryRepairer {
    pub fn new(config: RepairConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    /// Repair `candidate` (`(offset, length)` in `haystack`) against the text
    /// the caller was looking for. Returns the repaired `(offset, length)`.
    pub fn repair(&self, haystack: &str, candidate: (usize, usize), target_text: &str) -> (usize, usize) {
        let target = target_text.trim();
        let (offset, length) = candidate;

        let start = floor_char_boundary(haystack, offset);
        let end = ceil_char_boundary(haystack, offset.saturating_add(length)).max(start);
        let (start, end) = trim_span(haystack, start, end);

        let mut start = expand_to_word_start(haystack, start);
        let mut end = expand_to_word_end(haystack, end);
        trace!(target: SYNC_REPAIR, start, end, "snapped to words");

        if self.diverges(end - start, target.len()) {
            (start, end) = self.fit_length(haystack, start, end, target);
            trace!(target: SYNC_REPAIR, start, end, "length fitted");
        }

        // A span already opening on the target keeps its own occurrence.
        if !haystack[start..].starts_with(target) {
            if let Some(at) = self.nearby_verbatim(haystack, start, end, target) {
                (start, end) = (at, at + target.len());
                trace!(target: SYNC_REPAIR, start, end, "verbatim occurrence nearby");
            }
        }

        let (start, end) = trim_span(haystack, start, end);
        if (start, end - start) != candidate {
            debug!(
                target: SYNC_REPAIR,
                from_offset = offset,
                from_length = length,
                offset = start,
                length = end - start,
                "repaired"
            );
        }
        (start, end - start)
    }

    fn diverges(&self, len: usize, target_len: usize) -> bool {
        target_len > 0
            && (len as f32 - target_len as f32).abs() / target_len as f32 > self.config.length_tolerance
    }

    fn fit_score(&self, haystack: &str, start: usize, end: usize, target_len: usize) -> f32 {
        let slice = &haystack[start..end];
        let len = slice.len() as f32;
        let tl = target_len as f32;
        let mut score = (1.0 - (len - tl).abs() / tl).max(0.0);
        if slice.chars().next().map_or(false, char::is_uppercase) {
            score += self.config.capital_bonus;
        }
        if slice.ends_with(['.', '!', '?']) {
            score += self.config.terminal_bonus;
        }
        score
    }

    /// Grid search over shifted start/end positions, each snapped to words.
    fn fit_length(&self, haystack: &str, start: usize, end: usize, target: &str) -> (usize, usize) {
        let step = self.config.search_step.max(1);
        let steps = (self.config.search_radius / step) as isize;
        let shifts: Vec<isize> = (-steps..=steps).map(|k| k * step as isize).collect();
        let shifted = |pos: usize, by: isize| -> usize {
            pos.saturating_add_signed(by).min(haystack.len())
        };

        let mut best = (
            self.fit_score(haystack, start, end, target.len()),
            0usize,
            start,
            end,
        );
        for &ds in &shifts {
            let s = snap_start(haystack, shifted(start, ds));
            for &de in &shifts {
                let e = snap_end(haystack, shifted(end, de));
                if e <= s {
                    continue;
                }
                let score = self.fit_score(haystack, s, e, target.len());
                let shift = s.abs_diff(start) + e.abs_diff(end);
                let (best_score, best_shift, ..) = best;
                if score > best_score + f32::EPSILON
                    || ((score - best_score).abs() <= f32::EPSILON && shift < best_shift)
                {
                    best = (score, shift, s, e);
                }
            }
        }
        (best.2, best.3)
    }

    /// Whitespace-delimited occurrence of `target` nearest `start`, within
    /// `exact_radius` of the span.
    fn nearby_verbatim(&self, haystack: &str, start: usize, end: usize, target: &str) -> Option<usize> {
        if target.is_empty() {
            return None;
        }
        let radius = self.config.exact_radius;
        let lo = floor_char_boundary(haystack, start.saturating_sub(radius));
        let hi = ceil_char_boundary(haystack, end.saturating_add(radius));
        occurrences(&haystack[lo..hi], target)
            .map(|i| lo + i)
            .filter(|&p| is_whitespace_delimited(haystack, p, p + target.len()))
            .min_by_key(|&p| (p.abs_diff(start), p < start))
    }
}

/// Repair with the default configuration.
pub fn repair(haystack: &str, candidate: (usize, usize), target_text: &str) -> (usize, usize) {
    BoundaryRepairer::default().repair(haystack, candidate, target_text)
}
