use std::borrow::Cow;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, info, warn};

use crate::config::SyncConfig;
use crate::document::{AnchorSpan, ReconciliationResult};
use crate::error::{Result, SyncError};
use crate::geometry::GeometryMerger;
use crate::index::OffsetIndex;
use crate::locator::{CandidateLocator, MatchTier};
use crate::logging::SYNC_RECONCILE;
use crate::repair::BoundaryRepairer;
use crate::score::{ConfidenceScorer, Verdict};

/// Which side of the anchor is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The user acted in the text; derive page geometry.
    TextToSpatial,
    /// The user selected on a page; derive the text span.
    SpatialToText,
}

struct Scored {
    span: (usize, usize),
    confidence: f32,
    verdict: Verdict,
    tier: MatchTier,
}

/// Runs locate, repair, score and geometry for one anchor and applies the
/// degraded-sync policy. Holds no per-document state.
pub struct Reconciler {
    locator: CandidateLocator,
    repairer: BoundaryRepairer,
    scorer: ConfidenceScorer,
    merger: GeometryMerger,
}

impl Reconciler {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            locator: CandidateLocator::with_default_tiers(&config.locator, &config.scoring),
            repairer: BoundaryRepairer::new(config.repair.clone()),
            scorer: ConfidenceScorer::new(config.scoring.clone()),
            merger: GeometryMerger::new(config.geometry.clone()),
        }
    }

    /// Replace the search tiers, e.g. to add a custom strategy.
    pub fn with_locator(mut self, locator: CandidateLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn reconcile(
        &self,
        direction: Direction,
        anchor: &AnchorSpan,
        index: &OffsetIndex,
    ) -> Result<ReconciliationResult> {
        let _span = debug_span!(target: SYNC_RECONCILE, "reconcile", ?direction, version = %index.version()).entered();
        let result = match direction {
            Direction::TextToSpatial => self.text_to_spatial(anchor, index),
            Direction::SpatialToText => self.spatial_to_text(anchor, index),
        }?;

        if result.degraded {
            info!(
                target: SYNC_RECONCILE,
                confidence = result.confidence,
                tier = ?result.tier,
                "degraded"
            );
        } else if result.low_confidence {
            info!(target: SYNC_RECONCILE, confidence = result.confidence, tier = ?result.tier, "low confidence match");
        }
        Ok(result)
    }

    /// Reconcile many anchors against one index in parallel. Results are in
    /// input order.
    pub fn reconcile_batch(
        &self,
        direction: Direction,
        anchors: &[AnchorSpan],
        index: &OffsetIndex,
    ) -> Vec<Result<ReconciliationResult>> {
        anchors
            .par_iter()
            .map(|anchor| self.reconcile(direction, anchor, index))
            .collect()
    }

    fn locate_and_score(&self, index: &OffsetIndex, needle: &str, hint: Option<usize>) -> Result<Option<Scored>> {
        let haystack = index.haystack();
        let Some(candidate) = self.locator.locate(&haystack, needle, hint)? else {
            return Ok(None);
        };

        let text = index.source().as_str();
        let span = self.repairer.repair(text, candidate.span(), needle);
        let matched = &text[span.0..span.0 + span.1];
        let confidence = self.scorer.score(matched, needle);
        let verdict = self.scorer.verdict(confidence);
        debug!(
            target: SYNC_RECONCILE,
            tier = ?candidate.tier,
            locator_score = candidate.score,
            offset = span.0,
            length = span.1,
            confidence,
            ?verdict,
            "scored"
        );
        Ok(Some(Scored {
            span,
            confidence,
            verdict,
            tier: candidate.tier,
        }))
    }

    fn text_to_spatial(&self, anchor: &AnchorSpan, index: &OffsetIndex) -> Result<ReconciliationResult> {
        if anchor.anchor_text.trim().is_empty() {
            return Err(SyncError::invalid_span("anchor text is empty"));
        }
        let hint = anchor.text_offset.map(|(offset, _)| offset);
        let Some(scored) = self.locate_and_score(index, &anchor.anchor_text, hint)? else {
            return Ok(ReconciliationResult::not_found());
        };

        let mut result = ReconciliationResult {
            matched_offset: Some(scored.span),
            confidence: scored.confidence,
            tier: Some(scored.tier),
            ..ReconciliationResult::not_found()
        };
        if scored.verdict == Verdict::Rejected {
            return Ok(result);
        }

        result.low_confidence = scored.verdict == Verdict::LowConfidence;
        let mut regions = self.merger.to_regions(scored.span, index).into_iter();
        match regions.next() {
            Some(first) => {
                result.matched_spatial = Some(first);
                result.continued_on = regions.collect();
                result.degraded = false;
            }
            None => {
                warn!(
                    target: SYNC_RECONCILE,
                    offset = scored.span.0,
                    length = scored.span.1,
                    "span maps to no indexed element"
                );
            }
        }
        Ok(result)
    }

    fn spatial_to_text(&self, anchor: &AnchorSpan, index: &OffsetIndex) -> Result<ReconciliationResult> {
        let Some(selection) = anchor.spatial_ref.as_ref().filter(|s| !s.rects.is_empty()) else {
            return Err(SyncError::invalid_span("selection has no rectangles"));
        };

        let needle: Cow<'_, str> = if anchor.anchor_text.trim().is_empty() {
            Cow::Owned(index.text_under(selection))
        } else {
            Cow::Borrowed(anchor.anchor_text.as_str())
        };
        if needle.trim().is_empty() {
            return Err(SyncError::invalid_span("no text under the selection"));
        }

        let hint = index
            .offset_hint(selection)
            .or(anchor.text_offset.map(|(offset, _)| offset));
        let Some(scored) = self.locate_and_score(index, &needle, hint)? else {
            return Ok(ReconciliationResult::not_found());
        };

        let mut result = ReconciliationResult {
            confidence: scored.confidence,
            tier: Some(scored.tier),
            ..ReconciliationResult::not_found()
        };
        if scored.verdict != Verdict::Rejected {
            result.matched_offset = Some(scored.span);
            result.matched_spatial = Some(selection.clone());
            result.low_confidence = scored.verdict == Verdict::LowConfidence;
            result.degraded = false;
        }
        Ok(result)
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}

/// Reconcile one anchor with the default configuration.
pub fn reconcile(direction: Direction, anchor: &AnchorSpan, index: &OffsetIndex) -> Result<ReconciliationResult> {
    Reconciler::default().reconcile(direction, anchor, index)
}
