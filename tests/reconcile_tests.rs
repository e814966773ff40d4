mod common;

use std::sync::Arc;

use common::{origin_document, span_text, DocumentBuilder, PAGE_HEIGHT, PAGE_WIDTH};
use delver_sync::locator::Query;
use delver_sync::{
    reconcile, AnchorSpan, CandidateLocator, CandidateMatch, ContentVersion, Direction,
    DocumentSession, IndexCache, MatchTier, Reconciler, SearchStrategy, SpatialRef, SyncConfig,
    SyncError,
};
use pretty_assertions::assert_eq;

fn text_anchor(text: &str) -> AnchorSpan {
    AnchorSpan::from_text(text, None)
}

#[test]
fn truncated_needle_expands_to_whole_word() {
    let index = origin_document().index();
    let result = reconcile(Direction::TextToSpatial, &text_anchor("natural selecti"), &index).unwrap();

    let span = result.matched_offset.unwrap();
    assert_eq!(span_text(&index, span), "natural selection");
    assert!(result.confidence >= 0.9, "confidence {}", result.confidence);
    assert!(!result.degraded);
    assert!(result.matched_spatial.is_some());
}

#[test]
fn missing_terminal_period_is_recovered() {
    let index = origin_document().index();
    let result = reconcile(
        Direction::TextToSpatial,
        &text_anchor("The origin of species"),
        &index,
    )
    .unwrap();

    let span = result.matched_offset.unwrap();
    assert_eq!(span_text(&index, span), "The origin of species.");
    assert!(result.confidence >= 0.9, "confidence {}", result.confidence);
}

#[test]
fn injected_whitespace_is_trimmed() {
    let index = origin_document().index();
    let result = reconcile(
        Direction::TextToSpatial,
        &text_anchor(" phenotypic variation "),
        &index,
    )
    .unwrap();

    assert_eq!(span_text(&index, result.matched_offset.unwrap()), "phenotypic variation");
    assert_eq!(result.confidence, 1.0);
}

#[test]
fn hint_selects_the_nearer_duplicate() {
    let index = DocumentBuilder::new("v1")
        .paragraph("We begin with artificial selection in pigeons.")
        .paragraph("Natural selection is discussed next.")
        .paragraph("Breeders practise artificial selection in pigeons too.")
        .index();
    let text = index.source().as_str();
    let needle = "artificial selection in pigeons";
    let first = text.find(needle).unwrap();
    let second = text.rfind(needle).unwrap();
    assert!(first < second);

    let anchor = AnchorSpan::from_text(needle, Some((second - 2, needle.len())));
    let result = reconcile(Direction::TextToSpatial, &anchor, &index).unwrap();
    assert_eq!(result.matched_offset, Some((second, needle.len())));
    assert_eq!(result.tier, Some(MatchTier::Exact));

    let unhinted = reconcile(Direction::TextToSpatial, &text_anchor(needle), &index).unwrap();
    assert_eq!(unhinted.matched_offset.unwrap().0, first);
}

#[test]
fn whole_word_is_found_over_a_longer_word_containing_it() {
    let index = DocumentBuilder::new("v1")
        .paragraph("The concatenate routine joins the notes gathered on distant islands.")
        .paragraph("A cat sat on the mat.")
        .index();

    let result = reconcile(Direction::TextToSpatial, &text_anchor("cat"), &index).unwrap();
    assert_eq!(span_text(&index, result.matched_offset.unwrap()), "cat");
    assert_eq!(result.confidence, 1.0);
    assert!(!result.degraded);
}

#[test]
fn hinted_occurrence_before_punctuation_is_kept() {
    let index = DocumentBuilder::new("v1")
        .paragraph("Darwin studied species. Many species change over time.")
        .index();
    let at = index.source().as_str().find("species").unwrap();

    let anchor = AnchorSpan::from_text("species", Some((at, 7)));
    let result = reconcile(Direction::TextToSpatial, &anchor, &index).unwrap();
    assert_eq!(result.matched_offset.unwrap().0, at);
    assert!(result.confidence >= 0.9, "confidence {}", result.confidence);
}

#[test]
fn span_across_adjacent_elements_yields_one_rect() {
    let index = DocumentBuilder::new("v1")
        .paragraph("The finches of the")
        .inline("Galapagos islands varied.")
        .index();
    assert_eq!(index.entries().len(), 2);

    let result = reconcile(
        Direction::TextToSpatial,
        &text_anchor("of the Galapagos islands"),
        &index,
    )
    .unwrap();

    let region = result.matched_spatial.unwrap();
    assert_eq!(region.page, 1);
    assert_eq!(region.rects.len(), 1);
    assert!(result.continued_on.is_empty());
}

#[test]
fn absent_needle_degrades_without_geometry() {
    let index = origin_document().index();
    let result = reconcile(
        Direction::TextToSpatial,
        &text_anchor("quantum chromodynamics lattice simulations"),
        &index,
    )
    .unwrap();

    assert!(result.degraded);
    assert!(result.confidence < 0.6);
    assert_eq!(result.regions().count(), 0);
    assert_eq!(result.matched_offset, None);
}

#[test]
fn weak_match_is_degraded_but_keeps_its_best_guess() {
    let index = origin_document().index();
    let result = reconcile(
        Direction::TextToSpatial,
        &text_anchor("finches quantum chromodynamics lattice simulations"),
        &index,
    )
    .unwrap();

    assert!(result.degraded);
    assert!(result.confidence < 0.6, "confidence {}", result.confidence);
    assert_eq!(result.regions().count(), 0);
    assert!(result.matched_offset.is_some());
    assert_eq!(result.tier, Some(MatchTier::Global));
}

#[test]
fn reworded_match_is_low_confidence() {
    let index = origin_document().index();
    let at = index.source().as_str().find("the beaks").unwrap();
    let anchor = AnchorSpan::from_text("the beaks of finches varied with seed size", Some((at, 42)));
    let result = reconcile(Direction::TextToSpatial, &anchor, &index).unwrap();

    assert!(result.low_confidence, "confidence {}", result.confidence);
    assert!(!result.degraded);
    assert!(result.confidence >= 0.6 && result.confidence < 0.9);
    assert_eq!(result.matched_offset.unwrap().0, at);
    assert!(result.matched_spatial.is_some());
}

#[test]
fn span_across_a_page_break_continues_on_the_next_page() {
    let index = DocumentBuilder::new("v1")
        .paragraph("Selection acts slowly and the argument continues")
        .page_break()
        .paragraph("onto the following page with more evidence.")
        .index();

    let result = reconcile(
        Direction::TextToSpatial,
        &text_anchor("argument continues onto the following"),
        &index,
    )
    .unwrap();

    assert!(!result.degraded);
    assert_eq!(result.matched_spatial.as_ref().unwrap().page, 1);
    assert_eq!(result.continued_on.len(), 1);
    assert_eq!(result.continued_on[0].page, 2);
    for region in result.regions() {
        for rect in &region.rects {
            assert!(rect.contained_in(PAGE_WIDTH, PAGE_HEIGHT));
        }
    }
}

#[test]
fn reconciling_a_result_again_is_stable() {
    let index = origin_document().index();
    let first = reconcile(Direction::TextToSpatial, &text_anchor("natural selecti"), &index).unwrap();
    let span = first.matched_offset.unwrap();

    let again = AnchorSpan::from_text(span_text(&index, span), Some(span));
    let second = reconcile(Direction::TextToSpatial, &again, &index).unwrap();
    assert_eq!(second.matched_offset, Some(span));
    assert_eq!(second.confidence, 1.0);
    assert_eq!(second.matched_spatial, first.matched_spatial);
}

#[test]
fn selection_resolves_to_the_text_beneath_it() {
    let index = origin_document().index();
    let entry = index.entries()[3].clone();
    let bbox = index.element(entry.element_ref).unwrap().bbox;
    let selection = SpatialRef {
        page: 1,
        rects: vec![bbox],
    };

    let result = reconcile(
        Direction::SpatialToText,
        &AnchorSpan::from_selection(selection.clone(), ""),
        &index,
    )
    .unwrap();

    assert_eq!(
        result.matched_offset,
        Some((entry.text_start, entry.text_end - entry.text_start))
    );
    assert_eq!(result.matched_spatial, Some(selection));
    assert_eq!(result.confidence, 1.0);
}

#[test]
fn malformed_anchors_are_invalid_spans() {
    let index = origin_document().index();

    let blank = reconcile(Direction::TextToSpatial, &text_anchor("   "), &index);
    assert!(matches!(blank, Err(SyncError::InvalidSpan(_))));

    let no_rects = AnchorSpan::from_selection(SpatialRef { page: 1, rects: vec![] }, "anything");
    let empty = reconcile(Direction::SpatialToText, &no_rects, &index);
    assert!(matches!(empty, Err(SyncError::InvalidSpan(_))));
}

#[test]
fn oversized_documents_refuse_global_search() {
    let mut config = SyncConfig::default();
    config.locator.global_max_len = 16;
    let index = origin_document().index_with(&config);
    let reconciler = Reconciler::new(&config);

    let err = reconciler
        .reconcile(
            Direction::TextToSpatial,
            &text_anchor("quantum chromodynamics"),
            &index,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::DocumentTooLargeForGlobalSearch { limit: 16, .. }
    ));
}

/// Always picks the last verbatim occurrence.
struct LastOccurrence;

impl SearchStrategy for LastOccurrence {
    fn tier(&self) -> MatchTier {
        MatchTier::Global
    }

    fn search(&self, query: &Query<'_, '_>) -> delver_sync::Result<Option<CandidateMatch>> {
        Ok(query.haystack.text().rfind(query.needle).map(|offset| CandidateMatch {
            offset,
            length: query.needle.len(),
            score: 1.0,
            tier: MatchTier::Global,
        }))
    }
}

#[test]
fn custom_strategies_replace_the_default_tiers() {
    let index = DocumentBuilder::new("v1")
        .paragraph("We begin with artificial selection in pigeons.")
        .paragraph("Breeders practise artificial selection in pigeons too.")
        .index();
    let needle = "artificial selection in pigeons";
    let last = index.source().as_str().rfind(needle).unwrap();

    let locator = CandidateLocator::empty(0.8).push_strategy(LastOccurrence);
    assert_eq!(locator.tiers(), vec![MatchTier::Global]);
    let reconciler = Reconciler::default().with_locator(locator);

    let result = reconciler
        .reconcile(Direction::TextToSpatial, &text_anchor(needle), &index)
        .unwrap();
    assert_eq!(result.matched_offset, Some((last, needle.len())));
    assert_eq!(result.tier, Some(MatchTier::Global));
    assert_eq!(result.confidence, 1.0);
}

#[test]
fn batch_results_follow_input_order() {
    let index = origin_document().index();
    let anchors = vec![
        text_anchor("natural selection"),
        text_anchor("phenotypic variation"),
        text_anchor("quantum chromodynamics"),
    ];
    let results = Reconciler::default().reconcile_batch(Direction::TextToSpatial, &anchors, &index);

    assert_eq!(results.len(), 3);
    let first = results[0].as_ref().unwrap();
    assert_eq!(span_text(&index, first.matched_offset.unwrap()), "natural selection");
    let second = results[1].as_ref().unwrap();
    assert_eq!(span_text(&index, second.matched_offset.unwrap()), "phenotypic variation");
    assert!(results[2].as_ref().unwrap().degraded);
}

#[test]
fn session_checks_and_refreshes_versions() {
    let (spatial, source) = origin_document().build();
    let mut session = DocumentSession::open(spatial.clone(), source.clone(), SyncConfig::default()).unwrap();
    let current = ContentVersion::new("rev-1");

    assert!(session
        .reconcile(Direction::TextToSpatial, &text_anchor("natural selection"), &current)
        .is_ok());
    let stale = session.reconcile(
        Direction::TextToSpatial,
        &text_anchor("natural selection"),
        &ContentVersion::new("rev-0"),
    );
    assert!(matches!(stale, Err(SyncError::VersionMismatch { .. })));

    assert!(!session.refresh(spatial, source).unwrap());

    let held = session.index();
    let (spatial, source) = DocumentBuilder::new("rev-2")
        .paragraph("A revised chapter on natural selection.")
        .build();
    assert!(session.refresh(spatial, source).unwrap());
    assert_eq!(session.version(), &ContentVersion::new("rev-2"));
    assert_eq!(held.version(), &current);
}

#[test]
fn cache_reuses_current_versions_only() {
    let cache = IndexCache::default();
    let (spatial, source) = origin_document().build();

    let a = cache.get_or_build("origin", spatial.clone(), source.clone()).unwrap();
    let b = cache.get_or_build("origin", spatial, source).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let (spatial, source) = DocumentBuilder::new("rev-2")
        .paragraph("A revised chapter on natural selection.")
        .build();
    let c = cache.get_or_build("origin", spatial, source).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(cache.len(), 1);

    assert!(cache.invalidate("origin"));
    assert!(cache.get("origin").is_none());
}
