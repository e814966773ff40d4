//! Candidate search: find where a needle most plausibly sits in a haystack.
//!
//! Each tier is a `SearchStrategy`. `CandidateLocator` runs them in order and
//! stops at the first candidate scoring at or above its acceptance threshold;
//! otherwise it hands back the best candidate any tier produced, so the caller
//! can score it and degrade.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::{debug, trace, warn};

use crate::config::{LocatorConfig, ScoringConfig};
use crate::error::{Result, SyncError};
use crate::logging::SYNC_LOCATE;
use crate::normalize::{normalize, NormalizedText};
use crate::score::{token_overlap, NORMALIZED_EQUAL_SCORE};
use crate::text::{ceil_char_boundary, floor_char_boundary, occurrences, splits_word, words};

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?](?:\s|$)").unwrap());

const ANCHOR_BYTES: usize = 50;
const MIN_SENTENCE_ANCHOR: usize = 20;
const DEADLINE_CHECK_EVERY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Normalized,
    Anchored,
    Neighborhood,
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    pub offset: usize,
    pub length: usize,
    pub score: f32,
    pub tier: MatchTier,
}

impl CandidateMatch {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn span(&self) -> (usize, usize) {
        (self.offset, self.length)
    }
}

/// Text being searched, with its normalised form built on first use or
/// borrowed from a prebuilt index.
pub struct Haystack<'a> {
    text: &'a str,
    normalized: OnceCell<Cow<'a, NormalizedText>>,
}

impl<'a> Haystack<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            normalized: OnceCell::new(),
        }
    }

    pub fn with_normalized(text: &'a str, normalized: &'a NormalizedText) -> Self {
        Self {
            text,
            normalized: OnceCell::with_value(Cow::Borrowed(normalized)),
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn normalized(&self) -> &NormalizedText {
        self.normalized
            .get_or_init(|| Cow::Owned(NormalizedText::new(self.text)))
    }
}

/// One search request as seen by a tier. `needle` is already trimmed and
/// `hint`, when present, lies within the haystack.
pub struct Query<'q, 'h> {
    pub haystack: &'q Haystack<'h>,
    pub needle: &'q str,
    pub hint: Option<usize>,
}

pub trait SearchStrategy: Send + Sync {
    fn tier(&self) -> MatchTier;

    fn search(&self, query: &Query<'_, '_>) -> Result<Option<CandidateMatch>>;
}

/// Nearest position to `hint`; a forward position wins a tie.
fn nearest_to(positions: impl Iterator<Item = usize>, hint: Option<usize>) -> Option<usize> {
    match hint {
        Some(h) => positions.min_by_key(|&p| (p.abs_diff(h), p < h)),
        None => positions.min(),
    }
}

/// Like `nearest_to`, but occurrences that cut into a word only count when
/// no whole-word occurrence exists.
fn nearest_whole_word(
    text: &str,
    hits: impl Iterator<Item = usize>,
    len: usize,
    hint: Option<usize>,
) -> Option<usize> {
    let (whole, partial): (Vec<usize>, Vec<usize>) = hits.partition(|&p| !splits_word(text, p, p + len));
    nearest_to(whole.into_iter(), hint).or_else(|| nearest_to(partial.into_iter(), hint))
}

pub struct ExactSearch;

impl SearchStrategy for ExactSearch {
    fn tier(&self) -> MatchTier {
        MatchTier::Exact
    }

    fn search(&self, query: &Query<'_, '_>) -> Result<Option<CandidateMatch>> {
        let text = query.haystack.text();
        let hits = occurrences(text, query.needle);
        Ok(nearest_whole_word(text, hits, query.needle.len(), query.hint).map(|offset| CandidateMatch {
            offset,
            length: query.needle.len(),
            score: 1.0,
            tier: MatchTier::Exact,
        }))
    }
}

/// Verbatim search after folding typography, case and whitespace.
pub struct NormalizedSearch;

impl SearchStrategy for NormalizedSearch {
    fn tier(&self) -> MatchTier {
        MatchTier::Normalized
    }

    fn search(&self, query: &Query<'_, '_>) -> Result<Option<CandidateMatch>> {
        let needle = normalize(query.needle);
        if needle.is_empty() {
            return Ok(None);
        }
        let norm = query.haystack.normalized();
        let hint = query.hint.map(|h| norm.to_normalized(h));
        let hits = occurrences(&norm.text, &needle);
        let Some(at) = nearest_whole_word(&norm.text, hits, needle.len(), hint) else {
            return Ok(None);
        };
        Ok(norm
            .to_original(at, at + needle.len())
            .map(|(start, end)| CandidateMatch {
                offset: start,
                length: end - start,
                score: NORMALIZED_EQUAL_SCORE,
                tier: MatchTier::Normalized,
            }))
    }
}

/// Long passages whose middle drifted: pin the first sentence (or first
/// bytes) and the last bytes, and take everything between.
pub struct AnchoredSearch {
    min_len: usize,
    min_token_chars: usize,
}

impl AnchoredSearch {
    pub fn new(min_len: usize, min_token_chars: usize) -> Self {
        Self {
            min_len,
            min_token_chars,
        }
    }
}

fn head_anchor(needle: &str) -> &str {
    if let Some(m) = SENTENCE_END.find(needle) {
        let sentence = needle[..m.start() + 1].trim_end();
        if sentence.len() > MIN_SENTENCE_ANCHOR && sentence.len() < needle.len() {
            return sentence;
        }
    }
    &needle[..floor_char_boundary(needle, ANCHOR_BYTES)]
}

fn tail_anchor(needle: &str) -> &str {
    let from = ceil_char_boundary(needle, needle.len().saturating_sub(ANCHOR_BYTES));
    needle[from..].trim_start()
}

impl SearchStrategy for AnchoredSearch {
    fn tier(&self) -> MatchTier {
        MatchTier::Anchored
    }

    fn search(&self, query: &Query<'_, '_>) -> Result<Option<CandidateMatch>> {
        if query.needle.len() < self.min_len {
            return Ok(None);
        }
        let needle = normalize(query.needle);
        let head = head_anchor(&needle);
        let tail = tail_anchor(&needle);
        if head.is_empty() || tail.is_empty() {
            return Ok(None);
        }

        let norm = query.haystack.normalized();
        let text = query.haystack.text();
        let mut heads: Vec<usize> = occurrences(&norm.text, head).collect();
        if let Some(h) = query.hint.map(|h| norm.to_normalized(h)) {
            heads.sort_by_key(|&p| (p.abs_diff(h), p < h));
        }

        let mut best: Option<CandidateMatch> = None;
        for h in heads {
            let head_end = h + head.len();
            let limit = floor_char_boundary(&norm.text, h + 2 * needle.len());
            let tail_at = occurrences(&norm.text[h..limit], tail)
                .map(|i| h + i)
                .find(|&t| t + tail.len() >= head_end);

            // Without a tail, stretch from the head to the needle's length.
            let end = match tail_at {
                Some(t) => t + tail.len(),
                None => ceil_char_boundary(&norm.text, h + needle.len()),
            };
            let Some((start, stop)) = norm.to_original(h, end) else {
                continue;
            };
            let score = token_overlap(&text[start..stop], query.needle, self.min_token_chars);
            trace!(target: SYNC_LOCATE, start, stop, score, tail = tail_at.is_some(), "anchored candidate");
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(CandidateMatch {
                    offset: start,
                    length: stop - start,
                    score,
                    tier: MatchTier::Anchored,
                });
            }
        }
        Ok(best)
    }
}

/// Fuzzy alignment of the needle at every word start near the hint.
pub struct NeighborhoodSearch {
    radius: usize,
    levenshtein_max_chars: usize,
    min_token_chars: usize,
}

impl NeighborhoodSearch {
    pub fn new(radius: usize, levenshtein_max_chars: usize, min_token_chars: usize) -> Self {
        Self {
            radius,
            levenshtein_max_chars,
            min_token_chars,
        }
    }
}

impl SearchStrategy for NeighborhoodSearch {
    fn tier(&self) -> MatchTier {
        MatchTier::Neighborhood
    }

    fn search(&self, query: &Query<'_, '_>) -> Result<Option<CandidateMatch>> {
        let Some(hint) = query.hint else {
            return Ok(None);
        };
        let text = query.haystack.text();
        let lo = floor_char_boundary(text, hint.saturating_sub(self.radius));
        let hi = ceil_char_boundary(text, hint + self.radius + query.needle.len());
        let use_levenshtein = query.needle.chars().count() <= self.levenshtein_max_chars;
        let needle_norm = normalize(query.needle);

        let mut best: Option<(f32, usize, usize, usize)> = None;
        for word in words(&text[lo..hi]) {
            let start = lo + word.start;
            let end = ceil_char_boundary(text, start + query.needle.len());
            if end <= start {
                continue;
            }
            let candidate = &text[start..end];
            let score = if use_levenshtein {
                normalized_levenshtein(&normalize(candidate), &needle_norm) as f32
            } else {
                token_overlap(candidate, query.needle, self.min_token_chars)
            };
            let distance = start.abs_diff(hint);
            let better = match best {
                None => true,
                Some((s, d, _, _)) => score > s || (score == s && distance < d),
            };
            if better {
                best = Some((score, distance, start, end));
            }
        }

        Ok(best.map(|(score, _, start, end)| CandidateMatch {
            offset: start,
            length: end - start,
            score,
            tier: MatchTier::Neighborhood,
        }))
    }
}

/// Last resort: Jaccard similarity of word windows over the whole text.
pub struct GlobalWindowSearch {
    min_ratio: f32,
    max_ratio: f32,
    max_len: usize,
    budget: Duration,
    min_token_chars: usize,
}

impl GlobalWindowSearch {
    pub fn new(config: &LocatorConfig, min_token_chars: usize) -> Self {
        Self {
            min_ratio: config.window_min_ratio,
            max_ratio: config.window_max_ratio,
            max_len: config.global_max_len,
            budget: Duration::from_millis(config.global_budget_ms),
            min_token_chars,
        }
    }

    fn too_large(&self, length: usize) -> SyncError {
        SyncError::DocumentTooLargeForGlobalSearch {
            length,
            limit: self.max_len,
        }
    }
}

impl SearchStrategy for GlobalWindowSearch {
    fn tier(&self) -> MatchTier {
        MatchTier::Global
    }

    fn search(&self, query: &Query<'_, '_>) -> Result<Option<CandidateMatch>> {
        let text = query.haystack.text();
        if text.len() > self.max_len {
            return Err(self.too_large(text.len()));
        }

        let needle_words = words(query.needle);
        let hay = words(text);
        if needle_words.is_empty() || hay.is_empty() {
            return Ok(None);
        }

        // Short tokens only count when the needle has nothing else.
        let min_chars = if needle_words.iter().any(|w| w.char_len() >= self.min_token_chars) {
            self.min_token_chars
        } else {
            0
        };
        let needle_all: HashSet<&str> = needle_words.iter().map(|w| w.token.as_str()).collect();
        let needle_set: HashSet<&str> = needle_words
            .iter()
            .filter(|w| w.char_len() >= min_chars)
            .map(|w| w.token.as_str())
            .collect();

        let n = needle_words.len() as f32;
        let min_w = ((n * self.min_ratio).floor() as usize).max(1).min(hay.len());
        let max_w = ((n * self.max_ratio).ceil() as usize).max(min_w).min(hay.len());
        let deadline = Instant::now() + self.budget;

        let mut best: Option<(f32, usize, usize, usize)> = None;
        for i in 0..hay.len() {
            if i % DEADLINE_CHECK_EVERY == 0 && Instant::now() >= deadline {
                warn!(target: SYNC_LOCATE, budget_ms = self.budget.as_millis() as u64, "global search ran out of time");
                return Err(self.too_large(text.len()));
            }
            if !needle_all.contains(hay[i].token.as_str()) {
                continue;
            }

            let mut counts: HashMap<&str, usize> = HashMap::new();
            let mut shared = 0usize;
            for size in 1..=max_w {
                let Some(w) = hay.get(i + size - 1) else {
                    break;
                };
                if w.char_len() >= min_chars {
                    let count = counts.entry(w.token.as_str()).or_insert(0);
                    if *count == 0 && needle_set.contains(w.token.as_str()) {
                        shared += 1;
                    }
                    *count += 1;
                }
                if size < min_w {
                    continue;
                }
                let union = needle_set.len() + counts.len() - shared;
                if union == 0 {
                    continue;
                }
                let score = shared as f32 / union as f32;
                let distance = query.hint.map_or(0, |h| hay[i].start.abs_diff(h));
                let better = match best {
                    None => true,
                    Some((s, d, _, _)) => score > s || (score == s && distance < d),
                };
                if better {
                    best = Some((score, distance, hay[i].start, w.end));
                }
            }
        }

        Ok(best
            .filter(|(score, ..)| *score > 0.0)
            .map(|(score, _, start, end)| CandidateMatch {
                offset: start,
                length: end - start,
                score,
                tier: MatchTier::Global,
            }))
    }
}

/// Ordered tiers plus the first-accepted combinator.
pub struct CandidateLocator {
    acceptance_threshold: f32,
    strategies: Vec<Box<dyn SearchStrategy>>,
}

impl CandidateLocator {
    /// A locator with no tiers; add them with `push_strategy`.
    pub fn empty(acceptance_threshold: f32) -> Self {
        Self {
            acceptance_threshold,
            strategies: Vec::new(),
        }
    }

    /// Exact, normalised, anchored, neighbourhood, then global.
    pub fn with_default_tiers(config: &LocatorConfig, scoring: &ScoringConfig) -> Self {
        let min_chars = scoring.min_token_chars;
        Self::empty(config.acceptance_threshold)
            .push_strategy(ExactSearch)
            .push_strategy(NormalizedSearch)
            .push_strategy(AnchoredSearch::new(config.anchored_min_len, min_chars))
            .push_strategy(NeighborhoodSearch::new(
                config.neighborhood,
                config.levenshtein_max_chars,
                min_chars,
            ))
            .push_strategy(GlobalWindowSearch::new(config, min_chars))
    }

    pub fn push_strategy<S: SearchStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn tiers(&self) -> Vec<MatchTier> {
        self.strategies.iter().map(|s| s.tier()).collect()
    }

    pub fn acceptance_threshold(&self) -> f32 {
        self.acceptance_threshold
    }

    pub fn locate(
        &self,
        haystack: &Haystack<'_>,
        needle: &str,
        hint: Option<usize>,
    ) -> Result<Option<CandidateMatch>> {
        let needle = needle.trim();
        if needle.is_empty() {
            return Err(SyncError::invalid_span("needle is empty"));
        }
        let hint = match hint {
            Some(h) if h > haystack.len() => {
                debug!(target: SYNC_LOCATE, hint = h, len = haystack.len(), "hint outside haystack, ignoring");
                None
            }
            other => other,
        };
        let query = Query {
            haystack,
            needle,
            hint,
        };

        let mut best: Option<CandidateMatch> = None;
        for strategy in &self.strategies {
            let found = match strategy.search(&query) {
                Ok(found) => found,
                // A weak candidate from an earlier tier is still worth returning.
                Err(err) if best.is_some() => {
                    warn!(target: SYNC_LOCATE, tier = ?strategy.tier(), %err, "tier aborted");
                    break;
                }
                Err(err) => return Err(err),
            };
            let Some(candidate) = found else {
                trace!(target: SYNC_LOCATE, tier = ?strategy.tier(), "no candidate");
                continue;
            };
            trace!(
                target: SYNC_LOCATE,
                tier = ?candidate.tier,
                offset = candidate.offset,
                length = candidate.length,
                score = candidate.score,
                "candidate"
            );
            if candidate.score >= self.acceptance_threshold {
                debug!(target: SYNC_LOCATE, tier = ?candidate.tier, offset = candidate.offset, "accepted");
                return Ok(Some(candidate));
            }
            if best.as_ref().map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }

        if let Some(b) = &best {
            debug!(target: SYNC_LOCATE, tier = ?b.tier, score = b.score, "no tier reached the threshold, returning best");
        }
        Ok(best)
    }
}

impl Default for CandidateLocator {
    fn default() -> Self {
        Self::with_default_tiers(&LocatorConfig::default(), &ScoringConfig::default())
    }
}

/// Locate `needle` in `haystack` with the default tiers and thresholds.
pub fn locate(haystack: &str, needle: &str, hint_offset: Option<usize>) -> Result<Option<CandidateMatch>> {
    CandidateLocator::default().locate(&Haystack::new(haystack), needle, hint_offset)
}
