use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::ScoringConfig;
use crate::logging::SYNC_SCORE;
use crate::normalize::normalize;
use crate::text::significant_tokens;

/// Texts that differ only in typography, case or whitespace.
pub const NORMALIZED_EQUAL_SCORE: f32 = 0.98;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    /// Accepted, but worth surfacing to observability.
    LowConfidence,
    /// Below the reject threshold: degrade, no geometry.
    Rejected,
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ScoringConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Similarity in [0, 1] between the text a match produced and the text
    /// the caller was looking for.
    pub fn score(&self, matched_text: &str, target_text: &str) -> f32 {
        let matched = matched_text.trim();
        let target = target_text.trim();
        if matched.is_empty() || target.is_empty() {
            return 0.0;
        }
        if matched == target {
            return 1.0;
        }
        if normalize(matched) == normalize(target) {
            return NORMALIZED_EQUAL_SCORE;
        }

        let overlap = self.token_overlap(matched, target);
        let ratio = length_ratio(matched, target);
        let w = self.config.overlap_weight.clamp(0.0, 1.0);
        let score = (w * overlap + (1.0 - w) * ratio).clamp(0.0, 1.0);

        trace!(target: SYNC_SCORE, overlap, ratio, score, "scored match");
        score
    }

    /// Jaccard similarity of the word sets, ignoring short tokens. A target
    /// cut mid-word still counts its first/last token when it is a
    /// suffix/prefix of the matched side's first/last token.
    pub fn token_overlap(&self, matched: &str, target: &str) -> f32 {
        token_overlap(matched, target, self.config.min_token_chars)
    }

    pub fn verdict(&self, confidence: f32) -> Verdict {
        if confidence >= self.config.accept_threshold {
            Verdict::Accepted
        } else if confidence >= self.config.reject_threshold {
            Verdict::LowConfidence
        } else {
            Verdict::Rejected
        }
    }
}

/// Score with the default thresholds.
pub fn score(matched_text: &str, target_text: &str) -> f32 {
    ConfidenceScorer::default().score(matched_text, target_text)
}

pub fn token_overlap(matched: &str, target: &str, min_token_chars: usize) -> f32 {
    let target = target.trim();
    let target_tokens = significant_tokens(target, min_token_chars);
    let matched_tokens = significant_tokens(matched, min_token_chars);
    if target_tokens.is_empty() || matched_tokens.is_empty() {
        return 0.0;
    }

    // An edge only looks cut when the target stops on a letter or digit there.
    let cut_head = target.chars().next().map_or(false, char::is_alphanumeric);
    let cut_tail = target.chars().next_back().map_or(false, char::is_alphanumeric);
    let first = target_tokens.first().map(String::as_str);
    let last = target_tokens.last().map(String::as_str);
    let target_set: HashSet<&str> = target_tokens.iter().map(String::as_str).collect();
    let matched_set: HashSet<&str> = matched_tokens.iter().map(String::as_str).collect();

    let mut consumed: HashSet<&str> = HashSet::new();
    let mut unmatched: Vec<&str> = Vec::new();
    for t in &target_set {
        if matched_set.contains(t) {
            consumed.insert(*t);
        } else {
            unmatched.push(*t);
        }
    }
    let mut intersection = consumed.len();

    for t in unmatched {
        let mut partners: Vec<&str> = Vec::with_capacity(2);
        if cut_tail && last == Some(t) {
            partners.extend(matched_tokens.last().map(String::as_str).filter(|m| m.starts_with(t)));
        }
        if cut_head && first == Some(t) {
            partners.extend(matched_tokens.first().map(String::as_str).filter(|m| m.ends_with(t)));
        }
        if let Some(m) = partners.into_iter().find(|m| !consumed.contains(m)) {
            consumed.insert(m);
            intersection += 1;
        }
    }

    let union = target_set.len() + matched_set.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

fn length_ratio(a: &str, b: &str) -> f32 {
    let a = a.chars().count() as f32;
    let b = b.chars().count() as f32;
    if a == 0.0 || b == 0.0 {
        0.0
    } else {
        a.min(b) / a.max(b)
    }
}
