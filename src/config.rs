use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for the whole pipeline. Every field has a default, so a config
/// file only needs to name what it changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub index: IndexConfig,
    pub locator: LocatorConfig,
    pub repair: RepairConfig,
    pub scoring: ScoringConfig,
    pub geometry: GeometryConfig,
}

impl SyncConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Bytes ahead of the cursor searched for elements that are not found
    /// verbatim, and for short or furniture elements.
    pub forward_window: usize,
    /// Elements at least this many chars long are searched for verbatim
    /// anywhere ahead of the cursor.
    pub min_unbounded_len: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            forward_window: 2000,
            min_unbounded_len: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub acceptance_threshold: f32,
    /// Half-width in bytes of the fuzzy search around a hint.
    pub neighborhood: usize,
    pub window_min_ratio: f32,
    pub window_max_ratio: f32,
    /// Haystacks longer than this are refused by the global search.
    pub global_max_len: usize,
    pub global_budget_ms: u64,
    /// Above this needle length fuzzy scoring switches from edit distance to
    /// token overlap.
    pub levenshtein_max_chars: usize,
    /// Minimum needle length for the head/tail anchored search.
    pub anchored_min_len: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.8,
            neighborhood: 500,
            window_min_ratio: 0.7,
            window_max_ratio: 1.3,
            global_max_len: 4 * 1024 * 1024,
            global_budget_ms: 2000,
            levenshtein_max_chars: 512,
            anchored_min_len: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Relative length divergence that triggers the boundary search.
    pub length_tolerance: f32,
    pub search_radius: usize,
    pub search_step: usize,
    /// Radius of the verbatim-occurrence fallback.
    pub exact_radius: usize,
    pub capital_bonus: f32,
    pub terminal_bonus: f32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            length_tolerance: 0.3,
            search_radius: 20,
            search_step: 5,
            exact_radius: 100,
            capital_bonus: 0.1,
            terminal_bonus: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub accept_threshold: f32,
    pub reject_threshold: f32,
    pub min_token_chars: usize,
    /// Weight of token overlap; the rest goes to the length ratio.
    pub overlap_weight: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.9,
            reject_threshold: 0.6,
            min_token_chars: 3,
            overlap_weight: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Max top/bottom difference, as a fraction of height, for two boxes to
    /// share a line.
    pub vertical_tolerance: f32,
    /// Max horizontal gap, as a fraction of height, for two boxes to merge.
    pub horizontal_gap: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            vertical_tolerance: 0.3,
            horizontal_gap: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg = SyncConfig::from_json_str(r#"{ "locator": { "neighborhood": 1200 } }"#).unwrap();
        assert_eq!(cfg.locator.neighborhood, 1200);
        assert_eq!(cfg.locator.acceptance_threshold, 0.8);
        assert_eq!(cfg.scoring.reject_threshold, 0.6);
        assert_eq!(cfg.repair.search_step, 5);
    }
}
