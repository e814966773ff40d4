pub mod config;
pub mod document;
pub mod error;
pub mod geo;
pub mod geometry;
pub mod index;
pub mod locator;
pub mod logging;
pub mod normalize;
pub mod reconcile;
pub mod repair;
pub mod score;
pub mod session;
pub mod text;

use std::sync::Arc;

pub use crate::config::SyncConfig;
pub use crate::document::{
    AnchorSpan, ContentVersion, Element, ElementKind, Page, ReconciliationResult, SourceText,
    SpatialDocument, SpatialRef,
};
pub use crate::error::{Result, SyncError};
pub use crate::geo::Rect;
pub use crate::geometry::{to_regions, GeometryMerger};
pub use crate::index::{ElementRef, IndexEntry, OffsetIndex};
pub use crate::locator::{locate, CandidateLocator, CandidateMatch, Haystack, MatchTier, SearchStrategy};
pub use crate::reconcile::{reconcile, Direction, Reconciler};
pub use crate::repair::{repair, BoundaryRepairer};
pub use crate::score::{score, ConfidenceScorer, Verdict};
pub use crate::session::{DocumentSession, IndexCache};

#[cfg(feature = "extension-module")]
use pyo3::prelude::*;

/// Build an index from a serialized document and its source text, reconcile
/// one anchor, and return the result as JSON.
///
/// # Arguments
/// * `document_json` - A `SpatialDocument` as JSON
/// * `source_text` - The reflowed text; it takes the document's version
/// * `anchor_json` - An `AnchorSpan` as JSON
/// * `direction` - `"text_to_spatial"` or `"spatial_to_text"`
pub fn reconcile_json(
    document_json: &str,
    source_text: &str,
    anchor_json: &str,
    direction: &str,
) -> Result<String> {
    let document = SpatialDocument::from_json_str(document_json)?;
    let source = SourceText::new(source_text, document.version.clone());
    let anchor: AnchorSpan = serde_json::from_str(anchor_json)?;
    let direction: Direction = serde_json::from_value(serde_json::Value::String(direction.to_string()))?;

    let index = OffsetIndex::build(Arc::new(document), Arc::new(source))?;
    let result = reconcile(direction, &anchor, &index)?;
    Ok(serde_json::to_string(&result)?)
}

#[cfg(feature = "extension-module")]
#[pyfunction]
#[pyo3(name = "reconcile_json")]
fn py_reconcile_json(
    document_json: String,
    source_text: String,
    anchor_json: String,
    direction: String,
) -> PyResult<String> {
    reconcile_json(&document_json, &source_text, &anchor_json, &direction)
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string()))
}

/// A Python module implemented in Rust
#[cfg(feature = "extension-module")]
#[pymodule(name = "delver_sync")]
fn delver_sync(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(py_reconcile_json, m)?)?;
    Ok(())
}
