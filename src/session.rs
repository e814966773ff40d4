use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::document::{AnchorSpan, ContentVersion, ReconciliationResult, SourceText, SpatialDocument};
use crate::error::{Result, SyncError};
use crate::index::OffsetIndex;
use crate::logging::SYNC_INDEX;
use crate::reconcile::{Direction, Reconciler};

/// One open document: the index for its current version and a reconciler.
/// A new version replaces the index; the old one lives on for anyone still
/// holding its `Arc`.
pub struct DocumentSession {
    index: Arc<OffsetIndex>,
    reconciler: Reconciler,
    config: SyncConfig,
}

impl DocumentSession {
    pub fn open(spatial: Arc<SpatialDocument>, source: Arc<SourceText>, config: SyncConfig) -> Result<Self> {
        let index = OffsetIndex::build_with_config(spatial, source, &config)?;
        Ok(Self {
            index: Arc::new(index),
            reconciler: Reconciler::new(&config),
            config,
        })
    }

    pub fn index(&self) -> Arc<OffsetIndex> {
        Arc::clone(&self.index)
    }

    pub fn version(&self) -> &ContentVersion {
        self.index.version()
    }

    /// Rebuild the index if `source` carries a different version. Returns
    /// whether a rebuild happened.
    pub fn refresh(&mut self, spatial: Arc<SpatialDocument>, source: Arc<SourceText>) -> Result<bool> {
        if source.version == *self.version() && spatial.version == source.version {
            debug!(target: SYNC_INDEX, version = %source.version, "index is current");
            return Ok(false);
        }
        let previous = self.version().clone();
        let index = OffsetIndex::build_with_config(spatial, source, &self.config)?;
        self.index = Arc::new(index);
        info!(target: SYNC_INDEX, from = %previous, to = %self.version(), "index rebuilt");
        Ok(true)
    }

    fn check_version(&self, expected: &ContentVersion) -> Result<()> {
        if expected != self.version() {
            return Err(SyncError::VersionMismatch {
                index: self.version().clone(),
                requested: expected.clone(),
            });
        }
        Ok(())
    }

    pub fn reconcile(
        &self,
        direction: Direction,
        anchor: &AnchorSpan,
        expected_version: &ContentVersion,
    ) -> Result<ReconciliationResult> {
        self.check_version(expected_version)?;
        self.reconciler.reconcile(direction, anchor, &self.index)
    }

    pub fn reconcile_batch(
        &self,
        direction: Direction,
        anchors: &[AnchorSpan],
        expected_version: &ContentVersion,
    ) -> Result<Vec<Result<ReconciliationResult>>> {
        self.check_version(expected_version)?;
        Ok(self.reconciler.reconcile_batch(direction, anchors, &self.index))
    }
}

/// Current index per document id, for hosts serving several documents from
/// many threads.
#[derive(Default)]
pub struct IndexCache {
    indices: DashMap<String, Arc<OffsetIndex>>,
    config: SyncConfig,
}

impl IndexCache {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            indices: DashMap::new(),
            config,
        }
    }

    /// The cached index when it matches `source`'s version, otherwise a fresh
    /// build that replaces it.
    pub fn get_or_build(
        &self,
        document_id: &str,
        spatial: Arc<SpatialDocument>,
        source: Arc<SourceText>,
    ) -> Result<Arc<OffsetIndex>> {
        if let Some(cached) = self.indices.get(document_id) {
            if *cached.version() == source.version {
                return Ok(Arc::clone(&cached));
            }
        }
        let index = Arc::new(OffsetIndex::build_with_config(spatial, source, &self.config)?);
        self.indices.insert(document_id.to_string(), Arc::clone(&index));
        Ok(index)
    }

    pub fn get(&self, document_id: &str) -> Option<Arc<OffsetIndex>> {
        self.indices.get(document_id).map(|e| Arc::clone(e.value()))
    }

    pub fn invalidate(&self, document_id: &str) -> bool {
        self.indices.remove(document_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
