use std::path::{Path, PathBuf};

use tracing::info;

use crate::database::catalog::{QueryCatalog, ResultTable};
use crate::database::repo::{ClassificationStore, RowCounts, StoredClassification};
use crate::error::{CommitError, CommitStage, FetchError, PipelineError, QueryError};
use crate::ingest::fetcher::{eligible, PageFetcher, PageSource};
use crate::ingest::record::Classification;
use crate::pipeline::normalize::NormalizedBatch;

/// Sequences fetch, normalization, commit and catalog queries.
///
/// Holds no session state between calls: each stage returns its output to
/// the caller, and the store is opened per operation and closed afterwards.
pub struct Orchestrator<S> {
    fetcher: PageFetcher<S>,
    db_path: PathBuf,
    catalog: QueryCatalog,
}

impl<S: PageSource> Orchestrator<S> {
    pub fn new(
        fetcher: PageFetcher<S>,
        db_path: impl Into<PathBuf>,
        catalog: QueryCatalog,
    ) -> Self {
        Self {
            fetcher,
            db_path: db_path.into(),
            catalog,
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    pub fn list_eligible_classifications(
        &self,
        min_object_count: i64,
    ) -> Result<Vec<Classification>, FetchError> {
        let all = self.fetcher.fetch_classifications()?;
        let total = all.len();
        let selected = eligible(all, min_object_count);
        info!(
            total,
            eligible = selected.len(),
            min_object_count,
            "Filtered classifications"
        );
        Ok(selected)
    }

    pub fn fetch_and_normalize(&self, classification: &str) -> Result<NormalizedBatch, FetchError> {
        let plan = self.fetcher.plan();
        let records =
            self.fetcher
                .fetch_objects(classification, plan.object_page_size, plan.object_pages)?;
        let batch = NormalizedBatch::from_records(classification, &records);
        info!(
            classification,
            metadata = batch.metadata.len(),
            media = batch.media.len(),
            colors = batch.colors.len(),
            "Normalized records"
        );
        Ok(batch)
    }

    pub fn commit_classification(&self, batch: &NormalizedBatch) -> Result<RowCounts, CommitError> {
        let mut store = self.open_store(&batch.classification)?;
        store.commit(
            &batch.classification,
            &batch.metadata,
            &batch.media,
            &batch.colors,
        )
    }

    pub fn is_committed(&self, classification: &str) -> Result<bool, CommitError> {
        self.open_store(classification)?
            .is_committed(classification)
            .map_err(CommitError::integrity(classification, CommitStage::Check))
    }

    /// Fetches, normalizes and commits one classification. A classification that
    /// is already stored is refused before any page is requested.
    pub fn ingest(&self, classification: &str) -> Result<RowCounts, PipelineError> {
        if self.is_committed(classification)? {
            return Err(CommitError::AlreadyCommitted(classification.to_string()).into());
        }
        let batch = self.fetch_and_normalize(classification)?;
        Ok(self.commit_classification(&batch)?)
    }

    pub fn stored_classifications(&self) -> rusqlite::Result<Vec<StoredClassification>> {
        ClassificationStore::open(&self.db_path)?.committed()
    }

    pub fn run_catalog_query(&self, name: &str) -> Result<ResultTable, QueryError> {
        self.catalog.execute(&self.db_path, name)
    }

    fn open_store(&self, classification: &str) -> Result<ClassificationStore, CommitError> {
        ClassificationStore::open(&self.db_path)
            .map_err(CommitError::integrity(classification, CommitStage::Open))
    }
}
