use std::fmt;

use thiserror::Error;

/// Failure while paging through the remote collection API.
///
/// Any page failing aborts the whole fetch; there is no partial result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {endpoint} page {page}{} failed: {reason}", for_classification(.classification))]
    Transport {
        endpoint: String,
        page: u32,
        classification: Option<String>,
        reason: String,
    },

    #[error("{endpoint} page {page}{} returned HTTP {status}", for_classification(.classification))]
    Status {
        endpoint: String,
        page: u32,
        classification: Option<String>,
        status: u16,
    },

    #[error("{endpoint} page {page}{} has a malformed body: {reason}", for_classification(.classification))]
    Malformed {
        endpoint: String,
        page: u32,
        classification: Option<String>,
        reason: String,
    },

    #[error("{endpoint}{} reported {expected} records but only {received} were fetched", for_classification(.classification))]
    Shortfall {
        endpoint: String,
        classification: Option<String>,
        expected: u64,
        received: u64,
    },
}

fn for_classification(classification: &Option<String>) -> String {
    match classification {
        Some(name) => format!(" (classification '{name}')"),
        None => String::new(),
    }
}

/// Step of a commit at which the store failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    Open,
    Begin,
    Check,
    Metadata,
    Media,
    Colors,
    Commit,
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            CommitStage::Open => "open",
            CommitStage::Begin => "begin",
            CommitStage::Check => "check",
            CommitStage::Metadata => "metadata",
            CommitStage::Media => "media",
            CommitStage::Colors => "colors",
            CommitStage::Commit => "commit",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Error)]
pub enum CommitError {
    /// The classification already has rows in the store. Nothing was written.
    #[error("classification '{0}' is already stored")]
    AlreadyCommitted(String),

    /// A write failed part way; the transaction was rolled back.
    #[error("commit of '{classification}' failed at {stage}: {source}")]
    Integrity {
        classification: String,
        stage: CommitStage,
        #[source]
        source: rusqlite::Error,
    },

    #[error("no metadata rows to commit for '{0}'")]
    Empty(String),

    #[error("{table} row for artifact {object_id} has no metadata row in the '{classification}' commit")]
    OrphanRow {
        classification: String,
        table: &'static str,
        object_id: i64,
    },

    #[error("artifact {artifact_id} is tagged {found:?}, not '{classification}'")]
    ForeignClassification {
        classification: String,
        artifact_id: i64,
        found: Option<String>,
    },
}

impl CommitError {
    pub(crate) fn integrity(classification: &str, stage: CommitStage) -> impl FnOnce(rusqlite::Error) -> Self + '_ {
        move |source| CommitError::Integrity {
            classification: classification.to_string(),
            stage,
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no catalog query named '{0}'")]
    UnknownQuery(String),

    #[error("query '{0}' would modify the store")]
    NotReadOnly(String),

    #[error("query '{name}' failed: {source}")]
    Store {
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("query catalog could not be loaded: {0}")]
    Catalog(String),
}

/// Failure of a combined fetch-and-commit run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Commit(#[from] CommitError),
}
