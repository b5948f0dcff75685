use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use tracing::{info, warn};

use crate::database::schema::SCHEMA;
use crate::error::{CommitError, CommitStage};
use crate::pipeline::normalize::{ArtifactColor, ArtifactMedia, ArtifactMetadata};

/// Rows written per table by one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub metadata: usize,
    pub media: usize,
    pub colors: usize,
}

/// A classification present in the store and how many rows it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredClassification {
    pub name: String,
    pub rows: RowCounts,
}

/// Append-only store holding artifact rows grouped by classification.
///
/// A classification moves from unseen to committed exactly once; `commit`
/// refuses to touch a classification that already has metadata rows.
pub struct ClassificationStore {
    conn: Connection,
}

impl ClassificationStore {
    /// Opens (creating if needed) the store file and its tables.
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn is_committed(&self, classification: &str) -> rusqlite::Result<bool> {
        has_classification(&self.conn, classification)
    }

    /// Writes one classification's rows across all three tables, or nothing.
    ///
    /// The membership re-check runs first and the appends share its immediate
    /// transaction, so a second writer cannot slip the same classification in
    /// between. Shape errors are only reported for classifications not yet stored.
    pub fn commit(
        &mut self,
        classification: &str,
        metadata: &[ArtifactMetadata],
        media: &[ArtifactMedia],
        colors: &[ArtifactColor],
    ) -> Result<RowCounts, CommitError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(CommitError::integrity(classification, CommitStage::Begin))?;

        if has_classification(&tx, classification)
            .map_err(CommitError::integrity(classification, CommitStage::Check))?
        {
            warn!(classification, "Classification already stored, skipping commit");
            return Err(CommitError::AlreadyCommitted(classification.to_string()));
        }
        validate(classification, metadata, media, colors)?;

        {
            let stage = CommitStage::Metadata;
            let mut stmt = tx
                .prepare(
                    "INSERT INTO artifact_metadata (
                        id, title, culture, period, century, medium, dimensions,
                        description, department, classification, accessionyear, accessionmethod
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                )
                .map_err(CommitError::integrity(classification, stage))?;
            for row in metadata {
                stmt.execute(params![
                    row.id,
                    row.title,
                    row.culture,
                    row.period,
                    row.century,
                    row.medium,
                    row.dimensions,
                    row.description,
                    row.department,
                    row.classification,
                    row.accession_year,
                    row.accession_method
                ])
                .map_err(CommitError::integrity(classification, stage))?;
            }
        }

        {
            let stage = CommitStage::Media;
            let mut stmt = tx
                .prepare(
                    "INSERT INTO artifact_media (
                        objectid, imagecount, mediacount, colorcount, rank, datebegin, dateend
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(CommitError::integrity(classification, stage))?;
            for row in media {
                stmt.execute(params![
                    row.object_id,
                    row.image_count,
                    row.media_count,
                    row.color_count,
                    row.rank,
                    row.date_begin,
                    row.date_end
                ])
                .map_err(CommitError::integrity(classification, stage))?;
            }
        }

        {
            let stage = CommitStage::Colors;
            let mut stmt = tx
                .prepare(
                    "INSERT INTO artifact_colors (objectid, color, spectrum, hue, percent, css3)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(CommitError::integrity(classification, stage))?;
            for row in colors {
                stmt.execute(params![
                    row.object_id,
                    row.color,
                    row.spectrum,
                    row.hue,
                    row.percent,
                    row.css3
                ])
                .map_err(CommitError::integrity(classification, stage))?;
            }
        }

        tx.commit()
            .map_err(CommitError::integrity(classification, CommitStage::Commit))?;

        let counts = RowCounts {
            metadata: metadata.len(),
            media: media.len(),
            colors: colors.len(),
        };
        info!(
            classification,
            metadata = counts.metadata,
            media = counts.media,
            colors = counts.colors,
            "Committed classification"
        );
        Ok(counts)
    }

    /// Rows currently stored for `classification` in each table.
    pub fn row_counts(&self, classification: &str) -> rusqlite::Result<RowCounts> {
        let count = |sql: &str| -> rusqlite::Result<usize> {
            let n: i64 = self.conn.query_row(sql, params![classification], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(RowCounts {
            metadata: count("SELECT COUNT(*) FROM artifact_metadata WHERE classification = ?1")?,
            media: count(
                "SELECT COUNT(*) FROM artifact_media
                 WHERE objectid IN (SELECT id FROM artifact_metadata WHERE classification = ?1)",
            )?,
            colors: count(
                "SELECT COUNT(*) FROM artifact_colors
                 WHERE objectid IN (SELECT id FROM artifact_metadata WHERE classification = ?1)",
            )?,
        })
    }

    /// Every committed classification, alphabetically.
    pub fn committed(&self) -> rusqlite::Result<Vec<StoredClassification>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT classification FROM artifact_metadata
             WHERE classification IS NOT NULL ORDER BY classification",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        names
            .into_iter()
            .map(|name| {
                let rows = self.row_counts(&name)?;
                Ok(StoredClassification { name, rows })
            })
            .collect()
    }
}

fn has_classification(conn: &Connection, classification: &str) -> rusqlite::Result<bool> {
    let hit = conn
        .query_row(
            "SELECT 1 FROM artifact_metadata WHERE classification = ?1 LIMIT 1",
            params![classification],
            |_| Ok(()),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// Shape checks that need no database access.
fn validate(
    classification: &str,
    metadata: &[ArtifactMetadata],
    media: &[ArtifactMedia],
    colors: &[ArtifactColor],
) -> Result<(), CommitError> {
    if metadata.is_empty() {
        return Err(CommitError::Empty(classification.to_string()));
    }
    if let Some(row) = metadata
        .iter()
        .find(|row| row.classification.as_deref() != Some(classification))
    {
        return Err(CommitError::ForeignClassification {
            classification: classification.to_string(),
            artifact_id: row.id,
            found: row.classification.clone(),
        });
    }

    let ids: HashSet<i64> = metadata.iter().map(|row| row.id).collect();
    let orphan = media
        .iter()
        .map(|row| ("artifact_media", row.object_id))
        .chain(colors.iter().map(|row| ("artifact_colors", row.object_id)))
        .find(|(_, id)| !ids.contains(id));
    if let Some((table, object_id)) = orphan {
        return Err(CommitError::OrphanRow {
            classification: classification.to_string(),
            table,
            object_id,
        });
    }
    Ok(())
}
