use std::fmt;
use std::fs;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::QueryError;

/// A named, parameterless read query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub name: String,
    pub sql: String,
}

/// Tabular result of a catalog query. Cells are JSON scalars.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Tabulates serializable rows, one column per field of the first row in
    /// declaration order.
    pub fn from_rows<T: Serialize>(rows: &[T]) -> serde_json::Result<Self> {
        let mut table = ResultTable::default();
        for row in rows {
            let Value::Object(fields) = serde_json::to_value(row)? else {
                continue;
            };
            if table.columns.is_empty() {
                table.columns = fields.keys().cloned().collect();
            }
            let cells = table
                .columns
                .iter()
                .map(|c| fields.get(c).cloned().unwrap_or(Value::Null))
                .collect();
            table.rows.push(cells);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |f: &mut fmt::Formatter<'_>, values: &[String]| -> fmt::Result {
            let padded: Vec<String> = values
                .iter()
                .zip(&widths)
                .map(|(value, width)| format!("{value:<width$}"))
                .collect();
            writeln!(f, "{}", padded.join(" | ").trim_end())
        };

        line(f, &self.columns)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("-+-"))?;
        for row in &cells {
            line(f, row)?;
        }
        write!(f, "({} rows)", self.rows.len())
    }
}

/// Ordered mapping from display names to fixed SQL bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCatalog {
    queries: Vec<CatalogQuery>,
}

impl QueryCatalog {
    pub fn new(queries: Vec<CatalogQuery>) -> Self {
        Self { queries }
    }

    /// Loads a catalog from a JSON array of `{"name", "sql"}` objects.
    pub fn from_json_file(path: &Path) -> Result<Self, QueryError> {
        let text = fs::read_to_string(path)
            .map_err(|e| QueryError::Catalog(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, QueryError> {
        let queries: Vec<CatalogQuery> =
            serde_json::from_str(text).map_err(|e| QueryError::Catalog(e.to_string()))?;
        Ok(Self::new(queries))
    }

    pub fn queries(&self) -> &[CatalogQuery] {
        &self.queries
    }

    /// Looks a query up by exact name, or by 1-based position when `key` is a number.
    pub fn get(&self, key: &str) -> Option<&CatalogQuery> {
        self.queries.iter().find(|q| q.name == key).or_else(|| {
            key.trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|index| self.queries.get(index))
        })
    }

    /// Runs the named query on a read-only connection to the store at `db_path`.
    pub fn execute(&self, db_path: &Path, key: &str) -> Result<ResultTable, QueryError> {
        let query = self
            .get(key)
            .ok_or_else(|| QueryError::UnknownQuery(key.to_string()))?;
        let store_error = |source: rusqlite::Error| QueryError::Store {
            name: query.name.clone(),
            source,
        };
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(store_error)?;
        let table = run(&conn, query)?;
        info!(query = %query.name, rows = table.len(), "Catalog query executed");
        Ok(table)
    }
}

/// Executes `query` on `conn`, refusing statements that would write.
pub fn run(conn: &Connection, query: &CatalogQuery) -> Result<ResultTable, QueryError> {
    let store_error = |source: rusqlite::Error| QueryError::Store {
        name: query.name.clone(),
        source,
    };
    let mut stmt = conn.prepare(&query.sql).map_err(store_error)?;
    if !stmt.readonly() {
        return Err(QueryError::NotReadOnly(query.name.clone()));
    }

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();
    let mut rows = stmt.query([]).map_err(store_error)?;
    let mut table = ResultTable {
        columns,
        rows: Vec::new(),
    };
    while let Some(row) = rows.next().map_err(store_error)? {
        let mut cells = Vec::with_capacity(width);
        for index in 0..width {
            let cell = match row.get_ref(index).map_err(store_error)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => Value::from(i),
                ValueRef::Real(r) => Value::from(r),
                ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
            };
            cells.push(cell);
        }
        table.rows.push(cells);
    }
    Ok(table)
}

macro_rules! catalog {
    ($($name:expr => $sql:expr,)*) => {
        vec![$(CatalogQuery { name: $name.to_string(), sql: $sql.to_string() },)*]
    };
}

impl Default for QueryCatalog {
    /// The built-in analytical queries over the three artifact tables.
    fn default() -> Self {
        Self::new(catalog! {
            "Metadata: 11th century Byzantine artifacts" =>
                "SELECT * FROM artifact_metadata WHERE century LIKE '%11%' AND culture LIKE '%Byzantine%';",
            "Metadata: unique cultures" =>
                "SELECT DISTINCT culture FROM artifact_metadata WHERE culture IS NOT NULL;",
            "Metadata: Archaic Period artifacts" =>
                "SELECT * FROM artifact_metadata WHERE period LIKE '%Archaic%';",
            "Metadata: titles by accession year, newest first" =>
                "SELECT title, accessionyear FROM artifact_metadata WHERE accessionyear IS NOT NULL ORDER BY accessionyear DESC;",
            "Metadata: artifacts per department" =>
                "SELECT department, COUNT(*) AS artifact_count FROM artifact_metadata WHERE department IS NOT NULL GROUP BY department;",
            "Media: artifacts with more than one image" =>
                "SELECT * FROM artifact_media WHERE imagecount > 1;",
            "Media: average rank" =>
                "SELECT AVG(rank) AS avg_rank FROM artifact_media WHERE rank IS NOT NULL AND rank > 0;",
            "Media: colorcount greater than mediacount" =>
                "SELECT * FROM artifact_media WHERE colorcount > mediacount;",
            "Media: created between 1500 and 1600" =>
                "SELECT * FROM artifact_media WHERE datebegin >= 1500 AND dateend <= 1600;",
            "Media: artifacts with no media files" =>
                "SELECT COUNT(*) AS no_media_count FROM artifact_media WHERE mediacount = 0 OR mediacount IS NULL;",
            "Colors: distinct hues" =>
                "SELECT DISTINCT hue FROM artifact_colors WHERE hue IS NOT NULL;",
            "Colors: top 5 colors by frequency" =>
                "SELECT color, COUNT(*) AS freq FROM artifact_colors GROUP BY color ORDER BY freq DESC LIMIT 5;",
            "Colors: average coverage per hue" =>
                "SELECT hue, AVG(percent) AS avg_percent FROM artifact_colors WHERE hue IS NOT NULL GROUP BY hue;",
            "Colors: colors of the first artifact" =>
                "SELECT * FROM artifact_colors WHERE objectid = (SELECT MIN(id) FROM artifact_metadata);",
            "Colors: total color entries" =>
                "SELECT COUNT(*) AS total_colors FROM artifact_colors;",
            "Join: titles and hues of Byzantine artifacts" =>
                "SELECT m.title, c.hue FROM artifact_metadata m JOIN artifact_colors c ON m.id = c.objectid WHERE m.culture LIKE '%Byzantine%';",
            "Join: every title with its hues" =>
                "SELECT m.title, c.hue FROM artifact_metadata m JOIN artifact_colors c ON m.id = c.objectid ORDER BY m.title;",
            "Join: titles, cultures and ranks where period is known" =>
                "SELECT m.title, m.culture, me.rank FROM artifact_metadata m JOIN artifact_media me ON m.id = me.objectid WHERE m.period IS NOT NULL;",
            "Join: top 10 ranked titles with hue Grey" =>
                "SELECT m.title, me.rank, c.hue FROM artifact_metadata m JOIN artifact_media me ON m.id = me.objectid JOIN artifact_colors c ON m.id = c.objectid WHERE c.hue = 'Grey' ORDER BY me.rank ASC LIMIT 10;",
            "Join: artifacts and average media count per classification" =>
                "SELECT m.classification, COUNT(*) AS artifact_count, AVG(me.mediacount) AS avg_media FROM artifact_metadata m JOIN artifact_media me ON m.id = me.objectid GROUP BY m.classification ORDER BY artifact_count DESC;",
            "Extra: medium containing Gold" =>
                "SELECT * FROM artifact_metadata WHERE medium LIKE '%Gold%';",
            "Extra: Egyptian artifacts" =>
                "SELECT * FROM artifact_metadata WHERE culture LIKE '%Egyptian%';",
            "Extra: artifacts with more than 2 colors" =>
                "SELECT objectid, COUNT(*) AS color_count FROM artifact_colors GROUP BY objectid HAVING COUNT(*) > 2;",
            "Extra: artifacts per century" =>
                "SELECT century, COUNT(*) AS artifact_count FROM artifact_metadata GROUP BY century;",
            "Extra: artifacts with no description" =>
                "SELECT * FROM artifact_metadata WHERE description IS NULL OR description = '';",
            "Extra: media with colorcount 0" =>
                "SELECT * FROM artifact_media WHERE colorcount = 0;",
            "Extra: top 5 by media count" =>
                "SELECT * FROM artifact_media ORDER BY mediacount DESC LIMIT 5;",
            "Extra: dominant color per artifact" =>
                "SELECT objectid, color, hue, MAX(percent) AS max_percent FROM artifact_colors GROUP BY objectid;",
            "Extra: titles containing Vase" =>
                "SELECT * FROM artifact_metadata WHERE title LIKE '%Vase%';",
            "Extra: average percent per color" =>
                "SELECT color, AVG(percent) AS avg_percent FROM artifact_colors GROUP BY color;",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repo::ClassificationStore;
    use crate::pipeline::normalize::{ArtifactColor, ArtifactMedia, ArtifactMetadata};
    use std::path::PathBuf;

    fn seeded_store(dir: &tempfile::TempDir) -> anyhow::Result<PathBuf> {
        let path = dir.path().join("artifacts.db");
        let mut store = ClassificationStore::open(&path)?;
        let metadata = vec![
            ArtifactMetadata {
                id: 1,
                title: Some("Vase".to_string()),
                culture: Some("Byzantine".to_string()),
                century: Some("11th century".to_string()),
                classification: Some("Vessels".to_string()),
                ..ArtifactMetadata::default()
            },
            ArtifactMetadata {
                id: 2,
                title: Some("Bowl".to_string()),
                classification: Some("Vessels".to_string()),
                ..ArtifactMetadata::default()
            },
        ];
        let media = vec![
            ArtifactMedia {
                object_id: 1,
                media_count: Some(3),
                rank: Some(4),
                ..ArtifactMedia::default()
            },
            ArtifactMedia {
                object_id: 2,
                ..ArtifactMedia::default()
            },
        ];
        let colors = vec![
            ArtifactColor {
                object_id: 1,
                color: Some("#7d7d7d".to_string()),
                hue: Some("Grey".to_string()),
                percent: Some(0.75),
                ..ArtifactColor::default()
            },
            ArtifactColor {
                object_id: 1,
                color: Some("#c89632".to_string()),
                hue: Some("Orange".to_string()),
                percent: Some(0.25),
                ..ArtifactColor::default()
            },
        ];
        store.commit("Vessels", &metadata, &media, &colors)?;
        Ok(path)
    }

    #[test]
    fn test_builtin_queries_all_run() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = seeded_store(&dir)?;
        let catalog = QueryCatalog::default();
        assert_eq!(catalog.queries().len(), 30);
        for query in catalog.queries() {
            catalog.execute(&path, &query.name)?;
        }
        Ok(())
    }

    #[test]
    fn test_join_query_returns_rows() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = seeded_store(&dir)?;
        let catalog = QueryCatalog::default();

        let table = catalog.execute(&path, "Join: titles and hues of Byzantine artifacts")?;
        assert_eq!(table.columns, vec!["title", "hue"]);
        assert_eq!(table.len(), 2);
        assert!(table.rows.iter().all(|row| row[0] == Value::from("Vase")));

        let by_position = catalog.execute(&path, "15")?;
        assert_eq!(by_position.rows, vec![vec![Value::from(2)]]);
        Ok(())
    }

    #[test]
    fn test_missing_tables_are_a_query_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.db");
        Connection::open(&path)?;

        let err = QueryCatalog::default()
            .execute(&path, "Colors: distinct hues")
            .unwrap_err();
        assert!(matches!(err, QueryError::Store { .. }));
        Ok(())
    }

    #[test]
    fn test_writing_queries_are_refused() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = seeded_store(&dir)?;
        let catalog = QueryCatalog::from_json(
            r#"[{"name": "wipe", "sql": "DELETE FROM artifact_colors"},
                {"name": "broken", "sql": "SELEC nonsense"}]"#,
        )?;

        assert!(matches!(
            catalog.execute(&path, "wipe"),
            Err(QueryError::NotReadOnly(_))
        ));
        assert!(matches!(
            catalog.execute(&path, "broken"),
            Err(QueryError::Store { .. })
        ));
        assert!(matches!(
            catalog.execute(&path, "missing"),
            Err(QueryError::UnknownQuery(_))
        ));

        let total = QueryCatalog::default().execute(&path, "Colors: total color entries")?;
        assert_eq!(total.rows, vec![vec![Value::from(2)]]);
        Ok(())
    }

    #[test]
    fn test_lookup_by_position() {
        let catalog = QueryCatalog::default();
        assert_eq!(
            catalog.get("1").map(|q| q.name.as_str()),
            Some("Metadata: 11th century Byzantine artifacts")
        );
        assert!(catalog.get("0").is_none());
        assert!(catalog.get("31").is_none());
    }

    #[test]
    fn test_table_from_serialized_rows() -> anyhow::Result<()> {
        let rows = vec![
            ArtifactColor {
                object_id: 4,
                hue: Some("Red".to_string()),
                ..ArtifactColor::default()
            },
            ArtifactColor {
                object_id: 5,
                ..ArtifactColor::default()
            },
        ];
        let table = ResultTable::from_rows(&rows)?;
        assert_eq!(
            table.columns,
            vec!["object_id", "color", "spectrum", "hue", "percent", "css3"]
        );
        assert_eq!(table.rows[0][0], Value::from(4));
        assert_eq!(table.rows[0][3], Value::from("Red"));
        assert_eq!(table.rows[1][3], Value::Null);

        let metadata = ResultTable::from_rows(&[ArtifactMetadata {
            id: 9,
            ..ArtifactMetadata::default()
        }])?;
        assert_eq!(metadata.columns[..3], ["id", "title", "culture"]);
        Ok(())
    }

    #[test]
    fn test_table_renders_aligned() {
        let table = ResultTable {
            columns: vec!["hue".to_string(), "avg".to_string()],
            rows: vec![
                vec![Value::from("Grey"), Value::from(0.5)],
                vec![Value::Null, Value::from(1)],
            ],
        };
        let text = table.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "hue  | avg");
        assert_eq!(lines[1], "-----+----");
        assert_eq!(lines[2], "Grey | 0.5");
        assert_eq!(lines[3], "NULL | 1");
        assert_eq!(lines[4], "(2 rows)");
    }
}
