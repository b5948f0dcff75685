use serde::Serialize;

use crate::ingest::record::{RawColor, RawRecord};

/// Descriptive row for `artifact_metadata`. `id` is the artifact's API id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactMetadata {
    pub id: i64,
    pub title: Option<String>,
    pub culture: Option<String>,
    pub period: Option<String>,
    pub century: Option<String>,
    pub medium: Option<String>,
    pub dimensions: Option<String>,
    pub description: Option<String>,
    pub department: Option<String>,
    pub classification: Option<String>,
    pub accession_year: Option<i64>,
    pub accession_method: Option<String>,
}

/// Row for `artifact_media`, one per artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactMedia {
    pub object_id: i64,
    pub image_count: Option<i64>,
    pub media_count: Option<i64>,
    pub color_count: Option<i64>,
    pub rank: Option<i64>,
    pub date_begin: Option<i64>,
    pub date_end: Option<i64>,
}

/// Row for `artifact_colors`, one per entry of a record's color list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactColor {
    pub object_id: i64,
    pub color: Option<String>,
    pub spectrum: Option<String>,
    pub hue: Option<String>,
    pub percent: Option<f64>,
    pub css3: Option<String>,
}

/// The three row sets produced from one fetch, tagged with the classification
/// they were fetched for.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedBatch {
    pub classification: String,
    pub metadata: Vec<ArtifactMetadata>,
    pub media: Vec<ArtifactMedia>,
    pub colors: Vec<ArtifactColor>,
}

impl NormalizedBatch {
    pub fn from_records(classification: &str, records: &[RawRecord]) -> Self {
        let (metadata, media, colors) = normalize(records);
        Self {
            classification: classification.to_string(),
            metadata,
            media,
            colors,
        }
    }
}

/// Splits raw records into metadata, media and color rows.
///
/// Every record yields exactly one metadata row and one media row, plus one
/// color row per color entry. Output order follows input order. No
/// deduplication happens here.
pub fn normalize(
    records: &[RawRecord],
) -> (Vec<ArtifactMetadata>, Vec<ArtifactMedia>, Vec<ArtifactColor>) {
    let metadata = records.iter().map(metadata_row).collect();
    let media = records.iter().map(media_row).collect();
    let colors = records
        .iter()
        .flat_map(|record| record.colors.iter().map(move |c| color_row(record.id, c)))
        .collect();
    (metadata, media, colors)
}

fn metadata_row(record: &RawRecord) -> ArtifactMetadata {
    ArtifactMetadata {
        id: record.id,
        title: record.title.clone(),
        culture: record.culture.clone(),
        period: record.period.clone(),
        century: record.century.clone(),
        medium: record.medium.clone(),
        dimensions: record.dimensions.clone(),
        description: record.description.clone(),
        department: record.department.clone(),
        classification: record.classification.clone(),
        accession_year: record.accession_year,
        accession_method: record.accession_method.clone(),
    }
}

fn media_row(record: &RawRecord) -> ArtifactMedia {
    ArtifactMedia {
        object_id: record.id,
        image_count: record.image_count,
        media_count: record.media_count,
        color_count: record.color_count,
        rank: record.rank,
        date_begin: record.date_begin,
        date_end: record.date_end,
    }
}

fn color_row(object_id: i64, color: &RawColor) -> ArtifactColor {
    ArtifactColor {
        object_id,
        color: color.color.clone(),
        spectrum: color.spectrum.clone(),
        hue: color.hue.clone(),
        percent: color.percent,
        css3: color.css3.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn records(values: Vec<Value>) -> anyhow::Result<Vec<RawRecord>> {
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .collect()
    }

    #[test]
    fn test_vase_record_splits_into_three_tables() -> anyhow::Result<()> {
        let input = records(vec![json!({
            "id": 42,
            "title": "Vase",
            "colors": [{"color": "Red", "hue": "Red", "percent": 0.5}]
        })])?;
        let (metadata, media, colors) = normalize(&input);

        assert_eq!(
            metadata,
            vec![ArtifactMetadata {
                id: 42,
                title: Some("Vase".to_string()),
                ..ArtifactMetadata::default()
            }]
        );
        assert_eq!(
            media,
            vec![ArtifactMedia {
                object_id: 42,
                ..ArtifactMedia::default()
            }]
        );
        assert_eq!(
            colors,
            vec![ArtifactColor {
                object_id: 42,
                color: Some("Red".to_string()),
                spectrum: None,
                hue: Some("Red".to_string()),
                percent: Some(0.5),
                css3: None,
            }]
        );
        Ok(())
    }

    #[test]
    fn test_each_record_gets_one_metadata_and_media_row() -> anyhow::Result<()> {
        let input = records(vec![
            json!({"id": 1, "colors": [{"hue": "Grey"}, {"hue": "Blue"}, {"hue": "Red"}]}),
            json!({"id": 2}),
            json!({"id": 3, "colors": "not a list"}),
            json!({"id": 4, "colors": null}),
            json!({"id": 5, "colors": [{"hue": "Green"}]}),
        ])?;
        let (metadata, media, colors) = normalize(&input);

        assert_eq!(metadata.len(), 5);
        assert_eq!(media.len(), 5);
        for (record, (meta, med)) in input.iter().zip(metadata.iter().zip(&media)) {
            assert_eq!(meta.id, record.id);
            assert_eq!(med.object_id, record.id);
            let own_colors = colors.iter().filter(|c| c.object_id == record.id).count();
            assert_eq!(own_colors, record.colors.len());
        }

        let owners: Vec<i64> = colors.iter().map(|c| c.object_id).collect();
        assert_eq!(owners, vec![1, 1, 1, 5]);
        Ok(())
    }

    #[test]
    fn test_media_fields_are_carried_over() -> anyhow::Result<()> {
        let input = records(vec![json!({
            "id": 9,
            "imagecount": 2,
            "mediacount": 0,
            "colorcount": 4,
            "rank": 1200,
            "datebegin": 1500,
            "dateend": 1599,
            "accessionyear": 1977,
            "classification": "Coins"
        })])?;
        let (metadata, media, _) = normalize(&input);

        assert_eq!(metadata[0].accession_year, Some(1977));
        assert_eq!(metadata[0].classification.as_deref(), Some("Coins"));
        assert_eq!(
            media[0],
            ArtifactMedia {
                object_id: 9,
                image_count: Some(2),
                media_count: Some(0),
                color_count: Some(4),
                rank: Some(1200),
                date_begin: Some(1500),
                date_end: Some(1599),
            }
        );
        Ok(())
    }

    #[test]
    fn test_normalize_is_deterministic() -> anyhow::Result<()> {
        let input = records(vec![
            json!({"id": 10, "title": "Coin", "colors": [{"color": "Gold", "percent": 0.9}]}),
            json!({"id": 11, "title": "Stamp"}),
        ])?;
        let first = NormalizedBatch::from_records("Coins", &input);
        let second = NormalizedBatch::from_records("Coins", &input);
        assert_eq!(first, second);
        assert_eq!(serde_json::to_vec(&first)?, serde_json::to_vec(&second)?);
        Ok(())
    }

    #[test]
    fn test_empty_input_gives_empty_tables() {
        let (metadata, media, colors) = normalize(&[]);
        assert!(metadata.is_empty() && media.is_empty() && colors.is_empty());
    }
}
