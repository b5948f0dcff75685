use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One entry of the classification listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub name: String,
    #[serde(rename = "objectcount")]
    pub object_count: i64,
}

/// An object record as returned by the object listing endpoint.
///
/// The API is loose about types (years arrive as numbers or strings, fields go
/// missing), so every field except the identifier is optional and decoded
/// leniently: a value of the wrong shape becomes `None` rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecord {
    pub id: i64,

    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub culture: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub period: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub century: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub medium: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dimensions: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub classification: Option<String>,
    #[serde(default, rename = "accessionyear", deserialize_with = "lenient_int")]
    pub accession_year: Option<i64>,
    #[serde(default, rename = "accessionmethod", deserialize_with = "lenient_string")]
    pub accession_method: Option<String>,

    #[serde(default, rename = "imagecount", deserialize_with = "lenient_int")]
    pub image_count: Option<i64>,
    #[serde(default, rename = "mediacount", deserialize_with = "lenient_int")]
    pub media_count: Option<i64>,
    #[serde(default, rename = "colorcount", deserialize_with = "lenient_int")]
    pub color_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub rank: Option<i64>,
    #[serde(default, rename = "datebegin", deserialize_with = "lenient_int")]
    pub date_begin: Option<i64>,
    #[serde(default, rename = "dateend", deserialize_with = "lenient_int")]
    pub date_end: Option<i64>,

    /// Embedded color breakdown. Empty when the field is missing or not a list.
    #[serde(default, deserialize_with = "color_list")]
    pub colors: Vec<RawColor>,
}

/// One element of a record's `colors` list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawColor {
    #[serde(deserialize_with = "lenient_string")]
    pub color: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub spectrum: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub hue: Option<String>,
    #[serde(deserialize_with = "lenient_float")]
    pub percent: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub css3: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn color_list<'de, D>(deserializer: D) -> Result<Vec<RawColor>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| RawColor::deserialize(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    })
}
