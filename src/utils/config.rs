use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::info;

use crate::ingest::fetcher::FetchPlan;

pub const API_KEY: &str = "HARVARD_API_KEY";
pub const API_URL: &str = "HARVARD_API_URL";
pub const DB_PATH: &str = "ARTIFACT_DB_PATH";
pub const MIN_OBJECT_COUNT: &str = "MIN_OBJECT_COUNT";
pub const CLASSIFICATION_PAGES: &str = "CLASSIFICATION_PAGES";
pub const CLASSIFICATION_PAGE_SIZE: &str = "CLASSIFICATION_PAGE_SIZE";
pub const OBJECT_PAGES: &str = "OBJECT_PAGES";
pub const OBJECT_PAGE_SIZE: &str = "OBJECT_PAGE_SIZE";
pub const PAGE_DELAY_MS: &str = "PAGE_DELAY_MS";
pub const PARALLEL_FETCH: &str = "PARALLEL_FETCH";
pub const STRICT_TOTALS: &str = "STRICT_TOTALS";
pub const QUERY_CATALOG: &str = "QUERY_CATALOG";

const KEYS: [&str; 12] = [
    API_KEY,
    API_URL,
    DB_PATH,
    MIN_OBJECT_COUNT,
    CLASSIFICATION_PAGES,
    CLASSIFICATION_PAGE_SIZE,
    OBJECT_PAGES,
    OBJECT_PAGE_SIZE,
    PAGE_DELAY_MS,
    PARALLEL_FETCH,
    STRICT_TOTALS,
    QUERY_CATALOG,
];

pub const DEFAULT_API_URL: &str = "https://api.harvardartmuseums.org";
pub const DEFAULT_DB_PATH: &str = "harvard_artifacts.db";
pub const DEFAULT_MIN_OBJECT_COUNT: i64 = 2500;

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub api_url: String,
    pub db_path: PathBuf,
    pub min_object_count: i64,
    pub classification_pages: u32,
    pub classification_page_size: u32,
    pub object_pages: u32,
    pub object_page_size: u32,
    pub page_delay_ms: u64,
    pub parallel: bool,
    pub strict_totals: bool,
    pub catalog_path: Option<PathBuf>,
}

/// Values given on the command line. They win over every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub db_path: Option<PathBuf>,
    pub min_object_count: Option<i64>,
    pub object_pages: Option<u32>,
    pub object_page_size: Option<u32>,
    pub parallel: Option<bool>,
    pub strict_totals: Option<bool>,
    pub catalog_path: Option<PathBuf>,
}

impl Settings {
    /// Resolves settings from flags, the process environment, then `env_file`.
    pub fn resolve(overrides: &Overrides, env_file: &Path) -> Result<Self> {
        let mut vars = if env_file.exists() {
            let vars = load_from_env(env_file)?;
            info!("Loaded settings from {:?}", env_file);
            vars
        } else {
            HashMap::new()
        };
        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                vars.insert(key.to_string(), value);
            }
        }
        Self::from_vars(&vars, overrides)
    }

    pub fn from_vars(vars: &HashMap<String, String>, overrides: &Overrides) -> Result<Self> {
        let defaults = FetchPlan::default();
        let text = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            api_key: overrides.api_key.clone().or_else(|| text(API_KEY)),
            api_url: overrides
                .api_url
                .clone()
                .or_else(|| text(API_URL))
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            db_path: overrides
                .db_path
                .clone()
                .or_else(|| text(DB_PATH).map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            min_object_count: pick(
                overrides.min_object_count,
                vars,
                MIN_OBJECT_COUNT,
                DEFAULT_MIN_OBJECT_COUNT,
            )?,
            classification_pages: pick(
                None,
                vars,
                CLASSIFICATION_PAGES,
                defaults.classification_pages,
            )?,
            classification_page_size: pick(
                None,
                vars,
                CLASSIFICATION_PAGE_SIZE,
                defaults.classification_page_size,
            )?,
            object_pages: pick(overrides.object_pages, vars, OBJECT_PAGES, defaults.object_pages)?,
            object_page_size: pick(
                overrides.object_page_size,
                vars,
                OBJECT_PAGE_SIZE,
                defaults.object_page_size,
            )?,
            page_delay_ms: pick(
                None,
                vars,
                PAGE_DELAY_MS,
                defaults.page_delay.as_millis() as u64,
            )?,
            parallel: match overrides.parallel {
                Some(on) => on,
                None => flag(vars, PARALLEL_FETCH)?,
            },
            strict_totals: match overrides.strict_totals {
                Some(on) => on,
                None => flag(vars, STRICT_TOTALS)?,
            },
            catalog_path: overrides
                .catalog_path
                .clone()
                .or_else(|| text(QUERY_CATALOG).map(PathBuf::from)),
        })
    }

    pub fn fetch_plan(&self) -> FetchPlan {
        FetchPlan {
            classification_pages: self.classification_pages,
            classification_page_size: self.classification_page_size,
            object_pages: self.object_pages,
            object_page_size: self.object_page_size,
            page_delay: Duration::from_millis(self.page_delay_ms),
            parallel: self.parallel,
            strict_totals: self.strict_totals,
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("No API key configured. Pass --api-key or set {API_KEY}."))
    }

    fn to_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = Vec::new();
        if let Some(key) = &self.api_key {
            vars.push((API_KEY, key.clone()));
        }
        vars.push((API_URL, self.api_url.clone()));
        vars.push((DB_PATH, self.db_path.display().to_string()));
        vars.push((MIN_OBJECT_COUNT, self.min_object_count.to_string()));
        vars.push((CLASSIFICATION_PAGES, self.classification_pages.to_string()));
        vars.push((CLASSIFICATION_PAGE_SIZE, self.classification_page_size.to_string()));
        vars.push((OBJECT_PAGES, self.object_pages.to_string()));
        vars.push((OBJECT_PAGE_SIZE, self.object_page_size.to_string()));
        vars.push((PAGE_DELAY_MS, self.page_delay_ms.to_string()));
        vars.push((PARALLEL_FETCH, self.parallel.to_string()));
        vars.push((STRICT_TOTALS, self.strict_totals.to_string()));
        if let Some(path) = &self.catalog_path {
            vars.push((QUERY_CATALOG, path.display().to_string()));
        }
        vars
    }
}

fn pick<T>(flag: Option<T>, vars: &HashMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = flag {
        return Ok(value);
    }
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("Invalid value for {key}: '{raw}' ({e})")),
        None => Ok(default),
    }
}

fn flag(vars: &HashMap<String, String>, key: &str) -> Result<bool> {
    match vars.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "" | "0" | "false" | "no" | "off" => Ok(false),
            "1" | "true" | "yes" | "on" => Ok(true),
            _ => Err(anyhow!("Invalid value for {key}: '{v}' (expected true or false)")),
        },
    }
}

fn load_from_env(path: &Path) -> Result<HashMap<String, String>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let reader = BufReader::new(file);

    let mut vars = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            vars.insert(key.trim().to_string(), value.to_string());
        }
    }
    Ok(vars)
}

pub fn save_to_env(path: &Path, settings: &Settings) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    for (key, value) in settings.to_vars() {
        writeln!(file, "{key}={value}")?;
    }
    Ok(())
}
