use std::thread;
use std::time::Duration;

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::ingest::record::{Classification, RawRecord};

pub const CLASSIFICATION_ENDPOINT: &str = "classification";
pub const OBJECT_ENDPOINT: &str = "object";

/// A single page request against a listing endpoint. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub endpoint: &'static str,
    pub page: u32,
    pub size: u32,
    pub classification: Option<String>,
}

/// Paging summary the API returns alongside each page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageInfo {
    #[serde(default, rename = "totalrecords")]
    pub total_records: Option<u64>,
    #[serde(default)]
    pub pages: Option<u64>,
    #[serde(default)]
    pub page: Option<u64>,
}

/// Decoded body of one listing page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub info: Option<PageInfo>,
    pub records: Vec<Value>,
}

/// Transport used by [`PageFetcher`]. Implementations map every failure
/// (network, status, body) onto [`FetchError`].
pub trait PageSource: Send + Sync {
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError>;
}

/// How many pages to request and how.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub classification_pages: u32,
    pub classification_page_size: u32,
    pub object_pages: u32,
    pub object_page_size: u32,
    pub page_delay: Duration,
    pub parallel: bool,
    pub strict_totals: bool,
}

impl Default for FetchPlan {
    fn default() -> Self {
        Self {
            classification_pages: 7,
            classification_page_size: 10,
            object_pages: 25,
            object_page_size: 100,
            page_delay: Duration::from_millis(50),
            parallel: false,
            strict_totals: false,
        }
    }
}

pub struct PageFetcher<S> {
    source: S,
    plan: FetchPlan,
    progress: Option<ProgressBar>,
}

impl<S: PageSource> PageFetcher<S> {
    pub fn new(source: S, plan: FetchPlan) -> Self {
        Self {
            source,
            plan,
            progress: None,
        }
    }

    /// Report page completion on `bar`. Its length is reset for every fetch.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn plan(&self) -> &FetchPlan {
        &self.plan
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Walks the classification listing for the configured page budget.
    pub fn fetch_classifications(&self) -> Result<Vec<Classification>, FetchError> {
        self.fetch_all(
            CLASSIFICATION_ENDPOINT,
            None,
            self.plan.classification_page_size,
            self.plan.classification_pages,
        )
    }

    /// Fetches `page_count` pages of `page_size` objects filtered by
    /// `classification`, in page order then in-page order.
    pub fn fetch_objects(
        &self,
        classification: &str,
        page_size: u32,
        page_count: u32,
    ) -> Result<Vec<RawRecord>, FetchError> {
        self.fetch_all(OBJECT_ENDPOINT, Some(classification), page_size, page_count)
    }

    fn fetch_all<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        classification: Option<&str>,
        size: u32,
        page_count: u32,
    ) -> Result<Vec<T>, FetchError> {
        info!(
            endpoint,
            classification = classification.unwrap_or("-"),
            pages = page_count,
            size,
            "Fetching pages"
        );
        if let Some(bar) = &self.progress {
            bar.reset();
            bar.set_length(u64::from(page_count));
        }

        let request = |page: u32| PageRequest {
            endpoint,
            page,
            size,
            classification: classification.map(str::to_string),
        };

        let pages: Vec<(PageRequest, Page)> = if self.plan.parallel {
            (1..=page_count)
                .into_par_iter()
                .map(|page| -> Result<(PageRequest, Page), FetchError> {
                    let req = request(page);
                    let body = self.fetch_one(&req)?;
                    Ok((req, body))
                })
                .collect::<Result<_, _>>()?
        } else {
            let mut pages = Vec::with_capacity(page_count as usize);
            for page in 1..=page_count {
                if page > 1 && !self.plan.page_delay.is_zero() {
                    thread::sleep(self.plan.page_delay);
                }
                let req = request(page);
                let body = self.fetch_one(&req)?;
                pages.push((req, body));
            }
            pages
        };

        if let Some(bar) = &self.progress {
            bar.finish();
        }

        let expected = pages
            .iter()
            .find_map(|(_, body)| body.info.as_ref().and_then(|info| info.total_records));

        let mut records = Vec::new();
        for (req, body) in pages {
            for (index, raw) in body.records.into_iter().enumerate() {
                let record = serde_json::from_value(raw).map_err(|e| FetchError::Malformed {
                    endpoint: endpoint.to_string(),
                    page: req.page,
                    classification: req.classification.clone(),
                    reason: format!("record {index}: {e}"),
                })?;
                records.push(record);
            }
        }

        self.verify_total(endpoint, classification, size, page_count, expected, records.len())?;

        info!(endpoint, records = records.len(), "Fetch complete");
        Ok(records)
    }

    fn fetch_one(&self, request: &PageRequest) -> Result<Page, FetchError> {
        let page = self.source.fetch_page(request)?;
        debug!(
            endpoint = request.endpoint,
            page = request.page,
            records = page.records.len(),
            "Fetched page"
        );
        if let Some(bar) = &self.progress {
            bar.inc(1);
        }
        Ok(page)
    }

    /// Compares what arrived with what the API says exists, capped at what the
    /// page budget could possibly hold.
    fn verify_total(
        &self,
        endpoint: &str,
        classification: Option<&str>,
        size: u32,
        page_count: u32,
        reported: Option<u64>,
        received: usize,
    ) -> Result<(), FetchError> {
        let Some(reported) = reported else {
            return Ok(());
        };
        let expected = reported.min(u64::from(size) * u64::from(page_count));
        let received = received as u64;
        if received >= expected {
            return Ok(());
        }

        if self.plan.strict_totals {
            return Err(FetchError::Shortfall {
                endpoint: endpoint.to_string(),
                classification: classification.map(str::to_string),
                expected,
                received,
            });
        }
        warn!(
            endpoint,
            classification = classification.unwrap_or("-"),
            expected,
            received,
            "Fetched fewer records than the API reported"
        );
        Ok(())
    }
}

/// Classifications with at least `min_object_count` objects, in listing order.
pub fn eligible(
    classifications: Vec<Classification>,
    min_object_count: i64,
) -> Vec<Classification> {
    classifications
        .into_iter()
        .filter(|c| c.object_count >= min_object_count)
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory source keyed by (endpoint, page). Missing pages come back empty.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub pages: HashMap<(&'static str, u32), Page>,
        pub fail_on: Option<u32>,
        pub requests: Mutex<Vec<PageRequest>>,
    }

    impl FakeSource {
        pub fn with_page(mut self, endpoint: &'static str, page: u32, records: Vec<Value>) -> Self {
            self.pages.insert(
                (endpoint, page),
                Page {
                    info: None,
                    records,
                },
            );
            self
        }

        pub fn with_total(mut self, endpoint: &'static str, page: u32, total: u64) -> Self {
            self.pages.entry((endpoint, page)).or_default().info = Some(PageInfo {
                total_records: Some(total),
                ..PageInfo::default()
            });
            self
        }
    }

    impl PageSource for FakeSource {
        fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_on == Some(request.page) {
                return Err(FetchError::Status {
                    endpoint: request.endpoint.to_string(),
                    page: request.page,
                    classification: request.classification.clone(),
                    status: 503,
                });
            }
            Ok(self
                .pages
                .get(&(request.endpoint, request.page))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn quick_plan() -> FetchPlan {
        FetchPlan {
            page_delay: Duration::ZERO,
            ..FetchPlan::default()
        }
    }

    fn object_source() -> FakeSource {
        FakeSource::default()
            .with_page(OBJECT_ENDPOINT, 1, vec![json!({"id": 1}), json!({"id": 2})])
            .with_page(OBJECT_ENDPOINT, 2, vec![json!({"id": 3})])
            .with_page(OBJECT_ENDPOINT, 3, vec![json!({"id": 4}), json!({"id": 5})])
    }

    #[test]
    fn test_objects_accumulate_in_page_order() -> anyhow::Result<()> {
        let fetcher = PageFetcher::new(object_source(), quick_plan());
        let records = fetcher.fetch_objects("Coins", 2, 3)?;

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let requests = fetcher.source.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.size == 2));
        assert!(requests
            .iter()
            .all(|r| r.classification.as_deref() == Some("Coins")));
        Ok(())
    }

    #[test]
    fn test_parallel_fetch_keeps_order() -> anyhow::Result<()> {
        let plan = FetchPlan {
            parallel: true,
            ..quick_plan()
        };
        let fetcher = PageFetcher::new(object_source(), plan);
        let ids: Vec<i64> = fetcher
            .fetch_objects("Coins", 2, 3)?
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn test_failed_page_fails_whole_fetch() {
        let source = FakeSource {
            fail_on: Some(2),
            ..object_source()
        };
        let fetcher = PageFetcher::new(source, quick_plan());
        let err = fetcher.fetch_objects("Coins", 2, 3).unwrap_err();
        assert!(matches!(err, FetchError::Status { page: 2, status: 503, .. }));
        // No retry and nothing after the failing page.
        assert_eq!(fetcher.source.requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_undecodable_record_is_malformed() {
        let source = FakeSource::default().with_page(OBJECT_ENDPOINT, 1, vec![json!({"title": "no id"})]);
        let fetcher = PageFetcher::new(source, quick_plan());
        let err = fetcher.fetch_objects("Coins", 10, 1).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { page: 1, .. }));
    }

    #[test]
    fn test_classification_listing_uses_page_budget() -> anyhow::Result<()> {
        let source = FakeSource::default()
            .with_page(
                CLASSIFICATION_ENDPOINT,
                1,
                vec![json!({"name": "Coins", "objectcount": 3000})],
            )
            .with_page(
                CLASSIFICATION_ENDPOINT,
                7,
                vec![json!({"name": "Stamps", "objectcount": 10})],
            );
        let fetcher = PageFetcher::new(source, quick_plan());
        let classes = fetcher.fetch_classifications()?;

        assert_eq!(classes.len(), 2);
        assert_eq!(fetcher.source.requests.lock().unwrap().len(), 7);

        let names: Vec<String> = eligible(classes, 2500).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Coins".to_string()]);
        Ok(())
    }

    #[test]
    fn test_shortfall_warns_unless_strict() -> anyhow::Result<()> {
        let lenient = PageFetcher::new(object_source().with_total(OBJECT_ENDPOINT, 1, 9), quick_plan());
        assert_eq!(lenient.fetch_objects("Coins", 2, 3)?.len(), 5);

        let strict_plan = FetchPlan {
            strict_totals: true,
            ..quick_plan()
        };
        // Budget of 3 pages x 2 records caps the expectation at 6.
        let strict = PageFetcher::new(object_source().with_total(OBJECT_ENDPOINT, 1, 9), strict_plan.clone());
        let err = strict.fetch_objects("Coins", 2, 3).unwrap_err();
        assert!(matches!(
            err,
            FetchError::Shortfall {
                expected: 6,
                received: 5,
                ..
            }
        ));

        let complete = PageFetcher::new(object_source().with_total(OBJECT_ENDPOINT, 1, 5), strict_plan);
        assert_eq!(complete.fetch_objects("Coins", 2, 3)?.len(), 5);
        Ok(())
    }
}
