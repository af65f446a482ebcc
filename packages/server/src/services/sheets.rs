use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use common::cache::{Clock, SystemClock};
use common::retry::calculate_backoff;

use super::google::{AuthError, ServiceAccountTokens};

/// A sheet row keyed by its (uniquified) header names.
pub type Row = HashMap<String, String>;

const READ_ATTEMPTS: u32 = 4;
const BACKOFF_BASE_MS: u64 = 200;
const BACKOFF_CAP_MS: u64 = 2000;
const BACKOFF_JITTER_MS: u64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    /// All read attempts failed; carries the range and the last cause.
    #[error("sheets read failed for range \"{range}\": {reason}")]
    Exhausted { range: String, reason: String },
    #[error("sheets api error: {0}")]
    Api(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Narrow contract over a spreadsheet range read. One implementation per
/// spreadsheet; a single call, no caching, no retries.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Reads a range (e.g. `Grades!A:Z`) as stringified cell rows.
    async fn values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError>;
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Google Sheets v4 `values.get` bound to one spreadsheet.
pub struct GoogleSheets {
    http: reqwest::Client,
    tokens: Arc<ServiceAccountTokens>,
    spreadsheet_id: String,
}

impl GoogleSheets {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<ServiceAccountTokens>,
        spreadsheet_id: &str,
    ) -> Self {
        Self {
            http,
            tokens,
            spreadsheet_id: spreadsheet_id.to_string(),
        }
    }
}

#[async_trait]
impl SheetSource for GoogleSheets {
    async fn values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let token = self.tokens.bearer().await?;
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}",
            self.spreadsheet_id, range
        );
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&[
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("majorDimension", "ROWS"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Api(format!("{status}: {body}")));
        }

        let body: ValuesResponse = response.json().await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(stringify_cell).collect())
            .collect())
    }
}

fn stringify_cell(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Deduplicates header names (`NAME`, `NAME_2`, …) and fills blanks with a
/// placeholder so every row key is unique and non-empty.
fn uniquify_headers(raw: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, u32> = HashMap::new();
    raw.iter()
        .map(|h| {
            let name = h.trim();
            let name = if name.is_empty() { "COL" } else { name };
            let count = seen.entry(name.to_string()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name.to_string()
            } else {
                format!("{name}_{count}")
            }
        })
        .collect()
}

struct CachedTab {
    rows: Arc<Vec<Row>>,
    stored_at: Instant,
}

/// Per-tab TTL cache over a [`SheetSource`], with bounded retry.
///
/// A refresh replaces the tab's entry as a whole; concurrent readers see
/// either the old or the new rows. Two requests racing past an expired TTL
/// may both fetch; that duplicate work is accepted.
pub struct SheetCache {
    source: Arc<dyn SheetSource>,
    ttl: std::time::Duration,
    clock: Arc<dyn Clock>,
    tabs: DashMap<String, CachedTab>,
}

impl SheetCache {
    pub fn new(source: Arc<dyn SheetSource>, ttl: std::time::Duration) -> Self {
        Self::with_clock(source, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        source: Arc<dyn SheetSource>,
        ttl: std::time::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            ttl,
            clock,
            tabs: DashMap::new(),
        }
    }

    /// Reads a tab as header-keyed rows, serving from cache within the TTL.
    pub async fn read_tab(&self, tab: &str) -> Result<Arc<Vec<Row>>, SheetsError> {
        if let Some(hit) = self.tabs.get(tab)
            && self.clock.now().duration_since(hit.stored_at) < self.ttl
        {
            return Ok(Arc::clone(&hit.rows));
        }

        let range = format!("{tab}!A:Z");
        let raw = self.fetch_with_retry(&range).await?;
        let rows = Arc::new(parse_rows(raw));

        self.tabs.insert(
            tab.to_string(),
            CachedTab {
                rows: Arc::clone(&rows),
                stored_at: self.clock.now(),
            },
        );
        Ok(rows)
    }

    /// Drops every cached tab.
    pub fn clear(&self) {
        self.tabs.clear();
    }

    async fn fetch_with_retry(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let mut last_reason = String::new();
        for attempt in 0..READ_ATTEMPTS {
            match self.source.values(range).await {
                Ok(rows) => return Ok(rows),
                Err(err) => {
                    last_reason = err.to_string();
                    tracing::warn!(range, attempt, error = %last_reason, "sheet read failed");
                    if attempt + 1 < READ_ATTEMPTS {
                        tokio::time::sleep(calculate_backoff(
                            attempt,
                            BACKOFF_BASE_MS,
                            BACKOFF_CAP_MS,
                            BACKOFF_JITTER_MS,
                        ))
                        .await;
                    }
                }
            }
        }
        Err(SheetsError::Exhausted {
            range: range.to_string(),
            reason: last_reason,
        })
    }
}

fn parse_rows(raw: Vec<Vec<String>>) -> Vec<Row> {
    let mut rows = raw.into_iter();
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };
    let header = uniquify_headers(&header_row);

    rows.map(|cells| {
        header
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let value = cells.get(i).map(|c| c.trim().to_string()).unwrap_or_default();
                (key.clone(), value)
            })
            .collect()
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use common::cache::ManualClock;

    use super::*;

    struct StaticSource {
        tabs: Mutex<HashMap<String, Vec<Vec<String>>>>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StaticSource {
        fn new(tabs: HashMap<String, Vec<Vec<String>>>) -> Self {
            Self {
                tabs: Mutex::new(tabs),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                tabs: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SheetSource for StaticSource {
        async fn values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SheetsError::Api("boom".into()));
            }
            Ok(self
                .tabs
                .lock()
                .unwrap()
                .get(range)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn headers_are_uniquified_and_blanks_placeholdered() {
        let header = vec![
            "id".to_string(),
            "name".to_string(),
            "name".to_string(),
            "  ".to_string(),
            "name".to_string(),
        ];
        assert_eq!(
            uniquify_headers(&header),
            vec!["id", "name", "name_2", "COL", "name_3"]
        );
    }

    #[tokio::test]
    async fn rows_are_keyed_and_trimmed() {
        let source = StaticSource::new(HashMap::from([(
            "Grades!A:Z".to_string(),
            rows(&[&["id", "name"], &[" g1 ", " Grade 9 "], &["g2"]]),
        )]));
        let cache = SheetCache::new(Arc::new(source), Duration::from_secs(60));

        let result = cache.read_tab("Grades").await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0]["id"], "g1");
        assert_eq!(result[0]["name"], "Grade 9");
        // Short rows are padded with empty strings.
        assert_eq!(result[1]["name"], "");
    }

    #[tokio::test]
    async fn empty_sheet_yields_no_rows() {
        let source = StaticSource::new(HashMap::new());
        let cache = SheetCache::new(Arc::new(source), Duration::from_secs(60));
        assert!(cache.read_tab("Missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_serves_within_ttl_and_refetches_after() {
        let source = Arc::new(StaticSource::new(HashMap::from([(
            "Tab!A:Z".to_string(),
            rows(&[&["id"], &["1"]]),
        )])));
        let clock = Arc::new(ManualClock::new());
        let cache = SheetCache::with_clock(
            source.clone(),
            Duration::from_secs(60),
            clock.clone(),
        );

        cache.read_tab("Tab").await.unwrap();
        cache.read_tab("Tab").await.unwrap();
        assert_eq!(source.calls(), 1);

        clock.advance(Duration::from_secs(61));
        cache.read_tab("Tab").await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn clear_drops_cached_tabs() {
        let source = Arc::new(StaticSource::new(HashMap::from([(
            "Tab!A:Z".to_string(),
            rows(&[&["id"], &["1"]]),
        )])));
        let cache = SheetCache::new(source.clone(), Duration::from_secs(60));

        cache.read_tab("Tab").await.unwrap();
        cache.clear();
        cache.read_tab("Tab").await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn read_exhausts_retries_then_reports_range() {
        let source = Arc::new(StaticSource::failing());
        let cache = SheetCache::new(source.clone(), Duration::from_secs(60));

        let err = cache.read_tab("Roles").await.unwrap_err();
        assert_eq!(source.calls(), READ_ATTEMPTS as usize);
        match err {
            SheetsError::Exhausted { range, reason } => {
                assert_eq!(range, "Roles!A:Z");
                assert!(reason.contains("boom"));
            }
            other => panic!("expected Exhausted, got {other}"),
        }
    }
}
