mod extract;
mod notifier;

pub use extract::{Anchors, ExtractError, Quote, extract_quote, parse_amount, round2};
pub use notifier::{Notifier, change_message, error_message, value_or_na};

use core::time::Duration;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const CLOCK: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceWatchConfig {
    pub url: String,
    /// Shown in change notifications.
    pub label: String,
    pub interval_secs: u64,
    pub utc_offset_hours: i8,
    pub anchors: Anchors,
}

impl Default for PriceWatchConfig {
    fn default() -> Self {
        Self {
            url: "https://www.infodolar.com/cotizacion-dolar-provincia-cordoba.aspx".to_owned(),
            label: "CORDOBA".to_owned(),
            interval_secs: 60,
            utc_offset_hours: -3,
            anchors: Anchors::default(),
        }
    }
}

impl PriceWatchConfig {
    #[must_use]
    pub fn offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Snapshot of the feed as of the most recent check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceState {
    /// Time of the last successful check.
    pub checked_at: Option<OffsetDateTime>,
    pub buy: Option<f64>,
    pub sell: Option<f64>,
    /// Values that were current right before the last detected change.
    pub changed_at: Option<OffsetDateTime>,
    pub buy_last_change: Option<f64>,
    pub sell_last_change: Option<f64>,
    /// Whether the most recent check detected a change.
    pub changed: bool,
    pub error: Option<String>,
    pub checked_once: bool,
}

impl PriceState {
    /// Fold one check outcome into the state.
    pub fn record(&mut self, outcome: Result<Quote>, now: OffsetDateTime) {
        match outcome {
            Ok(Quote { buy, sell }) => {
                let had_values = self.buy.is_some() && self.sell.is_some();
                let differs = self.buy != Some(buy) || self.sell != Some(sell);
                let changed = self.checked_once && had_values && differs;
                if changed {
                    self.changed_at = self.checked_at;
                    self.buy_last_change = self.buy;
                    self.sell_last_change = self.sell;
                }
                self.checked_at = Some(now);
                self.buy = Some(buy);
                self.sell = Some(sell);
                self.changed = changed;
                self.error = None;
            }
            Err(e) => {
                self.changed = false;
                self.error = Some(format!("{} - ERROR: {e:#}", clock(now)));
            }
        }
        self.checked_once = true;
    }
}

/// Format a timestamp as `HH:MM:SS`.
#[must_use]
pub fn clock(at: OffsetDateTime) -> String {
    at.format(CLOCK).unwrap_or_else(|_| "??:??:??".to_owned())
}

/// Read handle on the shared price state.
#[derive(Debug, Clone, Default)]
pub struct PriceBoard {
    state: Arc<RwLock<PriceState>>,
}

impl PriceBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> PriceState {
        self.state.read().await.clone()
    }
}

/// Source of the raw feed markup.
#[async_trait]
pub trait Feed: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Feed for HttpFeed {
    async fn fetch(&self) -> Result<String> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("fetching {}", self.url))?
            .error_for_status()
            .context("feed returned an error status")?;
        resp.text().await.context("reading feed body")
    }
}

/// Polls the feed and owns the only writer to the price state.
pub struct PriceWatcher {
    feed: Arc<dyn Feed>,
    anchors: Anchors,
    offset: UtcOffset,
    board: PriceBoard,
}

impl core::fmt::Debug for PriceWatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PriceWatcher")
            .field("anchors", &self.anchors)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl PriceWatcher {
    pub fn new(feed: Arc<dyn Feed>, anchors: Anchors, offset: UtcOffset) -> Self {
        Self {
            feed,
            anchors,
            offset,
            board: PriceBoard::new(),
        }
    }

    #[must_use]
    pub fn board(&self) -> PriceBoard {
        self.board.clone()
    }

    /// Run one check. Never fails: problems end up in [`PriceState::error`].
    pub async fn check(&self) -> PriceState {
        let outcome = match self.feed.fetch().await {
            Ok(body) => {
                debug!(bytes = body.len(), "Fetched price feed");
                extract_quote(&body, &self.anchors).map_err(anyhow::Error::from)
            }
            Err(e) => Err(e),
        };
        let now = OffsetDateTime::now_utc().to_offset(self.offset);

        let mut state = self.board.state.write().await;
        state.record(outcome, now);
        match (&state.error, state.changed) {
            (Some(err), _) => warn!(error = %err, "Price check failed"),
            (None, true) => info!(buy = ?state.buy, sell = ?state.sell, "Price changed"),
            (None, false) => debug!(buy = ?state.buy, sell = ?state.sell, "Price unchanged"),
        }
        state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap()
    }

    const fn quote(buy: f64, sell: f64) -> Result<Quote> {
        Ok(Quote { buy, sell })
    }

    #[test]
    fn first_success_never_counts_as_change() {
        let mut state = PriceState::default();
        state.record(quote(1000.0, 1050.0), at(0));

        assert!(state.checked_once);
        assert!(!state.changed);
        assert_eq!(state.buy, Some(1000.0));
        assert_eq!(state.sell, Some(1050.0));
        assert!(state.buy_last_change.is_none());
    }

    #[test]
    fn differing_second_check_is_a_change() {
        let mut state = PriceState::default();
        state.record(quote(1000.0, 1050.0), at(0));
        state.record(quote(1010.0, 1050.0), at(60));

        assert!(state.changed);
        assert_eq!(state.buy, Some(1010.0));
        assert_eq!(state.buy_last_change, Some(1000.0));
        assert_eq!(state.sell_last_change, Some(1050.0));
        assert_eq!(state.changed_at, Some(at(0)));
        assert_eq!(state.checked_at, Some(at(60)));
    }

    #[test]
    fn identical_check_clears_changed_flag() {
        let mut state = PriceState::default();
        state.record(quote(1000.0, 1050.0), at(0));
        state.record(quote(1010.0, 1050.0), at(60));
        state.record(quote(1010.0, 1050.0), at(120));

        assert!(!state.changed);
        assert_eq!(state.buy_last_change, Some(1000.0));
    }

    #[test]
    fn failure_keeps_previous_values() {
        let mut state = PriceState::default();
        state.record(quote(1000.0, 1050.0), at(0));
        state.record(Err(ExtractError::Zero("sell").into()), at(60));

        assert!(!state.changed);
        assert_eq!(state.buy, Some(1000.0));
        assert_eq!(state.sell, Some(1050.0));
        assert_eq!(state.checked_at, Some(at(0)));
        let err = state.error.as_deref().unwrap();
        assert!(err.contains("sell value is zero"), "{err}");
    }

    #[test]
    fn failed_first_check_marks_checked_without_enabling_change() {
        let mut state = PriceState::default();
        state.record(Err(anyhow!("timeout")), at(0));
        assert!(state.checked_once);
        assert!(state.buy.is_none());

        state.record(quote(1000.0, 1050.0), at(60));
        assert!(!state.changed);
        assert!(state.error.is_none());
    }

    struct StaticFeed(Mutex<Vec<Result<String>>>);

    #[async_trait]
    impl Feed for StaticFeed {
        async fn fetch(&self) -> Result<String> {
            self.0.lock().unwrap().remove(0)
        }
    }

    fn page(buy: &str, sell: &str) -> String {
        format!(
            r#"<tr id="BluePromedio"><td class="colCompraVenta" data-order="$ {buy}"></td><td class="colCompraVenta" data-order="$ {sell}"></td></tr>"#
        )
    }

    #[tokio::test]
    async fn watcher_publishes_to_board() {
        let feed = StaticFeed(Mutex::new(vec![
            Ok(page("1.000,00", "1.050,00")),
            Ok(page("1.000,00", "1.060,25")),
            Err(anyhow!("connection reset")),
        ]));
        let watcher = PriceWatcher::new(Arc::new(feed), Anchors::default(), UtcOffset::UTC);
        let board = watcher.board();

        assert!(!board.snapshot().await.checked_once);

        let first = watcher.check().await;
        assert!(!first.changed);

        let second = watcher.check().await;
        assert!(second.changed);
        assert_eq!(second.sell, Some(1060.25));

        let third = watcher.check().await;
        assert!(third.error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(board.snapshot().await.sell, Some(1060.25));
    }
}
