use std::sync::Arc;

use bot_core::{Session, send_text_to};
use time::{OffsetDateTime, UtcOffset};
use tracing::{info, warn};

use crate::{PriceState, clock, round2};

/// Forwards price-check outcomes to the operator chat.
pub struct Notifier {
    session: Arc<dyn Session>,
    operator: String,
    label: String,
    offset: UtcOffset,
}

impl core::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notifier")
            .field("operator", &self.operator)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(
        session: Arc<dyn Session>,
        operator: impl Into<String>,
        label: impl Into<String>,
        offset: UtcOffset,
    ) -> Self {
        Self {
            session,
            operator: operator.into(),
            label: label.into(),
            offset,
        }
    }

    /// Send the change message and/or the error report for one check. Send failures are logged.
    pub async fn notify(&self, state: &PriceState) {
        if let Some(text) = change_message(state, &self.label) {
            self.deliver("change", text).await;
        }
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        if let Some(text) = error_message(state, now) {
            self.deliver("error", text).await;
        }
    }

    async fn deliver(&self, kind: &'static str, text: String) {
        match send_text_to(self.session.as_ref(), &self.operator, text).await {
            Ok(()) => info!(kind, to = %self.operator, "Price notification sent"),
            Err(e) => warn!(kind, error = %e, "Failed to send price notification"),
        }
    }
}

#[must_use]
pub fn change_message(state: &PriceState, label: &str) -> Option<String> {
    if !state.changed {
        return None;
    }
    let buy = state.buy?;
    let sell = state.sell?;
    let dbuy = delta(buy, state.buy_last_change.unwrap_or(buy));
    let dsell = delta(sell, state.sell_last_change.unwrap_or(sell));
    Some(format!(
        "The dollar quote changed ({label}):\n\nBuy: ${buy:.2} ({dbuy})\nSell: *${sell:.2} ({dsell})*"
    ))
}

#[must_use]
pub fn error_message(state: &PriceState, now: OffsetDateTime) -> Option<String> {
    let error = state.error.as_deref().filter(|e| !e.is_empty())?;
    Some(format!(
        "*ERROR {}*\n{error}\nBuy: {}\nSell: {}",
        clock(now),
        value_or_na(state.buy),
        value_or_na(state.sell),
    ))
}

fn delta(current: f64, previous: f64) -> String {
    // `+ 0.0` turns a rounded -0.0 into 0.0
    format!("{:+.2}", round2(current - previous) + 0.0)
}

#[must_use]
pub fn value_or_na(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_owned(), |v| format!("{v:.2}"))
}
