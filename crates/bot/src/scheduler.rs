use core::time::Duration;

use price_watch::{Notifier, PriceState, PriceWatcher};
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

/// One scheduled pass: check the feed, then hand the outcome to the notifier.
pub async fn tick(watcher: &PriceWatcher, notifier: &Notifier) -> PriceState {
    let state = watcher.check().await;
    notifier.notify(&state).await;
    state
}

/// Run [`tick`] every `period`. Ticks never overlap; a slow one delays the next.
pub async fn run(watcher: PriceWatcher, notifier: Notifier, period: Duration) {
    info!(period = ?period, "Price watcher started");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        tick(&watcher, &notifier).await;
    }
}
