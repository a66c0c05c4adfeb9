use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

use crate::api::OkxClient;
use crate::config::FeedConfig;
use crate::models::{Bar, Event, FeedStatus};

/// Candles fetched per poll once live; small but enough to bridge a gap
const POLL_FETCH: u32 = 5;

/// Backfill-then-poll market data feed
///
/// Emits a `Backfilling` status, replays the configured window of closed
/// historical bars oldest-first, then flips to `Live` and polls for newly
/// closed candles. Every bar is emitted exactly once, in strictly
/// increasing timestamp order; the newest (still-open) candle is always
/// dropped. Repeated poll failures surface as a `Disconnected` status, with
/// `Live` re-emitted on recovery.
pub struct MarketDataFeed {
    client: Arc<OkxClient>,
    events: UnboundedSender<Event>,
    cfg: FeedConfig,
}

impl MarketDataFeed {
    pub fn new(client: Arc<OkxClient>, events: UnboundedSender<Event>, cfg: FeedConfig) -> Self {
        Self {
            client,
            events,
            cfg,
        }
    }

    /// Run until the event channel closes
    pub async fn run(self) {
        let bar_param = bar_param(self.cfg.timeframe_minutes);

        if self.send(Event::Data(FeedStatus::Backfilling)).is_err() {
            return;
        }

        let mut last_ts = match self.backfill(&bar_param).await {
            Some(ts) => ts,
            None => return, // channel closed
        };

        if self.send(Event::Data(FeedStatus::Live)).is_err() {
            return;
        }

        let mut ticker = interval(Duration::from_secs(self.cfg.poll_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut failures = 0u32;
        let mut disconnected = false;

        loop {
            ticker.tick().await;

            match self
                .client
                .candles(&self.cfg.symbol, &bar_param, POLL_FETCH)
                .await
            {
                Ok(bars) => {
                    failures = 0;
                    if disconnected {
                        disconnected = false;
                        if self.send(Event::Data(FeedStatus::Live)).is_err() {
                            return;
                        }
                    }

                    for bar in fresh_bars(drop_newest(bars), last_ts) {
                        last_ts = Some(bar.timestamp);
                        if self.send(Event::Bar(bar)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        "candle poll failed ({}/{}): {}",
                        failures,
                        self.cfg.max_failures,
                        e
                    );

                    if failures >= self.cfg.max_failures && !disconnected {
                        disconnected = true;
                        if self.send(Event::Data(FeedStatus::Disconnected)).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Fetch and replay the historical window; returns the newest emitted
    /// timestamp, or `None` if the channel closed underneath us
    async fn backfill(&self, bar_param: &str) -> Option<Option<DateTime<Utc>>> {
        loop {
            match self
                .client
                .candles(&self.cfg.symbol, bar_param, self.cfg.backfill_bars + 1)
                .await
            {
                Ok(bars) => {
                    let closed = drop_newest(bars);
                    tracing::info!(
                        "backfilled {} closed bars for {}",
                        closed.len(),
                        self.cfg.symbol
                    );

                    let mut last_ts = None;
                    for bar in closed {
                        last_ts = Some(bar.timestamp);
                        if self.send(Event::Bar(bar)).is_err() {
                            return None;
                        }
                    }
                    return Some(last_ts);
                }
                Err(e) => {
                    tracing::error!("backfill failed, retrying: {}", e);
                    sleep(Duration::from_secs(self.cfg.poll_secs.max(1))).await;
                }
            }
        }
    }

    fn send(&self, event: Event) -> Result<(), ()> {
        self.events.send(event).map_err(|_| ())
    }
}

/// Venue timeframe label for a bar size in minutes
fn bar_param(minutes: u32) -> String {
    match minutes {
        60 => "1H".to_string(),
        240 => "4H".to_string(),
        1440 => "1D".to_string(),
        m => format!("{}m", m),
    }
}

/// Discard the still-open newest candle
fn drop_newest(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.pop();
    bars
}

/// Keep only bars strictly newer than the last emitted timestamp
fn fresh_bars(bars: Vec<Bar>, last_ts: Option<DateTime<Utc>>) -> Vec<Bar> {
    bars.into_iter()
        .filter(|bar| match last_ts {
            Some(ts) => bar.timestamp > ts,
            None => true,
        })
        .collect()
}
