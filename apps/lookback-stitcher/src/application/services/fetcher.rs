//! Historical Fetcher
//!
//! Collects a bounded replay into memory under a single global timeout.
//! No retries: the timeout is a safety valve against a stalled upstream.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use super::error::{ReconcileError, Stage};
use crate::application::ports::{FeedMessage, FeedStream, FeedSubscription, ReplayFeed};
use crate::domain::event::MarketEvent;
use crate::domain::lookback::ReplayWindow;
use crate::infrastructure::metrics;

/// Default upper bound on a replay fetch.
pub const DEFAULT_HISTORICAL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Collects historical replays.
pub struct HistoricalFetcher {
    feed: Arc<dyn ReplayFeed>,
    timeout: Duration,
}

impl HistoricalFetcher {
    /// Create a fetcher with the given timeout.
    #[must_use]
    pub fn new(feed: Arc<dyn ReplayFeed>, timeout: Duration) -> Self {
        Self { feed, timeout }
    }

    /// Configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replay `window` and collect every event until the replay completes.
    ///
    /// The timeout covers both the subscription and the collection. Events
    /// are returned ascending by timestamp.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::HistoricalFetchTimeout`] when the timeout elapses
    /// - [`ReconcileError::FeedUnavailable`] when the replay cannot be opened
    ///   or fails mid-stream
    pub async fn fetch(
        &self,
        subscription: &FeedSubscription,
        window: &ReplayWindow,
    ) -> Result<Vec<MarketEvent>, ReconcileError> {
        tracing::info!(
            from = %window.from_param(),
            to = %window.to_param(),
            timeout_secs = self.timeout.as_secs(),
            "Fetching historical replay"
        );

        let collect = async {
            let stream = self
                .feed
                .subscribe_replay(subscription, window)
                .await
                .map_err(|source| ReconcileError::FeedUnavailable {
                    stage: Stage::FetchHistorical,
                    source,
                })?;
            collect_events(stream).await
        };

        let mut events = tokio::time::timeout(self.timeout, collect)
            .await
            .map_err(|_| {
                metrics::record_historical_timeout();
                ReconcileError::HistoricalFetchTimeout {
                    timeout: self.timeout,
                }
            })??;

        if !events.is_sorted_by_key(|event| event.timestamp) {
            tracing::debug!("Historical replay out of order, sorting");
            events.sort_by_key(|event| event.timestamp);
        }

        metrics::record_historical_events(events.len() as u64);
        tracing::info!(
            count = events.len(),
            last = ?events.last().map(|event| event.timestamp),
            "Historical replay complete"
        );
        Ok(events)
    }
}

async fn collect_events(mut stream: FeedStream) -> Result<Vec<MarketEvent>, ReconcileError> {
    let mut events = Vec::new();
    while let Some(message) = stream.next().await {
        match message {
            Ok(FeedMessage::Event(event)) => events.push(event),
            Ok(FeedMessage::Disconnect(notice)) => {
                tracing::debug!(exchange = %notice.exchange, "Skipping replayed disconnect");
            }
            Err(source) => {
                return Err(ReconcileError::FeedUnavailable {
                    stage: Stage::FetchHistorical,
                    source,
                });
            }
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone, Utc};
    use futures::stream;

    use super::*;
    use crate::application::ports::{DisconnectNotice, FeedError};
    use crate::domain::event::BookLevels;

    enum Replay {
        Messages(Vec<FeedMessage>),
        Hang,
        Refuse,
    }

    struct FakeReplay(Replay);

    #[async_trait]
    impl ReplayFeed for FakeReplay {
        async fn subscribe_replay(
            &self,
            _: &FeedSubscription,
            _: &ReplayWindow,
        ) -> Result<FeedStream, FeedError> {
            match &self.0 {
                Replay::Messages(messages) => {
                    Ok(stream::iter(messages.clone().into_iter().map(Ok)).boxed())
                }
                Replay::Hang => Ok(stream::pending().boxed()),
                Replay::Refuse => Err(FeedError::ConnectionFailed("refused".to_string())),
            }
        }
    }

    fn subscription() -> FeedSubscription {
        FeedSubscription {
            exchange: "deribit".to_string(),
            symbols: vec!["BTC-PERPETUAL".to_string()],
            data_types: vec!["quote_1m".to_string()],
            with_disconnect_messages: false,
        }
    }

    fn window() -> ReplayWindow {
        let now = Utc.with_ymd_and_hms(2023, 5, 10, 16, 14, 0).unwrap();
        ReplayWindow::plan(now, TimeDelta::hours(2), TimeDelta::minutes(14))
    }

    fn event(minute: i64) -> FeedMessage {
        let ts = Utc.with_ymd_and_hms(2023, 5, 10, 14, 0, 0).unwrap() + TimeDelta::minutes(minute);
        FeedMessage::Event(MarketEvent {
            data_type: "book_snapshot".to_string(),
            symbol: "BTC-PERPETUAL".to_string(),
            exchange: "deribit".to_string(),
            name: "quote_1m".to_string(),
            interval_ms: 60_000,
            depth: None,
            timestamp: ts,
            local_timestamp: ts,
            bids: BookLevels::default(),
            asks: BookLevels::default(),
        })
    }

    #[tokio::test]
    async fn collects_until_replay_ends() {
        let notice = FeedMessage::Disconnect(DisconnectNotice {
            exchange: "deribit".to_string(),
            local_timestamp: Utc::now(),
        });
        let fetcher = HistoricalFetcher::new(
            Arc::new(FakeReplay(Replay::Messages(vec![
                event(2),
                notice,
                event(0),
                event(1),
            ]))),
            Duration::from_secs(5),
        );

        let events = fetcher.fetch(&subscription(), &window()).await.unwrap();
        let minutes: Vec<_> = events.iter().map(|e| e.timestamp.format("%M").to_string()).collect();
        assert_eq!(minutes, ["00", "01", "02"]);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_replay_times_out() {
        let fetcher = HistoricalFetcher::new(
            Arc::new(FakeReplay(Replay::Hang)),
            DEFAULT_HISTORICAL_TIMEOUT,
        );

        let err = fetcher.fetch(&subscription(), &window()).await.unwrap_err();
        assert_eq!(
            err,
            ReconcileError::HistoricalFetchTimeout {
                timeout: DEFAULT_HISTORICAL_TIMEOUT
            }
        );
    }

    #[tokio::test]
    async fn refused_replay_is_feed_unavailable() {
        let fetcher =
            HistoricalFetcher::new(Arc::new(FakeReplay(Replay::Refuse)), Duration::from_secs(5));

        let err = fetcher.fetch(&subscription(), &window()).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::FeedUnavailable {
                stage: Stage::FetchHistorical,
                ..
            }
        ));
    }
}
