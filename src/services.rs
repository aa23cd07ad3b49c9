//! # External Data Services
//!
//! Panels never talk to the network themselves. Each service runs as a
//! background task that polls its API on the service's own refresh interval
//! and publishes the latest payload into a `tokio::sync::watch` channel. The
//! panel side ([`PolledSource`]) implements [`DataSource::fetch`] by taking
//! whatever arrived since the last look, which is instant and never blocks the
//! render loop.
//!
//! ## Failure Policy
//! A failed request (network error, timeout, API error, bad JSON) is logged and
//! publishes nothing. The panel sees `None`, keeps its cached payload on
//! screen, and the next poll retries naturally. There are no retries inside
//! a poll.

use chrono::Duration;
use std::future::Future;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Fixed timeout for a single external request.
pub const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Why a service produced no data this cycle. Never fatal.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Network or protocol failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),

    /// The API answered with an error message
    #[error("API error: {0}")]
    Api(String),

    /// Response did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// No answer within [`REQUEST_TIMEOUT`]
    #[error("request timed out")]
    Timeout,

    /// Credentials missing or rejected
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Token persistence failed
    #[error("token store: {0}")]
    TokenStore(#[from] std::io::Error),
}

/// Current conditions from the weather service.
///
/// Every field is optional: the panel renders whatever subset arrived.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeatherReport {
    pub temperature: Option<f32>,
    pub feels_like: Option<f32>,
    pub humidity: Option<f32>,
    pub conditions: Option<String>,
    /// Icon code, e.g. "partly-cloudy-day"
    pub icon: Option<String>,
    /// Unit suffix for temperatures ("C" or "F")
    pub unit: char,
}

/// Today's totals from the fitness tracker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivitySummary {
    pub steps: Option<u32>,
    pub step_goal: Option<u32>,
    pub calories: Option<u32>,
    pub distance_km: Option<f32>,
    pub floors: Option<u32>,
}

/// Data a service can hand to a panel.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(String),
    Weather(WeatherReport),
    Activity(ActivitySummary),
}

/// Pull contract between a panel and its data provider.
pub trait DataSource: Send {
    /// Newest payload since the previous call, or `None` if nothing new
    /// arrived (too early, request failed, or unchanged provider state).
    fn fetch(&mut self) -> Option<Payload>;

    /// How often the panel should bother asking.
    fn refresh_interval(&self) -> Duration;
}

/// One request against an external API.
pub trait Fetcher: Send + 'static {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    fn fetch(&mut self) -> impl Future<Output = Result<Payload, ServiceError>> + Send;
}

/// Panel-side end of a background poller.
pub struct PolledSource {
    receiver: watch::Receiver<Option<Payload>>,
    interval: Duration,
}

impl PolledSource {
    pub fn new(receiver: watch::Receiver<Option<Payload>>, interval: Duration) -> Self {
        Self { receiver, interval }
    }
}

impl DataSource for PolledSource {
    fn fetch(&mut self) -> Option<Payload> {
        // A dropped poller reads as "nothing new", same as a failed request.
        if !self.receiver.has_changed().unwrap_or(false) {
            return None;
        }
        self.receiver.borrow_and_update().clone()
    }

    fn refresh_interval(&self) -> Duration {
        self.interval
    }
}

/// Start polling `fetcher` every `interval` on the current tokio runtime.
///
/// The task ends on its own once the returned source is dropped.
pub fn spawn_poller<F: Fetcher>(
    mut fetcher: F,
    interval: Duration,
) -> (PolledSource, JoinHandle<()>) {
    let (sender, receiver) = watch::channel(None);
    let period = interval
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(60))
        .max(std::time::Duration::from_secs(1));

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = sender.closed() => break,
                _ = ticker.tick() => {}
            }

            match poll_once(&mut fetcher).await {
                Ok(payload) => {
                    debug!(service = fetcher.name(), "Received new data");
                    sender.send_replace(Some(payload));
                }
                Err(err) => {
                    warn!(service = fetcher.name(), "Service unavailable: {}", err);
                }
            }
        }
        debug!(service = fetcher.name(), "Poller stopped");
    });

    (PolledSource::new(receiver, interval), handle)
}

/// Run one fetch bounded by [`REQUEST_TIMEOUT`].
pub async fn poll_once<F: Fetcher>(fetcher: &mut F) -> Result<Payload, ServiceError> {
    match tokio::time::timeout(REQUEST_TIMEOUT, fetcher.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        responses: Vec<Result<Payload, ServiceError>>,
    }

    impl Fetcher for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn fetch(&mut self) -> impl Future<Output = Result<Payload, ServiceError>> + Send {
            let next = if self.responses.is_empty() {
                Err(ServiceError::Api("exhausted".into()))
            } else {
                self.responses.remove(0)
            };
            async move { next }
        }
    }

    #[test]
    fn polled_source_only_reports_new_values() {
        let (sender, receiver) = watch::channel(None);
        let mut source = PolledSource::new(receiver, Duration::seconds(30));

        assert_eq!(source.fetch(), None);

        sender.send_replace(Some(Payload::Text("hello".into())));
        assert_eq!(source.fetch(), Some(Payload::Text("hello".into())));
        assert_eq!(source.fetch(), None);
        assert_eq!(source.refresh_interval(), Duration::seconds(30));

        drop(sender);
        assert_eq!(source.fetch(), None);
    }

    #[tokio::test]
    async fn poll_once_passes_through_results() {
        let mut fetcher = Scripted {
            responses: vec![
                Ok(Payload::Text("first".into())),
                Err(ServiceError::Malformed("no body".into())),
            ],
        };

        assert_eq!(
            poll_once(&mut fetcher).await.unwrap(),
            Payload::Text("first".into())
        );
        assert!(matches!(
            poll_once(&mut fetcher).await,
            Err(ServiceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn poller_publishes_first_success_and_skips_failures() {
        let fetcher = Scripted {
            responses: vec![Err(ServiceError::Timeout), Ok(Payload::Text("late".into()))],
        };
        let (mut source, handle) = spawn_poller(fetcher, Duration::seconds(1));

        // First tick fails: nothing published yet
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(source.fetch(), None);

        // Second tick (one second later) succeeds
        let mut received = None;
        for _ in 0..40 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            if let Some(payload) = source.fetch() {
                received = Some(payload);
                break;
            }
        }
        assert_eq!(received, Some(Payload::Text("late".into())));

        drop(source);
        tokio::time::timeout(std::time::Duration::from_secs(3), handle)
            .await
            .expect("poller should stop once the source is dropped")
            .unwrap();
    }
}
