//! Monitor event stream and subscriptions.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use super::filter::FilterOptions;
use crate::watcher::{Change, ChangeType, PathKind};

/// Events published by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum MonitorEvent {
    Watching { path: PathBuf, kind: PathKind },
    Unwatched { path: PathBuf },
    Error { path: PathBuf, error: String },
    /// A debounced, filter-accepted change.
    Change(Change),
    HistoryCleared,
    StatsReset,
    FilterUpdated(FilterOptions),
    ShuttingDown,
    Shutdown,
}

impl MonitorEvent {
    /// Event name as used on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Watching { .. } => "watching",
            Self::Unwatched { .. } => "unwatched",
            Self::Error { .. } => "error",
            Self::Change(_) => "change",
            Self::HistoryCleared => "history-cleared",
            Self::StatsReset => "stats-reset",
            Self::FilterUpdated(_) => "filter-updated",
            Self::ShuttingDown => "shutting-down",
            Self::Shutdown => "shutdown",
        }
    }

    /// Event payload as JSON (`null` for payload-less events).
    #[must_use]
    pub fn data(&self) -> Value {
        match self {
            Self::Watching { path, kind } => json!({ "path": path, "kind": kind }),
            Self::Unwatched { path } => json!({ "path": path }),
            Self::Error { path, error } => json!({ "path": path, "error": error }),
            Self::Change(change) => serde_json::to_value(change).unwrap_or(Value::Null),
            Self::FilterUpdated(options) => serde_json::to_value(options).unwrap_or(Value::Null),
            Self::HistoryCleared | Self::StatsReset | Self::ShuttingDown | Self::Shutdown => {
                Value::Null
            }
        }
    }

    /// Render as a Server-Sent Events frame.
    #[must_use]
    pub fn sse_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name(), self.data())
    }
}

/// Selects which events a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    All,
    Watching,
    Unwatched,
    Error,
    /// Every change.
    Change,
    /// Changes of one type (`change:<type>`).
    ChangeOf(ChangeType),
    HistoryCleared,
    StatsReset,
    FilterUpdated,
    ShuttingDown,
    Shutdown,
}

impl Topic {
    /// Whether `event` belongs to this topic.
    #[must_use]
    pub fn matches(self, event: &MonitorEvent) -> bool {
        match (self, event) {
            (Self::All, _) => true,
            (Self::ChangeOf(wanted), MonitorEvent::Change(change)) => {
                change.change_type == wanted
            }
            (Self::ChangeOf(_), _) => false,
            (topic, event) => topic.to_string() == event.name(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Watching => f.write_str("watching"),
            Self::Unwatched => f.write_str("unwatched"),
            Self::Error => f.write_str("error"),
            Self::Change => f.write_str("change"),
            Self::ChangeOf(t) => write!(f, "change:{t}"),
            Self::HistoryCleared => f.write_str("history-cleared"),
            Self::StatsReset => f.write_str("stats-reset"),
            Self::FilterUpdated => f.write_str("filter-updated"),
            Self::ShuttingDown => f.write_str("shutting-down"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(kind) = s.strip_prefix("change:") {
            return kind.parse().map(Self::ChangeOf);
        }
        match s {
            "*" | "all" => Ok(Self::All),
            "watching" => Ok(Self::Watching),
            "unwatched" => Ok(Self::Unwatched),
            "error" => Ok(Self::Error),
            "change" => Ok(Self::Change),
            "history-cleared" => Ok(Self::HistoryCleared),
            "stats-reset" => Ok(Self::StatsReset),
            "filter-updated" => Ok(Self::FilterUpdated),
            "shutting-down" => Ok(Self::ShuttingDown),
            "shutdown" => Ok(Self::Shutdown),
            other => Err(format!("unknown event topic '{other}'")),
        }
    }
}

/// A registered listener on the monitor's event stream.
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`])
/// removes it.
pub struct Subscription {
    rx: broadcast::Receiver<MonitorEvent>,
    topic: Topic,
}

impl Subscription {
    pub(crate) const fn new(rx: broadcast::Receiver<MonitorEvent>, topic: Topic) -> Self {
        Self { rx, topic }
    }

    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next matching event.
    ///
    /// Returns `None` once the monitor has been dropped. Events missed
    /// because this subscriber lagged are skipped with a warning.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.topic.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, topic = %self.topic, "Subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.topic.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, topic = %self.topic, "Subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Consume the subscription as a stream of matching events.
    pub fn into_stream(self) -> impl Stream<Item = MonitorEvent> {
        let topic = self.topic;
        BroadcastStream::new(self.rx)
            .filter_map(move |item| item.ok().filter(|event| topic.matches(event)))
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {
        drop(self);
    }
}
