use crate::output::stats::MetricsSnapshot;
use serde::Serialize;
use std::fmt;

/// Why a crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The frontier ran dry with no request in flight
    Exhausted,

    /// The configured number of requests completed
    UrlLimitReached,

    /// The running-time budget was spent
    DurationElapsed,

    /// `stop` was called
    Requested,

    /// The process received an interrupt
    Interrupted,

    /// `reset` was called while running
    Reset,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StopReason::Exhausted => "frontier exhausted",
            StopReason::UrlLimitReached => "URL limit reached",
            StopReason::DurationElapsed => "duration elapsed",
            StopReason::Requested => "stop requested",
            StopReason::Interrupted => "interrupted",
            StopReason::Reset => "reset",
        };
        f.write_str(reason)
    }
}

/// Notifications broadcast by a running crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlEvent {
    Started,

    #[serde(rename = "pause")]
    Paused,
    Complete { reason: StopReason },
    Metrics(MetricsSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Exhausted.to_string(), "frontier exhausted");
        assert_eq!(StopReason::DurationElapsed.to_string(), "duration elapsed");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(CrawlEvent::Complete {
            reason: StopReason::UrlLimitReached,
        })
        .unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["reason"], "url_limit_reached");

        let json = serde_json::to_value(CrawlEvent::Started).unwrap();
        assert_eq!(json["type"], "started");
    }

    #[test]
    fn test_paused_event_is_named_pause() {
        let json = serde_json::to_value(CrawlEvent::Paused).unwrap();
        assert_eq!(json["type"], "pause");
    }
}
