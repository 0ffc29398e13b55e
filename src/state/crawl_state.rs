/// Lifecycle state definitions for a crawl session
use serde::Serialize;
use std::fmt;

/// Represents the current lifecycle state of the crawl controller
///
/// Transitions: Stopped → Running → Paused → Running → Stopped. Paused is only
/// reachable from Running; Stopped is reachable from any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// Not crawling; configuration may change
    #[default]
    Stopped,

    /// Admission is suspended; in-flight requests still complete
    Paused,

    /// Admission ticks are issuing new requests
    Running,
}

impl CrawlStatus {
    /// Returns true if the controller is stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns true if the controller is admitting new requests
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if the controller is paused
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Returns true if `pause` is a valid transition from this state
    pub fn can_pause(&self) -> bool {
        self.is_running()
    }

    /// Converts the status to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Paused => "paused",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
