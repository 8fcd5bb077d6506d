use std::time::Duration;

/// Default ALPHA: how many peers each lookup round queries in parallel.
pub const DEFAULT_ALPHA: usize = 3;

/// Default timeout before abandoning a request to a non-responding peer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default bound on the total duration of one iterative lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on how long any bucket may go without a refreshing lookup.
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Default interval between republishing locally held resources.
pub const DEFAULT_REPUBLISH_PERIOD: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_NETWORK_NAME: &str = "kadline";

#[derive(Debug, Clone)]
/// Node configuration.
pub struct Config {
    /// The network this node agrees to join; JOIN_PROPOSAL frames naming a
    /// different network are ignored.
    ///
    /// Defaults to [DEFAULT_NETWORK_NAME].
    pub network_name: String,
    /// Addresses of peers to seed lookups with while the routing table is
    /// still empty.
    ///
    /// Defaults to none; a node with no bootstrap peers waits to be
    /// contacted.
    pub bootstrap: Vec<String>,
    /// Per-request reply timeout.
    ///
    /// The longer this duration is, the longer lookups take until they are
    /// deemed done. The shorter it is, the more replies from busy peers are
    /// missed, which affects the accuracy of closest-peer results.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT].
    pub request_timeout: Duration,
    /// Global bound on the total duration of one lookup.
    ///
    /// Defaults to [DEFAULT_LOOKUP_TIMEOUT].
    pub lookup_timeout: Duration,
    /// Lookup fan-out per round.
    ///
    /// Defaults to [DEFAULT_ALPHA].
    pub alpha: usize,
    /// No bucket goes longer than this without a refreshing lookup; staleness
    /// is checked every half period.
    ///
    /// Defaults to [DEFAULT_REFRESH_PERIOD].
    pub refresh_period: Duration,
    /// Every locally held resource is re-replicated to the currently closest
    /// peers at this interval.
    ///
    /// Defaults to [DEFAULT_REPUBLISH_PERIOD].
    pub republish_period: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network_name: DEFAULT_NETWORK_NAME.to_string(),
            bootstrap: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            alpha: DEFAULT_ALPHA,
            refresh_period: DEFAULT_REFRESH_PERIOD,
            republish_period: DEFAULT_REPUBLISH_PERIOD,
        }
    }
}
