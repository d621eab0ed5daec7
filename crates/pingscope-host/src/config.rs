use std::time::Duration;

/// Host configuration.
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Artificial delay applied to every session lookup.
    pub lookup_latency: Duration,
    /// Maximum number of simultaneously open connections.
    pub max_connections: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            lookup_latency: Duration::ZERO,
            max_connections: 10_000,
        }
    }
}
