use std::time::Duration;

/// Bus-level configuration for the dispatcher and the worker pool.
///
/// Controls pool size, how long a caller waits for a reply, and how many
/// frames may queue in each worker mailbox.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Number of repository workers. Each one processes requests strictly
    /// sequentially, so this bounds parallel persistence work.
    pub worker_count: usize,
    /// How long a caller waits for a reply before giving up.
    pub dispatch_timeout: Duration,
    /// Bounded mpsc capacity of each worker mailbox.
    pub mailbox_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            dispatch_timeout: Duration::from_secs(30),
            mailbox_capacity: 256,
        }
    }
}
