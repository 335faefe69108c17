use std::time::Duration;

use codec::Priority;

/// Per-priority retry policy (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub interval: Duration,
}

pub fn policy_for(priority: Priority) -> RetryPolicy {
    match priority {
        Priority::High => RetryPolicy { max_retries: 5, interval: Duration::from_secs(5) },
        Priority::Medium => RetryPolicy { max_retries: 3, interval: Duration::from_secs(10) },
        Priority::Low => RetryPolicy { max_retries: 1, interval: Duration::from_secs(15) },
    }
}
