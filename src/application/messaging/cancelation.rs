//! Cancelation predicates - veto an event before any command runs

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::Bundle;

/// Returns `true` when the event should be dropped.
///
/// Predicates run in registration order; the first `true` ends the event.
pub type Cancelation = Box<dyn Fn(&Bundle<'_>) -> bool + Send + Sync>;

/// Box a predicate as a [`Cancelation`]
pub fn cancelation<F>(f: F) -> Cancelation
where
    F: Fn(&Bundle<'_>) -> bool + Send + Sync + 'static,
{
    Box::new(f)
}

/// Drops events whose author is another bot account
pub fn ignore_bots() -> Cancelation {
    cancelation(|bundle| bundle.message().author.is_bot)
}

/// Sliding-window limit per author
pub struct RateLimiter {
    requests: Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Records a request for `key`; `true` once the window is already full.
    pub fn exceeded(&self, key: &str) -> bool {
        self.exceeded_at(key, Instant::now())
    }

    fn exceeded_at(&self, key: &str, now: Instant) -> bool {
        let mut requests = self.requests.lock().unwrap_or_else(|p| p.into_inner());

        // Forget requests outside the window, and authors with none left
        requests.retain(|_, times| {
            times.retain(|&t| now.duration_since(t) < self.window);
            !times.is_empty()
        });

        let times = requests.entry(key.to_string()).or_default();
        if times.len() >= self.max_requests as usize {
            return true;
        }

        times.push(now);
        false
    }

    /// Cancel events from authors over their limit
    pub fn into_cancelation(self) -> Cancelation {
        cancelation(move |bundle| {
            let author = &bundle.message().author.id;
            let limited = self.exceeded(author);
            if limited {
                tracing::debug!("Rate limited author {}", author);
            }
            limited
        })
    }
}
