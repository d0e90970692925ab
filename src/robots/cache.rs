//! Bounded robots.txt cache
//!
//! Entries expire after a configurable TTL. When the cache is full the
//! oldest-inserted origin is evicted.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

/// Cached robots.txt policy for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new entry stamped with the current time
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the entry is older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    /// Returns the age of the entry
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Insertion-ordered map of origin to policy with a fixed capacity
#[derive(Debug)]
pub struct RobotsCache {
    entries: HashMap<String, CachedRobots>,
    order: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
}

impl RobotsCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the fresh policy for `origin`, if any
    pub fn get_fresh(&self, origin: &str) -> Option<&CachedRobots> {
        self.entries
            .get(origin)
            .filter(|cached| !cached.is_stale(self.ttl))
    }

    /// Stores a policy, replacing any previous one for the same origin
    ///
    /// A refreshed origin moves to the back of the eviction order.
    pub fn insert(&mut self, origin: &str, cached: CachedRobots) {
        if self.entries.contains_key(origin) {
            self.order.retain(|o| o != origin);
        } else {
            while self.entries.len() >= self.capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
                tracing::debug!("Evicted robots.txt policy for {}", oldest);
            }
        }

        self.order.push_back(origin.to_string());
        self.entries.insert(origin.to_string(), cached);
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.entries.contains_key(origin)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
