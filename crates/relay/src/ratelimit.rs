//! Adaptive per-topic slowmode.
//!
//! Every topic keeps a short window of recent accepted sends. The cooldown a
//! user must wait between two sends on a topic grows with the size of that
//! window, so busy topics slow down and quiet topics relax on their own.
//!
//! A check is judged against the cooldown computed by the *previous* accepted
//! send; the send it accepts only affects later checks.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};

use {crosschat_common::UserId, crosschat_config::RateLimitConfig};

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateCheck {
    Accepted,
    /// The user has to wait this much longer.
    Cooldown(Duration),
}

impl RateCheck {
    /// Remaining wait in seconds, rounded to two decimals; `0.0` when accepted.
    pub fn remaining_secs(&self) -> f64 {
        match self {
            Self::Accepted => 0.0,
            Self::Cooldown(d) => (d.as_secs_f64() * 100.0).round() / 100.0,
        }
    }
}

/// Send timestamps younger than `max_age`, pruned whenever touched.
#[derive(Debug)]
struct AgedList {
    max_age: Duration,
    items: VecDeque<Instant>,
}

impl AgedList {
    fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            items: VecDeque::new(),
        }
    }

    fn clean(&mut self, now: Instant) {
        while let Some(front) = self.items.front() {
            if *front + self.max_age < now {
                self.items.pop_front();
            } else {
                break;
            }
        }
    }

    fn add(&mut self, now: Instant) {
        self.items.push_back(now);
        self.clean(now);
    }

    fn len(&mut self, now: Instant) -> usize {
        self.clean(now);
        self.items.len()
    }
}

#[derive(Debug)]
struct TopicState {
    activity: AgedList,
    cooldown: Duration,
    last_send: HashMap<UserId, Instant>,
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: u64,
    max: u64,
    horizon: Duration,
    divisor: u64,
}

pub struct RateLimiter {
    bounds: Bounds,
    topics: Mutex<HashMap<String, TopicState>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let min = config.min_cooldown_secs;
        Self {
            bounds: Bounds {
                min,
                max: config.max_cooldown_secs.max(min),
                horizon: Duration::from_secs(config.horizon_secs),
                divisor: config.traffic_divisor.max(1),
            },
            topics: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, user_id: UserId, topic: &str) -> RateCheck {
        self.check_at(user_id, topic, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&self, user_id: UserId, topic: &str, now: Instant) -> RateCheck {
        let bounds = self.bounds;
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let state = topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicState {
                activity: AgedList::new(bounds.horizon),
                cooldown: Duration::from_secs(bounds.min),
                last_send: HashMap::new(),
            });

        // A send older than the longest cooldown can no longer gate anyone.
        let max_cooldown = Duration::from_secs(bounds.max);
        state
            .last_send
            .retain(|_, last| now.saturating_duration_since(*last) <= max_cooldown);

        if let Some(last) = state.last_send.get(&user_id) {
            let ready_at = *last + state.cooldown;
            if now < ready_at {
                return RateCheck::Cooldown(ready_at - now);
            }
        }

        state.last_send.insert(user_id, now);
        state.activity.add(now);

        let recent = state.activity.len(now) as u64;
        let secs = (recent / bounds.divisor).clamp(bounds.min, bounds.max);
        state.cooldown = Duration::from_secs(secs);

        RateCheck::Accepted
    }

    /// Current cooldown of a topic (the minimum for unseen topics).
    pub fn cooldown(&self, topic: &str) -> Duration {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .get(topic)
            .map_or(Duration::from_secs(self.bounds.min), |s| s.cooldown)
    }
}
