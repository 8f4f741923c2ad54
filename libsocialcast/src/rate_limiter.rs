//! Sliding-window rate limiting for outbound platform calls
//!
//! Every outbound call goes through [`SlidingWindow::admit`], which suspends
//! the caller until the platform's budget has room. When the window is full
//! the caller waits until the oldest call ages out, then the window is
//! cleared entirely instead of being re-checked. That bounds every caller to
//! at most one wait, at the cost of briefly allowing more than `max_calls`
//! in a strict trailing window right after a reset.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{Config, RateLimitConfig};
use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug)]
pub struct SlidingWindow {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn from_config(limit: &RateLimitConfig) -> Self {
        Self::new(limit.max_calls, limit.window())
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a call is allowed, then record it.
    ///
    /// The lock is held across the wait, so concurrent callers queue behind
    /// the one that is waiting and are admitted in arrival order.
    pub async fn admit(&self) {
        let mut calls = self.calls.lock().await;
        let now = Instant::now();
        prune(&mut calls, now, self.window);

        if calls.len() >= self.max_calls {
            if let Some(&oldest) = calls.front() {
                let wait = (oldest + self.window).saturating_duration_since(now);
                debug!(
                    "Rate limit reached ({} calls in {:?}), waiting {:?}",
                    calls.len(),
                    self.window,
                    wait
                );
                tokio::time::sleep(wait).await;
            }
            calls.clear();
        }

        calls.push_back(Instant::now());
    }

    /// Calls recorded within the trailing window
    pub async fn calls_in_window(&self) -> usize {
        let mut calls = self.calls.lock().await;
        prune(&mut calls, Instant::now(), self.window);
        calls.len()
    }
}

fn prune(calls: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = calls.front() {
        if now.saturating_duration_since(oldest) >= window {
            calls.pop_front();
        } else {
            break;
        }
    }
}

/// One window per platform, shared between platforms that name the same
/// `group` in `[rate_limits]`.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    // populated for every platform by both constructors
    windows: HashMap<Platform, Arc<SlidingWindow>>,
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut groups: HashMap<String, (RateLimitConfig, Arc<SlidingWindow>)> = HashMap::new();
        let mut windows = HashMap::new();

        for platform in Platform::ALL {
            let limit = config.rate_limit_for(platform);

            let window = match &limit.group {
                Some(group) => match groups.get(group) {
                    Some((existing, shared)) => {
                        if existing.max_calls != limit.max_calls
                            || existing.window_secs != limit.window_secs
                        {
                            return Err(ConfigError::InvalidValue {
                                field: format!("rate_limits.{}", platform),
                                reason: format!(
                                    "group '{}' is already defined with a different budget",
                                    group
                                ),
                            }
                            .into());
                        }
                        shared.clone()
                    }
                    None => {
                        let shared = Arc::new(SlidingWindow::from_config(&limit));
                        groups.insert(group.clone(), (limit.clone(), shared.clone()));
                        shared
                    }
                },
                None => Arc::new(SlidingWindow::from_config(&limit)),
            };

            debug!(
                "Rate limit for {}: {} calls per {:?}{}",
                platform,
                window.max_calls(),
                window.window(),
                limit
                    .group
                    .as_deref()
                    .map(|g| format!(" (group {})", g))
                    .unwrap_or_default()
            );
            windows.insert(platform, window);
        }

        Ok(Self { windows })
    }

    /// Separate windows with the same budget for every platform
    pub fn uniform(max_calls: usize, window: Duration) -> Self {
        let windows = Platform::ALL
            .into_iter()
            .map(|p| (p, Arc::new(SlidingWindow::new(max_calls, window))))
            .collect();
        Self { windows }
    }

    pub fn for_platform(&self, platform: Platform) -> Arc<SlidingWindow> {
        self.windows[&platform].clone()
    }
}
