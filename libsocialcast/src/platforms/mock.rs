//! Mock publisher for testing
//!
//! A configurable [`Publisher`] that can succeed, fail, or take its time,
//! and records what it was asked to publish. Used by unit and integration
//! tests that exercise scheduling without network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PublishError, Result};
use crate::platforms::Publisher;
use crate::types::{Account, Platform, PostContent};

/// Configuration for mock publisher behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Whether publishing should succeed
    pub publish_succeeds: bool,

    /// External id returned on success
    pub external_id: String,

    /// Error to return on failure
    pub publish_error: Option<String>,

    /// Delay before completing (simulates network latency)
    pub delay: Duration,

    /// Number of times publish has been called
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Image URLs that have been published (for verification)
    pub published: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Instagram,
            publish_succeeds: true,
            external_id: "ext-1".to_string(),
            publish_error: None,
            delay: Duration::from_millis(0),
            publish_call_count: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockPublisher {
    config: MockConfig,
}

impl MockPublisher {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A publisher that always succeeds with `external_id`
    pub fn success(platform: Platform, external_id: &str) -> Self {
        Self::new(MockConfig {
            platform,
            external_id: external_id.to_string(),
            ..Default::default()
        })
    }

    /// A publisher whose publish phase always fails with `error`
    pub fn failure(platform: Platform, error: &str) -> Self {
        Self::new(MockConfig {
            platform,
            publish_succeeds: false,
            publish_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            platform,
            delay,
            ..Default::default()
        })
    }

    pub fn publish_call_count(&self) -> usize {
        *self
            .config
            .publish_call_count
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn published(&self) -> Vec<String> {
        self.config
            .published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    async fn publish(&self, _account: &Account, content: &PostContent) -> Result<String> {
        *self
            .config
            .publish_call_count
            .lock()
            .unwrap_or_else(|e| e.into_inner()) += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.publish_succeeds {
            self.config
                .published
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(content.image_url.clone());
            Ok(self.config.external_id.clone())
        } else {
            let error_msg = self
                .config
                .publish_error
                .clone()
                .unwrap_or_else(|| "Mock publish failed".to_string());
            Err(PublishError::PublishMedia(error_msg).into())
        }
    }
}
