//! Publish dispatchers
//!
//! A [`Publisher`] turns `(account, content)` into a live post and returns
//! the platform's post id. Every platform this crate talks to uses the same
//! two-phase shape (create a media object, then publish it), so concrete
//! platforms only implement [`MediaApi`] and are wrapped in a
//! [`TwoPhasePublisher`], which rate-limits each phase and maps failures to
//! [`PublishError`].
//!
//! Calls on posts that are already live (listing, insights, deletion) go
//! through a [`PostApi`] wrapped in a [`PostManager`], which takes one
//! admission from the same platform limiter per call.
//!
//! ```no_run
//! use std::sync::Arc;
//! use libsocialcast::platforms::{graph::InstagramMedia, PublisherRegistry, TwoPhasePublisher};
//! use libsocialcast::rate_limiter::RateLimiters;
//! use libsocialcast::{Config, Platform};
//!
//! # fn example(config: &Config) -> libsocialcast::Result<()> {
//! let limiters = RateLimiters::from_config(config)?;
//! let mut registry = PublisherRegistry::new();
//! registry.register(Arc::new(TwoPhasePublisher::new(
//!     InstagramMedia::new(&config.oauth.graph_url),
//!     limiters.for_platform(Platform::Instagram),
//! )));
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::error::{ConfigError, GraphError, PublishError, Result, SocialcastError};
use crate::rate_limiter::{RateLimiters, SlidingWindow};
use crate::types::{Account, Platform, PostContent, RemoteMedia};

pub mod graph;

// Public for the integration tests under tests/
pub mod mock;

#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Publish `content` as `account`, returning the external post id.
    ///
    /// Either succeeds with the final id or fails as a whole; no
    /// intermediate state is visible to the caller.
    async fn publish(&self, account: &Account, content: &PostContent) -> Result<String>;
}

/// The two calls of a create-then-publish content API.
///
/// Errors are plain descriptions; [`TwoPhasePublisher`] tags them with the
/// phase they came from.
#[async_trait]
pub trait MediaApi: Send + Sync {
    fn platform(&self) -> Platform;

    /// Submit the image and caption, returning a creation id
    async fn create_media(
        &self,
        account: &Account,
        content: &PostContent,
    ) -> std::result::Result<String, String>;

    /// Make a created media object live, returning the post id
    async fn publish_media(
        &self,
        account: &Account,
        creation_id: &str,
        content: &PostContent,
    ) -> std::result::Result<String, String>;
}

pub struct TwoPhasePublisher<A> {
    api: A,
    limiter: Arc<SlidingWindow>,
}

impl<A: MediaApi> TwoPhasePublisher<A> {
    pub fn new(api: A, limiter: Arc<SlidingWindow>) -> Self {
        Self { api, limiter }
    }
}

#[async_trait]
impl<A: MediaApi> Publisher for TwoPhasePublisher<A> {
    fn platform(&self) -> Platform {
        self.api.platform()
    }

    async fn publish(&self, account: &Account, content: &PostContent) -> Result<String> {
        self.limiter.admit().await;
        let creation_id = self
            .api
            .create_media(account, content)
            .await
            .map_err(PublishError::CreateMedia)?;
        debug!("Created {} media {}", self.platform(), creation_id);

        self.limiter.admit().await;
        let post_id = self
            .api
            .publish_media(account, &creation_id, content)
            .await
            .map_err(PublishError::PublishMedia)?;
        debug!("Published {} media {} as {}", self.platform(), creation_id, post_id);

        Ok(post_id)
    }
}

/// Calls on an account's existing posts
#[async_trait]
pub trait PostApi: Send + Sync {
    fn platform(&self) -> Platform;

    /// The account's newest posts, at most `limit`
    async fn recent_media(
        &self,
        account: &Account,
        limit: usize,
    ) -> std::result::Result<Vec<RemoteMedia>, String>;

    /// Metric name to value for one post
    async fn insights(
        &self,
        account: &Account,
        external_id: &str,
    ) -> std::result::Result<BTreeMap<String, i64>, String>;

    async fn delete_post(
        &self,
        account: &Account,
        external_id: &str,
    ) -> std::result::Result<(), String>;
}

pub struct PostManager {
    api: Arc<dyn PostApi>,
    limiter: Arc<SlidingWindow>,
}

impl PostManager {
    pub fn new(api: Arc<dyn PostApi>, limiter: Arc<SlidingWindow>) -> Self {
        Self { api, limiter }
    }

    pub fn platform(&self) -> Platform {
        self.api.platform()
    }

    pub async fn recent_media(&self, account: &Account, limit: usize) -> Result<Vec<RemoteMedia>> {
        self.limiter.admit().await;
        let media = self
            .api
            .recent_media(account, limit)
            .await
            .map_err(GraphError::RecentMedia)?;
        debug!("Listed {} {} post(s)", media.len(), self.platform());
        Ok(media)
    }

    pub async fn insights(
        &self,
        account: &Account,
        external_id: &str,
    ) -> Result<BTreeMap<String, i64>> {
        self.limiter.admit().await;
        Ok(self
            .api
            .insights(account, external_id)
            .await
            .map_err(GraphError::Insights)?)
    }

    pub async fn delete_post(&self, account: &Account, external_id: &str) -> Result<()> {
        self.limiter.admit().await;
        self.api
            .delete_post(account, external_id)
            .await
            .map_err(GraphError::Delete)?;
        debug!("Deleted {} post {}", self.platform(), external_id);
        Ok(())
    }
}

/// Post managers keyed by platform
#[derive(Clone, Default)]
pub struct PostManagers {
    managers: HashMap<Platform, Arc<PostManager>>,
}

impl PostManagers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instagram post management against the configured Graph API
    pub fn graph(config: &Config, limiters: &RateLimiters) -> Self {
        let mut managers = Self::new();
        managers.register(Arc::new(PostManager::new(
            Arc::new(graph::GraphPosts::new(&config.oauth.graph_url)),
            limiters.for_platform(Platform::Instagram),
        )));
        managers
    }

    pub fn register(&mut self, manager: Arc<PostManager>) {
        self.managers.insert(manager.platform(), manager);
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<PostManager>> {
        self.managers.get(&platform).cloned().ok_or_else(|| {
            SocialcastError::InvalidInput(format!(
                "Managing published posts is not supported for {}",
                platform
            ))
        })
    }
}

/// Publishers keyed by the platform they serve
#[derive(Clone, Default)]
pub struct PublisherRegistry {
    publishers: HashMap<Platform, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instagram and Facebook dispatchers against the configured Graph API
    pub fn graph(config: &Config, limiters: &RateLimiters) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TwoPhasePublisher::new(
            graph::InstagramMedia::new(&config.oauth.graph_url),
            limiters.for_platform(Platform::Instagram),
        )));
        registry.register(Arc::new(TwoPhasePublisher::new(
            graph::FacebookPhotos::new(&config.oauth.graph_url),
            limiters.for_platform(Platform::Facebook),
        )));
        registry
    }

    /// Register a publisher, replacing any earlier one for its platform
    pub fn register(&mut self, publisher: Arc<dyn Publisher>) {
        let platform = publisher.platform();
        if self.publishers.insert(platform, publisher).is_some() {
            debug!("Replaced publisher for {}", platform);
        }
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn Publisher>> {
        self.publishers
            .get(&platform)
            .cloned()
            .ok_or_else(|| ConfigError::MissingPublisher(platform).into())
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.publishers.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingApi {
        fail_create: bool,
        fail_publish: bool,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingApi {
        fn new(fail_create: bool, fail_publish: bool) -> Self {
            Self {
                fail_create,
                fail_publish,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaApi for RecordingApi {
        fn platform(&self) -> Platform {
            Platform::Instagram
        }

        async fn create_media(
            &self,
            _account: &Account,
            content: &PostContent,
        ) -> std::result::Result<String, String> {
            self.calls.lock().unwrap().push(format!("create {}", content.image_url));
            if self.fail_create {
                return Err("Only photo or video can be accepted as media type".to_string());
            }
            Ok("container-1".to_string())
        }

        async fn publish_media(
            &self,
            _account: &Account,
            creation_id: &str,
            _content: &PostContent,
        ) -> std::result::Result<String, String> {
            self.calls.lock().unwrap().push(format!("publish {}", creation_id));
            if self.fail_publish {
                return Err("Media ID is not available".to_string());
            }
            Ok("ext-1".to_string())
        }
    }

    fn account() -> Account {
        Account {
            server_id: "42".to_string(),
            platform: Platform::Instagram,
            platform_account_id: "1784".to_string(),
            access_token: "token".to_string(),
            display_name: "coffee.shop".to_string(),
            connected_at: 0,
        }
    }

    fn content() -> PostContent {
        PostContent {
            image_url: "https://cdn.example.com/latte.jpg".to_string(),
            caption: Some("Latte".to_string()),
        }
    }

    fn limiter() -> Arc<SlidingWindow> {
        Arc::new(SlidingWindow::new(100, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_two_phases_run_in_order() {
        let limiter = limiter();
        let publisher = TwoPhasePublisher::new(RecordingApi::new(false, false), limiter.clone());

        let id = publisher.publish(&account(), &content()).await.unwrap();

        assert_eq!(id, "ext-1");
        assert_eq!(
            *publisher.api.calls.lock().unwrap(),
            vec![
                "create https://cdn.example.com/latte.jpg".to_string(),
                "publish container-1".to_string()
            ]
        );
        assert_eq!(limiter.calls_in_window().await, 2);
    }

    #[tokio::test]
    async fn test_create_failure_skips_publish() {
        let publisher = TwoPhasePublisher::new(RecordingApi::new(true, false), limiter());

        match publisher.publish(&account(), &content()).await {
            Err(SocialcastError::Publish(PublishError::CreateMedia(msg))) => {
                assert!(msg.contains("photo or video"))
            }
            other => panic!("Expected create failure, got {:?}", other),
        }
        assert_eq!(publisher.api.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_is_tagged() {
        let publisher = TwoPhasePublisher::new(RecordingApi::new(false, true), limiter());

        match publisher.publish(&account(), &content()).await {
            Err(SocialcastError::Publish(PublishError::PublishMedia(msg))) => {
                assert_eq!(msg, "Media ID is not available")
            }
            other => panic!("Expected publish failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_phase_is_rate_limited() {
        let limiter = Arc::new(SlidingWindow::new(1, Duration::from_secs(60)));
        let publisher = TwoPhasePublisher::new(RecordingApi::new(false, false), limiter);

        let start = tokio::time::Instant::now();
        publisher.publish(&account(), &content()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(59));
    }

    #[test]
    fn test_registry_reports_missing_publisher() {
        let registry = PublisherRegistry::graph(
            &Config::default_config(),
            &RateLimiters::uniform(10, Duration::from_secs(60)),
        );

        assert_eq!(
            registry.platforms(),
            vec![Platform::Facebook, Platform::Instagram]
        );
        assert!(registry.get(Platform::Instagram).is_ok());
        match registry.get(Platform::Tiktok) {
            Err(SocialcastError::Config(ConfigError::MissingPublisher(Platform::Tiktok))) => {}
            Err(e) => panic!("Expected missing publisher, got {}", e),
            Ok(_) => panic!("Expected missing publisher"),
        }
    }

    struct FailingPosts;

    #[async_trait]
    impl PostApi for FailingPosts {
        fn platform(&self) -> Platform {
            Platform::Instagram
        }

        async fn recent_media(
            &self,
            _account: &Account,
            _limit: usize,
        ) -> std::result::Result<Vec<RemoteMedia>, String> {
            Ok(vec![])
        }

        async fn insights(
            &self,
            _account: &Account,
            _external_id: &str,
        ) -> std::result::Result<BTreeMap<String, i64>, String> {
            Err("Invalid metric".to_string())
        }

        async fn delete_post(
            &self,
            _account: &Account,
            external_id: &str,
        ) -> std::result::Result<(), String> {
            Err(format!("Unsupported delete request for {}", external_id))
        }
    }

    #[tokio::test]
    async fn test_post_manager_admits_every_call_and_tags_errors() {
        let limiter = limiter();
        let manager = PostManager::new(Arc::new(FailingPosts), limiter.clone());

        assert!(manager.recent_media(&account(), 5).await.unwrap().is_empty());
        match manager.insights(&account(), "ig-1").await {
            Err(SocialcastError::Graph(GraphError::Insights(msg))) => {
                assert_eq!(msg, "Invalid metric")
            }
            other => panic!("Expected insights failure, got {:?}", other),
        }
        match manager.delete_post(&account(), "ig-1").await {
            Err(SocialcastError::Graph(GraphError::Delete(msg))) => assert!(msg.contains("ig-1")),
            other => panic!("Expected delete failure, got {:?}", other),
        }
        assert_eq!(limiter.calls_in_window().await, 3);
    }

    #[test]
    fn test_post_managers_cover_instagram_only() {
        let managers = PostManagers::graph(
            &Config::default_config(),
            &RateLimiters::uniform(10, Duration::from_secs(60)),
        );

        assert!(managers.get(Platform::Instagram).is_ok());
        match managers.get(Platform::Facebook) {
            Err(SocialcastError::InvalidInput(msg)) => assert!(msg.contains("facebook")),
            Err(e) => panic!("Expected invalid input, got {}", e),
            Ok(_) => panic!("Expected invalid input"),
        }
    }
}
