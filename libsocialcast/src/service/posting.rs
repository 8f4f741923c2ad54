//! Publishing and scheduling posts, and managing posts once they are live

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::{Result, SocialcastError};
use crate::platforms::{PostManagers, PublisherRegistry};
use crate::scheduling::parse_future_schedule;
use crate::types::{
    Account, NewPost, Platform, PostAnalytics, PostContent, RemoteMedia, ScheduledPost,
};
use crate::Database;

const DEFAULT_RECENT_LIMIT: usize = 10;
const DEFAULT_MEDIA_LIMIT: usize = 5;

#[derive(Clone)]
pub struct PostingService {
    db: Database,
    publishers: PublisherRegistry,
    managers: PostManagers,
}

/// Result of an immediate publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub post_id: String,
    pub platform: Platform,
    pub external_post_id: String,
}

/// Result of scheduling a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleReceipt {
    pub post_id: String,
    pub platform: Platform,
    pub scheduled_at: DateTime<Utc>,
}

impl PostingService {
    pub fn new(db: Database, publishers: PublisherRegistry) -> Self {
        Self {
            db,
            publishers,
            managers: PostManagers::new(),
        }
    }

    /// Use `managers` for listing, insights, and deletion of live posts
    pub fn with_post_managers(mut self, managers: PostManagers) -> Self {
        self.managers = managers;
        self
    }

    /// Publish right away through the platform's dispatcher.
    ///
    /// The post is recorded only once it is live; a failed publish leaves no
    /// record and returns the error.
    pub async fn publish_now(
        &self,
        server_id: &str,
        platform: Platform,
        image_url: &str,
        caption: Option<&str>,
    ) -> Result<PublishReceipt> {
        let content = validate_content(image_url, caption)?;
        let account = self.require_account(server_id, platform).await?;
        let publisher = self.publishers.get(platform)?;

        let external_post_id = publisher.publish(&account, &content).await?;
        let post_id = self
            .db
            .save_post(&NewPost::published(
                &account,
                content.image_url,
                content.caption,
                external_post_id.clone(),
            ))
            .await?;

        info!("Published {} post {} as {}", platform, post_id, external_post_id);
        Ok(PublishReceipt {
            post_id,
            platform,
            external_post_id,
        })
    }

    /// Record a post for the scheduler. `when` must name a future time.
    pub async fn schedule_post(
        &self,
        server_id: &str,
        platform: Platform,
        image_url: &str,
        caption: Option<&str>,
        when: &str,
    ) -> Result<ScheduleReceipt> {
        self.schedule_post_at(server_id, platform, image_url, caption, when, Utc::now())
            .await
    }

    /// [`PostingService::schedule_post`] with an explicit notion of "now"
    pub async fn schedule_post_at(
        &self,
        server_id: &str,
        platform: Platform,
        image_url: &str,
        caption: Option<&str>,
        when: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduleReceipt> {
        let content = validate_content(image_url, caption)?;
        let scheduled_at = parse_future_schedule(when, now)?;
        let account = self.require_account(server_id, platform).await?;

        let post_id = self
            .db
            .save_post(&NewPost::scheduled(
                &account,
                content.image_url,
                content.caption,
                scheduled_at.timestamp(),
            ))
            .await?;

        info!("Scheduled {} post {} for {}", platform, post_id, scheduled_at);
        Ok(ScheduleReceipt {
            post_id,
            platform,
            scheduled_at,
        })
    }

    /// A server's most recent posts, newest first (10 unless `limit` is given)
    pub async fn recent_posts(
        &self,
        server_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScheduledPost>> {
        self.db
            .get_posts_by_server(server_id, limit.unwrap_or(DEFAULT_RECENT_LIMIT))
            .await
    }

    /// The connected account's newest posts on the platform (5 unless
    /// `limit` is given)
    pub async fn recent_media(
        &self,
        server_id: &str,
        platform: Platform,
        limit: Option<usize>,
    ) -> Result<Vec<RemoteMedia>> {
        let account = self.require_account(server_id, platform).await?;
        let manager = self.managers.get(platform)?;
        manager
            .recent_media(&account, limit.unwrap_or(DEFAULT_MEDIA_LIMIT))
            .await
    }

    /// Fetch a post's insights and keep them as the latest snapshot
    pub async fn post_insights(
        &self,
        server_id: &str,
        platform: Platform,
        external_post_id: &str,
    ) -> Result<PostAnalytics> {
        let external_post_id = require_post_id(external_post_id)?;
        let account = self.require_account(server_id, platform).await?;
        let manager = self.managers.get(platform)?;

        let metrics = manager.insights(&account, external_post_id).await?;
        let analytics = self
            .db
            .save_analytics(server_id, platform, external_post_id, &metrics)
            .await?;
        info!("Fetched {} metric(s) for {} post {}", metrics.len(), platform, external_post_id);
        Ok(analytics)
    }

    /// The newest stored insights for a post, without calling the platform
    pub async fn saved_insights(&self, external_post_id: &str) -> Result<Option<PostAnalytics>> {
        self.db
            .get_analytics(require_post_id(external_post_id)?)
            .await
    }

    /// Delete a live post from the platform
    pub async fn delete_post(
        &self,
        server_id: &str,
        platform: Platform,
        external_post_id: &str,
    ) -> Result<()> {
        let external_post_id = require_post_id(external_post_id)?;
        let account = self.require_account(server_id, platform).await?;
        let manager = self.managers.get(platform)?;

        manager.delete_post(&account, external_post_id).await?;
        info!("Deleted {} post {}", platform, external_post_id);
        Ok(())
    }

    async fn require_account(&self, server_id: &str, platform: Platform) -> Result<Account> {
        self.db
            .get_account(server_id, platform)
            .await?
            .ok_or_else(|| {
                SocialcastError::InvalidInput(format!(
                    "No {} account connected for server {}. Connect one first.",
                    platform, server_id
                ))
            })
    }
}

fn require_post_id(external_post_id: &str) -> Result<&str> {
    let trimmed = external_post_id.trim();
    if trimmed.is_empty() {
        return Err(SocialcastError::InvalidInput(
            "Post id cannot be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

fn validate_content(image_url: &str, caption: Option<&str>) -> Result<PostContent> {
    let image_url = image_url.trim();
    if image_url.is_empty() {
        return Err(SocialcastError::InvalidInput(
            "Image URL cannot be empty".to_string(),
        ));
    }
    if !(image_url.starts_with("https://") || image_url.starts_with("http://")) {
        return Err(SocialcastError::InvalidInput(format!(
            "Image URL must be a public http(s) URL, got '{}'",
            image_url
        )));
    }

    Ok(PostContent {
        image_url: image_url.to_string(),
        caption: caption
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::TokenCipher;
    use crate::platforms::mock::MockPublisher;
    use crate::platforms::{PostApi, PostManager};
    use crate::rate_limiter::SlidingWindow;
    use crate::types::{NewAccount, PostStatus};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    async fn setup(publishers: PublisherRegistry) -> (TempDir, Database, PostingService) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path.to_string_lossy(), &TokenCipher::generate_key())
            .await
            .unwrap();
        db.save_account(
            "42",
            &NewAccount {
                platform: Platform::Instagram,
                platform_account_id: "1784".to_string(),
                access_token: "token".to_string(),
                display_name: "coffee.shop".to_string(),
            },
        )
        .await
        .unwrap();
        let service = PostingService::new(db.clone(), publishers);
        (temp_dir, db, service)
    }

    fn registry_with(publisher: MockPublisher) -> PublisherRegistry {
        let mut registry = PublisherRegistry::new();
        registry.register(Arc::new(publisher));
        registry
    }

    #[tokio::test]
    async fn test_publish_now_records_published_post() {
        let (_temp, db, service) =
            setup(registry_with(MockPublisher::success(Platform::Instagram, "1789"))).await;

        let receipt = service
            .publish_now("42", Platform::Instagram, "https://cdn.example.com/a.jpg", Some(" Hi "))
            .await
            .unwrap();
        assert_eq!(receipt.external_post_id, "1789");

        let post = db.get_post(&receipt.post_id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Published);
        assert_eq!(post.caption.as_deref(), Some("Hi"));
        assert_eq!(post.account_id, "1784");
        assert!(post.scheduled_at.is_none());
    }

    #[tokio::test]
    async fn test_publish_now_failure_leaves_no_record() {
        let (_temp, db, service) =
            setup(registry_with(MockPublisher::failure(Platform::Instagram, "boom"))).await;

        let err = service
            .publish_now("42", Platform::Instagram, "https://cdn.example.com/a.jpg", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(db.get_posts_by_server("42", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_requires_account_and_publisher() {
        let (_temp, _db, service) =
            setup(registry_with(MockPublisher::success(Platform::Instagram, "1"))).await;

        match service
            .publish_now("99", Platform::Instagram, "https://cdn.example.com/a.jpg", None)
            .await
        {
            Err(SocialcastError::InvalidInput(msg)) => assert!(msg.contains("No instagram account")),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }

        let (_temp2, _db2, service) = setup(PublisherRegistry::new()).await;
        assert!(service
            .publish_now("42", Platform::Instagram, "https://cdn.example.com/a.jpg", None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_invalid_image_url_rejected() {
        let (_temp, _db, service) =
            setup(registry_with(MockPublisher::success(Platform::Instagram, "1"))).await;

        for url in ["", "   ", "/tmp/a.jpg", "ftp://example.com/a.jpg"] {
            assert!(matches!(
                service.publish_now("42", Platform::Instagram, url, None).await,
                Err(SocialcastError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_schedule_post_in_future() {
        let (_temp, db, service) = setup(PublisherRegistry::new()).await;
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();

        let receipt = service
            .schedule_post_at(
                "42",
                Platform::Instagram,
                "https://cdn.example.com/a.jpg",
                None,
                "2030-01-02 09:30",
                now,
            )
            .await
            .unwrap();
        assert_eq!(
            receipt.scheduled_at,
            Utc.with_ymd_and_hms(2030, 1, 2, 9, 30, 0).unwrap()
        );

        let post = db.get_post(&receipt.post_id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Scheduled);
        assert_eq!(post.scheduled_at, Some(receipt.scheduled_at.timestamp()));
    }

    #[tokio::test]
    async fn test_schedule_rejects_past_time() {
        let (_temp, db, service) = setup(PublisherRegistry::new()).await;
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();

        assert!(service
            .schedule_post_at(
                "42",
                Platform::Instagram,
                "https://cdn.example.com/a.jpg",
                None,
                "2029-12-31 23:00",
                now,
            )
            .await
            .is_err());
        assert!(db.get_posts_by_server("42", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_posts_default_limit() {
        let (_temp, _db, service) = setup(PublisherRegistry::new()).await;
        for _ in 0..12 {
            service
                .schedule_post("42", Platform::Instagram, "https://cdn.example.com/a.jpg", None, "1h")
                .await
                .unwrap();
        }

        assert_eq!(service.recent_posts("42", None).await.unwrap().len(), 10);
        assert_eq!(service.recent_posts("42", Some(3)).await.unwrap().len(), 3);
        assert!(service.recent_posts("7", None).await.unwrap().is_empty());
    }

    #[derive(Default)]
    struct FakePosts {
        reach: Mutex<i64>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PostApi for FakePosts {
        fn platform(&self) -> Platform {
            Platform::Instagram
        }

        async fn recent_media(
            &self,
            _account: &Account,
            limit: usize,
        ) -> std::result::Result<Vec<RemoteMedia>, String> {
            Ok((0..limit)
                .map(|i| RemoteMedia {
                    id: format!("ig-{}", i),
                    caption: None,
                    media_url: None,
                    permalink: None,
                    timestamp: None,
                })
                .collect())
        }

        async fn insights(
            &self,
            _account: &Account,
            _external_id: &str,
        ) -> std::result::Result<BTreeMap<String, i64>, String> {
            let mut reach = self.reach.lock().unwrap();
            *reach += 10;
            Ok(BTreeMap::from([("reach".to_string(), *reach)]))
        }

        async fn delete_post(
            &self,
            _account: &Account,
            external_id: &str,
        ) -> std::result::Result<(), String> {
            self.deleted.lock().unwrap().push(external_id.to_string());
            Ok(())
        }
    }

    async fn setup_managed() -> (TempDir, Database, Arc<FakePosts>, PostingService) {
        let (temp, db, service) = setup(PublisherRegistry::new()).await;
        let api = Arc::new(FakePosts::default());
        let mut managers = PostManagers::new();
        managers.register(Arc::new(PostManager::new(
            api.clone(),
            Arc::new(SlidingWindow::new(100, Duration::from_secs(60))),
        )));
        (temp, db, api, service.with_post_managers(managers))
    }

    #[tokio::test]
    async fn test_post_insights_are_saved_as_latest_snapshot() {
        let (_temp, _db, _api, service) = setup_managed().await;
        assert!(service.saved_insights("ig-1").await.unwrap().is_none());

        service
            .post_insights("42", Platform::Instagram, "ig-1")
            .await
            .unwrap();
        let second = service
            .post_insights("42", Platform::Instagram, " ig-1 ")
            .await
            .unwrap();
        assert_eq!(second.metrics["reach"], 20);

        let saved = service.saved_insights("ig-1").await.unwrap().unwrap();
        assert_eq!(saved.metrics["reach"], 20);
        assert_eq!(saved.server_id, "42");
    }

    #[tokio::test]
    async fn test_delete_and_recent_media_use_the_account() {
        let (_temp, _db, api, service) = setup_managed().await;

        service
            .delete_post("42", Platform::Instagram, "ig-9")
            .await
            .unwrap();
        assert_eq!(*api.deleted.lock().unwrap(), vec!["ig-9".to_string()]);

        assert_eq!(
            service
                .recent_media("42", Platform::Instagram, None)
                .await
                .unwrap()
                .len(),
            5
        );

        match service.delete_post("7", Platform::Instagram, "ig-9").await {
            Err(SocialcastError::InvalidInput(msg)) => assert!(msg.contains("No instagram account")),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
        assert!(matches!(
            service.delete_post("42", Platform::Instagram, "  ").await,
            Err(SocialcastError::InvalidInput(_))
        ));
        assert_eq!(api.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_post_management_needs_a_manager_for_the_platform() {
        let (_temp, db, _api, service) = setup_managed().await;
        db.save_account(
            "42",
            &NewAccount {
                platform: Platform::Facebook,
                platform_account_id: "1001".to_string(),
                access_token: "token".to_string(),
                display_name: "Coffee Shop".to_string(),
            },
        )
        .await
        .unwrap();

        match service.post_insights("42", Platform::Facebook, "1001_1").await {
            Err(SocialcastError::InvalidInput(msg)) => assert!(msg.contains("not supported")),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }
}
