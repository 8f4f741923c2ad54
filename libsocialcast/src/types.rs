//! Core types for Socialcast

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Social platforms an account can be connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    Linkedin,
    Tiktok,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Facebook,
        Platform::Instagram,
        Platform::Linkedin,
        Platform::Tiktok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Linkedin => "linkedin",
            Platform::Tiktok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "linkedin" => Ok(Platform::Linkedin),
            "tiktok" => Ok(Platform::Tiktok),
            _ => Err(format!(
                "Unknown platform '{}'. Valid options: facebook, instagram, linkedin, tiktok",
                s
            )),
        }
    }
}

/// A connected account, one per (server, platform).
///
/// The access token is held decrypted in memory; it is only ever encrypted
/// on its way into the database.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub server_id: String,
    pub platform: Platform,
    pub platform_account_id: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub display_name: String,
    pub connected_at: i64,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("server_id", &self.server_id)
            .field("platform", &self.platform)
            .field("platform_account_id", &self.platform_account_id)
            .field("access_token", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Account data produced by a completed OAuth handshake, before it is stamped
/// with its server and connection time.
#[derive(Clone)]
pub struct NewAccount {
    pub platform: Platform,
    pub platform_account_id: String,
    pub access_token: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PostStatus::Scheduled)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(PostStatus::Scheduled),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("Unknown post status '{}'", other)),
        }
    }
}

/// A post record, scheduled or already published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: String,
    pub server_id: String,
    pub platform: Platform,
    pub account_id: String,
    pub image_url: String,
    pub caption: Option<String>,
    pub scheduled_at: Option<i64>,
    pub status: PostStatus,
    pub external_post_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub published_at: Option<i64>,
}

impl ScheduledPost {
    pub fn content(&self) -> PostContent {
        PostContent {
            image_url: self.image_url.clone(),
            caption: self.caption.clone(),
        }
    }
}

/// What a publisher puts on the platform: one image and an optional caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostContent {
    pub image_url: String,
    pub caption: Option<String>,
}

/// Input for [`crate::Database::save_post`]; id and creation time are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub server_id: String,
    pub platform: Platform,
    pub account_id: String,
    pub image_url: String,
    pub caption: Option<String>,
    pub scheduled_at: Option<i64>,
    pub status: PostStatus,
    pub external_post_id: Option<String>,
}

impl NewPost {
    /// A post waiting for the scheduler
    pub fn scheduled(account: &Account, image_url: String, caption: Option<String>, at: i64) -> Self {
        Self {
            server_id: account.server_id.clone(),
            platform: account.platform,
            account_id: account.platform_account_id.clone(),
            image_url,
            caption,
            scheduled_at: Some(at),
            status: PostStatus::Scheduled,
            external_post_id: None,
        }
    }

    /// A post that already went live through the immediate publish path
    pub fn published(
        account: &Account,
        image_url: String,
        caption: Option<String>,
        external_post_id: String,
    ) -> Self {
        Self {
            server_id: account.server_id.clone(),
            platform: account.platform,
            account_id: account.platform_account_id.clone(),
            image_url,
            caption,
            scheduled_at: None,
            status: PostStatus::Published,
            external_post_id: Some(external_post_id),
        }
    }
}

/// A post as the platform lists it, whether or not it was made here
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMedia {
    pub id: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Insight counts fetched for one published post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostAnalytics {
    pub server_id: String,
    pub platform: Platform,
    pub external_post_id: String,
    pub metrics: BTreeMap<String, i64>,
    pub fetched_at: i64,
}

/// A page (or linked business account) the authorizing user can manage
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManagedPage {
    pub id: String,
    pub name: String,
    pub access_token: String,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub instagram_business_account: Option<LinkedInstagramAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkedInstagramAccount {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl ManagedPage {
    /// Turn this page into the account data for `platform`, if the page can
    /// act on that platform.
    pub fn to_account(&self, platform: Platform) -> Option<NewAccount> {
        match platform {
            Platform::Instagram => self.instagram_business_account.as_ref().map(|ig| NewAccount {
                platform,
                platform_account_id: ig.id.clone(),
                access_token: self.access_token.clone(),
                display_name: ig.username.clone().unwrap_or_else(|| self.name.clone()),
            }),
            _ => Some(NewAccount {
                platform,
                platform_account_id: self.id.clone(),
                access_token: self.access_token.clone(),
                display_name: self.name.clone(),
            }),
        }
    }
}
