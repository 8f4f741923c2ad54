//! Connecting and disconnecting platform accounts

use std::sync::Arc;

use tracing::info;

use crate::error::{AuthorizationError, Result, SocialcastError};
use crate::oauth::{OAuthEngine, PendingHandle};
use crate::types::{Account, ManagedPage, NewAccount, Platform};
use crate::{Config, Database};

#[derive(Clone)]
pub struct AccountService {
    db: Database,
    config: Arc<Config>,
}

/// A connect request waiting for the user to authorize in their browser
pub struct PendingConnect {
    server_id: String,
    platform: Platform,
    url: String,
    handle: PendingHandle,
}

impl PendingConnect {
    /// The URL the user has to open
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

impl AccountService {
    pub fn new(db: Database, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Start connecting `platform` for `server_id`.
    ///
    /// Starts the callback listener if needed and registers the pending
    /// authorization; finish with [`AccountService::complete_connect`].
    pub async fn begin_connect(
        &self,
        engine: &Arc<OAuthEngine>,
        server_id: &str,
        platform: Platform,
    ) -> Result<PendingConnect> {
        self.config.validate_oauth()?;

        if let Some(existing) = self.db.get_account(server_id, platform).await? {
            return Err(SocialcastError::InvalidInput(format!(
                "Server {} already has a {} account connected ({}); disconnect it first",
                server_id, platform, existing.display_name
            )));
        }

        engine.start().await?;
        let url = engine.get_auth_url(server_id)?;
        let handle = engine.register_pending(server_id);

        Ok(PendingConnect {
            server_id: server_id.to_string(),
            platform,
            url,
            handle,
        })
    }

    /// Wait for the authorization, pick a page, and save the account.
    ///
    /// `page_id` selects a page (or linked Instagram account) explicitly;
    /// otherwise the first page usable for the platform is taken.
    pub async fn complete_connect(
        &self,
        pending: PendingConnect,
        page_id: Option<&str>,
    ) -> Result<Account> {
        let PendingConnect {
            server_id,
            platform,
            handle,
            ..
        } = pending;

        let pages = handle.wait(self.config.oauth.timeout()).await?;
        let chosen = choose_page(&pages, platform, page_id)?;
        let account = self.db.save_account(&server_id, &chosen).await?;

        info!(
            "Connected {} account '{}' for server {}",
            platform, account.display_name, server_id
        );
        Ok(account)
    }

    /// Remove the account, returning its display name if one was connected
    pub async fn disconnect(&self, server_id: &str, platform: Platform) -> Result<Option<String>> {
        // A token that no longer decrypts must not block removal
        let name = self
            .db
            .get_account(server_id, platform)
            .await
            .ok()
            .flatten()
            .map(|account| account.display_name);

        if !self.db.delete_account(server_id, platform).await? {
            return Ok(None);
        }
        Ok(Some(name.unwrap_or_else(|| platform.to_string())))
    }

    pub async fn show(&self, server_id: &str) -> Result<Vec<Account>> {
        self.db.list_accounts(server_id).await
    }

    pub async fn get(&self, server_id: &str, platform: Platform) -> Result<Option<Account>> {
        self.db.get_account(server_id, platform).await
    }
}

fn choose_page(
    pages: &[ManagedPage],
    platform: Platform,
    page_id: Option<&str>,
) -> Result<NewAccount> {
    if pages.is_empty() {
        return Err(AuthorizationError::AccountLookup(
            "no pages are managed by the authorizing user".to_string(),
        )
        .into());
    }

    match page_id {
        Some(id) => {
            let page = pages
                .iter()
                .find(|p| {
                    p.id == id
                        || p.instagram_business_account
                            .as_ref()
                            .is_some_and(|ig| ig.id == id)
                })
                .ok_or_else(|| {
                    SocialcastError::InvalidInput(format!(
                        "Page {} is not among the {} page(s) you manage",
                        id,
                        pages.len()
                    ))
                })?;
            page.to_account(platform).ok_or_else(|| {
                SocialcastError::InvalidInput(format!(
                    "Page '{}' cannot post to {}; link an Instagram business account to it first",
                    page.name, platform
                ))
            })
        }
        None => pages
            .iter()
            .find_map(|p| p.to_account(platform))
            .ok_or_else(|| {
                AuthorizationError::AccountLookup(format!(
                    "none of your {} page(s) can post to {}",
                    pages.len(),
                    platform
                ))
                .into()
            }),
    }
}
