//! OAuth providers: authorization URLs, token exchange, managed page lookup

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::OAuthConfig;
use crate::error::{AuthorizationError, ConfigError, Result};
use crate::platforms::graph::graph_error_message;
use crate::types::{ManagedPage, Platform};

const PAGE_SCOPES: &[&str] = &[
    "pages_show_list",
    "pages_read_engagement",
    "pages_manage_posts",
    "pages_read_user_content",
    "read_insights",
];

const INSTAGRAM_SCOPES: &[&str] = &["instagram_basic", "instagram_content_publish"];

const PAGE_FIELDS: &str = "id,name,access_token,tasks,instagram_business_account{id,username}";

/// The provider side of an authorization-code handshake
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL the user opens to grant access; `state` comes back on the redirect
    fn authorization_url(&self, state: &str) -> Result<String>;

    /// Trade the redirect's `code` for a short-lived user token
    async fn exchange_code(&self, code: &str) -> std::result::Result<String, AuthorizationError>;

    /// Upgrade a short-lived token to a long-lived one
    async fn long_lived_token(
        &self,
        short_token: &str,
    ) -> std::result::Result<String, AuthorizationError>;

    /// Pages (and linked accounts) the token can act for
    async fn managed_accounts(
        &self,
        user_token: &str,
    ) -> std::result::Result<Vec<ManagedPage>, AuthorizationError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct PagesResponse {
    #[serde(default)]
    data: Vec<ManagedPage>,
}

/// Facebook Login for Pages, used for both Facebook pages and the
/// Instagram business accounts linked to them.
pub struct FacebookOAuth {
    client: reqwest::Client,
    app_id: String,
    app_secret: String,
    redirect_uri: String,
    oauth_url: String,
    token_url: String,
    graph_url: String,
    scopes: Vec<&'static str>,
}

impl FacebookOAuth {
    pub fn new(config: &OAuthConfig, platform: Platform) -> Self {
        let mut scopes = PAGE_SCOPES.to_vec();
        if platform == Platform::Instagram {
            scopes.extend_from_slice(INSTAGRAM_SCOPES);
        }

        Self {
            client: reqwest::Client::new(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            oauth_url: config.oauth_url.clone(),
            token_url: config.token_url.clone(),
            graph_url: config.graph_url.trim_end_matches('/').to_string(),
            scopes,
        }
    }

    pub fn scopes(&self) -> String {
        self.scopes.join(",")
    }

    async fn request_token(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<String, String> {
        let response = self
            .client
            .get(&self.token_url)
            .query(params)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{} {}", status, graph_error_message(&body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| format!("unexpected token response: {}", e))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl OAuthProvider for FacebookOAuth {
    fn authorization_url(&self, state: &str) -> Result<String> {
        let scope = self.scopes();
        let url = reqwest::Url::parse_with_params(
            &self.oauth_url,
            &[
                ("client_id", self.app_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("response_type", "code"),
                ("state", state),
            ],
        )
        .map_err(|e| ConfigError::InvalidValue {
            field: "oauth.oauth_url".to_string(),
            reason: e.to_string(),
        })?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> std::result::Result<String, AuthorizationError> {
        debug!("Exchanging authorization code");
        self.request_token(&[
            ("client_id", self.app_id.as_str()),
            ("client_secret", self.app_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", code),
        ])
        .await
        .map_err(AuthorizationError::CodeExchange)
    }

    async fn long_lived_token(
        &self,
        short_token: &str,
    ) -> std::result::Result<String, AuthorizationError> {
        debug!("Requesting long-lived token");
        self.request_token(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.app_id.as_str()),
            ("client_secret", self.app_secret.as_str()),
            ("fb_exchange_token", short_token),
        ])
        .await
        .map_err(AuthorizationError::TokenExchange)
    }

    async fn managed_accounts(
        &self,
        user_token: &str,
    ) -> std::result::Result<Vec<ManagedPage>, AuthorizationError> {
        let url = format!("{}/me/accounts", self.graph_url);
        let response = self
            .client
            .get(&url)
            .query(&[("access_token", user_token), ("fields", PAGE_FIELDS)])
            .send()
            .await
            .map_err(|e| AuthorizationError::AccountLookup(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthorizationError::AccountLookup(format!(
                "{} {}",
                status,
                graph_error_message(&body)
            )));
        }

        let pages: PagesResponse = response.json().await.map_err(|e| {
            AuthorizationError::AccountLookup(format!("unexpected pages response: {}", e))
        })?;
        debug!("Token manages {} page(s)", pages.data.len());
        Ok(pages.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OAuthConfig {
        OAuthConfig {
            app_id: "1234".to_string(),
            app_secret: "shh".to_string(),
            redirect_uri: "http://localhost:8080/callback".to_string(),
            ..OAuthConfig::default()
        }
    }

    fn query_pairs(url: &str) -> Vec<(String, String)> {
        reqwest::Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_authorization_url_embeds_state() {
        let provider = FacebookOAuth::new(&config(), Platform::Facebook);
        let url = provider.authorization_url("42").unwrap();

        assert!(url.starts_with("https://www.facebook.com/"));
        let pairs = query_pairs(&url);
        assert!(pairs.contains(&("state".to_string(), "42".to_string())));
        assert!(pairs.contains(&("client_id".to_string(), "1234".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://localhost:8080/callback".to_string()
        )));
    }

    #[test]
    fn test_instagram_requests_content_publish_scope() {
        let instagram = FacebookOAuth::new(&config(), Platform::Instagram);
        let facebook = FacebookOAuth::new(&config(), Platform::Facebook);

        assert!(instagram.scopes().contains("instagram_content_publish"));
        assert!(instagram.scopes().contains("pages_show_list"));
        assert!(!facebook.scopes().contains("instagram_basic"));
    }

    #[test]
    fn test_state_is_url_encoded() {
        let provider = FacebookOAuth::new(&config(), Platform::Facebook);
        let url = provider.authorization_url("a b&c").unwrap();

        assert!(!url.contains("a b&c"));
        let pairs = query_pairs(&url);
        assert!(pairs.contains(&("state".to_string(), "a b&c".to_string())));
    }

    #[test]
    fn test_malformed_oauth_url_is_config_error() {
        let mut config = config();
        config.oauth_url = "not a url".to_string();
        let provider = FacebookOAuth::new(&config, Platform::Facebook);
        assert!(provider.authorization_url("42").is_err());
    }
}
