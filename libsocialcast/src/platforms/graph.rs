//! Graph API content publishing for Instagram business accounts and
//! Facebook pages, plus listing, insights, and deletion of Instagram posts

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{MediaApi, PostApi};
use crate::types::{Account, Platform, PostContent, RemoteMedia};

const MEDIA_FIELDS: &str = "id,caption,media_url,permalink,timestamp";
const INSIGHT_METRICS: &str = "impressions,reach,engagement,saved";

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Reduce a Graph error body to its message, or return the body unchanged
/// if it is not the usual `{"error": {"message": ...}}` shape.
pub(crate) fn graph_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.trim().to_string(),
    }
}

async fn post_for_id(
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, &str)],
) -> std::result::Result<String, String> {
    let response = client
        .post(url)
        .form(params)
        .send()
        .await
        .map_err(|e| format!("request failed: {}", e))?;

    let created: IdResponse = check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| format!("unexpected response: {}", e))?;
    Ok(created.id)
}

async fn check_status(response: reqwest::Response) -> std::result::Result<reqwest::Response, String> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(format!("{} {}", status, graph_error_message(&body)))
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, &str)],
) -> std::result::Result<T, String> {
    let response = client
        .get(url)
        .query(params)
        .send()
        .await
        .map_err(|e| format!("request failed: {}", e))?;

    check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| format!("unexpected response: {}", e))
}

/// `/{ig-user}/media` then `/{ig-user}/media_publish`
pub struct InstagramMedia {
    client: reqwest::Client,
    graph_url: String,
}

impl InstagramMedia {
    pub fn new(graph_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            graph_url: graph_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaApi for InstagramMedia {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn create_media(
        &self,
        account: &Account,
        content: &PostContent,
    ) -> std::result::Result<String, String> {
        let url = format!("{}/{}/media", self.graph_url, account.platform_account_id);
        post_for_id(
            &self.client,
            &url,
            &[
                ("image_url", content.image_url.as_str()),
                ("caption", content.caption.as_deref().unwrap_or("")),
                ("access_token", account.access_token.as_str()),
            ],
        )
        .await
    }

    async fn publish_media(
        &self,
        account: &Account,
        creation_id: &str,
        _content: &PostContent,
    ) -> std::result::Result<String, String> {
        let url = format!(
            "{}/{}/media_publish",
            self.graph_url, account.platform_account_id
        );
        post_for_id(
            &self.client,
            &url,
            &[
                ("creation_id", creation_id),
                ("access_token", account.access_token.as_str()),
            ],
        )
        .await
    }
}

/// Unpublished `/{page}/photos` upload, then a `/{page}/feed` post with the
/// photo attached
pub struct FacebookPhotos {
    client: reqwest::Client,
    graph_url: String,
}

impl FacebookPhotos {
    pub fn new(graph_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            graph_url: graph_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaApi for FacebookPhotos {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn create_media(
        &self,
        account: &Account,
        content: &PostContent,
    ) -> std::result::Result<String, String> {
        let url = format!("{}/{}/photos", self.graph_url, account.platform_account_id);
        post_for_id(
            &self.client,
            &url,
            &[
                ("url", content.image_url.as_str()),
                ("published", "false"),
                ("access_token", account.access_token.as_str()),
            ],
        )
        .await
    }

    async fn publish_media(
        &self,
        account: &Account,
        creation_id: &str,
        content: &PostContent,
    ) -> std::result::Result<String, String> {
        let url = format!("{}/{}/feed", self.graph_url, account.platform_account_id);
        let attached = serde_json::json!({ "media_fbid": creation_id }).to_string();
        post_for_id(
            &self.client,
            &url,
            &[
                ("message", content.caption.as_deref().unwrap_or("")),
                ("attached_media[0]", attached.as_str()),
                ("access_token", account.access_token.as_str()),
            ],
        )
        .await
    }
}

#[derive(Deserialize)]
struct MediaList {
    #[serde(default)]
    data: Vec<RemoteMedia>,
}

#[derive(Deserialize)]
struct InsightsResponse {
    #[serde(default)]
    data: Vec<Insight>,
}

#[derive(Deserialize)]
struct Insight {
    name: String,
    #[serde(default)]
    values: Vec<InsightValue>,
}

#[derive(Deserialize)]
struct InsightValue {
    value: i64,
}

/// Listing, `/{post}/insights`, and `DELETE /{post}` for Instagram
/// business accounts
pub struct GraphPosts {
    client: reqwest::Client,
    graph_url: String,
}

impl GraphPosts {
    pub fn new(graph_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            graph_url: graph_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PostApi for GraphPosts {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn recent_media(
        &self,
        account: &Account,
        limit: usize,
    ) -> std::result::Result<Vec<RemoteMedia>, String> {
        let url = format!("{}/{}/media", self.graph_url, account.platform_account_id);
        let limit_param = limit.to_string();
        let list: MediaList = get_json(
            &self.client,
            &url,
            &[
                ("fields", MEDIA_FIELDS),
                ("limit", limit_param.as_str()),
                ("access_token", account.access_token.as_str()),
            ],
        )
        .await?;

        let mut media = list.data;
        media.truncate(limit);
        Ok(media)
    }

    async fn insights(
        &self,
        account: &Account,
        external_id: &str,
    ) -> std::result::Result<BTreeMap<String, i64>, String> {
        let url = format!("{}/{}/insights", self.graph_url, external_id);
        let insights: InsightsResponse = get_json(
            &self.client,
            &url,
            &[
                ("metric", INSIGHT_METRICS),
                ("access_token", account.access_token.as_str()),
            ],
        )
        .await?;

        Ok(insights
            .data
            .into_iter()
            .filter_map(|insight| {
                let value = insight.values.first()?.value;
                Some((insight.name, value))
            })
            .collect())
    }

    async fn delete_post(
        &self,
        account: &Account,
        external_id: &str,
    ) -> std::result::Result<(), String> {
        let url = format!("{}/{}", self.graph_url, external_id);
        let response = self
            .client
            .delete(&url)
            .query(&[("access_token", account.access_token.as_str())])
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        check_status(response).await?;
        Ok(())
    }
}
