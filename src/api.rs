//! REST client for the moderation endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// Relationship kind for a confirmed contact.
pub const RELATIONSHIP_FRIEND: u8 = 1;
/// Relationship kind for a pending incoming friend request.
pub const RELATIONSHIP_INCOMING: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response.
    Http(String),
    /// The API answered with a non-success status.
    Status { status: u16, detail: String },
    /// The response body could not be decoded.
    Parse(String),
}

impl ApiError {
    /// Text suitable for showing to the user.
    pub fn detail(&self) -> &str {
        match self {
            ApiError::Http(e) | ApiError::Parse(e) => e,
            ApiError::Status { detail, .. } => detail,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http(e) => write!(f, "HTTP error: {e}"),
            ApiError::Status { status, detail } => write!(f, "API error {status}: {detail}"),
            ApiError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;

fn snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn optional_snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "snowflake")] u64);
    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    #[serde(default)]
    pub username: Option<String>,
}

/// Channel payload; only the fields the group commands read.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChannelData {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    #[serde(default, deserialize_with = "optional_snowflake")]
    pub owner_id: Option<u64>,
    #[serde(default)]
    pub recipients: Option<Vec<Recipient>>,
}

impl ChannelData {
    pub fn member_ids(&self) -> Vec<u64> {
        self.recipients
            .as_ref()
            .map(|r| r.iter().map(|m| m.id).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: u8,
}

/// Moderation endpoints used by the command handlers.
///
/// Every call is attempted exactly once. Transport faults and non-success
/// statuses come back as `Err`, never as a panic.
#[async_trait]
pub trait ModerationApi: Send + Sync {
    async fn transfer_ownership(&self, channel_id: u64, new_owner: u64) -> ApiResult<()>;
    async fn remove_recipient(&self, channel_id: u64, user_id: u64) -> ApiResult<()>;
    async fn get_channel(&self, channel_id: u64) -> ApiResult<ChannelData>;
    async fn get_relationships(&self) -> ApiResult<Vec<Relationship>>;
    async fn create_group(&self, recipients: &[u64]) -> ApiResult<ChannelData>;
    async fn accept_friend_request(&self, user_id: u64) -> ApiResult<()>;
}

#[derive(Serialize)]
struct OwnerBody {
    owner: String,
}

#[derive(Serialize)]
struct CreateGroupBody {
    recipients: Vec<String>,
}

#[derive(Serialize)]
struct RelationshipBody {
    #[serde(rename = "type")]
    kind: u8,
}

pub struct RestClient {
    /// Sent verbatim as the `authorization` header.
    authorization: String,
    base: String,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(authorization: String, base: String) -> Self {
        Self {
            authorization,
            base,
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base, path))
            .header("authorization", &self.authorization)
            .header("content-type", "application/json")
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ApiResult<reqwest::Response> {
        let response = request.send().await.map_err(|e| ApiError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = status.canonical_reason().unwrap_or("unknown status").to_string();
            let detail = match response.text().await {
                Ok(body) if !body.trim().is_empty() => body,
                _ => reason,
            };
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(response)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ApiResult<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ModerationApi for RestClient {
    async fn transfer_ownership(&self, channel_id: u64, new_owner: u64) -> ApiResult<()> {
        debug!("PATCH owner of channel {} -> {}", channel_id, new_owner);
        let body = OwnerBody {
            owner: new_owner.to_string(),
        };
        self.send(
            self.request(reqwest::Method::PATCH, &format!("/channels/{channel_id}"))
                .json(&body),
        )
        .await
        .map(|_| ())
    }

    async fn remove_recipient(&self, channel_id: u64, user_id: u64) -> ApiResult<()> {
        debug!("DELETE recipient {} from channel {}", user_id, channel_id);
        self.send(self.request(
            reqwest::Method::DELETE,
            &format!("/channels/{channel_id}/recipients/{user_id}"),
        ))
        .await
        .map(|_| ())
    }

    async fn get_channel(&self, channel_id: u64) -> ApiResult<ChannelData> {
        debug!("GET channel {}", channel_id);
        self.send_json(self.request(reqwest::Method::GET, &format!("/channels/{channel_id}")))
            .await
    }

    async fn get_relationships(&self) -> ApiResult<Vec<Relationship>> {
        debug!("GET relationships");
        self.send_json(self.request(reqwest::Method::GET, "/users/@me/relationships"))
            .await
    }

    async fn create_group(&self, recipients: &[u64]) -> ApiResult<ChannelData> {
        debug!("POST new group with {:?}", recipients);
        let body = CreateGroupBody {
            recipients: recipients.iter().map(u64::to_string).collect(),
        };
        self.send_json(
            self.request(reqwest::Method::POST, "/users/@me/channels")
                .json(&body),
        )
        .await
    }

    async fn accept_friend_request(&self, user_id: u64) -> ApiResult<()> {
        debug!("PUT relationship {} (accept)", user_id);
        let body = RelationshipBody {
            kind: RELATIONSHIP_FRIEND,
        };
        self.send(
            self.request(
                reqwest::Method::PUT,
                &format!("/users/@me/relationships/{user_id}"),
            )
            .json(&body),
        )
        .await
        .map(|_| ())
    }
}
