//! Discord REST transport.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AnnouncementFeed, ChannelError, ChannelMessage, Embed, MessageId, StatusChannel};

/// Discord epoch (2015-01-01) in unix milliseconds
const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;
/// Bulk delete rejects messages older than this
const BULK_DELETE_MAX_AGE_MS: u64 = 14 * 24 * 3600 * 1000;

#[derive(Debug, Deserialize)]
struct CurrentUser {
    id: MessageId,
    username: String,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: MessageId,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageAuthor {
    id: MessageId,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: MessageId,
    author: MessageAuthor,
    #[serde(default)]
    content: String,
}

/// Authenticated Discord REST client
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    user_id: MessageId,
}

impl DiscordClient {
    /// Authenticate with the bot token and learn our own user id.
    pub async fn connect(
        api_base: impl Into<String>,
        token: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self, ChannelError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(timeout_seconds)).build()?;
        let mut client = Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            user_id: MessageId(0),
        };

        let response = client.request(Method::GET, "/users/@me").send().await?;
        let me: CurrentUser = decode(response).await?;
        tracing::info!("Logged in as {} ({})", me.username, me.id);
        client.user_id = me.id;
        Ok(client)
    }

    pub fn user_id(&self) -> MessageId {
        self.user_id
    }

    /// Resolve a channel id, failing if it does not exist or is hidden.
    pub async fn channel(&self, channel_id: u64) -> Result<DiscordChannel, ChannelError> {
        let response = self.request(Method::GET, &format!("/channels/{channel_id}")).send().await?;
        let info: ChannelInfo = decode(response).await?;
        debug!("Resolved channel {} ({})", info.id, info.name.as_deref().unwrap_or("unnamed"));
        Ok(DiscordChannel { client: self.clone(), channel_id: info.id })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .header(AUTHORIZATION, format!("Bot {}", self.token))
    }
}

/// Map non-success statuses onto channel errors.
async fn checked(response: Response) -> Result<Response, ChannelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(match status {
        StatusCode::NOT_FOUND => ChannelError::NotFound,
        StatusCode::FORBIDDEN => ChannelError::Forbidden,
        StatusCode::UNAUTHORIZED => ChannelError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<f64>().ok())
                .map(Duration::from_secs_f64);
            ChannelError::RateLimited(retry_after)
        }
        status => ChannelError::Http { status, body: response.text().await.unwrap_or_default() },
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ChannelError> {
    Ok(checked(response).await?.json().await?)
}

/// One text channel
#[derive(Clone)]
pub struct DiscordChannel {
    client: DiscordClient,
    channel_id: MessageId,
}

impl DiscordChannel {
    async fn list(&self, query: &str) -> Result<Vec<ChannelMessage>, ChannelError> {
        let response = self
            .client
            .request(Method::GET, &format!("/channels/{}/messages?{query}", self.channel_id))
            .send()
            .await?;
        let raw: Vec<RawMessage> = decode(response).await?;
        let own = self.client.user_id;
        Ok(raw
            .into_iter()
            .map(|message| ChannelMessage {
                id: message.id,
                author_id: message.author.id,
                from_self: message.author.id == own,
                content: message.content,
            })
            .collect())
    }

    async fn delete(&self, message_id: MessageId) -> Result<(), ChannelError> {
        let response = self
            .client
            .request(Method::DELETE, &format!("/channels/{}/messages/{message_id}", self.channel_id))
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[MessageId]) -> Result<(), ChannelError> {
        let response = self
            .client
            .request(Method::POST, &format!("/channels/{}/messages/bulk-delete", self.channel_id))
            .json(&json!({ "messages": ids }))
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }
}

/// Whether a snowflake is young enough for bulk deletion
fn bulk_deletable(id: MessageId, now_ms: u64) -> bool {
    let created_ms = (id.0 >> 22) + DISCORD_EPOCH_MS;
    now_ms.saturating_sub(created_ms) < BULK_DELETE_MAX_AGE_MS
}

#[async_trait]
impl StatusChannel for DiscordChannel {
    async fn send(&self, body: &Embed) -> Result<MessageId, ChannelError> {
        let response = self
            .client
            .request(Method::POST, &format!("/channels/{}/messages", self.channel_id))
            .json(&json!({ "embeds": [body], "allowed_mentions": { "parse": [] } }))
            .send()
            .await?;
        let message: RawMessage = decode(response).await?;
        Ok(message.id)
    }

    async fn edit(&self, message_id: MessageId, body: &Embed) -> Result<(), ChannelError> {
        let response = self
            .client
            .request(Method::PATCH, &format!("/channels/{}/messages/{message_id}", self.channel_id))
            .json(&json!({ "content": null, "embeds": [body] }))
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }

    async fn recent_messages(&self, limit: u8) -> Result<Vec<ChannelMessage>, ChannelError> {
        self.list(&format!("limit={}", limit.clamp(1, 100))).await
    }

    async fn purge(&self, limit: u8) -> Result<usize, ChannelError> {
        let messages = self.recent_messages(limit).await?;
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let (young, old): (Vec<_>, Vec<_>) =
            messages.iter().map(|message| message.id).partition(|id| bulk_deletable(*id, now_ms));

        match young.as_slice() {
            [] => {}
            [single] => self.delete(*single).await?,
            ids => self.bulk_delete(ids).await?,
        }
        for id in &old {
            self.delete(*id).await?;
        }

        debug!("Purged {} messages from channel {}", messages.len(), self.channel_id);
        Ok(messages.len())
    }
}

#[async_trait]
impl AnnouncementFeed for DiscordChannel {
    async fn messages_after(
        &self,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<ChannelMessage>, ChannelError> {
        let limit = limit.clamp(1, 100);
        match after {
            Some(after) => self.list(&format!("after={after}&limit={limit}")).await,
            None => self.list(&format!("limit={limit}")).await,
        }
    }
}
