//! HTTP client for the remote authoritative store.
//!
//! Plain REST per record kind, scoped by owner, with bearer auth. The
//! change feed is a long-polled cursor endpoint: the transport task keeps
//! one request in flight and forwards committed events into the feed
//! channel, retrying with backoff when the remote is unreachable. The exact
//! transport is invisible to the engine; only the event ordering matters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use looseleaf_core::{OwnerId, Record, RecordKind};

use super::{ChangeEvent, ChangeFeed, RemoteCollection};
use crate::error::{Error, Result};

const FEED_CHANNEL_CAPACITY: usize = 64;
const FEED_RETRY_BASE: Duration = Duration::from_secs(1);
const FEED_RETRY_MAX: Duration = Duration::from_secs(30);

/// Remote store client over HTTP.
#[derive(Clone)]
pub struct HttpRemote {
    base_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into())?;
        let auth_token = auth_token.into().trim().to_string();
        if auth_token.is_empty() {
            return Err(Error::InvalidInput(
                "auth token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            auth_token,
            client: reqwest::Client::builder()
                .build()
                .map_err(remote_unavailable)?,
        })
    }

    fn collection_url(&self, kind: RecordKind) -> String {
        format!("{}/v1/{}", self.base_url, kind.collection())
    }
}

#[async_trait]
impl<T: Record> RemoteCollection<T> for HttpRemote {
    async fn list(&self, owner: &OwnerId) -> Result<Vec<T>> {
        let response = self
            .client
            .get(self.collection_url(T::KIND))
            .query(&[("owner", owner.as_str())])
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(remote_unavailable)?;

        let response = ok_or_unavailable(response).await?;
        response.json::<Vec<T>>().await.map_err(remote_unavailable)
    }

    async fn insert(&self, record: &T) -> Result<()> {
        let response = self
            .client
            .post(self.collection_url(T::KIND))
            .bearer_auth(&self.auth_token)
            .json(record)
            .send()
            .await
            .map_err(remote_unavailable)?;

        ok_or_unavailable(response).await.map(drop)
    }

    async fn update(&self, record: &T) -> Result<()> {
        let url = format!("{}/{}", self.collection_url(T::KIND), record.record_id());
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.auth_token)
            .json(record)
            .send()
            .await
            .map_err(remote_unavailable)?;

        ok_or_unavailable(response).await.map(drop)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let url = format!("{}/{}", self.collection_url(T::KIND), id);
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(remote_unavailable)?;

        // Deleting a record another device already removed is not an error
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ok_or_unavailable(response).await.map(drop)
    }

    async fn subscribe(&self, owner: &OwnerId) -> Result<ChangeFeed<T>> {
        let (events_tx, events_rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let task = tokio::spawn(poll_changes::<T>(
            self.client.clone(),
            format!("{}/changes", self.collection_url(T::KIND)),
            self.auth_token.clone(),
            owner.clone(),
            events_tx,
        ));
        Ok(ChangeFeed::with_transport(events_rx, task))
    }
}

/// Long-poll loop feeding one subscription.
///
/// Ends only when the receiving side of the feed goes away.
async fn poll_changes<T: Record>(
    client: reqwest::Client,
    url: String,
    auth_token: String,
    owner: OwnerId,
    events: mpsc::Sender<ChangeEvent<T>>,
) {
    let mut cursor: Option<u64> = None;
    let mut delay = FEED_RETRY_BASE;

    loop {
        if events.is_closed() {
            return;
        }

        let batch = fetch_batch::<T>(&client, &url, &auth_token, &owner, cursor).await;
        match batch {
            Ok(batch) => {
                delay = FEED_RETRY_BASE;
                cursor = Some(batch.cursor);
                for event in batch.events {
                    if events.send(event.into()).await.is_err() {
                        return;
                    }
                }
            }
            Err(error) => {
                tracing::warn!(kind = %T::KIND, %error, "Change feed poll failed; retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(FEED_RETRY_MAX);
            }
        }
    }
}

async fn fetch_batch<T: Record>(
    client: &reqwest::Client,
    url: &str,
    auth_token: &str,
    owner: &OwnerId,
    cursor: Option<u64>,
) -> Result<FeedBatch<T>> {
    let mut request = client
        .get(url)
        .query(&[("owner", owner.as_str())])
        .bearer_auth(auth_token);
    if let Some(cursor) = cursor {
        request = request.query(&[("cursor", cursor)]);
    }

    let response = request.send().await.map_err(remote_unavailable)?;
    let response = ok_or_unavailable(response).await?;
    response
        .json::<FeedBatch<T>>()
        .await
        .map_err(remote_unavailable)
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: serde::de::DeserializeOwned")]
struct FeedBatch<T> {
    cursor: u64,
    events: Vec<WireEvent<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "lowercase",
    bound = "T: serde::de::DeserializeOwned"
)]
enum WireEvent<T> {
    Insert { record: T },
    Update { record: T },
    Delete { id: Uuid },
}

impl<T> From<WireEvent<T>> for ChangeEvent<T> {
    fn from(value: WireEvent<T>) -> Self {
        match value {
            WireEvent::Insert { record } => Self::Insert(record),
            WireEvent::Update { record } => Self::Update(record),
            WireEvent::Delete { id } => Self::Delete(id),
        }
    }
}

fn remote_unavailable(error: reqwest::Error) -> Error {
    Error::RemoteUnavailable(error.to_string())
}

async fn ok_or_unavailable(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::RemoteUnavailable(parse_api_error(status, &body)))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("base URL must not be empty".to_string()));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looseleaf_core::Note;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("api.example.com").is_err());
    }

    #[test]
    fn normalize_base_url_strips_trailing_slash() {
        let normalized = normalize_base_url("https://api.example.com/").unwrap();
        assert_eq!(normalized, "https://api.example.com");
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let rendered = parse_api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"message": "token expired"}"#,
        );
        assert_eq!(rendered, "token expired (401)");
    }

    #[test]
    fn parse_api_error_falls_back_to_raw_body() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, ""),
            "HTTP 502"
        );
    }

    #[test]
    fn feed_batch_parses_all_event_kinds() {
        let note = Note::new("from feed", "");
        let payload = format!(
            r#"{{
                "cursor": 7,
                "events": [
                    {{"kind": "insert", "record": {note_json}}},
                    {{"kind": "update", "record": {note_json}}},
                    {{"kind": "delete", "id": "{id}"}}
                ]
            }}"#,
            note_json = serde_json::to_string(&note).unwrap(),
            id = note.id
        );

        let batch: FeedBatch<Note> = serde_json::from_str(&payload).unwrap();
        assert_eq!(batch.cursor, 7);
        assert_eq!(batch.events.len(), 3);

        let events: Vec<ChangeEvent<Note>> = batch.events.into_iter().map(Into::into).collect();
        assert_eq!(events[0], ChangeEvent::Insert(note.clone()));
        assert_eq!(events[2], ChangeEvent::Delete(note.record_id()));
    }

    #[test]
    fn invalid_auth_token_is_rejected() {
        assert!(HttpRemote::new("https://api.example.com", "  ").is_err());
    }
}
