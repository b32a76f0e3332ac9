//! Gmail REST client — list, fetch, and relabel messages.
//!
//! Authorization is already done: the client is handed a bearer access
//! token and never runs an OAuth flow itself.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::MailError;
use crate::mail::MailSource;
use crate::mail::types::{Header, HeaderMessage, INBOX_LABEL, UNREAD_LABEL};

/// Default Gmail API root.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Largest page the list endpoint accepts.
const MAX_PAGE_SIZE: usize = 500;

/// Label IDs Gmail defines for every mailbox. These never need a lookup.
const SYSTEM_LABELS: &[&str] = &[
    INBOX_LABEL,
    UNREAD_LABEL,
    "SPAM",
    "TRASH",
    "STARRED",
    "IMPORTANT",
    "SENT",
    "DRAFT",
    "CATEGORY_PERSONAL",
    "CATEGORY_SOCIAL",
    "CATEGORY_PROMOTIONS",
    "CATEGORY_UPDATES",
    "CATEGORY_FORUMS",
];

/// Gmail client configuration.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_base: String,
    /// Mailbox owner; `me` is the authorized user.
    pub user_id: String,
    /// Label whose messages are listed.
    pub label: String,
    pub max_messages: usize,
    pub access_token: SecretString,
}

impl GmailConfig {
    pub fn new(access_token: SecretString) -> Self {
        Self {
            api_base: GMAIL_API_BASE.to_string(),
            user_id: "me".to_string(),
            label: INBOX_LABEL.to_string(),
            max_messages: 100,
            access_token,
        }
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<LabelInfo>,
}

#[derive(Debug, Deserialize)]
struct LabelInfo {
    id: String,
    name: String,
}

impl MessagePart {
    /// First `text/plain` part with data, depth-first.
    fn plain_text(&self) -> Option<String> {
        if self.mime_type.eq_ignore_ascii_case("text/plain") {
            if let Some(data) = self.body.as_ref().and_then(|b| b.data.as_deref()) {
                return decode_body(data);
            }
        }
        self.parts.iter().find_map(MessagePart::plain_text)
    }
}

/// Gmail bodies are base64url, with or without padding.
fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

impl From<GmailMessage> for HeaderMessage {
    fn from(msg: GmailMessage) -> Self {
        let body = msg
            .payload
            .as_ref()
            .and_then(MessagePart::plain_text)
            .or(msg.snippet);
        HeaderMessage {
            id: msg.id,
            headers: msg.payload.map(|p| p.headers).unwrap_or_default(),
            body,
            label_ids: msg.label_ids,
            internal_date: msg.internal_date,
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Gmail API client.
pub struct GmailClient {
    config: GmailConfig,
    client: reqwest::Client,
    /// Lowercased label name → label ID, filled on first use.
    labels: Mutex<Option<HashMap<String, String>>>,
}

impl GmailClient {
    pub fn new(config: GmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            labels: Mutex::new(None),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/users/{}/{path}",
            self.config.api_base.trim_end_matches('/'),
            self.config.user_id
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailError> {
        let resp = self
            .client
            .get(self.api_url(path))
            .bearer_auth(self.config.access_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| MailError::Http(e.to_string()))?;
        let resp = check_status(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| MailError::InvalidResponse(e.to_string()))
    }

    async fn modify(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), MailError> {
        let body = serde_json::json!({
            "addLabelIds": add,
            "removeLabelIds": remove,
        });
        let resp = self
            .client
            .post(self.api_url(&format!("messages/{id}/modify")))
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Http(e.to_string()))?;
        check_status(resp).await.map_err(|e| match e {
            MailError::Api { status: 404, .. } => MailError::NotFound { id: id.into() },
            other => other,
        })?;
        debug!(id, ?add, ?remove, "Message labels modified");
        Ok(())
    }

    /// Resolve a label name or ID to the ID Gmail expects.
    async fn resolve_label(&self, label: &str) -> Result<String, MailError> {
        if let Some(system) = SYSTEM_LABELS
            .iter()
            .find(|l| l.eq_ignore_ascii_case(label))
        {
            return Ok((*system).to_string());
        }

        let cached = self
            .labels
            .lock()
            .map_err(|_| MailError::Http("label cache poisoned".into()))?
            .as_ref()
            .and_then(|map| lookup_label(map, label));
        if let Some(id) = cached {
            return Ok(id);
        }

        let list: LabelList = self.get_json("labels", &[]).await?;
        let mut map = HashMap::with_capacity(list.labels.len() * 2);
        for info in list.labels {
            map.insert(info.id.to_lowercase(), info.id.clone());
            map.insert(info.name.to_lowercase(), info.id);
        }
        let found = lookup_label(&map, label);
        *self
            .labels
            .lock()
            .map_err(|_| MailError::Http("label cache poisoned".into()))? = Some(map);

        found.ok_or_else(|| MailError::UnknownLabel(label.to_string()))
    }
}

fn lookup_label(map: &HashMap<String, String>, label: &str) -> Option<String> {
    map.get(&label.to_lowercase()).cloned()
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, MailError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(MailError::AuthFailed(body));
    }
    Err(MailError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl MailSource for GmailClient {
    async fn list_message_ids(&self) -> Result<Vec<String>, MailError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < self.config.max_messages {
            let page_size = (self.config.max_messages - ids.len()).min(MAX_PAGE_SIZE);
            let mut query = vec![
                ("labelIds", self.config.label.clone()),
                ("maxResults", page_size.to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let page: ListResponse = self.get_json("messages", &query).await?;
            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        ids.truncate(self.config.max_messages);
        info!(count = ids.len(), label = %self.config.label, "Listed Gmail messages");
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<HeaderMessage, MailError> {
        let msg: GmailMessage = self
            .get_json(&format!("messages/{id}"), &[("format", "full".to_string())])
            .await
            .map_err(|e| match e {
                MailError::Api { status: 404, .. } => MailError::NotFound { id: id.into() },
                other => other,
            })?;
        Ok(msg.into())
    }

    async fn set_read_state(&self, id: &str, read: bool) -> Result<(), MailError> {
        let unread = vec![UNREAD_LABEL.to_string()];
        if read {
            self.modify(id, &[], &unread).await
        } else {
            self.modify(id, &unread, &[]).await
        }
    }

    async fn add_label(&self, id: &str, label: &str) -> Result<(), MailError> {
        let label_id = self.resolve_label(label).await?;
        self.modify(id, &[label_id], &[]).await
    }

    async fn remove_label(&self, id: &str, label: &str) -> Result<(), MailError> {
        let label_id = self.resolve_label(label).await?;
        self.modify(id, &[], &[label_id]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> GmailClient {
        let mut config = GmailConfig::new(SecretString::from("test-token"));
        config.api_base = server.url();
        config.max_messages = 3;
        GmailClient::new(config)
    }

    fn encode(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text)
    }

    #[test]
    fn api_url_joins_user_and_path() {
        let mut config = GmailConfig::new(SecretString::from("t"));
        config.api_base = "http://localhost:1234/gmail/v1/".into();
        let client = GmailClient::new(config);
        assert_eq!(
            client.api_url("messages/abc"),
            "http://localhost:1234/gmail/v1/users/me/messages/abc"
        );
    }

    #[test]
    fn decodes_padded_and_unpadded_bodies() {
        assert_eq!(decode_body("aGk").as_deref(), Some("hi"));
        assert_eq!(decode_body("aGk=").as_deref(), Some("hi"));
        assert!(decode_body("***").is_none());
    }

    #[test]
    fn plain_text_part_preferred_over_snippet() {
        let json = serde_json::json!({
            "id": "m1",
            "labelIds": ["INBOX"],
            "snippet": "snip",
            "internalDate": "1721728800000",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [{"name": "From", "value": "a@x.com"}],
                "parts": [
                    {"mimeType": "text/html", "body": {"data": encode("<p>html</p>")}},
                    {"mimeType": "text/plain", "body": {"data": encode("plain body")}}
                ]
            }
        });
        let msg: HeaderMessage = serde_json::from_value::<GmailMessage>(json).unwrap().into();
        assert_eq!(msg.body.as_deref(), Some("plain body"));
        assert_eq!(msg.header("from"), Some("a@x.com"));
        assert_eq!(msg.internal_date.as_deref(), Some("1721728800000"));
    }

    #[test]
    fn snippet_used_without_text_part() {
        let json = serde_json::json!({
            "id": "m1",
            "snippet": "just a snippet",
            "payload": {"mimeType": "text/html", "body": {"data": encode("<b>x</b>")}}
        });
        let msg: HeaderMessage = serde_json::from_value::<GmailMessage>(json).unwrap().into();
        assert_eq!(msg.body.as_deref(), Some("just a snippet"));
    }

    #[tokio::test]
    async fn list_follows_pages_up_to_limit() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/users/me/messages")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("labelIds".into(), "INBOX".into()),
                Matcher::UrlEncoded("maxResults".into(), "3".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"messages": [{"id": "a"}, {"id": "b"}], "nextPageToken": "p2"}"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/users/me/messages")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("pageToken".into(), "p2".into()),
                Matcher::UrlEncoded("maxResults".into(), "1".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"messages": [{"id": "c"}], "nextPageToken": "p3"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let ids = client.list_message_ids().await.unwrap();

        assert_eq!(ids, vec!["a", "b", "c"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn list_empty_mailbox() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/users/me/messages")
            .match_query(Matcher::Any)
            .with_body(r#"{"resultSizeEstimate": 0}"#)
            .create_async()
            .await;
        let client = client_for(&server);
        assert!(client.list_message_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_message_maps_payload() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "id": "m1",
            "labelIds": ["INBOX", "UNREAD"],
            "snippet": "Interview tomorrow",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    {"name": "From", "value": "hr@tenmiles.com"},
                    {"name": "Subject", "value": "Interview"},
                    {"name": "Date", "value": "Tue, 23 Jul 2024 10:00:00 +0000"}
                ],
                "body": {"data": encode("Interview tomorrow at 10")}
            }
        });
        let _m = server
            .mock("GET", "/users/me/messages/m1")
            .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let msg = client.get_message("m1").await.unwrap();
        assert_eq!(msg.header("subject"), Some("Interview"));
        assert_eq!(msg.body.as_deref(), Some("Interview tomorrow at 10"));
        assert!(!msg.is_read());
    }

    #[tokio::test]
    async fn get_message_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/users/me/messages/gone")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": {"code": 404}}"#)
            .create_async()
            .await;
        let client = client_for(&server);
        let err = client.get_message("gone").await.unwrap_err();
        assert!(matches!(err, MailError::NotFound { ref id } if id == "gone"));
    }

    #[tokio::test]
    async fn unauthorized_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/users/me/messages")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("invalid credentials")
            .create_async()
            .await;
        let client = client_for(&server);
        let err = client.list_message_ids().await.unwrap_err();
        assert!(matches!(err, MailError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn mark_read_removes_unread_label() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/users/me/messages/m1/modify")
            .match_body(Matcher::Json(serde_json::json!({
                "addLabelIds": [],
                "removeLabelIds": ["UNREAD"]
            })))
            .with_body(r#"{"id": "m1"}"#)
            .create_async()
            .await;
        let client = client_for(&server);
        client.set_read_state("m1", true).await.unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn user_label_resolved_by_name() {
        let mut server = mockito::Server::new_async().await;
        let labels = server
            .mock("GET", "/users/me/labels")
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"labels": [{"id": "INBOX", "name": "INBOX"}, {"id": "Label_7", "name": "Work"}]}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let modify = server
            .mock("POST", "/users/me/messages/m1/modify")
            .match_body(Matcher::Json(serde_json::json!({
                "addLabelIds": ["Label_7"],
                "removeLabelIds": []
            })))
            .with_body(r#"{"id": "m1"}"#)
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&server);
        client.add_label("m1", "work").await.unwrap();
        // Second call is served from the cache.
        client.add_label("m1", "Work").await.unwrap();

        labels.assert_async().await;
        modify.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_label_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _labels = server
            .mock("GET", "/users/me/labels")
            .with_body(r#"{"labels": []}"#)
            .create_async()
            .await;
        let client = client_for(&server);
        let err = client.add_label("m1", "Nowhere").await.unwrap_err();
        assert!(matches!(err, MailError::UnknownLabel(ref l) if l == "Nowhere"));
    }
}
