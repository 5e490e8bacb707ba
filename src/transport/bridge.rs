//! HTTP client for the local messaging sidecar.
//!
//! The sidecar owns the network identity, end-to-end encryption and the
//! encrypted local database. We hand it the credentials once on connect and
//! then talk plain JSON.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::{BridgeConfig, Credentials};

use super::{
    Conversation, GroupHandle, Member, Message, MessageStream, Result, Transport, TransportError,
};

/// Buffered messages between the poller task and the consumer.
const STREAM_BUFFER: usize = 64;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest<'a> {
    env: String,
    wallet_key: &'a str,
    db_encryption_key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectResponse {
    inbox_id: String,
}

#[derive(Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<Message>,
    cursor: Option<String>,
    #[serde(default)]
    closed: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireKind {
    Dm,
    Group,
}

#[derive(Deserialize)]
struct WireConversation {
    id: String,
    kind: WireKind,
    #[serde(default)]
    name: Option<String>,
}

impl From<WireConversation> for Conversation {
    fn from(wire: WireConversation) -> Self {
        match wire.kind {
            WireKind::Dm => Conversation::direct(wire.id),
            WireKind::Group => Conversation::group(GroupHandle {
                name: wire.name.unwrap_or_default(),
                id: wire.id,
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuperAdmins {
    #[serde(default)]
    super_admins: Vec<String>,
}

/// Transport backed by the sidecar's HTTP API.
pub struct BridgeTransport {
    client: Client,
    base_url: String,
    poll_timeout: Duration,
    inbox_id: String,
}

impl BridgeTransport {
    /// Hand the credentials to the sidecar and learn our inbox id.
    pub async fn connect(config: &BridgeConfig, credentials: &Credentials) -> Result<Self> {
        let poll_timeout = Duration::from_secs(config.poll_timeout_secs);
        let client = Client::builder()
            // Long polls must outlive the server-side wait.
            .timeout(poll_timeout + Duration::from_secs(15))
            .build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let body = ConnectRequest {
            env: credentials.env.to_string(),
            wallet_key: &credentials.wallet_key,
            db_encryption_key: &credentials.encryption_key,
        };
        let resp = client
            .post(format!("{}/v1/connect", base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let resp = check(resp)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let connected: ConnectResponse = resp.json().await?;

        tracing::info!(
            "Connected to {} network as {}",
            credentials.env,
            connected.inbox_id
        );

        Ok(Self {
            client,
            base_url,
            poll_timeout,
            inbox_id: connected.inbox_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(TransportError::NotFound(body));
    }
    Err(TransportError::Request(format!("{}: {}", status, body)))
}

async fn poll_messages(
    client: &Client,
    url: &str,
    cursor: Option<&str>,
    timeout: Duration,
) -> Result<MessagePage> {
    let mut request = client
        .get(url)
        .query(&[("timeout", timeout.as_secs().to_string())]);
    if let Some(cursor) = cursor {
        request = request.query(&[("cursor", cursor)]);
    }
    let resp = check(request.send().await?).await?;
    Ok(resp.json().await?)
}

/// Forward pages into `tx`, polling with each page's cursor, until the
/// sidecar closes the stream, a poll fails or the receiver goes away.
async fn pump_pages<P, F>(mut page: MessagePage, mut poll: P, tx: mpsc::Sender<Result<Message>>)
where
    P: FnMut(Option<String>) -> F,
    F: Future<Output = Result<MessagePage>>,
{
    loop {
        for message in page.messages.drain(..) {
            if tx.send(Ok(message)).await.is_err() {
                return;
            }
        }
        if page.closed {
            tracing::debug!("Sidecar closed the message stream");
            return;
        }
        page = match poll(page.cursor.take()).await {
            Ok(next) => next,
            Err(e) => {
                let _ = tx.send(Err(TransportError::Stream(e.to_string()))).await;
                return;
            }
        };
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    fn inbox_id(&self) -> &str {
        &self.inbox_id
    }

    async fn sync(&self) -> Result<()> {
        check(self.client.post(self.url("/v1/sync")).send().await?).await?;
        Ok(())
    }

    async fn stream_messages(&self) -> Result<MessageStream> {
        let url = self.url("/v1/messages");
        let client = self.client.clone();
        let timeout = self.poll_timeout;

        // First poll happens here so an unreachable sidecar fails the open.
        let first = poll_messages(&client, &url, None, Duration::ZERO)
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(pump_pages(
            first,
            move |cursor| {
                let client = client.clone();
                let url = url.clone();
                async move { poll_messages(&client, &url, cursor.as_deref(), timeout).await }
            },
            tx,
        ));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/conversations/{}", id)))
            .send()
            .await?;
        match check(resp).await {
            Ok(resp) => Ok(Some(resp.json::<WireConversation>().await?.into())),
            Err(TransportError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send(&self, conversation_id: &str, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/v1/conversations/{}/messages", conversation_id)))
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<GroupHandle>> {
        let resp = check(self.client.get(self.url("/v1/groups")).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn create_group(&self, name: &str) -> Result<GroupHandle> {
        let resp = self
            .client
            .post(self.url("/v1/groups"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn list_members(&self, group: &GroupHandle) -> Result<Vec<Member>> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/groups/{}/members", group.id)))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn add_members(&self, group: &GroupHandle, inbox_ids: &[String]) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/v1/groups/{}/members", group.id)))
            .json(&serde_json::json!({ "inboxIds": inbox_ids }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn list_super_admins(&self, group: &GroupHandle) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/groups/{}/super-admins", group.id)))
            .send()
            .await?;
        let admins: SuperAdmins = check(resp).await?.json().await?;
        Ok(admins.super_admins)
    }

    async fn add_super_admin(&self, group: &GroupHandle, inbox_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/v1/groups/{}/super-admins", group.id)))
            .json(&serde_json::json!({ "inboxId": inbox_id }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}
