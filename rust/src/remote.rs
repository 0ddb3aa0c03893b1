//! HTTP client for the generic create/read/update/delete data service.
//!
//! Endpoints are `<base>/<collection>` (list, create) and
//! `<base>/<collection>/<id>` (get, update, delete). Every response body is an
//! [`Envelope`]; a non-2xx status that still carries an envelope surfaces that
//! envelope so the server's message reaches the user.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::SyncConfig;
use crate::envelope::{Envelope, RemoteResult};

pub const ACTOR_HEADER: &str = "x-actor-id";

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("network disabled")]
    NetworkDisabled,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote returned HTTP {status}")]
    Status { status: u16 },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    actor_id: Option<String>,
    network_enabled: bool,
}

impl HttpRemote {
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        Self::build(base_url, &SyncConfig::default())
    }

    /// `None` when the config names no remote.
    pub fn from_config(config: &SyncConfig) -> Result<Option<Self>, RemoteError> {
        match config.remote_base_url() {
            Some(url) => Self::build(url, config).map(Some),
            None => Ok(None),
        }
    }

    fn build(base_url: &str, config: &SyncConfig) -> Result<Self, RemoteError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            actor_id: config.actor_id.clone(),
            network_enabled: config.network_enabled(),
        })
    }

    /// Stamp writes with the signed-in caller.
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list<T: DeserializeOwned>(&self, collection: &str) -> RemoteResult<Vec<T>> {
        let url = self.collection_url(collection);
        self.send(self.client.get(url)).await
    }

    pub async fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> RemoteResult<T> {
        let url = self.item_url(collection, id);
        self.send(self.client.get(url)).await
    }

    pub async fn create<B, T>(&self, collection: &str, body: &B) -> RemoteResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.collection_url(collection);
        self.send(self.client.post(url).json(body)).await
    }

    pub async fn update<B, T>(&self, collection: &str, id: &str, body: &B) -> RemoteResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.item_url(collection, id);
        self.send(self.client.put(url).json(body)).await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()> {
        let url = self.item_url(collection, id);
        let envelope: Envelope<serde_json::Value> = self.send(self.client.delete(url)).await?;
        Ok(envelope.map(|_| ()))
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection.trim_matches('/'))
    }

    fn item_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), id)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> RemoteResult<T> {
        if !self.network_enabled {
            return Err(RemoteError::NetworkDisabled);
        }
        let request = match &self.actor_id {
            Some(actor) => request.header(ACTOR_HEADER, actor),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        match serde_json::from_slice::<Envelope<T>>(&bytes) {
            Ok(envelope) => {
                if !status.is_success() {
                    tracing::debug!(status = status.as_u16(), "remote returned error envelope");
                }
                Ok(envelope)
            }
            Err(_) if !status.is_success() => Err(RemoteError::Status {
                status: status.as_u16(),
            }),
            Err(e) => Err(RemoteError::Decode(e)),
        }
    }
}
