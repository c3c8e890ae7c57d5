//! Accès réseau avec politique de nouvelles tentatives
//!
//! [`Transport`] est la couture entre le moteur et le réseau : l'implémentation
//! par défaut, [`HttpTransport`], s'appuie sur `reqwest`, et les tests
//! fournissent leurs propres transports en mémoire.
//!
//! [`ContentSource`] applique la politique de l'application : jusqu'à trois
//! tentatives, chacune avec son propre délai de 30 secondes, sans pause entre
//! deux tentatives. Après épuisement, le résultat est simplement absent.

use crate::error::{KuwoError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Nombre maximal de tentatives par requête
pub const MAX_ATTEMPTS: u32 = 3;

/// Délai par tentative
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Flux d'octets d'un corps de réponse
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Ressource binaire ouverte en lecture progressive
pub struct MediaStream {
    /// Taille annoncée par le serveur (`Content-Length`), si connue
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl MediaStream {
    /// Construit un flux depuis des morceaux déjà en mémoire
    pub fn from_chunks(chunks: Vec<io::Result<Bytes>>, content_length: Option<u64>) -> Self {
        Self {
            content_length,
            body: Box::pin(futures_util::stream::iter(chunks)),
        }
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Couche de transport : une seule tentative, sans retry
#[async_trait]
pub trait Transport: Send + Sync {
    /// Récupère le corps complet d'une URL
    async fn get(&self, url: &str, timeout: Duration) -> Result<Bytes>;

    /// Ouvre une URL en flux ; `timeout` borne l'ouverture, pas la lecture
    async fn open(&self, url: &str, timeout: Duration) -> Result<MediaStream>;
}

/// Transport HTTP basé sur reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pmokuwo/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: &str, timeout: Option<Duration>) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(KuwoError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Bytes> {
        let response = self.send(url, Some(timeout)).await?;
        Ok(response.bytes().await?)
    }

    async fn open(&self, url: &str, timeout: Duration) -> Result<MediaStream> {
        let response = tokio::time::timeout(timeout, self.send(url, None))
            .await
            .map_err(|_| KuwoError::Timeout(timeout))??;

        let content_length = response.content_length();
        let body = response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other));

        Ok(MediaStream {
            content_length,
            body: Box::pin(body),
        })
    }
}

/// Politique de nouvelles tentatives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Source de contenu réseau avec retry
#[derive(Clone)]
pub struct ContentSource {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl ContentSource {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Source HTTP avec la politique par défaut
    pub fn http() -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new()?), RetryPolicy::default()))
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Une seule tentative, bornée par le délai de la politique
    pub async fn try_fetch(&self, url: &str) -> Result<Bytes> {
        let timeout = self.policy.timeout;
        tokio::time::timeout(timeout, self.transport.get(url, timeout))
            .await
            .map_err(|_| KuwoError::Timeout(timeout))?
    }

    /// Récupère une URL avec retry
    ///
    /// Chaque échec est journalisé puis la tentative suivante démarre
    /// immédiatement. Retourne `None` une fois les tentatives épuisées.
    pub async fn fetch(&self, url: &str) -> Option<Bytes> {
        for attempt in 1..=self.policy.max_attempts {
            match self.try_fetch(url).await {
                Ok(body) => {
                    debug!(url, attempt, size = body.len(), "Fetched");
                    return Some(body);
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "Fetch attempt failed");
                }
            }
        }
        None
    }

    /// Ouvre un flux (une seule tentative ; l'appelant gère les retries)
    pub async fn open_stream(&self, url: &str) -> Result<MediaStream> {
        self.transport.open(url, self.policy.timeout).await
    }
}

impl std::fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSource")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
