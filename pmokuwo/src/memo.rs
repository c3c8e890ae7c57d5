//! Mémo en mémoire des réponses non persistées
//!
//! Les recherches et certaines listes ne doivent pas finir dans le cache
//! disque : leurs corps sont gardés en mémoire pour la durée du processus,
//! dans la limite d'une capacité fixe.

use crate::source::ContentSource;
use bytes::Bytes;
use moka::future::Cache as MokaCache;
use tracing::debug;

/// Capacité par défaut (nombre de réponses)
pub const DEFAULT_CAPACITY: u64 = 256;

#[derive(Clone)]
pub struct RequestMemo {
    bodies: MokaCache<String, Bytes>,
}

impl RequestMemo {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            bodies: MokaCache::builder().max_capacity(max_capacity).build(),
        }
    }

    pub async fn get(&self, url: &str) -> Option<Bytes> {
        self.bodies.get(url).await
    }

    /// Récupère une URL via le mémo ; les échecs ne sont pas retenus
    pub async fn fetch(&self, source: &ContentSource, url: &str) -> Option<Bytes> {
        if let Some(body) = self.bodies.get(url).await {
            debug!(url, "Memo hit");
            return Some(body);
        }

        let body = source.fetch(url).await?;
        self.bodies.insert(url.to_string(), body.clone()).await;
        Some(body)
    }

    pub async fn invalidate_all(&self) {
        self.bodies.invalidate_all();
        self.bodies.run_pending_tasks().await;
    }
}

impl Default for RequestMemo {
    fn default() -> Self {
        Self::new()
    }
}
