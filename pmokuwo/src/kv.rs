//! Cache clé/valeur persistant (URL → octets)
//!
//! Les entrées sont stockées dans une table SQLite ordonnée par clé
//! (`WITHOUT ROWID`), sans TTL ni éviction : une entrée écrite n'est jamais
//! modifiée ni supprimée.

use crate::error::Result;
use crate::keys::{canonical_url, CacheKey};
use crate::source::ContentSource;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

/// Cache clé/valeur partagé par tout le processus
#[derive(Debug)]
pub struct KeyValueCache {
    conn: Mutex<Connection>,
}

impl KeyValueCache {
    /// Ouvre (ou crée) le cache dans le fichier indiqué
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened key/value cache");
        Self::init(conn)
    }

    /// Cache en mémoire, perdu à la fermeture
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS blobs (
                key BLOB PRIMARY KEY,
                value BLOB NOT NULL
            ) WITHOUT ROWID",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        let conn = self.conn();
        let value: Option<Vec<u8>> = conn
            .query_row(
                "SELECT value FROM blobs WHERE key = ?1",
                params![key.as_bytes()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(Bytes::from))
    }

    /// Insère une entrée ; une clé déjà présente garde sa valeur d'origine
    pub fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO blobs (key, value) VALUES (?1, ?2)",
            params![key.as_bytes(), value],
        )?;
        Ok(())
    }

    pub fn contains(&self, key: &CacheKey) -> Result<bool> {
        let conn = self.conn();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM blobs WHERE key = ?1",
                params![key.as_bytes()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Récupère une URL en passant par le cache
    ///
    /// L'URL est canonisée avant le hachage comme avant la requête : un
    /// serveur annoncé sur le port `:81` est interrogé sur le port standard.
    ///
    /// Avec `use_cache`, une entrée présente est renvoyée sans aucun accès
    /// réseau, et un corps récupéré avec succès est stocké avant d'être
    /// renvoyé. Les échecs ne sont jamais mis en cache.
    pub async fn urlopen(&self, source: &ContentSource, url: &str, use_cache: bool) -> Option<Bytes> {
        let url = canonical_url(url);
        let url = url.as_str();
        let key = CacheKey::from_url(url);

        if use_cache {
            match self.get(&key) {
                Ok(Some(body)) => {
                    debug!(url, "Cache hit");
                    return Some(body);
                }
                Ok(None) => debug!(url, "Cache miss"),
                Err(e) => error!(url, error = %e, "Cache read failed"),
            }
        }

        let body = source.fetch(url).await?;

        if use_cache {
            if let Err(e) = self.put(&key, &body) {
                error!(url, error = %e, "Cache write failed");
            }
        }
        Some(body)
    }

    /// Ferme la connexion
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }
}
