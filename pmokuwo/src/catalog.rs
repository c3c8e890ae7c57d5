//! Lecture du catalogue Kuwo à travers la base d'enregistrements
//!
//! Chaque famille suit le même schéma : lecture de la base, sinon requête
//! réseau, parsing (guillemets simples tolérés), écriture puis retour. Les
//! recherches passent par le mémo en mémoire et ne sont jamais persistées.

use crate::endpoints::{Endpoints, PAGE_SIZE};
use crate::files::FileCache;
use crate::memo::RequestMemo;
use crate::quasi_json::{as_count, loads_quasi};
use crate::records::{ArtistRef, DimensionKey, RecordStore};
use crate::source::ContentSource;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Catalog {
    source: ContentSource,
    records: Arc<RecordStore>,
    memo: RequestMemo,
    endpoints: Endpoints,
    files: FileCache,
}

fn parse_body(url: &str, body: Bytes) -> Option<Value> {
    match loads_quasi(&body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(url, error = %e, "Malformed response");
            None
        }
    }
}

impl Catalog {
    pub fn new(
        source: ContentSource,
        records: Arc<RecordStore>,
        memo: RequestMemo,
        endpoints: Endpoints,
        files: FileCache,
    ) -> Self {
        Self {
            source,
            records,
            memo,
            endpoints,
            files,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn fetch_json(&self, url: String) -> Option<Value> {
        let body = self.source.fetch(&url).await?;
        parse_body(&url, body)
    }

    /// Page de chansons d'un artiste (objet complet avec `TOTAL` et `abslist`)
    pub async fn artist_songs(&self, artist: &str, page: u32) -> Option<Value> {
        let key = DimensionKey::ArtistSongs {
            artist: artist.to_string(),
            page,
        };
        let url = self.endpoints.artist_songs(artist, page);
        self.records.read_through(&key, || self.fetch_json(url)).await
    }

    /// Sous-nœuds (`child`) d'un nœud du catalogue
    pub async fn nodes(&self, nid: u64) -> Option<Vec<Value>> {
        let url = self.endpoints.nodes(nid);
        let nodes = self
            .records
            .read_through(&DimensionKey::Node(nid), || self.fetch_json(url))
            .await?;
        list_field(nodes, "child")
    }

    /// Chansons (`musiclist`) d'un classement
    pub async fn toplist_songs(&self, nid: u64) -> Option<Vec<Value>> {
        let url = self.endpoints.toplist_songs(nid);
        let songs = self
            .records
            .read_through(&DimensionKey::TopList(nid), || self.fetch_json(url))
            .await?;
        list_field(songs, "musiclist")
    }

    /// Fiche d'un artiste, par nom ou par identifiant
    ///
    /// Le portrait (`pic`) est mis en cache avant l'écriture de la fiche ;
    /// son chemin local est ajouté sous `logo` (`null` s'il n'a pu être
    /// récupéré).
    pub async fn artist_info(&self, artist: &ArtistRef) -> Option<Value> {
        let url = match artist {
            ArtistRef::Name(name) => self.endpoints.artist_info_by_name(name),
            ArtistRef::Id(id) => self.endpoints.artist_info_by_id(*id),
        };
        self.records
            .read_through(&DimensionKey::ArtistInfo(artist.clone()), || async move {
                let mut info = self.fetch_json(url).await?;
                let logo = self.artist_logo(&info).await;
                if let Some(fields) = info.as_object_mut() {
                    fields.insert("logo".to_string(), logo);
                }
                Some(info)
            })
            .await
    }

    async fn artist_logo(&self, info: &Value) -> Value {
        let Some(pic) = info.get("pic").and_then(Value::as_str).filter(|p| !p.trim().is_empty()) else {
            return Value::Null;
        };
        match self.files.get_image(&self.endpoints.artist_logo(pic)).await {
            Ok(Some(path)) => Value::String(path.to_string_lossy().into_owned()),
            Ok(None) => Value::Null,
            Err(e) => {
                warn!(pic, error = %e, "Cannot store artist logo");
                Value::Null
            }
        }
    }

    /// Recherche de chansons (mémo en mémoire, jamais persistée)
    pub async fn search_songs(&self, keyword: &str, page: u32) -> Option<Value> {
        let url = self.endpoints.search_songs(keyword, page);
        let body = self.memo.fetch(&self.source, &url).await?;
        parse_body(&url, body)
    }
}

fn list_field(mut value: Value, field: &str) -> Option<Vec<Value>> {
    match value.get_mut(field).map(Value::take) {
        Some(Value::Array(items)) => Some(items),
        _ => {
            warn!(field, "Missing list in response");
            None
        }
    }
}

/// Parcours paginé des chansons d'un artiste
///
/// Le total est lu dans le champ `TOTAL` de la première page ; le parcours
/// s'arrête dès que `page * PAGE_SIZE` dépasse ce total.
#[derive(Debug, Clone)]
pub struct ArtistSongsPager {
    artist: String,
    page: u32,
    total: Option<u64>,
}

impl ArtistSongsPager {
    pub fn new(artist: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            page: 0,
            total: None,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.total, Some(total) if u64::from(self.page) * u64::from(PAGE_SIZE) > total)
    }

    /// Page suivante (`abslist`), ou `None` en fin de parcours ou en cas d'échec
    ///
    /// Un échec ne fait pas avancer le curseur : un nouvel appel retente la
    /// même page.
    pub async fn next_page(&mut self, catalog: &Catalog) -> Option<Vec<Value>> {
        if self.is_exhausted() {
            debug!(artist = %self.artist, page = self.page, "No more songs");
            return None;
        }

        let songs = catalog.artist_songs(&self.artist, self.page).await?;
        if self.total.is_none() {
            self.total = Some(songs.get("TOTAL").and_then(as_count).unwrap_or(0));
        }
        self.page += 1;
        list_field(songs, "abslist")
    }
}
