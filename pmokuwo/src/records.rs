//! Stockage des réponses structurées (JSON) et des chansons téléchargées
//!
//! Quatre familles d'enregistrements indépendantes, une table chacune :
//!
//! | Famille                 | Table         | Dimension                 |
//! |-------------------------|---------------|---------------------------|
//! | Pages de chansons       | `artistmusic` | artiste + page            |
//! | Nœuds du catalogue      | `nodes`       | identifiant de nœud       |
//! | Classements             | `toplist`     | identifiant du classement |
//! | Fiches d'artiste        | `artistinfo`  | nom ou identifiant        |
//!
//! Les écritures sont de simples insertions : la base n'impose pas l'unicité
//! d'une dimension et la lecture renvoie le plus ancien enregistrement.
//!
//! La table `song` associe l'identifiant d'une chanson (`rid`) au fichier
//! local téléchargé.

use crate::error::Result;
use crate::quasi_json::as_count;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

/// Référence à un artiste, par nom ou par identifiant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtistRef {
    Name(String),
    Id(u64),
}

/// Clé de dimension d'une famille d'enregistrements
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimensionKey {
    ArtistSongs { artist: String, page: u32 },
    Node(u64),
    TopList(u64),
    ArtistInfo(ArtistRef),
}

/// Chanson téléchargée
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SongInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    pub rid: String,
    #[serde(default)]
    pub artistid: String,
    #[serde(default)]
    pub albumid: String,
    #[serde(default)]
    pub filepath: PathBuf,
}

impl SongInfo {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let filepath: String = row.get(7)?;
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            artist: row.get(2)?,
            album: row.get(3)?,
            rid: row.get(4)?,
            artistid: row.get(5)?,
            albumid: row.get(6)?,
            filepath: PathBuf::from(filepath),
        })
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS artistmusic (
        artist TEXT NOT NULL,
        pn INTEGER NOT NULL,
        songs TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_artistmusic_dim ON artistmusic (artist, pn);

    CREATE TABLE IF NOT EXISTS nodes (
        nid INTEGER NOT NULL,
        info TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_nodes_dim ON nodes (nid);

    CREATE TABLE IF NOT EXISTS toplist (
        nid INTEGER NOT NULL,
        songs TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_toplist_dim ON toplist (nid);

    CREATE TABLE IF NOT EXISTS artistinfo (
        artist TEXT,
        artistid INTEGER,
        info TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_artistinfo_name ON artistinfo (artist);
    CREATE INDEX IF NOT EXISTS idx_artistinfo_id ON artistinfo (artistid);

    CREATE TABLE IF NOT EXISTS song (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        artist TEXT NOT NULL,
        album TEXT NOT NULL,
        rid TEXT NOT NULL,
        artistid TEXT NOT NULL,
        albumid TEXT NOT NULL,
        filepath TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_song_rid ON song (rid);
";

/// Base d'enregistrements partagée par tout le processus
#[derive(Debug)]
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Ouvre (ou crée) la base et ses tables
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened record store");
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lit l'enregistrement d'une dimension
    pub fn read_record(&self, key: &DimensionKey) -> Result<Option<Value>> {
        let conn = self.conn();
        let text: Option<String> = match key {
            DimensionKey::ArtistSongs { artist, page } => conn
                .query_row(
                    "SELECT songs FROM artistmusic WHERE artist = ?1 AND pn = ?2
                     ORDER BY rowid ASC LIMIT 1",
                    params![artist, page],
                    |row| row.get(0),
                )
                .optional()?,
            DimensionKey::Node(nid) => conn
                .query_row(
                    "SELECT info FROM nodes WHERE nid = ?1 ORDER BY rowid ASC LIMIT 1",
                    params![*nid as i64],
                    |row| row.get(0),
                )
                .optional()?,
            DimensionKey::TopList(nid) => conn
                .query_row(
                    "SELECT songs FROM toplist WHERE nid = ?1 ORDER BY rowid ASC LIMIT 1",
                    params![*nid as i64],
                    |row| row.get(0),
                )
                .optional()?,
            DimensionKey::ArtistInfo(ArtistRef::Name(name)) => conn
                .query_row(
                    "SELECT info FROM artistinfo WHERE artist = ?1 ORDER BY rowid ASC LIMIT 1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?,
            DimensionKey::ArtistInfo(ArtistRef::Id(id)) => conn
                .query_row(
                    "SELECT info FROM artistinfo WHERE artistid = ?1 ORDER BY rowid ASC LIMIT 1",
                    params![*id as i64],
                    |row| row.get(0),
                )
                .optional()?,
        };

        match text {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Insère un enregistrement
    ///
    /// Pour les fiches d'artiste, la colonne de la clé reçoit toujours la
    /// valeur de la clé ; l'autre colonne est reprise du contenu (`name` ou
    /// `id`) afin que la fiche soit aussi retrouvable par l'autre voie.
    pub fn write_record(&self, key: &DimensionKey, payload: &Value, timestamp: i64) -> Result<()> {
        let text = serde_json::to_string(payload)?;
        let conn = self.conn();
        match key {
            DimensionKey::ArtistSongs { artist, page } => {
                conn.execute(
                    "INSERT INTO artistmusic (artist, pn, songs, timestamp) VALUES (?1, ?2, ?3, ?4)",
                    params![artist, page, text, timestamp],
                )?;
            }
            DimensionKey::Node(nid) => {
                conn.execute(
                    "INSERT INTO nodes (nid, info, timestamp) VALUES (?1, ?2, ?3)",
                    params![*nid as i64, text, timestamp],
                )?;
            }
            DimensionKey::TopList(nid) => {
                conn.execute(
                    "INSERT INTO toplist (nid, songs, timestamp) VALUES (?1, ?2, ?3)",
                    params![*nid as i64, text, timestamp],
                )?;
            }
            DimensionKey::ArtistInfo(artist) => {
                let (name, id) = match artist {
                    ArtistRef::Name(n) => (
                        Some(n.clone()),
                        payload.get("id").and_then(as_count).map(|id| id as i64),
                    ),
                    ArtistRef::Id(i) => (
                        payload.get("name").and_then(Value::as_str).map(str::to_string),
                        Some(*i as i64),
                    ),
                };
                conn.execute(
                    "INSERT INTO artistinfo (artist, artistid, info, timestamp) VALUES (?1, ?2, ?3, ?4)",
                    params![name, id, text, timestamp],
                )?;
            }
        }
        Ok(())
    }

    /// Lecture avec repli sur le réseau
    ///
    /// En cas d'absence, `fetch` est appelé ; un résultat est écrit puis
    /// renvoyé. Une erreur de la base est journalisée et traitée comme une
    /// absence (lecture) ou ignorée (écriture).
    pub async fn read_through<F, Fut>(&self, key: &DimensionKey, fetch: F) -> Option<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Value>>,
    {
        match self.read_record(key) {
            Ok(Some(payload)) => {
                debug!(?key, "Record cache hit");
                return Some(payload);
            }
            Ok(None) => debug!(?key, "Record cache miss"),
            Err(e) => error!(?key, error = %e, "Record read failed"),
        }

        let payload = fetch().await?;

        if let Err(e) = self.write_record(key, &payload, chrono::Utc::now().timestamp()) {
            error!(?key, error = %e, "Record write failed");
        }
        Some(payload)
    }

    /// Chanson déjà téléchargée
    ///
    /// L'enregistrement n'est renvoyé que si le fichier existe encore ;
    /// sinon il est supprimé.
    pub fn read_song(&self, rid: &str) -> Result<Option<SongInfo>> {
        let song = {
            let conn = self.conn();
            conn.query_row(
                "SELECT id, name, artist, album, rid, artistid, albumid, filepath
                 FROM song WHERE rid = ?1 ORDER BY id ASC LIMIT 1",
                params![rid],
                SongInfo::from_row,
            )
            .optional()?
        };

        match song {
            Some(song) if song.filepath.exists() => Ok(Some(song)),
            Some(song) => {
                debug!(rid, path = %song.filepath.display(), "Dropping stale song record");
                if let Some(id) = song.id {
                    self.delete_song(id)?;
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Enregistre une chanson et renvoie son identifiant
    pub fn write_song(&self, song: &SongInfo) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO song (name, artist, album, rid, artistid, albumid, filepath)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                song.name,
                song.artist,
                song.album,
                song.rid,
                song.artistid,
                song.albumid,
                song.filepath.to_string_lossy().into_owned(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete_song(&self, id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM song WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }
}
