//! # pmokuwo - Moteur de téléchargement et de cache pour Kuwo
//!
//! Cette crate fournit la couche de cache d'un client du service musical
//! Kuwo : récupération réseau avec nouvelles tentatives, caches persistants,
//! téléchargement progressif des médias et exécution des requêtes en
//! arrière-plan avec retour sur le fil de contrôle de l'application.
//!
//! ## Architecture
//!
//! ```text
//! ContentSource (source.rs)     - requêtes HTTP, 3 tentatives de 30 s
//!     ├── KeyValueCache (kv.rs)        - URL → octets, SQLite
//!     ├── RecordStore (records.rs)     - réponses JSON par dimension, chansons
//!     ├── Catalog (catalog.rs)         - lectures avec repli réseau
//!     ├── FileCache (files.rs)         - images, pochettes, paroles
//!     └── StreamingDownloader (download.rs)
//!             ├── SongFetcher (song.rs)   - chansons
//!             └── MvFetcher (song.rs)     - clips
//! TaskRunner / ControlLoop (runner.rs)  - tâches de fond, rappels sur le fil de contrôle
//! KuwoEngine (engine.rs)                - assemblage
//! ```
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use pmoconfig::get_config;
//! use pmokuwo::{KuwoConfigExt, KuwoEngine};
//! use std::time::Duration;
//!
//! let rt = tokio::runtime::Runtime::new()?;
//! let config = get_config().engine_config()?;
//! let (engine, control) = KuwoEngine::open(config, rt.handle().clone())?;
//!
//! let catalog = engine.catalog().clone();
//! engine.spawn(
//!     async move { Ok(catalog.toplist_songs(16).await) },
//!     |songs| println!("{} chansons", songs.ok().flatten().map_or(0, |s| s.len())),
//! );
//!
//! // Boucle du fil de contrôle
//! control.dispatch_timeout(Duration::from_secs(60));
//! engine.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod catalog;
pub mod config_ext;
pub mod download;
pub mod endpoints;
pub mod engine;
pub mod error;
pub mod events;
pub mod files;
pub mod keys;
pub mod kv;
pub mod memo;
pub mod quasi_json;
pub mod records;
pub mod runner;
pub mod song;
pub mod source;

pub use catalog::{ArtistSongsPager, Catalog};
pub use config_ext::KuwoConfigExt;
pub use download::{Download, DownloadProfile, PlayableThreshold, StreamingDownloader};
pub use endpoints::Endpoints;
pub use engine::{EngineConfig, KuwoEngine};
pub use error::{KuwoError, Result};
pub use events::{DownloadEvent, EventBus};
pub use files::FileCache;
pub use keys::{canonical_url, CacheKey};
pub use kv::KeyValueCache;
pub use memo::RequestMemo;
pub use records::{ArtistRef, DimensionKey, RecordStore, SongInfo};
pub use runner::{task_runner, ControlLoop, TaskRunner};
pub use song::{resolve_song_link, MvFetcher, SongFetcher};
pub use source::{ContentSource, HttpTransport, MediaStream, RetryPolicy, Transport};
