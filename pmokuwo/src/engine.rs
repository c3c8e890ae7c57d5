//! Assemblage du moteur : stores partagés, source réseau, caches et lanceur
//!
//! Le moteur est construit explicitement et passé par référence ; il n'y a
//! pas d'état global. Les deux bases sont ouvertes une seule fois à
//! l'ouverture et fermées par [`KuwoEngine::close`].

use crate::catalog::Catalog;
use crate::endpoints::Endpoints;
use crate::error::Result;
use crate::files::FileCache;
use crate::kv::KeyValueCache;
use crate::memo::{RequestMemo, DEFAULT_CAPACITY};
use crate::records::RecordStore;
use crate::runner::{task_runner, ControlLoop, TaskRunner, DEFAULT_WORKERS};
use crate::song::{MvFetcher, SongFetcher};
use crate::source::{ContentSource, HttpTransport, RetryPolicy, Transport};
use bytes::Bytes;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Paramètres du moteur
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_db: PathBuf,
    pub records_db: PathBuf,
    pub image_dir: PathBuf,
    pub large_image_dir: PathBuf,
    pub lrc_dir: PathBuf,
    pub song_dir: PathBuf,
    pub mv_dir: PathBuf,
    pub use_ape: bool,
    pub retry: RetryPolicy,
    pub workers: usize,
    pub memo_capacity: u64,
    pub endpoints: Endpoints,
}

impl EngineConfig {
    /// Disposition par défaut sous un répertoire racine
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            cache_db: root.join("cache.db"),
            records_db: root.join("records.db"),
            image_dir: root.join("cache/images"),
            large_image_dir: root.join("cache/images_large"),
            lrc_dir: root.join("cache/lyrics"),
            song_dir: root.join("songs"),
            mv_dir: root.join("videos"),
            use_ape: false,
            retry: RetryPolicy::default(),
            workers: DEFAULT_WORKERS,
            memo_capacity: DEFAULT_CAPACITY,
            endpoints: Endpoints::default(),
        }
    }

    fn create_dirs(&self) -> Result<()> {
        let parents = [&self.cache_db, &self.records_db]
            .into_iter()
            .filter_map(|db| db.parent());
        let dirs = [
            &self.image_dir,
            &self.large_image_dir,
            &self.lrc_dir,
            &self.song_dir,
            &self.mv_dir,
        ];
        for dir in parents.chain(dirs.iter().map(|d| d.as_path())) {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

/// Moteur de téléchargement et de cache Kuwo
pub struct KuwoEngine {
    kv: Arc<KeyValueCache>,
    records: Arc<RecordStore>,
    source: ContentSource,
    files: FileCache,
    catalog: Catalog,
    songs: SongFetcher,
    mvs: MvFetcher,
    runner: TaskRunner,
}

impl KuwoEngine {
    /// Ouvre le moteur avec le transport HTTP
    ///
    /// # Returns
    ///
    /// Le moteur et la boucle de contrôle sur laquelle les rappels des
    /// tâches de fond seront exécutés.
    pub fn open(config: EngineConfig, handle: Handle) -> Result<(Self, ControlLoop)> {
        Self::open_with_transport(config, Arc::new(HttpTransport::new()?), handle)
    }

    pub fn open_with_transport(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        handle: Handle,
    ) -> Result<(Self, ControlLoop)> {
        config.create_dirs()?;

        let kv = Arc::new(KeyValueCache::open(&config.cache_db)?);
        let records = Arc::new(RecordStore::open(&config.records_db)?);
        let source = ContentSource::new(transport, config.retry);
        let memo = RequestMemo::with_capacity(config.memo_capacity);

        let files = FileCache::new(
            source.clone(),
            &config.image_dir,
            &config.large_image_dir,
            &config.lrc_dir,
        );
        let catalog = Catalog::new(
            source.clone(),
            Arc::clone(&records),
            memo,
            config.endpoints.clone(),
            files.clone(),
        );
        let songs = SongFetcher::new(
            source.clone(),
            Arc::clone(&kv),
            Arc::clone(&records),
            config.endpoints.clone(),
            &config.song_dir,
            config.use_ape,
            handle.clone(),
        );
        let mvs = MvFetcher::new(source.clone(), &config.mv_dir, handle.clone());
        let (runner, control) = task_runner(handle, config.workers);

        info!(workers = config.workers, "Kuwo engine opened");
        Ok((
            Self {
                kv,
                records,
                source,
                files,
                catalog,
                songs,
                mvs,
                runner,
            },
            control,
        ))
    }

    pub fn kv(&self) -> &Arc<KeyValueCache> {
        &self.kv
    }

    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    pub fn source(&self) -> &ContentSource {
        &self.source
    }

    pub fn files(&self) -> &FileCache {
        &self.files
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn songs(&self) -> &SongFetcher {
        &self.songs
    }

    pub fn mvs(&self) -> &MvFetcher {
        &self.mvs
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Récupère une URL via le cache clé/valeur
    pub async fn urlopen(&self, url: &str, use_cache: bool) -> Option<Bytes> {
        self.kv.urlopen(&self.source, url, use_cache).await
    }

    /// Raccourci vers [`TaskRunner::run`]
    pub fn spawn<T, F, C>(&self, work: F, on_complete: C)
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        self.runner.run(work, on_complete);
    }

    /// Ferme les bases
    ///
    /// Une base encore utilisée par une tâche en cours sera fermée par
    /// cette tâche lorsqu'elle se termine.
    pub fn close(self) -> Result<()> {
        let Self {
            kv,
            records,
            source,
            files,
            catalog,
            songs,
            mvs,
            runner,
        } = self;
        drop((source, files, catalog, songs, mvs, runner));

        match Arc::try_unwrap(kv) {
            Ok(kv) => kv.close()?,
            Err(_) => warn!("Key/value cache still in use, closing deferred"),
        }
        match Arc::try_unwrap(records) {
            Ok(records) => records.close()?,
            Err(_) => warn!("Record store still in use, closing deferred"),
        }

        info!("Kuwo engine closed");
        Ok(())
    }
}
