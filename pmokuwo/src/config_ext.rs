//! Extension pour intégrer le moteur Kuwo dans pmoconfig
//!
//! Ce module fournit le trait `KuwoConfigExt` qui ajoute à
//! `pmoconfig::Config` l'accès aux réglages du moteur (bases, répertoires,
//! politique réseau) et la construction d'un [`EngineConfig`].

use crate::endpoints::Endpoints;
use crate::engine::EngineConfig;
use crate::memo::DEFAULT_CAPACITY;
use crate::runner::DEFAULT_WORKERS;
use crate::source::{RetryPolicy, DEFAULT_TIMEOUT, MAX_ATTEMPTS};
use anyhow::Result;
use pmoconfig::Config;
use std::path::PathBuf;
use std::time::Duration;

/// Trait d'extension pour la configuration du moteur Kuwo
///
/// # Exemple
///
/// ```rust,no_run
/// use pmoconfig::get_config;
/// use pmokuwo::KuwoConfigExt;
///
/// let config = get_config();
/// let songs = config.get_kuwo_dir("songs", "songs")?;
/// let engine_config = config.engine_config()?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub trait KuwoConfigExt {
    /// Récupère un répertoire du moteur (`kuwo.directories.<name>`)
    ///
    /// # Arguments
    ///
    /// * `name` - Nom du répertoire (ex: "images", "lyrics", "songs")
    /// * `default` - Chemin par défaut, relatif au répertoire de configuration
    fn get_kuwo_dir(&self, name: &str, default: &str) -> Result<PathBuf>;

    /// Récupère le chemin d'une base (`kuwo.databases.<name>`)
    fn get_kuwo_db(&self, name: &str, default: &str) -> Result<PathBuf>;

    /// Préfère les fichiers sans perte (`ape`) quand ils existent
    fn get_use_ape(&self) -> Result<bool>;

    fn set_use_ape(&self, use_ape: bool) -> Result<()>;

    /// Politique réseau (`kuwo.network.max_attempts`, `kuwo.network.timeout_secs`)
    fn get_retry_policy(&self) -> Result<RetryPolicy>;

    /// Nombre de tâches de fond simultanées
    fn get_workers(&self) -> Result<usize>;

    /// Capacité du mémo des recherches
    fn get_memo_capacity(&self) -> Result<u64>;

    /// Assemble la configuration complète du moteur
    fn engine_config(&self) -> Result<EngineConfig>;
}

impl KuwoConfigExt for Config {
    fn get_kuwo_dir(&self, name: &str, default: &str) -> Result<PathBuf> {
        self.get_managed_dir(&["kuwo", "directories", name], default)
    }

    fn get_kuwo_db(&self, name: &str, default: &str) -> Result<PathBuf> {
        self.get_managed_file(&["kuwo", "databases", name], default)
    }

    fn get_use_ape(&self) -> Result<bool> {
        self.get_bool(&["kuwo", "use_ape"], false)
    }

    fn set_use_ape(&self, use_ape: bool) -> Result<()> {
        self.set_bool(&["kuwo", "use_ape"], use_ape)
    }

    fn get_retry_policy(&self) -> Result<RetryPolicy> {
        let attempts = self.get_usize(&["kuwo", "network", "max_attempts"], MAX_ATTEMPTS as usize)?;
        let timeout = self.get_usize(
            &["kuwo", "network", "timeout_secs"],
            DEFAULT_TIMEOUT.as_secs() as usize,
        )?;
        Ok(RetryPolicy {
            max_attempts: attempts.max(1) as u32,
            timeout: Duration::from_secs(timeout.max(1) as u64),
        })
    }

    fn get_workers(&self) -> Result<usize> {
        self.get_usize(&["kuwo", "workers"], DEFAULT_WORKERS)
    }

    fn get_memo_capacity(&self) -> Result<u64> {
        Ok(self.get_usize(&["kuwo", "memo_capacity"], DEFAULT_CAPACITY as usize)? as u64)
    }

    fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            cache_db: self.get_kuwo_db("cache", "cache.db")?,
            records_db: self.get_kuwo_db("records", "records.db")?,
            image_dir: self.get_kuwo_dir("images", "cache/images")?,
            large_image_dir: self.get_kuwo_dir("large_images", "cache/images_large")?,
            lrc_dir: self.get_kuwo_dir("lyrics", "cache/lyrics")?,
            song_dir: self.get_kuwo_dir("songs", "songs")?,
            mv_dir: self.get_kuwo_dir("videos", "videos")?,
            use_ape: self.get_use_ape()?,
            retry: self.get_retry_policy()?,
            workers: self.get_workers()?,
            memo_capacity: self.get_memo_capacity()?,
            endpoints: Endpoints::default(),
        })
    }
}
