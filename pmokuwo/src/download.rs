//! Téléchargement progressif des médias (chansons, clips)
//!
//! Le fichier de destination est écrit morceau par morceau. Dès que le seuil
//! de lecture du profil est franchi, `CanPlay` est émis (une seule fois par
//! ressource) ; `Downloaded` suit une fois le fichier complet et fermé.
//!
//! Les erreurs réseau (ouverture, lecture, corps tronqué) relancent le flux
//! selon la politique de la [`ContentSource`]. Une erreur d'écriture locale
//! arrête immédiatement le téléchargement. Après un échec définitif, le
//! fichier partiel est supprimé puis `Failed` est émis.
//!
//! Les événements sont diffusés avant la mise à jour de l'état du
//! [`Download`] : quand `wait_until_finished` rend la main, l'événement
//! final est déjà dans les files des abonnés.

use crate::error::{KuwoError, Result};
use crate::events::{DownloadEvent, EventBus};
use crate::source::ContentSource;
use crossbeam_channel::Receiver;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, warn};

/// Taille de lecture par défaut (16 Kio)
pub const CHUNK_SIZE: usize = 1 << 14;

const MIB: u64 = 1 << 20;

/// Seuil à partir duquel un fichier partiel peut être lu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayableThreshold {
    /// Nombre d'octets à dépasser
    pub min_bytes: u64,
    /// Pourcentage de la taille annoncée à dépasser (ignoré si la taille est inconnue)
    pub min_percent: Option<u8>,
}

impl PlayableThreshold {
    /// Vrai dès que l'une des deux conditions est remplie
    pub fn is_reached(&self, received: u64, total: Option<u64>) -> bool {
        if received > self.min_bytes {
            return true;
        }
        match (self.min_percent, total) {
            (Some(percent), Some(total)) if total > 0 => received * 100 / total > u64::from(percent),
            _ => false,
        }
    }
}

/// Paramètres d'un type de ressource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProfile {
    pub threshold: PlayableThreshold,
    pub chunk_size: usize,
}

impl DownloadProfile {
    /// Chansons : 2 Mio ou 40 %
    pub const SONG: Self = Self {
        threshold: PlayableThreshold {
            min_bytes: 2 * MIB,
            min_percent: Some(40),
        },
        chunk_size: CHUNK_SIZE,
    };

    /// Audio simple : 1 Mio
    pub const AUDIO: Self = Self {
        threshold: PlayableThreshold {
            min_bytes: MIB,
            min_percent: None,
        },
        chunk_size: CHUNK_SIZE,
    };

    /// Clips vidéo : 8 Mio ou 20 %
    pub const VIDEO: Self = Self {
        threshold: PlayableThreshold {
            min_bytes: 8 * MIB,
            min_percent: Some(20),
        },
        chunk_size: CHUNK_SIZE,
    };
}

/// Garantit qu'une ressource ne signale `CanPlay` qu'une fois
#[derive(Debug)]
pub struct PlaybackGate {
    threshold: PlayableThreshold,
    fired: bool,
}

impl PlaybackGate {
    pub fn new(threshold: PlayableThreshold) -> Self {
        Self {
            threshold,
            fired: false,
        }
    }

    /// Vrai la première fois que le seuil est franchi
    pub fn observe(&mut self, received: u64, total: Option<u64>) -> bool {
        if self.fired || !self.threshold.is_reached(received, total) {
            return false;
        }
        self.fired = true;
        true
    }

    /// Franchit le seuil sans condition ; vrai s'il ne l'était pas encore
    pub fn force(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

/// État interne du téléchargement
#[derive(Debug, Clone, Default)]
struct DownloadState {
    /// Octets écrits pour la tentative en cours
    received: u64,
    /// Taille annoncée par le serveur (si connue)
    expected_size: Option<u64>,
    /// `CanPlay` a été émis
    can_play: bool,
    /// Fichier complet
    finished: bool,
    /// Raison de l'échec définitif
    error: Option<String>,
}

/// Objet représentant un téléchargement en cours
#[derive(Debug)]
pub struct Download {
    /// Fichier de destination
    path: PathBuf,
    /// État partagé entre la tâche de téléchargement et les observateurs
    state: RwLock<DownloadState>,
}

impl Download {
    fn new(path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            path,
            state: RwLock::new(DownloadState::default()),
        })
    }

    /// Téléchargement déjà terminé (fichier présent sur le disque)
    fn completed(path: PathBuf, size: u64) -> Arc<Self> {
        Arc::new(Self {
            path,
            state: RwLock::new(DownloadState {
                received: size,
                expected_size: Some(size),
                can_play: true,
                finished: true,
                error: None,
            }),
        })
    }

    /// Retourne le chemin du fichier
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn received(&self) -> u64 {
        self.state.read().await.received
    }

    /// Retourne la taille attendue du fichier (si disponible)
    pub async fn expected_size(&self) -> Option<u64> {
        self.state.read().await.expected_size
    }

    pub async fn can_play(&self) -> bool {
        self.state.read().await.can_play
    }

    /// Indique si le téléchargement est terminé
    pub async fn finished(&self) -> bool {
        self.state.read().await.finished
    }

    /// Retourne l'erreur éventuelle
    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    /// Attend que le fichier atteigne au moins la taille spécifiée ou soit complètement téléchargé
    pub async fn wait_until_min_size(&self, min_size: u64) -> Result<()> {
        self.wait_for(|s| s.received >= min_size || s.finished).await
    }

    /// Attend que la lecture puisse commencer
    pub async fn wait_until_playable(&self) -> Result<()> {
        self.wait_for(|s| s.can_play || s.finished).await
    }

    /// Attend que le téléchargement soit complètement terminé
    pub async fn wait_until_finished(&self) -> Result<()> {
        self.wait_for(|s| s.finished).await
    }

    async fn wait_for(&self, done: impl Fn(&DownloadState) -> bool) -> Result<()> {
        loop {
            let state = self.state.read().await;

            if let Some(ref error) = state.error {
                return Err(KuwoError::Download(error.clone()));
            }
            if done(&*state) {
                return Ok(());
            }

            drop(state);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn start_attempt(&self, expected_size: Option<u64>) {
        let mut s = self.state.write().await;
        s.received = 0;
        s.expected_size = expected_size;
    }

    async fn set_received(&self, received: u64) {
        self.state.write().await.received = received;
    }

    async fn mark_playable(&self) {
        self.state.write().await.can_play = true;
    }

    async fn finish(&self) {
        self.state.write().await.finished = true;
    }

    async fn fail(&self, reason: String) {
        self.state.write().await.error = Some(reason);
    }
}

/// Échec d'une tentative
#[derive(Debug)]
enum AttemptError {
    /// Réseau : une nouvelle tentative est possible
    Network(String),
    /// Disque local : abandon immédiat
    Local(KuwoError),
}

impl From<KuwoError> for AttemptError {
    fn from(e: KuwoError) -> Self {
        if e.is_network() {
            AttemptError::Network(e.to_string())
        } else {
            AttemptError::Local(e)
        }
    }
}

/// Téléchargeur de médias vers le disque
///
/// `R` identifie la ressource dans les événements (fiche de chanson,
/// chemin de clip, ...).
#[derive(Clone)]
pub struct StreamingDownloader<R> {
    source: ContentSource,
    events: EventBus<DownloadEvent<R>>,
    handle: Handle,
}

impl<R> StreamingDownloader<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Les copies tournent sur `handle` : `download` peut donc être appelé
    /// depuis un fil extérieur au runtime (fil de contrôle).
    pub fn new(source: ContentSource, handle: Handle) -> Self {
        Self::with_events(source, EventBus::new(), handle)
    }

    pub fn with_events(
        source: ContentSource,
        events: EventBus<DownloadEvent<R>>,
        handle: Handle,
    ) -> Self {
        Self {
            source,
            events,
            handle,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn events(&self) -> &EventBus<DownloadEvent<R>> {
        &self.events
    }

    pub fn subscribe(&self) -> Receiver<DownloadEvent<R>> {
        self.events.subscribe()
    }

    /// Signale un fichier déjà présent : `CanPlay` puis `Downloaded`, sans réseau
    pub fn complete_local(&self, resource: R, path: PathBuf) -> Arc<Download> {
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        self.events.broadcast(DownloadEvent::CanPlay(resource.clone()));
        self.events.broadcast(DownloadEvent::Downloaded(resource));
        Download::completed(path, size)
    }

    /// Lance le téléchargement de `link` vers `dest`
    ///
    /// Si `dest` existe déjà, `CanPlay` puis `Downloaded` sont émis avant le
    /// retour, sans accès réseau. Sinon le téléchargement tourne sur le
    /// runtime du téléchargeur.
    ///
    /// # Returns
    ///
    /// Un `Arc<Download>` qui permet de suivre la progression
    pub fn download(
        &self,
        resource: R,
        link: &str,
        dest: impl AsRef<Path>,
        profile: DownloadProfile,
    ) -> Arc<Download> {
        let dest = dest.as_ref().to_path_buf();

        if dest.exists() {
            debug!(path = %dest.display(), "Local file exists, skipping download");
            return self.complete_local(resource, dest);
        }

        let download = Download::new(dest);
        let task = DownloadTask {
            source: self.source.clone(),
            events: self.events.clone(),
            resource,
            link: link.to_string(),
            download: Arc::clone(&download),
            profile,
        };
        self.handle.spawn(task.run());

        download
    }
}

struct DownloadTask<R> {
    source: ContentSource,
    events: EventBus<DownloadEvent<R>>,
    resource: R,
    link: String,
    download: Arc<Download>,
    profile: DownloadProfile,
}

impl<R: Clone> DownloadTask<R> {
    async fn run(self) {
        let policy = self.source.policy();
        let mut gate = PlaybackGate::new(self.profile.threshold);
        let mut failure = String::from("no attempt made");

        for attempt in 1..=policy.max_attempts {
            match self.attempt(&mut gate, policy.timeout).await {
                Ok(size) => {
                    if gate.force() {
                        self.download.mark_playable().await;
                        self.events.broadcast(DownloadEvent::CanPlay(self.resource.clone()));
                    }
                    info!(link = %self.link, path = %self.download.path().display(), size, "Download finished");
                    self.events.broadcast(DownloadEvent::Downloaded(self.resource.clone()));
                    self.download.finish().await;
                    return;
                }
                Err(AttemptError::Network(reason)) => {
                    warn!(link = %self.link, attempt, error = %reason, "Download attempt failed");
                    failure = reason;
                }
                Err(AttemptError::Local(e)) => {
                    error!(link = %self.link, path = %self.download.path().display(), error = %e, "Cannot write download");
                    failure = e.to_string();
                    break;
                }
            }
        }

        match tokio::fs::remove_file(self.download.path()).await {
            Ok(()) => debug!(path = %self.download.path().display(), "Removed partial file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.download.path().display(), error = %e, "Cannot remove partial file"),
        }

        self.events.broadcast(DownloadEvent::Failed(self.resource.clone(), failure.clone()));
        self.download.fail(failure).await;
    }

    /// Une tentative complète : ouverture, copie, fermeture
    async fn attempt(&self, gate: &mut PlaybackGate, timeout: Duration) -> std::result::Result<u64, AttemptError> {
        let stream = self.source.open_stream(&self.link).await?;
        let total = stream.content_length;
        self.download.start_attempt(total).await;

        let mut file = tokio::fs::File::create(self.download.path())
            .await
            .map_err(|e| AttemptError::Local(e.into()))?;
        let mut reader = StreamReader::new(stream.body);
        let mut buf = vec![0u8; self.profile.chunk_size];
        let mut received = 0u64;

        loop {
            let n = match tokio::time::timeout(timeout, reader.read(&mut buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(AttemptError::Network(format!("stream read failed: {e}"))),
                Err(_) => return Err(AttemptError::Network(format!("no data for {timeout:?}"))),
            };
            if n == 0 {
                break;
            }

            file.write_all(&buf[..n])
                .await
                .map_err(|e| AttemptError::Local(e.into()))?;
            received += n as u64;
            self.download.set_received(received).await;

            if gate.observe(received, total) {
                // Les octets doivent être lisibles par le lecteur avant le signal
                file.flush().await.map_err(|e| AttemptError::Local(e.into()))?;
                debug!(link = %self.link, received, "Playable threshold reached");
                self.download.mark_playable().await;
                self.events.broadcast(DownloadEvent::CanPlay(self.resource.clone()));
            }
        }

        if let Some(total) = total {
            if received < total {
                return Err(AttemptError::Network(format!(
                    "body truncated: {received} of {total} bytes"
                )));
            }
        }

        file.flush().await.map_err(|e| AttemptError::Local(e.into()))?;
        file.sync_all().await.map_err(|e| AttemptError::Local(e.into()))?;
        Ok(received)
    }
}
