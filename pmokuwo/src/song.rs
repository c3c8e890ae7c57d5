//! Lecture des chansons et des clips
//!
//! Le lien réel d'un fichier est obtenu auprès du service « anti » de Kuwo,
//! puis le fichier est téléchargé dans le répertoire des chansons (ou des
//! clips) sous le nom de base du lien.

use crate::download::{Download, DownloadProfile, StreamingDownloader};
use crate::endpoints::Endpoints;
use crate::events::DownloadEvent;
use crate::files::url_basename;
use crate::kv::KeyValueCache;
use crate::records::{RecordStore, SongInfo};
use crate::source::ContentSource;
use crossbeam_channel::Receiver;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Un corps plus court est une absence de lien
const MIN_LINK_LEN: usize = 20;

/// Résout le lien de téléchargement d'une chanson ou d'un clip
///
/// # Arguments
///
/// * `rid` - Identifiant de la chanson
/// * `high_res` - Demande `ape|mp3` (ou `mkv|mp4` pour un clip)
/// * `use_mv` - Lien du clip plutôt que de l'audio
///
/// Les segments 3 et 4 du chemin renvoyé sont retirés.
pub async fn resolve_song_link(
    source: &ContentSource,
    kv: &KeyValueCache,
    endpoints: &Endpoints,
    rid: &str,
    high_res: bool,
    use_mv: bool,
) -> Option<String> {
    let url = endpoints.song_link(rid, high_res, use_mv);
    let body = kv.urlopen(source, &url, true).await?;
    let link = String::from_utf8_lossy(&body).trim().to_string();

    if link.len() < MIN_LINK_LEN {
        warn!(rid, body = %link, "No download link");
        return None;
    }

    let link = link
        .split('/')
        .enumerate()
        .filter(|(i, _)| !(3..5).contains(i))
        .map(|(_, part)| part)
        .collect::<Vec<_>>()
        .join("/");
    debug!(rid, link = %link, "Resolved download link");
    Some(link)
}

/// Téléchargement et lecture des chansons
#[derive(Clone)]
pub struct SongFetcher {
    source: ContentSource,
    kv: Arc<KeyValueCache>,
    records: Arc<RecordStore>,
    endpoints: Endpoints,
    downloader: StreamingDownloader<SongInfo>,
    song_dir: PathBuf,
    use_ape: bool,
}

impl SongFetcher {
    pub fn new(
        source: ContentSource,
        kv: Arc<KeyValueCache>,
        records: Arc<RecordStore>,
        endpoints: Endpoints,
        song_dir: impl Into<PathBuf>,
        use_ape: bool,
        handle: Handle,
    ) -> Self {
        Self {
            downloader: StreamingDownloader::new(source.clone(), handle),
            source,
            kv,
            records,
            endpoints,
            song_dir: song_dir.into(),
            use_ape,
        }
    }

    pub fn subscribe(&self) -> Receiver<DownloadEvent<SongInfo>> {
        self.downloader.subscribe()
    }

    /// Prépare la lecture d'une chanson
    ///
    /// Un fichier local (ou un enregistrement `song` valide) est signalé
    /// immédiatement. Sinon le lien est résolu puis le téléchargement lancé ;
    /// l'enregistrement est écrit une fois le fichier complet. Si le lien ne
    /// peut être résolu, `Failed` est émis et `None` retourné.
    pub async fn play_song(&self, mut song: SongInfo) -> Option<Arc<Download>> {
        if !song.filepath.as_os_str().is_empty() && song.filepath.exists() {
            let path = song.filepath.clone();
            return Some(self.downloader.complete_local(song, path));
        }

        match self.records.read_song(&song.rid) {
            Ok(Some(known)) => {
                debug!(rid = %known.rid, "Song record hit");
                let path = known.filepath.clone();
                return Some(self.downloader.complete_local(known, path));
            }
            Ok(None) => {}
            Err(e) => error!(rid = %song.rid, error = %e, "Song record read failed"),
        }

        let link = resolve_song_link(
            &self.source,
            &self.kv,
            &self.endpoints,
            &song.rid,
            self.use_ape,
            false,
        )
        .await;
        let target = link.and_then(|link| {
            let name = url_basename(&link)?.to_string();
            Some((link, name))
        });
        let Some((link, name)) = target else {
            let reason = format!("no download link for song {}", song.rid);
            self.downloader
                .events()
                .broadcast(DownloadEvent::Failed(song, reason));
            return None;
        };

        song.filepath = self.song_dir.join(name);
        let download = self
            .downloader
            .download(song.clone(), &link, &song.filepath, DownloadProfile::SONG);

        let records = Arc::clone(&self.records);
        let watched = Arc::clone(&download);
        self.downloader.handle().spawn(async move {
            if watched.wait_until_finished().await.is_err() {
                return;
            }
            match records.write_song(&song) {
                Ok(id) => info!(rid = %song.rid, id, "Song recorded"),
                Err(e) => error!(rid = %song.rid, error = %e, "Song record write failed"),
            }
        });

        Some(download)
    }
}

/// Téléchargement des clips vidéo
#[derive(Clone)]
pub struct MvFetcher {
    downloader: StreamingDownloader<PathBuf>,
    mv_dir: PathBuf,
}

impl MvFetcher {
    pub fn new(source: ContentSource, mv_dir: impl Into<PathBuf>, handle: Handle) -> Self {
        Self {
            downloader: StreamingDownloader::new(source, handle),
            mv_dir: mv_dir.into(),
        }
    }

    pub fn subscribe(&self) -> Receiver<DownloadEvent<PathBuf>> {
        self.downloader.subscribe()
    }

    /// Télécharge un clip dans `<mv_dir>/<nom du lien>`
    ///
    /// Les événements portent le chemin local du clip.
    pub fn get_mv(&self, link: &str) -> Option<Arc<Download>> {
        let Some(name) = url_basename(link) else {
            warn!(link, "No file name in video link");
            return None;
        };
        let path = self.mv_dir.join(name);
        Some(
            self.downloader
                .download(path.clone(), link, &path, DownloadProfile::VIDEO),
        )
    }
}
