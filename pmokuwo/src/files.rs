//! Cache de fichiers locaux (images, pochettes, paroles)
//!
//! Chaque URL correspond à un nom de fichier déterministe :
//! - images : nom de base de l'URL, dans le répertoire des images ;
//! - grandes images : SHA-1 de l'URL suivi de son extension ;
//! - paroles : `<rid>.lrc`.
//!
//! Un fichier présent est un succès immédiat. Sinon le contenu est récupéré,
//! écrit dans un fichier `.part` puis renommé, de sorte qu'un fichier visible
//! est toujours complet. Un échec réseau donne `Ok(None)` ; une erreur
//! d'écriture sur le disque est propagée.

use crate::error::Result;
use crate::keys::{canonical_url, hash_str};
use crate::source::ContentSource;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Conversion du corps brut des paroles en texte
pub type LyricDecoder = Arc<dyn Fn(&[u8]) -> Result<String> + Send + Sync>;

/// Décodeur par défaut : UTF-8 strict
pub fn utf8_decoder() -> LyricDecoder {
    Arc::new(|body: &[u8]| -> Result<String> {
        String::from_utf8(body.to_vec())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
    })
}

/// Nom de base d'une URL, sans requête ni fragment
///
/// `.` et `..` ne désignent pas un fichier et sont refusés.
pub fn url_basename(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let raw = path.rsplit('/').next().unwrap_or(path);
    let is_host = path[..path.len() - raw.len()].ends_with("//");
    let name = raw.trim();
    if name.is_empty() || name == "." || name == ".." || is_host {
        None
    } else {
        Some(name)
    }
}

#[derive(Clone)]
pub struct FileCache {
    source: ContentSource,
    image_dir: PathBuf,
    large_image_dir: PathBuf,
    lrc_dir: PathBuf,
    decoder: LyricDecoder,
}

impl FileCache {
    pub fn new(
        source: ContentSource,
        image_dir: impl Into<PathBuf>,
        large_image_dir: impl Into<PathBuf>,
        lrc_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            image_dir: image_dir.into(),
            large_image_dir: large_image_dir.into(),
            lrc_dir: lrc_dir.into(),
            decoder: utf8_decoder(),
        }
    }

    /// Remplace le décodeur des paroles
    pub fn with_lyric_decoder(mut self, decoder: LyricDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Chemin local d'une image, récupérée si nécessaire
    pub async fn get_local_path(&self, url: &str) -> Result<Option<PathBuf>> {
        let Some(name) = url_basename(url) else {
            warn!(url, "No file name in image URL");
            return Ok(None);
        };
        let path = self.image_dir.join(name);
        self.fetch_to(url, path).await
    }

    pub async fn get_image(&self, url: &str) -> Result<Option<PathBuf>> {
        self.get_local_path(url).await
    }

    /// Grande image (pochette d'artiste), nommée par le SHA-1 de son URL
    pub async fn get_large_image(&self, url: &str) -> Result<Option<PathBuf>> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(None);
        }

        let mut name = hash_str(url);
        if let Some(ext) = url_basename(url)
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
        {
            name.push('.');
            name.push_str(ext);
        }
        self.fetch_to(url, self.large_image_dir.join(name)).await
    }

    /// Paroles d'une chanson, lues depuis `<rid>.lrc` ou récupérées à `url`
    pub async fn get_lrc(&self, rid: &str, url: &str) -> Result<Option<String>> {
        let path = self.lrc_dir.join(format!("{rid}.lrc"));
        if tokio::fs::try_exists(&path).await? {
            debug!(rid, "Lyrics cache hit");
            return Ok(Some(tokio::fs::read_to_string(&path).await?));
        }

        let Some(body) = self.source.fetch(&canonical_url(url)).await else {
            return Ok(None);
        };
        let lrc = match (self.decoder)(&body) {
            Ok(lrc) => lrc,
            Err(e) => {
                warn!(rid, url, error = %e, "Cannot decode lyrics");
                return Ok(None);
            }
        };

        write_atomic(&path, lrc.as_bytes()).await?;
        Ok(Some(lrc))
    }

    async fn fetch_to(&self, url: &str, path: PathBuf) -> Result<Option<PathBuf>> {
        if tokio::fs::try_exists(&path).await? {
            debug!(url, path = %path.display(), "File cache hit");
            return Ok(Some(path));
        }

        let Some(body) = self.source.fetch(&canonical_url(url)).await else {
            return Ok(None);
        };
        write_atomic(&path, &body).await?;
        debug!(url, path = %path.display(), size = body.len(), "File cached");
        Ok(Some(path))
    }
}

/// Écrit dans `<path>.part` puis renomme
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&part, data).await?;
    tokio::fs::rename(&part, path).await?;
    Ok(())
}
