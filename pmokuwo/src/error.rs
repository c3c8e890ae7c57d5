//! Gestion des erreurs pour le moteur de cache Kuwo

use thiserror::Error;

/// Type Result personnalisé pour pmokuwo
pub type Result<T> = std::result::Result<T, KuwoError>;

/// Erreurs possibles dans le moteur de téléchargement et de cache
#[derive(Error, Debug)]
pub enum KuwoError {
    /// Erreur HTTP (connexion, lecture du corps, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Réponse HTTP avec un statut d'échec
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    /// Délai dépassé pour une tentative
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Erreur de parsing JSON
    #[error("JSON parsing error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Erreur d'entrée/sortie sur le disque local
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur de la base SQLite
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Erreur de configuration (anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Lien de téléchargement inexploitable
    #[error("Invalid download link: {0}")]
    InvalidLink(String),

    /// Échec définitif d'un téléchargement
    #[error("Download failed: {0}")]
    Download(String),

    /// Tâche de fond interrompue (panic ou annulation du runtime)
    #[error("Task failed: {0}")]
    Task(String),
}

impl KuwoError {
    /// Vérifie si l'erreur relève du réseau (et peut donc être retentée)
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            KuwoError::Http(_) | KuwoError::Status { .. } | KuwoError::Timeout(_)
        )
    }

    /// Vérifie si l'erreur est une erreur de parsing
    pub fn is_parse(&self) -> bool {
        matches!(self, KuwoError::Parse(_))
    }
}
