//! Événements de téléchargement et bus de diffusion
//!
//! Les événements sont déposés dans un canal par abonné ; le fil de contrôle
//! de l'application les consomme à son rythme.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Événement émis pour une ressource `R` (chanson, chemin de clip, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent<R> {
    /// Assez d'octets sont sur le disque pour commencer la lecture
    CanPlay(R),
    /// Fichier complet et fermé
    Downloaded(R),
    /// Abandon définitif, avec la raison
    Failed(R, String),
}

impl<R> DownloadEvent<R> {
    pub fn resource(&self) -> &R {
        match self {
            DownloadEvent::CanPlay(r) | DownloadEvent::Downloaded(r) | DownloadEvent::Failed(r, _) => r,
        }
    }
}

#[derive(Clone)]
pub struct EventBus<E> {
    subscribers: Arc<Mutex<Vec<Sender<E>>>>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded::<E>();
        {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            subscribers.push(tx);
        }
        rx
    }

    /// Diffuse à tous les abonnés ; les abonnés disparus sont retirés
    pub fn broadcast(&self, event: E) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
