//! Exécution de tâches en arrière-plan avec retour sur le fil de contrôle
//!
//! Le travail tourne sur le runtime tokio, dans la limite d'un nombre fixe
//! de tâches simultanées. Son résultat (ou sa panique) est transmis au
//! fil de contrôle par une file : les rappels ne s'exécutent que lorsque ce
//! fil appelle [`ControlLoop::dispatch_pending`] ou
//! [`ControlLoop::dispatch_timeout`], jamais sur un worker.
//!
//! Les tâches ne sont pas annulables et leurs rappels arrivent dans un ordre
//! quelconque : un rappel doit vérifier que sa cible existe encore.

use crate::error::{KuwoError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Rappel en attente d'exécution sur le fil de contrôle
type Completion = Box<dyn FnOnce() + Send>;

/// Nombre de tâches simultanées par défaut
pub const DEFAULT_WORKERS: usize = 8;

/// Lanceur de tâches
#[derive(Clone)]
pub struct TaskRunner {
    handle: Handle,
    permits: Arc<Semaphore>,
    completions: Sender<Completion>,
}

/// Côté fil de contrôle : exécute les rappels en attente
pub struct ControlLoop {
    completions: Receiver<Completion>,
}

/// Crée un lanceur et la boucle de contrôle associée
///
/// # Arguments
///
/// * `handle` - Runtime tokio sur lequel le travail s'exécute
/// * `workers` - Nombre maximal de tâches simultanées (au moins 1)
pub fn task_runner(handle: Handle, workers: usize) -> (TaskRunner, ControlLoop) {
    let (tx, rx) = unbounded();
    let runner = TaskRunner {
        handle,
        permits: Arc::new(Semaphore::new(workers.max(1))),
        completions: tx,
    };
    (runner, ControlLoop { completions: rx })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

impl TaskRunner {
    /// Exécute `work` en arrière-plan puis planifie `on_complete(résultat)`
    /// sur le fil de contrôle
    ///
    /// Une panique de `work` est capturée et transmise comme
    /// [`KuwoError::Task`].
    pub fn run<T, F, C>(&self, work: F, on_complete: C)
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let completions = self.completions.clone();

        self.handle.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let msg = panic_message(payload);
                        warn!(error = %msg, "Background task panicked");
                        Err(KuwoError::Task(msg))
                    }
                },
                Err(_) => Err(KuwoError::Task("task runner closed".into())),
            };

            if completions.send(Box::new(move || on_complete(result))).is_err() {
                debug!("Control loop gone, dropping task result");
            }
        });
    }

    /// Accès au runtime pour les tâches sans rappel
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl ControlLoop {
    /// Exécute tous les rappels déjà arrivés ; retourne leur nombre
    pub fn dispatch_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(completion) = self.completions.try_recv() {
            completion();
            count += 1;
        }
        count
    }

    /// Attend au plus `timeout` un premier rappel, puis exécute aussi ceux en attente
    ///
    /// Retourne le nombre de rappels exécutés.
    pub fn dispatch_timeout(&self, timeout: Duration) -> usize {
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => {
                completion();
                1 + self.dispatch_pending()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }
}
