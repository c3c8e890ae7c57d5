//! Exemple : rechercher une chanson puis la télécharger
//!
//! Le fil principal joue le rôle du fil de contrôle de l'application : il
//! dépile les rappels des tâches de fond et les événements de
//! téléchargement.
//!
//! Usage:
//!   cargo run --example play_song -- "Faye Wong"

use pmoconfig::get_config;
use pmokuwo::{DownloadEvent, KuwoConfigExt, KuwoEngine, SongInfo};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn song_from_search(item: &Value) -> Option<SongInfo> {
    let field = |name: &str| item.get(name).and_then(Value::as_str).unwrap_or_default().to_string();
    let rid = field("MUSICRID").trim_start_matches("MUSIC_").to_string();
    if rid.is_empty() {
        return None;
    }
    Some(SongInfo {
        name: field("SONGNAME"),
        artist: field("ARTIST"),
        album: field("ALBUM"),
        rid,
        artistid: field("ARTISTID"),
        albumid: field("ALBUMID"),
        ..Default::default()
    })
}

fn main() -> anyhow::Result<()> {
    let config = get_config();

    // Initialiser le logging (RUST_LOG prioritaire sur la configuration)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().unwrap_or_else(|_| "info".into())));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let keyword = std::env::args().nth(1).unwrap_or_else(|| "Faye Wong".to_string());

    let rt = tokio::runtime::Runtime::new()?;
    let (engine, control) = KuwoEngine::open(config.engine_config()?, rt.handle().clone())?;
    let events = engine.songs().subscribe();

    println!("=== PMOKuwo - Recherche de '{}' ===\n", keyword);

    let found: Arc<Mutex<Option<Option<SongInfo>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&found);
    let catalog = engine.catalog().clone();
    engine.spawn(
        async move { Ok(catalog.search_songs(&keyword, 0).await) },
        move |result| {
            let first = result
                .ok()
                .flatten()
                .and_then(|res| res.get("abslist").and_then(|l| l.get(0)).and_then(song_from_search));
            if let Ok(mut slot) = sink.lock() {
                *slot = Some(first);
            }
        },
    );

    while found.lock().map(|f| f.is_none()).unwrap_or(false) {
        control.dispatch_timeout(Duration::from_millis(100));
    }

    let Some(song) = found.lock().ok().and_then(|mut f| f.take()).flatten() else {
        println!("Aucun résultat");
        engine.close()?;
        return Ok(());
    };
    println!("✓ {} - {} (rid {})", song.artist, song.name, song.rid);

    let songs = engine.songs().clone();
    engine.spawn(async move { Ok(songs.play_song(song).await) }, |_| {});

    loop {
        control.dispatch_pending();
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(DownloadEvent::CanPlay(song)) => {
                println!("▶ Lecture possible : {}", song.filepath.display());
            }
            Ok(DownloadEvent::Downloaded(song)) => {
                println!("✓ Téléchargé : {}", song.filepath.display());
                break;
            }
            Ok(DownloadEvent::Failed(song, reason)) => {
                println!("✗ Échec pour {} : {}", song.rid, reason);
                break;
            }
            Err(_) => {}
        }
    }

    engine.close()?;
    Ok(())
}
