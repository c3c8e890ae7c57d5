mod common;

use common::{media, FakeTransport, MIB};
use pmokuwo::{DownloadEvent, EngineConfig, Endpoints, KuwoEngine, SongInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};

const RAW_LINK: &str = "http://other.web.nf01.sycdn.kuwo.cn/6b5d6d2a/5f1d2c3b/resource/n2/42.mp3";

fn song(rid: &str) -> SongInfo {
    SongInfo {
        name: "Red Bean".into(),
        artist: "Faye Wong".into(),
        album: "Sing and Play".into(),
        rid: rid.into(),
        ..Default::default()
    }
}

fn link_url(rid: &str) -> String {
    Endpoints::default().song_link(rid, false, false)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_play_song_downloads_then_records() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(
        FakeTransport::new()
            .with_body(&link_url("42"), RAW_LINK)
            .with_media(media(3 * MIB)),
    );
    let (engine, _control) =
        KuwoEngine::open_with_transport(EngineConfig::in_dir(dir.path()), transport.clone(), Handle::current())
            .unwrap();
    let events = engine.songs().subscribe();

    let download = engine.songs().play_song(song("42")).await.unwrap();
    download.wait_until_finished().await.unwrap();

    let expected = dir.path().join("songs/42.mp3");
    assert_eq!(download.path(), expected);

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.len(), 2);
    assert!(matches!(&received[0], DownloadEvent::CanPlay(s) if s.rid == "42"));
    assert!(matches!(&received[1], DownloadEvent::Downloaded(s) if s.filepath == expected));

    // Enregistrement écrit après la fin du téléchargement
    let mut record = None;
    for _ in 0..100 {
        record = engine.records().read_song("42").unwrap();
        if record.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(record.unwrap().filepath, expected);

    // Second appel : signalé immédiatement, sans réseau
    let opens = transport.opens();
    engine.songs().play_song(song("42")).await.unwrap();
    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.len(), 2);
    assert!(matches!(&received[0], DownloadEvent::CanPlay(_)));
    assert!(matches!(&received[1], DownloadEvent::Downloaded(_)));
    assert_eq!(transport.opens(), opens);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_short_link_body_fails() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(FakeTransport::new().with_body(&link_url("7"), "IPDeny"));
    let (engine, _control) =
        KuwoEngine::open_with_transport(EngineConfig::in_dir(dir.path()), transport.clone(), Handle::current())
            .unwrap();
    let events = engine.songs().subscribe();

    assert!(engine.songs().play_song(song("7")).await.is_none());
    let received: Vec<_> = events.try_iter().collect();
    assert!(matches!(received.as_slice(), [DownloadEvent::Failed(s, _)] if s.rid == "7"));
    assert_eq!(transport.opens(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mv_uses_local_path_as_resource() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(FakeTransport::new().with_media(media(MIB)));
    let (engine, _control) =
        KuwoEngine::open_with_transport(EngineConfig::in_dir(dir.path()), transport, Handle::current())
            .unwrap();
    let events = engine.mvs().subscribe();

    let download = engine.mvs().get_mv("http://mv.kuwo.cn/a/b/clip.mp4").unwrap();
    download.wait_until_finished().await.unwrap();

    let path = dir.path().join("videos/clip.mp4");
    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![DownloadEvent::CanPlay(path.clone()), DownloadEvent::Downloaded(path)]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_spawn_delivers_on_control_loop() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(FakeTransport::new().with_body("http://x/a", "body"));
    let (engine, control) =
        KuwoEngine::open_with_transport(EngineConfig::in_dir(dir.path()), transport, Handle::current())
            .unwrap();

    let kv = Arc::clone(engine.kv());
    let source = engine.source().clone();
    let (tx, rx) = crossbeam_channel::unbounded();
    engine.spawn(
        async move { Ok(kv.urlopen(&source, "http://x/a", true).await) },
        move |result| tx.send(result.unwrap()).unwrap(),
    );

    let control = tokio::task::spawn_blocking(move || {
        control.dispatch_timeout(Duration::from_secs(5));
        control
    })
    .await
    .unwrap();
    drop(control);

    assert_eq!(rx.try_recv().unwrap().as_deref(), Some(&b"body"[..]));
    engine.close().unwrap();
}

#[test]
fn test_mv_requested_from_control_thread() {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(FakeTransport::new().with_media(media(MIB)));
    let (engine, _control) =
        KuwoEngine::open_with_transport(EngineConfig::in_dir(dir.path()), transport, rt.handle().clone())
            .unwrap();
    let events = engine.mvs().subscribe();

    // Le fil du test joue le rôle du fil de contrôle : aucun runtime actif ici
    let download = engine.mvs().get_mv("http://mv.kuwo.cn/a/b/clip.mp4").unwrap();

    let path = dir.path().join("videos/clip.mp4");
    assert_eq!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        DownloadEvent::CanPlay(path.clone())
    );
    assert_eq!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        DownloadEvent::Downloaded(path.clone())
    );
    rt.block_on(download.wait_until_finished()).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), MIB as u64);
    engine.close().unwrap();
}
