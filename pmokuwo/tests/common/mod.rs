//! Transport en mémoire pour les tests d'intégration

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use pmokuwo::{KuwoError, MediaStream, Result, Transport};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const MIB: usize = 1 << 20;

/// Transport scripté : réponses par URL, échecs programmés, média découpé
#[derive(Default)]
pub struct FakeTransport {
    bodies: Mutex<HashMap<String, Bytes>>,
    fail_first_gets: u32,
    media: Bytes,
    media_chunk: usize,
    hide_length: bool,
    broken_streams: u32,
    gets: AtomicU32,
    opens: AtomicU32,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            media_chunk: 16 * 1024,
            ..Default::default()
        }
    }

    pub fn with_body(self, url: &str, body: impl Into<Bytes>) -> Self {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
        self
    }

    /// Les `n` premiers `get` échouent (503)
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first_gets = n;
        self
    }

    pub fn with_media(mut self, media: Vec<u8>) -> Self {
        self.media = Bytes::from(media);
        self
    }

    /// Pas de `Content-Length`
    pub fn without_length(mut self) -> Self {
        self.hide_length = true;
        self
    }

    /// Les `n` premiers flux sont coupés à mi-parcours
    pub fn breaking_streams(mut self, n: u32) -> Self {
        self.broken_streams = n;
        self
    }

    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<Bytes> {
        let n = self.gets.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.fail_first_gets {
            return Err(KuwoError::Status {
                status: 503,
                url: url.to_string(),
            });
        }
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| KuwoError::Status {
                status: 404,
                url: url.to_string(),
            })
    }

    async fn open(&self, _url: &str, _timeout: Duration) -> Result<MediaStream> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        let broken = n <= self.broken_streams;
        let cut = if broken { self.media.len() / 2 } else { self.media.len() };

        let mut chunks: Vec<io::Result<Bytes>> = Vec::new();
        let mut offset = 0;
        while offset < cut {
            let end = (offset + self.media_chunk).min(cut);
            chunks.push(Ok(self.media.slice(offset..end)));
            offset = end;
        }
        if broken {
            chunks.push(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")));
        }

        let length = (!self.hide_length).then_some(self.media.len() as u64);
        Ok(MediaStream::from_chunks(chunks, length))
    }
}

pub fn media(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
