use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use log::{debug, warn};
use lru::LruCache;

use crate::types::error::PosterError;

/// Posters larger than this are downscaled before caching.
const MAX_POSTER_SIZE: (u32, u32) = (960, 540);

#[derive(Debug, Clone, PartialEq)]
pub struct Poster {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone)]
enum Slot {
    Loading,
    Ready(Arc<Poster>),
    Failed,
}

pub fn decode_poster(bytes: &[u8]) -> Result<Poster, PosterError> {
    let image = image::load_from_memory(bytes)?;
    let (max_w, max_h) = MAX_POSTER_SIZE;
    let image = if image.width() > max_w || image.height() > max_h {
        image.thumbnail(max_w, max_h)
    } else {
        image
    };
    let rgba = image.to_rgba8();
    Ok(Poster {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

/// Fetches over http(s), otherwise reads a local file.
pub fn load_poster(source: &str) -> Result<Poster, PosterError> {
    let bytes = if source.starts_with("http://") || source.starts_with("https://") {
        reqwest::blocking::get(source)?
            .error_for_status()?
            .bytes()?
            .to_vec()
    } else {
        std::fs::read(source)?
    };
    decode_poster(&bytes)
}

/// Poster images keyed by URL, loaded on background threads.
pub struct PosterCache {
    cache: LruCache<String, Slot>,
    tx: Sender<(String, Result<Poster, PosterError>)>,
    rx: Receiver<(String, Result<Poster, PosterError>)>,
}

impl PosterCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        let (tx, rx) = mpsc::channel();
        Self {
            cache: LruCache::new(capacity),
            tx,
            rx,
        }
    }

    /// Applies finished loads. Returns how many arrived.
    pub fn poll(&mut self) -> usize {
        let mut arrived = 0;
        while let Ok((url, result)) = self.rx.try_recv() {
            arrived += 1;
            let slot = match result {
                Ok(poster) => {
                    debug!("Poster ready: {} ({}x{})", url, poster.width, poster.height);
                    Slot::Ready(Arc::new(poster))
                }
                Err(e) => {
                    warn!("Poster {} failed: {}", url, e);
                    Slot::Failed
                }
            };
            // Evicted while loading: keep the result anyway.
            self.cache.put(url, slot);
        }
        arrived
    }

    /// The poster if loaded; starts a load on first request.
    pub fn get(&mut self, url: &str) -> Option<Arc<Poster>> {
        self.poll();
        match self.cache.get(url) {
            Some(Slot::Ready(poster)) => return Some(poster.clone()),
            Some(Slot::Loading) | Some(Slot::Failed) => return None,
            None => {}
        }
        self.cache.put(url.to_string(), Slot::Loading);
        let tx = self.tx.clone();
        let source = url.to_string();
        std::thread::spawn(move || {
            let result = load_poster(&source);
            let _ = tx.send((source, result));
        });
        None
    }

    pub fn is_failed(&self, url: &str) -> bool {
        matches!(self.cache.peek(url), Some(Slot::Failed))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cache.len()
    }
}
