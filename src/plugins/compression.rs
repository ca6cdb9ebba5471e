//! Gzip response compression.
//!
//! JSON and text responses larger than the threshold are gzip-compressed
//! when the compressed form saves at least 10%. The compression level is
//! tiered by payload size so small bodies pay almost nothing and large ones
//! compress hard. Compressed payloads are memoized in a bounded cache keyed
//! by status and content hash, so identical responses skip the encoder.

use std::{
    hash::{Hash, Hasher},
    io::Write,
};

use anyhow::Result;
use bytes::Bytes;
use flate2::{Compression as GzLevel, write::GzEncoder};
use http::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderValue};
use http_body_util::BodyExt;
use tracing::debug;

use crate::{
    body::ArborBody,
    cache::{CacheBuilder, CacheStats, LruCache},
    errors::ApiError,
    middleware::Next,
    plugins::ArborPlugin,
    responder::Responder,
    router::Router,
    types::{Request, Response},
};

/// Compression configuration.
#[derive(Clone)]
pub struct Config {
    /// Minimum body size in bytes before compression is considered.
    pub threshold: usize,
    /// Compressed output must be below `ratio * original` to be kept.
    pub min_ratio: f64,
    /// Capacity of the memoized-payload cache.
    pub memo_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 2048,
            min_ratio: 0.9,
            memo_capacity: 1000,
        }
    }
}

/// Builder for [`CompressionPlugin`].
pub struct CompressionBuilder(Config);

impl CompressionBuilder {
    pub fn new() -> Self {
        Self(Config::default())
    }

    /// Minimum body size before compression applies.
    pub fn threshold(mut self, bytes: usize) -> Self {
        self.0.threshold = bytes;
        self
    }

    /// Required compression ratio; 0.9 keeps outputs saving at least 10%.
    pub fn min_ratio(mut self, ratio: f64) -> Self {
        self.0.min_ratio = ratio;
        self
    }

    /// Capacity of the memoized-payload cache.
    pub fn memo_capacity(mut self, capacity: usize) -> Self {
        self.0.memo_capacity = capacity;
        self
    }

    pub fn build(self) -> CompressionPlugin {
        let memo = CacheBuilder::new()
            .capacity(self.0.memo_capacity)
            .ttl(std::time::Duration::from_secs(300))
            .weigher(|b: &Bytes| b.len())
            .build();
        CompressionPlugin { cfg: self.0, memo }
    }
}

impl Default for CompressionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks the gzip level for a payload of `size` bytes.
pub(crate) fn compression_level(size: usize) -> u32 {
    match size {
        0..=1024 => 1,
        1025..=10_240 => 4,
        10_241..=102_400 => 6,
        _ => 9,
    }
}

fn gzip(data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

fn is_compressible(res: &Response) -> bool {
    res.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json") || ct.starts_with("text/"))
        .unwrap_or(false)
}

/// Response compression plugin.
#[derive(Clone)]
pub struct CompressionPlugin {
    cfg: Config,
    memo: LruCache<Bytes>,
}

impl CompressionPlugin {
    /// Counters of the memoized-payload cache.
    pub fn memo_stats(&self) -> CacheStats {
        self.memo.stats()
    }
}

impl ArborPlugin for CompressionPlugin {
    fn name(&self) -> &'static str {
        "compression"
    }

    fn setup(&self, router: &Router) -> Result<()> {
        let cfg = self.cfg.clone();
        let memo = self.memo.clone();

        router.middleware(move |req, next| {
            let cfg = cfg.clone();
            let memo = memo.clone();
            async move { compress(req, next, cfg, memo).await }
        });

        Ok(())
    }
}

async fn compress(
    req: Request,
    next: Next,
    cfg: Config,
    memo: LruCache<Bytes>,
) -> Response {
    let res = next.run(req).await;
    if !is_compressible(&res) || res.headers().contains_key(CONTENT_ENCODING) {
        return res;
    }

    let (mut parts, body) = res.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            // Failing while re-buffering our own response; answer with the
            // internal envelope rather than a broken stream.
            return ApiError::internal_msg(format!("response buffering failed: {err}"))
                .into_response();
        }
    };

    if bytes.len() <= cfg.threshold {
        return Response::from_parts(parts, ArborBody::chunked(bytes));
    }

    let key = memo_key(parts.status.as_u16(), &bytes);
    let compressed = match memo.get(&key) {
        Some(cached) => Some(cached),
        None => {
            let level = compression_level(bytes.len());
            match gzip(&bytes, level) {
                Ok(out) if (out.len() as f64) < bytes.len() as f64 * cfg.min_ratio => {
                    let out = Bytes::from(out);
                    debug!(
                        original = bytes.len(),
                        compressed = out.len(),
                        level,
                        "compressed response payload"
                    );
                    memo.set(key, out.clone(), None);
                    Some(out)
                }
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(error = %err, "gzip encoding failed; sending identity");
                    None
                }
            }
        }
    };

    match compressed {
        Some(compressed) => {
            parts
                .headers
                .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            Response::from_parts(parts, ArborBody::chunked(compressed))
        }
        None => Response::from_parts(parts, ArborBody::chunked(bytes)),
    }
}

fn memo_key(status: u16, bytes: &Bytes) -> String {
    let mut hasher = std::hash::DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{status}:{:016x}", hasher.finish())
}
