//! Upload payload generation and caching

use crate::error::{ProbeError, ProbeResult};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

const PATTERN_LEN: usize = 1024;
const BYTES_PER_MB: usize = 1024 * 1024;

/// The 1 KiB repeating block: `p[i] = (i * 137 + 19) mod 256`
fn pattern_block() -> [u8; PATTERN_LEN] {
    let mut block = [0u8; PATTERN_LEN];
    for (i, byte) in block.iter_mut().enumerate() {
        *byte = ((i * 137 + 19) % 256) as u8;
    }
    block
}

/// Build a payload of `size_mb` MiB by repeating the pattern block
pub fn generate_payload(size_mb: u32) -> Bytes {
    let total = size_mb as usize * BYTES_PER_MB;
    let block = pattern_block();
    let mut buffer = Vec::with_capacity(total);
    while buffer.len() < total {
        let remaining = total - buffer.len();
        buffer.extend_from_slice(&block[..remaining.min(PATTERN_LEN)]);
    }
    Bytes::from(buffer)
}

/// Payloads keyed by size in MiB
///
/// Entries are immutable once inserted; handing out a `Bytes` clone shares
/// the buffer without copying.
#[derive(Debug, Default)]
pub struct PayloadCache {
    entries: Mutex<HashMap<u32, Bytes>>,
}

impl PayloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the payload for `size_mb`, generating it on first use
    ///
    /// Generation runs without the lock held. When two callers race on a
    /// missing size the first insert wins and both receive that buffer.
    pub fn get(&self, size_mb: u32) -> Bytes {
        if let Some(payload) = self.cached(size_mb) {
            return payload;
        }
        self.insert(size_mb, generate_payload(size_mb))
    }

    /// Like [`PayloadCache::get`], but a missing payload is generated on the
    /// blocking pool so async callers never stall a runtime worker
    pub async fn fetch(&self, size_mb: u32) -> ProbeResult<Bytes> {
        if let Some(payload) = self.cached(size_mb) {
            return Ok(payload);
        }

        let generated = tokio::task::spawn_blocking(move || generate_payload(size_mb))
            .await
            .map_err(|e| ProbeError::transport(format!("payload generation failed: {}", e)))?;
        Ok(self.insert(size_mb, generated))
    }

    pub fn cached(&self, size_mb: u32) -> Option<Bytes> {
        self.lock().get(&size_mb).cloned()
    }

    fn insert(&self, size_mb: u32, payload: Bytes) -> Bytes {
        self.lock().entry(size_mb).or_insert(payload).clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Bytes>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Generate the given sizes ahead of time
    pub fn prefill(&self, sizes_mb: &[u32]) {
        for &size in sizes_mb {
            let _ = self.get(size);
        }
    }

    pub fn contains(&self, size_mb: u32) -> bool {
        self.lock().contains_key(&size_mb)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
