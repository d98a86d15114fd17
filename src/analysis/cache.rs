//! Memoization cache for repeated analyses
//!
//! Purely an optimization: results are keyed by a content hash of the input
//! buffer, sample rate, and configuration fingerprint, held in a bounded
//! least-recently-used store behind a mutex. The cache is an explicit object
//! the caller owns and injects; the engine keeps no global state.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::analysis::result::LoopAnalysis;
use crate::config::EngineConfig;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Bounded LRU cache of analysis results
///
/// Safe to share across worker threads; lookups and insertions take a short
/// critical section.
#[derive(Debug)]
pub struct AnalysisCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<u64, LoopAnalysis>,
    // Most recently used last
    order: Vec<u64>,
}

impl AnalysisCache {
    /// Create a cache holding up to `capacity` results
    ///
    /// A capacity of zero disables storage entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity,
        }
    }

    /// Look up a previously stored result
    pub fn get(&self, key: u64) -> Option<LoopAnalysis> {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let result = inner.map.get(&key).cloned();
        if result.is_some() {
            inner.touch(key);
        }
        result
    }

    /// Store a result, evicting the least recently used entry when full
    pub fn put(&self, key: u64, result: LoopAnalysis) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if inner.map.len() >= self.capacity
            && !inner.map.contains_key(&key)
            && !inner.order.is_empty()
        {
            let oldest = inner.order.remove(0);
            inner.map.remove(&oldest);
        }
        inner.map.insert(key, result);
        inner.touch(key);
    }

    /// Number of cached results
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").map.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AnalysisCache {
    /// A cache with the default capacity of 16 entries
    fn default() -> Self {
        Self::new(16)
    }
}

impl CacheInner {
    fn touch(&mut self, key: u64) {
        if let Some(pos) = self.order.iter().position(|&k| k == key) {
            self.order.remove(pos);
        }
        self.order.push(key);
    }
}

/// FNV-1a content hash of an analysis request
///
/// Covers the raw sample bytes, the sample rate, and the numeric
/// configuration fields, so any change that could alter the result changes
/// the key.
pub fn content_key(samples: &[f32], sample_rate: u32, config: &EngineConfig) -> u64 {
    let mut hash = FNV_OFFSET;
    for &s in samples {
        hash = fnv_step(hash, &s.to_bits().to_le_bytes());
    }
    hash = fnv_step(hash, &sample_rate.to_le_bytes());

    hash = fnv_step(hash, &(config.frame_len as u64).to_le_bytes());
    hash = fnv_step(hash, &(config.hop as u64).to_le_bytes());
    for f in [
        config.min_bpm,
        config.max_bpm,
        config.default_bpm,
        config.octave_threshold,
        config.normal_bpm_band.0,
        config.normal_bpm_band.1,
        config.tightness,
        config.min_loop_s,
        config.max_loop_s,
        config.short_track_s,
        config.zero_cross_window_ms,
        config.crossfade_ms,
        config.structure_fallback_threshold,
    ] {
        hash = fnv_step(hash, &f.to_bits().to_le_bytes());
    }
    hash = fnv_step(hash, &(config.beats_per_bar as u64).to_le_bytes());
    hash = fnv_step(hash, &(config.embed_steps as u64).to_le_bytes());
    hash = fnv_step(hash, &(config.max_structure_frames as u64).to_le_bytes());
    for &m in &config.bar_multiples {
        hash = fnv_step(hash, &m.to_bits().to_le_bytes());
    }
    hash
}

fn fnv_step(mut hash: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_result(bpm: f32) -> LoopAnalysis {
        LoopAnalysis {
            bpm,
            bpm_confidence: 1.0,
            tempo_candidates: vec![],
            beat_grid: vec![],
            loop_start: 0.0,
            loop_end: 1.0,
            loop_confidence: 1.0,
            crossfade: None,
            candidates: vec![],
            degenerate: false,
        }
    }

    #[test]
    fn test_put_get_round_trip() {
        let cache = AnalysisCache::new(4);
        cache.put(1, dummy_result(120.0));
        let hit = cache.get(1).unwrap();
        assert_eq!(hit.bpm, 120.0);
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = AnalysisCache::new(2);
        cache.put(1, dummy_result(100.0));
        cache.put(2, dummy_result(110.0));
        // Touch 1 so 2 becomes the eviction victim
        cache.get(1);
        cache.put(3, dummy_result(120.0));

        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_none());
        assert!(cache.get(3).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = AnalysisCache::new(0);
        cache.put(1, dummy_result(120.0));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_content_key_sensitivity() {
        let samples_a = vec![0.0f32, 0.5, -0.5];
        let samples_b = vec![0.0f32, 0.5, -0.4];
        let cfg = EngineConfig::default();

        let key_a = content_key(&samples_a, 44100, &cfg);
        assert_eq!(key_a, content_key(&samples_a, 44100, &cfg));
        assert_ne!(key_a, content_key(&samples_b, 44100, &cfg));
        assert_ne!(key_a, content_key(&samples_a, 48000, &cfg));

        let cfg2 = EngineConfig {
            min_bpm: 70.0,
            ..EngineConfig::default()
        };
        assert_ne!(key_a, content_key(&samples_a, 44100, &cfg2));
    }
}
