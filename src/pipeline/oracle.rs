use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::config::EncoderConfig;
use crate::error::AlignmentError;
use crate::pipeline::traits::{EmbeddingBackend, SimilarityOracle};

/// Cosine similarity over backend embeddings.
///
/// Vectors for texts passed to [`SimilarityOracle::prepare`] are cached (up to
/// `capacity` entries, oldest evicted first); anything else, such as merged
/// spans, is encoded on demand and not kept.
pub struct CosineOracle {
    backend: Box<dyn EmbeddingBackend>,
    cache: Mutex<VectorCache>,
    capacity: usize,
}

/// Text -> vector map that evicts in insertion order once `capacity` is reached.
#[derive(Default)]
struct VectorCache {
    vectors: HashMap<String, Arc<[f32]>>,
    order: VecDeque<String>,
}

impl VectorCache {
    fn get(&self, text: &str) -> Option<Arc<[f32]>> {
        self.vectors.get(text).cloned()
    }

    fn contains(&self, text: &str) -> bool {
        self.vectors.contains_key(text)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn insert(&mut self, text: String, vector: Arc<[f32]>, capacity: usize) -> usize {
        if capacity == 0 || self.vectors.contains_key(&text) {
            return 0;
        }
        let mut evicted = 0;
        while self.vectors.len() >= capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.vectors.remove(&oldest);
            evicted += 1;
        }
        self.order.push_back(text.clone());
        self.vectors.insert(text, vector);
        evicted
    }
}

impl CosineOracle {
    pub fn new(backend: Box<dyn EmbeddingBackend>) -> Self {
        Self::with_capacity(backend, EncoderConfig::DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(backend: Box<dyn EmbeddingBackend>, capacity: usize) -> Self {
        Self {
            backend,
            cache: Mutex::new(VectorCache::default()),
            capacity,
        }
    }

    pub fn device_label(&self) -> String {
        self.backend.device_label()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, VectorCache>, AlignmentError> {
        self.cache
            .lock()
            .map_err(|_| AlignmentError::runtime("oracle cache lock", "cache mutex poisoned"))
    }

    fn embed_checked(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AlignmentError> {
        let vectors = self.backend.embed(texts)?;
        if vectors.len() != texts.len() {
            return Err(AlignmentError::oracle(format!(
                "embedding backend returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

impl SimilarityOracle for CosineOracle {
    fn score(&self, a: &str, b: &str) -> Result<f32, AlignmentError> {
        let (cached_a, cached_b) = {
            let cache = self.lock_cache()?;
            (cache.get(a), cache.get(b))
        };

        let (va, vb): (Arc<[f32]>, Arc<[f32]>) = match (cached_a, cached_b) {
            (Some(va), Some(vb)) => (va, vb),
            (Some(va), None) => {
                let mut fresh = self.embed_checked(&[b])?;
                (va, fresh.remove(0).into())
            }
            (None, Some(vb)) => {
                let mut fresh = self.embed_checked(&[a])?;
                (fresh.remove(0).into(), vb)
            }
            (None, None) => {
                let mut fresh = self.embed_checked(&[a, b])?;
                let vb = fresh.remove(1);
                (fresh.remove(0).into(), vb.into())
            }
        };

        if va.len() != vb.len() {
            return Err(AlignmentError::oracle(format!(
                "embedding dimensions differ: {} vs {}",
                va.len(),
                vb.len()
            )));
        }
        Ok(cosine_similarity(&va, &vb))
    }

    fn prepare(&self, texts: &[&str]) -> Result<(), AlignmentError> {
        // Units past `capacity` could not stay cached; they are encoded on demand instead.
        let missing: Vec<&str> = {
            let cache = self.lock_cache()?;
            let mut seen = HashSet::new();
            texts
                .iter()
                .copied()
                .filter(|text| !cache.contains(text) && seen.insert(*text))
                .take(self.capacity)
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }

        let vectors = self.embed_checked(&missing)?;
        let mut cache = self.lock_cache()?;
        let mut evicted = 0;
        for (text, vector) in missing.iter().zip(vectors) {
            evicted += cache.insert(text.to_string(), vector.into(), self.capacity);
        }
        if evicted > 0 {
            tracing::debug!(
                evicted,
                cached = cache.len(),
                capacity = self.capacity,
                "oracle: evicted oldest single-unit vectors"
            );
        }
        Ok(())
    }
}

/// Cosine of the angle between `a` and `b`; zero when either has no length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (&x, &y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

/// Scales `v` to unit length in place; zero vectors are left untouched.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
