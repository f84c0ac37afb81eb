//! Process-wide cache of loaded model variants.
//!
//! Each [`ModelVariant`] owns one slot. A slot is read through a
//! read/write lock, so once a model is loaded requests only share a read
//! guard long enough to clone an `Arc`. Loads go through a per-variant
//! gate mutex held for the whole load: concurrent callers asking for the
//! same variant queue on the gate, re-check the slot and pick up the
//! instance the first caller stored. Different variants never wait on
//! each other.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::{
    engine::{InferenceEngine, ModelLoader},
    error::{MaiaError, ServiceError},
    types::{Device, ModelVariant},
};

/// A model ready to serve one variant. Never mutated after construction.
pub struct LoadedModel {
    pub variant: ModelVariant,
    pub device: Device,
    pub engine: Arc<dyn InferenceEngine>,
    pub loaded_at: Instant,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("variant", &self.variant)
            .field("device", &self.device)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

/// Snapshot for health/status endpoints; may be slightly stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub loaded: bool,
    pub variant: Option<ModelVariant>,
    pub device: Option<Device>,
}

#[derive(Default)]
struct Slot {
    model: RwLock<Option<Arc<LoadedModel>>>,
    gate: Mutex<()>,
}

pub struct ModelVariantCache {
    loader: Box<dyn ModelLoader>,
    slots: [Slot; 2],
    active: RwLock<Option<(ModelVariant, Device)>>,
}

impl ModelVariantCache {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            slots: Default::default(),
            active: RwLock::new(None),
        }
    }

    fn slot(&self, variant: ModelVariant) -> &Slot {
        &self.slots[variant.slot()]
    }

    /// The loaded instance for `variant`, if any, whatever its device.
    pub fn cached(&self, variant: ModelVariant) -> Option<Arc<LoadedModel>> {
        self.slot(variant).model.read().clone()
    }

    fn matching(&self, variant: ModelVariant, device: Device) -> Option<Arc<LoadedModel>> {
        self.cached(variant).filter(|m| m.device == device)
    }

    /// Return the cached model for `variant` on `device`, loading it first
    /// if needed. At most one load per variant is ever in flight; a failed
    /// load leaves the slot as it was and the next call retries.
    pub fn get_or_load(
        &self,
        variant: ModelVariant,
        device: Device,
    ) -> Result<Arc<LoadedModel>, ServiceError> {
        if let Some(model) = self.matching(variant, device) {
            self.mark_active(variant, device);
            return Ok(model);
        }

        let slot = self.slot(variant);
        let _gate = slot.gate.lock();
        // another caller may have finished the load while we queued
        if let Some(model) = self.matching(variant, device) {
            self.mark_active(variant, device);
            return Ok(model);
        }

        tracing::info!(%variant, %device, "loading model");
        let started = Instant::now();
        let engine = catch_unwind(AssertUnwindSafe(|| self.loader.load(variant, device)))
            .unwrap_or_else(|panic| Err(MaiaError::Panic(panic_message(panic.as_ref()))))
            .map_err(|e| {
                tracing::error!(%variant, %device, error = %e, "model load failed");
                ServiceError::ModelLoadFailure(e)
            })?;

        let model = Arc::new(LoadedModel {
            variant,
            device,
            engine,
            loaded_at: Instant::now(),
        });
        *slot.model.write() = Some(Arc::clone(&model));
        self.mark_active(variant, device);
        tracing::info!(
            %variant,
            %device,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model loaded"
        );
        Ok(model)
    }

    fn mark_active(&self, variant: ModelVariant, device: Device) {
        let current = *self.active.read();
        if current != Some((variant, device)) {
            *self.active.write() = Some((variant, device));
        }
    }

    pub fn status(&self) -> CacheStatus {
        let active = *self.active.read();
        CacheStatus {
            loaded: active.is_some(),
            variant: active.map(|(v, _)| v),
            device: active.map(|(_, d)| d),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{position::Position, types::EvaluationResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, mpsc};
    use std::thread;
    use std::time::Duration;

    struct NullEngine;

    impl InferenceEngine for NullEngine {
        fn predict(&self, _: &Position, _: u32, _: u32) -> Result<EvaluationResult, MaiaError> {
            Ok(EvaluationResult {
                policy: Vec::new(),
                value: 0.5,
            })
        }
    }

    /// Counts loads; fails the first `fail_first` attempts.
    #[derive(Clone)]
    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        fail_first: usize,
        delay: Duration,
    }

    impl CountingLoader {
        fn new(fail_first: usize, delay: Duration) -> Self {
            Self {
                loads: Arc::new(AtomicUsize::new(0)),
                fail_first,
                delay,
            }
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, _: ModelVariant, _: Device) -> Result<Arc<dyn InferenceEngine>, MaiaError> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if n < self.fail_first {
                return Err(MaiaError::MissingArtifact("nowhere.onnx".into()));
            }
            Ok(Arc::new(NullEngine))
        }
    }

    struct PanickingLoader;

    impl ModelLoader for PanickingLoader {
        fn load(&self, _: ModelVariant, _: Device) -> Result<Arc<dyn InferenceEngine>, MaiaError> {
            panic!("corrupt checkpoint");
        }
    }

    #[test]
    fn concurrent_requests_share_one_load() {
        let loader = CountingLoader::new(0, Duration::from_millis(50));
        let loads = Arc::clone(&loader.loads);
        let cache = ModelVariantCache::new(loader);
        let barrier = Barrier::new(8);

        let models: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get_or_load(ModelVariant::Rapid, Device::Cpu).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        for model in &models[1..] {
            assert!(Arc::ptr_eq(&models[0], model));
        }
    }

    /// Holds every blitz load until the test releases it.
    struct GatedLoader {
        loads: Arc<AtomicUsize>,
        blitz_started: Mutex<mpsc::Sender<()>>,
        release_blitz: Mutex<mpsc::Receiver<()>>,
    }

    impl ModelLoader for GatedLoader {
        fn load(
            &self,
            variant: ModelVariant,
            _: Device,
        ) -> Result<Arc<dyn InferenceEngine>, MaiaError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if variant == ModelVariant::Blitz {
                let _ = self.blitz_started.lock().send(());
                let _ = self.release_blitz.lock().recv_timeout(Duration::from_secs(10));
            }
            Ok(Arc::new(NullEngine))
        }
    }

    #[test]
    fn variants_load_independently() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let loads = Arc::new(AtomicUsize::new(0));
        let cache = ModelVariantCache::new(GatedLoader {
            loads: Arc::clone(&loads),
            blitz_started: Mutex::new(started_tx),
            release_blitz: Mutex::new(release_rx),
        });
        let cache = &cache;

        thread::scope(|s| {
            let blitz = s.spawn(move || cache.get_or_load(ModelVariant::Blitz, Device::Cpu));
            started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

            let (done_tx, done_rx) = mpsc::channel();
            s.spawn(move || {
                let _ = done_tx.send(cache.get_or_load(ModelVariant::Rapid, Device::Cpu));
            });
            // rapid must finish while the blitz load is still held
            let rapid = done_rx.recv_timeout(Duration::from_secs(5));
            let blitz_pending = cache.cached(ModelVariant::Blitz).is_none();
            release_tx.send(()).unwrap();

            assert_eq!(rapid.unwrap().unwrap().variant, ModelVariant::Rapid);
            assert!(blitz_pending);
            assert_eq!(blitz.join().unwrap().unwrap().variant, ModelVariant::Blitz);
        });

        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn variants_are_retained_side_by_side() {
        let loader = CountingLoader::new(0, Duration::ZERO);
        let loads = Arc::clone(&loader.loads);
        let cache = ModelVariantCache::new(loader);

        let rapid = cache.get_or_load(ModelVariant::Rapid, Device::Cpu).unwrap();
        let blitz = cache.get_or_load(ModelVariant::Blitz, Device::Cpu).unwrap();
        let rapid_again = cache.get_or_load(ModelVariant::Rapid, Device::Cpu).unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&rapid, &rapid_again));
        assert_eq!(blitz.variant, ModelVariant::Blitz);
        assert_eq!(cache.status().variant, Some(ModelVariant::Rapid));
    }

    #[test]
    fn device_change_replaces_the_instance() {
        let loader = CountingLoader::new(0, Duration::ZERO);
        let loads = Arc::clone(&loader.loads);
        let cache = ModelVariantCache::new(loader);

        let cpu = cache.get_or_load(ModelVariant::Blitz, Device::Cpu).unwrap();
        let gpu = cache.get_or_load(ModelVariant::Blitz, Device::Gpu).unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&cpu, &gpu));
        assert_eq!(cache.cached(ModelVariant::Blitz).unwrap().device, Device::Gpu);
    }

    #[test]
    fn failed_load_is_not_cached_and_can_be_retried() {
        let loader = CountingLoader::new(1, Duration::ZERO);
        let loads = Arc::clone(&loader.loads);
        let cache = ModelVariantCache::new(loader);

        let err = cache.get_or_load(ModelVariant::Rapid, Device::Cpu).unwrap_err();
        assert!(matches!(err, ServiceError::ModelLoadFailure(_)));
        assert!(cache.cached(ModelVariant::Rapid).is_none());
        assert!(!cache.status().loaded);

        cache.get_or_load(ModelVariant::Rapid, Device::Cpu).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(cache.status().loaded);
    }

    #[test]
    fn loader_panic_becomes_load_failure() {
        let cache = ModelVariantCache::new(PanickingLoader);
        let err = cache.get_or_load(ModelVariant::Rapid, Device::Cpu).unwrap_err();
        match err {
            ServiceError::ModelLoadFailure(MaiaError::Panic(msg)) => {
                assert_eq!(msg, "corrupt checkpoint");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(cache.cached(ModelVariant::Rapid).is_none());
    }

    #[test]
    fn status_starts_empty() {
        let cache = ModelVariantCache::new(CountingLoader::new(0, Duration::ZERO));
        assert_eq!(
            cache.status(),
            CacheStatus {
                loaded: false,
                variant: None,
                device: None
            }
        );
    }
}
