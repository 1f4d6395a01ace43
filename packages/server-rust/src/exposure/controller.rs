//! Camera exposure state machine and its background progression cycle.
//!
//! ```text
//!   Idle --start--> Exposing --steps done / stop--> Reading --synthesis ok--> Idle (image ready)
//!                                                          \--failure------> Error
//!   any state --abort--> Idle
//! ```
//!
//! Every in-flight cycle is registered under its camera with a generation
//! number and two tokens: `cancel` (abort, reload, shutdown) and `stop` (end
//! integration early). Cycle writes go through [`ExposureController::write_if_current`],
//! which holds the registration while it checks the camera state, so an
//! aborted or superseded cycle can never overwrite newer state.
//!
//! Lock order is always registration first, then the state-store entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alpaca_sim_core::{
    property_map, AlpacaError, CameraState, DeviceIdentity, DeviceType, PixelGrid, PropertyMap,
    PropertyMapExt, Value,
};
use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::{Fingerprint, ImageCache};
use super::pointing::{dark_current, is_sunlit, seeing_multiplier, PointingModel};
use super::synthesis::{
    ImageSynthesizer, Optics, SensorGeometry, Site, SynthesisRequest, DAYLIGHT_SKY_BACKGROUND,
    NIGHT_SKY_BACKGROUND,
};
use crate::service::config::{
    ServerConfig, SharedCatalogue, DEFAULT_IMAGE_CACHE_CAPACITY, DEFAULT_SYNTHESIS_TIMEOUT,
};
use crate::service::domain::{effective_config, DeviceContext};
use crate::storage::SharedStore;

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

struct ActiveExposure {
    generation: u64,
    cancel: CancellationToken,
    stop: CancellationToken,
}

/// Result of a guarded cycle write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Applied,
    /// The camera left `Exposing`/`Reading` (abort, reset).
    Skipped,
    /// The cycle is no longer the registered one.
    Stale,
}

fn camera_state(state: &PropertyMap) -> Option<CameraState> {
    state.get("camerastate").and_then(CameraState::from_value)
}

fn is_active(state: &PropertyMap) -> bool {
    matches!(
        camera_state(state),
        Some(CameraState::Exposing | CameraState::Reading)
    )
}

/// Numeric lookup: state first, then configuration, then `default`.
fn number(state: &PropertyMap, config: &PropertyMap, key: &str, default: f64) -> f64 {
    state
        .get(key)
        .or_else(|| config.get(key))
        .and_then(Value::as_f64)
        .unwrap_or(default)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension(state: &PropertyMap, config: &PropertyMap, key: &str, default: f64) -> u32 {
    let raw = number(state, config, key, default);
    if raw.is_finite() && (0.0..=f64::from(u32::MAX)).contains(&raw) {
        raw as u32
    } else {
        0
    }
}

/// Sleep per progress step. Durations too long for `Duration` saturate.
fn step_interval(duration: f64, steps: u32) -> Duration {
    Duration::try_from_secs_f64(duration / f64::from(steps)).unwrap_or(Duration::MAX)
}

/// Whole percent after `done` of `steps` steps.
fn percent_completed(done: u32, steps: u32) -> i64 {
    let percent = u64::from(done) * 100 / u64::from(steps.max(1));
    i64::try_from(percent).unwrap_or(100)
}

/// Command line first, then the document, then the built-in default.
fn cache_capacity(config: &ServerConfig, catalogue: &SharedCatalogue) -> usize {
    config
        .image_cache_capacity
        .or(catalogue.load().settings.image_cache_capacity)
        .unwrap_or(DEFAULT_IMAGE_CACHE_CAPACITY)
}

fn pointing_identity(config: &PropertyMap, key: &str, device_type: DeviceType) -> DeviceIdentity {
    let number = u32::try_from(config.i64_or(key, 0)).unwrap_or(0);
    DeviceIdentity::new(device_type, number)
}

// ---------------------------------------------------------------------------
// ExposureController
// ---------------------------------------------------------------------------

struct Inner {
    store: SharedStore,
    catalogue: SharedCatalogue,
    synthesizer: Arc<dyn ImageSynthesizer>,
    cache: ArcSwap<ImageCache>,
    config: Arc<ServerConfig>,
    active: DashMap<DeviceIdentity, ActiveExposure>,
    generation: AtomicU64,
}

/// Runs camera exposures. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ExposureController {
    inner: Arc<Inner>,
}

impl ExposureController {
    #[must_use]
    pub fn new(
        store: SharedStore,
        catalogue: SharedCatalogue,
        synthesizer: Arc<dyn ImageSynthesizer>,
        config: Arc<ServerConfig>,
    ) -> Self {
        let cache = ImageCache::new(cache_capacity(&config, &catalogue));
        Self {
            inner: Arc::new(Inner {
                store,
                catalogue,
                synthesizer,
                cache: ArcSwap::from_pointee(cache),
                config,
                active: DashMap::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// `startexposure`: validates, moves the camera to `Exposing` and spawns the cycle.
    ///
    /// # Errors
    ///
    /// `NotIdle` unless the camera is `Idle`; `InvalidValue` when `duration`
    /// is outside `[exposuremin, exposuremax]`. Neither mutates state.
    pub fn start(
        &self,
        ctx: &DeviceContext<'_>,
        duration: f64,
        light: bool,
    ) -> Result<(), AlpacaError> {
        let id = ctx.id;
        let min = ctx.config.f64_or("exposuremin", 0.001);
        let max = ctx.config.f64_or("exposuremax", 3600.0);

        // Holding the registration slot across the state transition keeps
        // start and abort from interleaving.
        let slot = self.inner.active.entry(id);
        ctx.store.update_with(id, |state| {
            if camera_state(state) != Some(CameraState::Idle) {
                return (PropertyMap::new(), Err(AlpacaError::not_idle("Camera is not idle")));
            }
            if !(min..=max).contains(&duration) {
                return (
                    PropertyMap::new(),
                    Err(AlpacaError::invalid_value(format!(
                        "Duration {duration} is outside the range {min} to {max}"
                    ))),
                );
            }
            let patch = property_map([
                ("camerastate", CameraState::Exposing.into()),
                ("imageready", false.into()),
                ("imagedata", Value::Null),
                ("lastexposurestarttime", Utc::now().to_rfc3339().into()),
                ("lastexposureduration", duration.into()),
                ("light", light.into()),
                ("percentcompleted", 0.into()),
            ]);
            (patch, Ok(()))
        })?;

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let stop = CancellationToken::new();
        let registration = ActiveExposure {
            generation,
            cancel: cancel.clone(),
            stop: stop.clone(),
        };
        match slot {
            Entry::Occupied(mut occupied) => {
                occupied.get().cancel.cancel();
                occupied.insert(registration);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(registration);
            }
        }

        info!(camera = %id, duration, light, generation, "exposure started");
        let controller = self.clone();
        tokio::spawn(async move {
            controller
                .run_cycle(id, generation, duration, light, cancel, stop)
                .await;
            controller
                .inner
                .active
                .remove_if(&id, |_, active| active.generation == generation);
        });
        Ok(())
    }

    /// `abortexposure`: forces `Idle` from any state and cancels the running cycle.
    ///
    /// # Errors
    ///
    /// `NotImplemented` when `canabortexposure` is false.
    pub fn abort(&self, ctx: &DeviceContext<'_>) -> Result<(), AlpacaError> {
        if !ctx.config.bool_or("canabortexposure", true) {
            return Err(AlpacaError::not_implemented("Camera cannot abort exposures"));
        }
        if let Some((_, active)) = self.inner.active.remove(&ctx.id) {
            active.cancel.cancel();
        }
        ctx.store.update(
            ctx.id,
            property_map([
                ("camerastate", CameraState::Idle.into()),
                ("imageready", false.into()),
                ("imagedata", Value::Null),
                ("percentcompleted", 0.into()),
            ]),
        );
        info!(camera = %ctx.id, "exposure aborted");
        Ok(())
    }

    /// `stopexposure`: ends integration early; the cycle still reads out and synthesizes.
    ///
    /// # Errors
    ///
    /// `NotImplemented` when `canstopexposure` is false.
    pub fn stop(&self, ctx: &DeviceContext<'_>) -> Result<(), AlpacaError> {
        if !ctx.config.bool_or("canstopexposure", true) {
            return Err(AlpacaError::not_implemented("Camera cannot stop exposures"));
        }
        let stopped = ctx.store.update_with(ctx.id, |state| {
            if camera_state(state) == Some(CameraState::Exposing) {
                (
                    property_map([("camerastate", CameraState::Reading.into())]),
                    true,
                )
            } else {
                (PropertyMap::new(), false)
            }
        });
        if stopped {
            if let Some(active) = self.inner.active.get(&ctx.id) {
                active.stop.cancel();
            }
            info!(camera = %ctx.id, "exposure stopped");
        }
        Ok(())
    }

    /// `imagearray`: takes the stored image, leaving the camera without one.
    ///
    /// # Errors
    ///
    /// `ActionFailed` when no image is stored.
    pub fn take_image(&self, ctx: &DeviceContext<'_>) -> Result<Arc<PixelGrid>, AlpacaError> {
        ctx.store.update_with(ctx.id, |state| {
            match state.get("imagedata").and_then(Value::as_image).cloned() {
                Some(image) => (
                    property_map([
                        ("imagedata", Value::Null),
                        ("imageready", false.into()),
                        ("percentcompleted", 0.into()),
                    ]),
                    Ok(image),
                ),
                None => (
                    PropertyMap::new(),
                    Err(AlpacaError::action_failed("No image data available")),
                ),
            }
        })
    }

    /// Cancels every in-flight cycle. Used by reload and shutdown.
    pub fn cancel_all(&self) {
        self.inner.active.retain(|id, active| {
            debug!(camera = %id, generation = active.generation, "cancelling exposure");
            active.cancel.cancel();
            false
        });
    }

    /// Replaces the frame cache with an empty one sized for the current catalogue.
    pub fn reset_cache(&self) {
        let capacity = cache_capacity(&self.inner.config, &self.inner.catalogue);
        self.inner.cache.store(Arc::new(ImageCache::new(capacity)));
        debug!(capacity, "image cache rebuilt");
    }

    fn cache(&self) -> Arc<ImageCache> {
        self.inner.cache.load_full()
    }

    /// Number of cycles currently registered.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }

    // -----------------------------------------------------------------------
    // Progression cycle
    // -----------------------------------------------------------------------

    /// Merges `patch` only if this cycle is still registered and the camera is
    /// still `Exposing` or `Reading`.
    fn write_if_current(
        &self,
        id: DeviceIdentity,
        generation: u64,
        patch: PropertyMap,
    ) -> WriteOutcome {
        let Some(active) = self.inner.active.get(&id) else {
            return WriteOutcome::Stale;
        };
        if active.generation != generation {
            return WriteOutcome::Stale;
        }
        let outcome = self.inner.store.update_with(id, |state| {
            if is_active(state) {
                (patch, WriteOutcome::Applied)
            } else {
                (PropertyMap::new(), WriteOutcome::Skipped)
            }
        });
        drop(active);
        outcome
    }

    async fn run_cycle(
        &self,
        id: DeviceIdentity,
        generation: u64,
        duration: f64,
        light: bool,
        cancel: CancellationToken,
        stop: CancellationToken,
    ) {
        let steps = self.inner.config.exposure_steps.max(1);
        let step = step_interval(duration, steps);

        for i in 0..steps {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = stop.cancelled() => break,
                () = tokio::time::sleep(step) => {}
            }
            let percent = percent_completed(i + 1, steps);
            let patch = property_map([("percentcompleted", percent.into())]);
            if self.write_if_current(id, generation, patch) != WriteOutcome::Applied {
                return;
            }
        }

        let reading = property_map([("camerastate", CameraState::Reading.into())]);
        if self.write_if_current(id, generation, reading) != WriteOutcome::Applied {
            return;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(self.inner.config.readout_delay) => {}
        }

        let (request, fingerprint) = self.build_request(id, duration, light);
        let cache = self.cache();
        let image = match cache.get(&fingerprint) {
            Some(cached) => {
                debug!(camera = %id, "image cache hit");
                Ok(cached)
            }
            None => {
                let timeout = self.synthesis_timeout();
                let synthesis =
                    tokio::time::timeout(timeout, self.inner.synthesizer.synthesize(request));
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    outcome = synthesis => outcome,
                };
                match outcome {
                    Ok(Ok(grid)) => Ok(cache.insert(fingerprint, Arc::new(grid))),
                    Ok(Err(err)) => Err(format!("Issue with camera exposure: {err:#}")),
                    Err(_) => Err(format!(
                        "Issue with camera exposure: synthesis timed out after {}s",
                        timeout.as_secs_f64()
                    )),
                }
            }
        };

        match image {
            Ok(grid) => {
                let done = property_map([
                    ("camerastate", CameraState::Idle.into()),
                    ("imageready", true.into()),
                    ("imagedata", Value::Image(grid)),
                    ("percentcompleted", 100.into()),
                ]);
                if self.write_if_current(id, generation, done) == WriteOutcome::Applied {
                    info!(camera = %id, generation, "exposure complete");
                }
            }
            Err(message) => {
                let failed = property_map([
                    ("camerastate", CameraState::Error.into()),
                    ("imageready", false.into()),
                    ("imagedata", Value::Null),
                ]);
                if self.write_if_current(id, generation, failed) == WriteOutcome::Applied {
                    warn!(camera = %id, generation, error = %message, "exposure failed");
                }
            }
        }
    }

    fn synthesis_timeout(&self) -> Duration {
        self.inner.config.synthesis_timeout.unwrap_or_else(|| {
            self.inner
                .catalogue
                .load()
                .settings
                .gaia_query_timeout
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .unwrap_or(DEFAULT_SYNTHESIS_TIMEOUT)
        })
    }

    /// Snapshots camera, telescope and focuser state into a synthesis request.
    fn build_request(
        &self,
        camera: DeviceIdentity,
        duration: f64,
        light: bool,
    ) -> (SynthesisRequest, Fingerprint) {
        let catalogue = self.inner.catalogue.load();
        let store = &self.inner.store;

        let cam_config = effective_config(&catalogue.registry, camera);
        let cam = store.get(camera);

        let snapshot = |id: DeviceIdentity| {
            if catalogue.registry.exists(id) {
                store.get(id)
            } else {
                PropertyMap::new()
            }
        };
        let telescope = snapshot(pointing_identity(
            &cam_config,
            "pointing_telescope",
            DeviceType::Telescope,
        ));
        let focuser = snapshot(pointing_identity(
            &cam_config,
            "pointing_focuser",
            DeviceType::Focuser,
        ));

        let model = PointingModel {
            error_ra: cam_config.f64_or("pointingerrorra", 0.0),
            error_dec: cam_config.f64_or("pointingerrordec", 0.0),
            drift_ra: cam_config.f64_or("trackingdriftra", 0.0),
            drift_dec: cam_config.f64_or("trackingdriftdec", 0.0),
        };
        let pointing = model.apply(
            telescope.f64_or("rightascension", 0.0),
            telescope.f64_or("declination", 0.0),
            duration,
        );
        let focus = focuser.i64_or("position", 0);
        let sunlit = is_sunlit(Utc::now(), telescope.f64_or("sitelongitude", 0.0));

        let request = SynthesisRequest {
            geometry: SensorGeometry {
                width: dimension(&cam, &cam_config, "numx", 0.0),
                height: dimension(&cam, &cam_config, "numy", 0.0),
                bin_x: dimension(&cam, &cam_config, "binx", 1.0),
                bin_y: dimension(&cam, &cam_config, "biny", 1.0),
                pixel_size: number(&cam, &cam_config, "pixelsizex", 10.0),
                gain: number(&cam, &cam_config, "gain", 1.0),
                full_well: number(&cam, &cam_config, "fullwellcapacity", 65_536.0),
                dark_current: dark_current(number(&cam, &cam_config, "ccdtemperature", -60.0)),
            },
            optics: Optics {
                focal_length: telescope.f64_or("focallength", 8.0),
                aperture: telescope.f64_or("aperture", 0.2),
            },
            site: Site {
                sky_background: if sunlit {
                    DAYLIGHT_SKY_BACKGROUND
                } else {
                    NIGHT_SKY_BACKGROUND
                },
                seeing: seeing_multiplier(focus),
            },
            pointing,
            duration,
            light,
        };
        let fingerprint = Fingerprint::new(&request, focus, sunlit);
        (request, fingerprint)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use alpaca_sim_core::SimulatorConfig;
    use arc_swap::ArcSwap;
    use async_trait::async_trait;

    use super::*;
    use crate::storage::StateStore;

    const DOCUMENT: &str = "\
devices:
  camera:
    0:
      cameraxsize: 8
      cameraysize: 6
  telescope:
    0:
      rightascension: 5.5
      declination: -5.4
  focuser:
    0:
      position: 10000
";

    #[derive(Default)]
    struct CountingSynth {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageSynthesizer for CountingSynth {
        async fn synthesize(&self, request: SynthesisRequest) -> anyhow::Result<PixelGrid> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PixelGrid::filled(
                request.geometry.width,
                request.geometry.height,
                42,
            ))
        }
    }

    struct FailingSynth;

    #[async_trait]
    impl ImageSynthesizer for FailingSynth {
        async fn synthesize(&self, _request: SynthesisRequest) -> anyhow::Result<PixelGrid> {
            anyhow::bail!("star catalogue unreachable")
        }
    }

    struct SlowSynth;

    #[async_trait]
    impl ImageSynthesizer for SlowSynth {
        async fn synthesize(&self, request: SynthesisRequest) -> anyhow::Result<PixelGrid> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(PixelGrid::filled(request.geometry.width, request.geometry.height, 1))
        }
    }

    struct Harness {
        store: SharedStore,
        catalogue: SharedCatalogue,
        controller: ExposureController,
    }

    impl Harness {
        fn new(synthesizer: Arc<dyn ImageSynthesizer>, config: ServerConfig) -> Self {
            let catalogue: SharedCatalogue = Arc::new(ArcSwap::from_pointee(
                SimulatorConfig::from_yaml_str(DOCUMENT).unwrap(),
            ));
            let store: SharedStore = Arc::new(StateStore::new(Arc::clone(&catalogue)));
            let controller = ExposureController::new(
                Arc::clone(&store),
                Arc::clone(&catalogue),
                synthesizer,
                Arc::new(config),
            );
            Self {
                store,
                catalogue,
                controller,
            }
        }

        fn camera() -> DeviceIdentity {
            DeviceIdentity::new(DeviceType::Camera, 0)
        }

        fn ctx(&self) -> DeviceContext<'_> {
            let catalogue = self.catalogue.load();
            DeviceContext {
                id: Self::camera(),
                config: effective_config(&catalogue.registry, Self::camera()),
                store: &self.store,
            }
        }

        fn state(&self) -> PropertyMap {
            self.store.get(Self::camera())
        }

        fn camera_state(&self) -> Option<CameraState> {
            camera_state(&self.state())
        }
    }

    async fn advance(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn completed_cycle_leaves_image_ready() {
        let synth = Arc::new(CountingSynth::default());
        let h = Harness::new(synth.clone(), ServerConfig::default());

        h.controller.start(&h.ctx(), 1.0, true).unwrap();
        assert_eq!(h.camera_state(), Some(CameraState::Exposing));
        assert!(h.state().get("lastexposurestarttime").and_then(Value::as_str).is_some());

        advance(2.0).await;
        let state = h.state();
        assert_eq!(camera_state(&state), Some(CameraState::Idle));
        assert!(state.bool_or("imageready", false));
        assert_eq!(state.i64_or("percentcompleted", 0), 100);
        let image = state.get("imagedata").and_then(Value::as_image).unwrap();
        assert_eq!((image.width(), image.height()), (8, 6));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.controller.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_advances_in_steps() {
        let h = Harness::new(Arc::new(CountingSynth::default()), ServerConfig::default());
        h.controller.start(&h.ctx(), 10.0, true).unwrap();

        advance(5.5).await;
        assert_eq!(h.state().i64_or("percentcompleted", -1), 50);
        assert_eq!(h.camera_state(), Some(CameraState::Exposing));
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_busy_is_not_idle() {
        let h = Harness::new(Arc::new(CountingSynth::default()), ServerConfig::default());
        h.controller.start(&h.ctx(), 10.0, true).unwrap();
        let before = h.state();

        let err = h.controller.start(&h.ctx(), 1.0, false).unwrap_err();
        assert_eq!(err, AlpacaError::not_idle("Camera is not idle"));
        assert_eq!(h.state().get("lastexposureduration"), before.get("lastexposureduration"));
        assert_eq!(h.controller.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_out_of_range_is_rejected_without_mutation() {
        let h = Harness::new(Arc::new(CountingSynth::default()), ServerConfig::default());

        for duration in [0.0, 3600.5, -1.0] {
            let err = h.controller.start(&h.ctx(), duration, true).unwrap_err();
            assert_eq!(err.error_number(), 0x402);
        }
        assert_eq!(h.camera_state(), Some(CameraState::Idle));
        assert_eq!(h.controller.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_during_integration_wins() {
        let synth = Arc::new(CountingSynth::default());
        let h = Harness::new(synth.clone(), ServerConfig::default());
        h.controller.start(&h.ctx(), 10.0, true).unwrap();

        advance(3.5).await;
        h.controller.abort(&h.ctx()).unwrap();
        let state = h.state();
        assert_eq!(camera_state(&state), Some(CameraState::Idle));
        assert_eq!(state.i64_or("percentcompleted", -1), 0);

        advance(60.0).await;
        let state = h.state();
        assert_eq!(camera_state(&state), Some(CameraState::Idle));
        assert!(!state.bool_or("imageready", true));
        assert!(state.get("imagedata").is_some_and(Value::is_null));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_during_synthesis_wins() {
        let h = Harness::new(Arc::new(SlowSynth), ServerConfig::default());
        h.controller.start(&h.ctx(), 0.1, true).unwrap();

        advance(1.0).await;
        assert_eq!(h.camera_state(), Some(CameraState::Reading));
        h.controller.abort(&h.ctx()).unwrap();

        advance(7200.0).await;
        assert_eq!(h.camera_state(), Some(CameraState::Idle));
        assert!(!h.state().bool_or("imageready", true));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_abort_is_not_clobbered_by_old_cycle() {
        let synth = Arc::new(CountingSynth::default());
        let h = Harness::new(synth.clone(), ServerConfig::default());
        h.controller.start(&h.ctx(), 10.0, true).unwrap();
        advance(2.5).await;
        h.controller.abort(&h.ctx()).unwrap();
        h.controller.start(&h.ctx(), 100.0, true).unwrap();

        advance(15.0).await;
        assert_eq!(h.camera_state(), Some(CameraState::Exposing));
        assert_eq!(h.state().i64_or("percentcompleted", -1), 10);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_failure_moves_to_error() {
        let h = Harness::new(Arc::new(FailingSynth), ServerConfig::default());
        h.controller.start(&h.ctx(), 0.5, true).unwrap();

        advance(2.0).await;
        let state = h.state();
        assert_eq!(camera_state(&state), Some(CameraState::Error));
        assert!(!state.bool_or("imageready", true));

        let err = h.controller.start(&h.ctx(), 0.5, true).unwrap_err();
        assert_eq!(err.error_number(), 0x40C);

        h.controller.abort(&h.ctx()).unwrap();
        assert_eq!(h.camera_state(), Some(CameraState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_timeout_moves_to_error() {
        let config = ServerConfig {
            synthesis_timeout: Some(Duration::from_secs(5)),
            ..ServerConfig::default()
        };
        let h = Harness::new(Arc::new(SlowSynth), config);
        h.controller.start(&h.ctx(), 0.1, true).unwrap();

        advance(3.0).await;
        assert_eq!(h.camera_state(), Some(CameraState::Reading));
        advance(5.0).await;
        assert_eq!(h.camera_state(), Some(CameraState::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn identical_exposures_reuse_cached_frame() {
        let synth = Arc::new(CountingSynth::default());
        let h = Harness::new(synth.clone(), ServerConfig::default());

        h.controller.start(&h.ctx(), 0.5, true).unwrap();
        advance(1.0).await;
        let first = h.controller.take_image(&h.ctx()).unwrap();

        h.controller.start(&h.ctx(), 0.5, true).unwrap();
        advance(1.0).await;
        let second = h.controller.take_image(&h.ctx()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.to_image_bytes(), second.to_image_bytes());
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn moved_focuser_misses_cache() {
        let synth = Arc::new(CountingSynth::default());
        let h = Harness::new(synth.clone(), ServerConfig::default());

        h.controller.start(&h.ctx(), 0.5, true).unwrap();
        advance(1.0).await;
        h.store.update(
            DeviceIdentity::new(DeviceType::Focuser, 0),
            property_map([("position", 10_200.into())]),
        );
        h.controller.start(&h.ctx(), 0.5, true).unwrap();
        advance(1.0).await;

        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn take_image_consumes_it() {
        let h = Harness::new(Arc::new(CountingSynth::default()), ServerConfig::default());

        let err = h.controller.take_image(&h.ctx()).unwrap_err();
        assert_eq!(err, AlpacaError::action_failed("No image data available"));

        h.controller.start(&h.ctx(), 0.2, true).unwrap();
        advance(1.0).await;
        let image = h.controller.take_image(&h.ctx()).unwrap();
        assert_eq!(image.to_image_bytes().len(), 44 + 2 * 8 * 6);
        assert!(!h.state().bool_or("imageready", true));
        assert!(h.controller.take_image(&h.ctx()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_integration_and_still_reads_out() {
        let synth = Arc::new(CountingSynth::default());
        let h = Harness::new(synth.clone(), ServerConfig::default());
        h.controller.start(&h.ctx(), 100.0, true).unwrap();

        advance(10.5).await;
        h.controller.stop(&h.ctx()).unwrap();
        assert_eq!(h.camera_state(), Some(CameraState::Reading));

        advance(1.0).await;
        assert_eq!(h.camera_state(), Some(CameraState::Idle));
        assert!(h.state().bool_or("imageready", false));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_when_idle_is_a_no_op() {
        let h = Harness::new(Arc::new(CountingSynth::default()), ServerConfig::default());
        h.controller.stop(&h.ctx()).unwrap();
        assert_eq!(h.camera_state(), Some(CameraState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn capability_flags_gate_abort_and_stop() {
        let h = Harness::new(Arc::new(CountingSynth::default()), ServerConfig::default());
        let mut ctx = h.ctx();
        ctx.config.insert("canabortexposure".into(), false.into());
        ctx.config.insert("canstopexposure".into(), false.into());

        let err = h.controller.abort(&ctx).unwrap_err();
        assert_eq!(err, AlpacaError::not_implemented("Camera cannot abort exposures"));
        let err = h.controller.stop(&ctx).unwrap_err();
        assert_eq!(err, AlpacaError::not_implemented("Camera cannot stop exposures"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_silences_running_cycles() {
        let synth = Arc::new(CountingSynth::default());
        let h = Harness::new(synth.clone(), ServerConfig::default());
        h.controller.start(&h.ctx(), 5.0, true).unwrap();

        h.controller.cancel_all();
        assert_eq!(h.controller.active_count(), 0);
        advance(10.0).await;
        assert_eq!(h.camera_state(), Some(CameraState::Exposing));
        assert_eq!(h.state().i64_or("percentcompleted", -1), 0);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_beyond_timer_range_still_completes_on_stop() {
        let synth = Arc::new(CountingSynth::default());
        let h = Harness::new(synth.clone(), ServerConfig::default());
        let mut ctx = h.ctx();
        ctx.config.insert("exposuremax".into(), 1.0e21.into());

        h.controller.start(&ctx, 5.0e20, true).unwrap();
        advance(5.0).await;
        assert_eq!(h.camera_state(), Some(CameraState::Exposing));
        assert_eq!(h.controller.active_count(), 1);

        h.controller.stop(&ctx).unwrap();
        advance(1.0).await;
        assert_eq!(h.camera_state(), Some(CameraState::Idle));
        assert!(h.state().bool_or("imageready", false));
        assert_eq!(h.controller.active_count(), 0);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);

        h.controller.start(&ctx, 1.0, true).unwrap();
    }

    #[test]
    fn step_interval_saturates() {
        assert_eq!(step_interval(10.0, 10), Duration::from_secs(1));
        assert_eq!(step_interval(5.0e20, 10), Duration::MAX);
        assert_eq!(step_interval(f64::INFINITY, 1), Duration::MAX);
    }

    #[test]
    fn percent_completed_handles_large_step_counts() {
        assert_eq!(percent_completed(1, 10), 10);
        assert_eq!(percent_completed(10, 10), 100);
        assert_eq!(percent_completed(u32::MAX / 2, u32::MAX), 49);
        assert_eq!(percent_completed(u32::MAX, u32::MAX), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cache_applies_reloaded_capacity() {
        let synth = Arc::new(CountingSynth::default());
        let h = Harness::new(synth.clone(), ServerConfig::default());
        assert_eq!(h.controller.cache().capacity(), DEFAULT_IMAGE_CACHE_CAPACITY);

        h.controller.start(&h.ctx(), 0.5, true).unwrap();
        advance(1.0).await;
        assert_eq!(h.controller.cache().len(), 1);

        let reloaded = format!("image_cache_capacity: 3\n{DOCUMENT}");
        h.catalogue
            .store(Arc::new(SimulatorConfig::from_yaml_str(&reloaded).unwrap()));
        h.controller.reset_cache();
        let cache = h.controller.cache();
        assert_eq!(cache.capacity(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn request_reads_pointing_and_optics_from_state() {
        let h = Harness::new(Arc::new(CountingSynth::default()), ServerConfig::default());

        let (request, _) = h.controller.build_request(Harness::camera(), 2.0, true);
        assert!((request.pointing.right_ascension - 5.5).abs() < 1e-9);
        assert!((request.pointing.declination + 5.4).abs() < 1e-9);
        assert_eq!((request.geometry.width, request.geometry.height), (8, 6));
        assert!((request.optics.focal_length - 8.0).abs() < f64::EPSILON);
        assert!((request.site.seeing - 1.0).abs() < f64::EPSILON);
    }
}
