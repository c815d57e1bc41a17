#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{
    Backend, BackendError, DecodeError, EnvironmentBinding, EnvironmentRequest, EquirectImage,
    Presentation, Rotation, SourceError, SourceFormat, SourceKey,
};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A fetch not answered within this interval fails.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// Quiet period after the last rotation change before the map is regenerated.
pub const ROTATION_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Clone, Debug, Error, PartialEq)]
pub enum EnvironmentError {
    #[error(transparent)]
    InvalidSource(#[from] SourceError),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("no response within {} s", .0.as_secs())]
    Timeout(Duration),
    #[error("renderer rejected environment: {0}")]
    Device(#[from] BackendError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoadingState {
    Idle,
    Loading,
    Loaded,
    Failed(EnvironmentError),
}

impl LoadingState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Failed(_) => "failed",
        }
    }
}

/// A fetch the host must perform and answer with `complete_fetch` or
/// `fail_fetch`, quoting the generation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FetchTicket {
    pub generation: u64,
    pub url: String,
    pub format: SourceFormat,
}

/// What became of an answered fetch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadOutcome {
    Applied,
    /// The answer belonged to a superseded or timed out request.
    Discarded,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct EnvironmentStats {
    pub fetches: u64,
    pub applied: u64,
    pub disposed: u64,
    pub discarded: u64,
    pub regenerations: u64,
    pub failures: u64,
}

#[derive(Debug)]
struct LoadedEnvironment<T> {
    raw: T,
    filtered: T,
    key: SourceKey,
    generation: u64,
    rotation: Rotation,
    presentation: Presentation,
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    key: SourceKey,
    started: Duration,
}

#[derive(Clone, Copy, Debug)]
struct PendingRotation {
    generation: u64,
    due: Duration,
}

type FailureCallback = Box<dyn FnMut(&EnvironmentError)>;

/// Owns the applied environment map and every resource derived from it.
///
/// Requests are numbered by a generation counter; only an answer quoting the
/// generation of the load currently in flight is ever decoded. Everything
/// else is dropped on arrival, before any GPU allocation.
pub struct EnvironmentManager<B: Backend> {
    loaded: Option<LoadedEnvironment<B::Texture>>,
    prefilter: Option<B::Prefilter>,
    in_flight: Option<InFlight>,
    pending_rotation: Option<PendingRotation>,
    tickets: Vec<FetchTicket>,
    generation: u64,
    rotation: Rotation,
    presentation: Presentation,
    state: LoadingState,
    stats: EnvironmentStats,
    on_failure: Option<FailureCallback>,
}

impl<B: Backend> Default for EnvironmentManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> EnvironmentManager<B> {
    pub fn new() -> Self {
        Self {
            loaded: None,
            prefilter: None,
            in_flight: None,
            pending_rotation: None,
            tickets: Vec::new(),
            generation: 0,
            rotation: Rotation::default(),
            presentation: Presentation::default(),
            state: LoadingState::Idle,
            stats: EnvironmentStats::default(),
            on_failure: None,
        }
    }

    pub fn state(&self) -> &LoadingState {
        &self.state
    }

    pub fn stats(&self) -> EnvironmentStats {
        self.stats
    }

    /// Textures currently owned by the manager.
    pub fn resident_textures(&self) -> usize {
        self.loaded.as_ref().map_or(0, |_| 2)
    }

    /// Source of the environment currently applied to the scene.
    pub fn applied_source(&self) -> Option<&SourceKey> {
        self.loaded.as_ref().map(|loaded| &loaded.key)
    }

    pub fn applied_rotation(&self) -> Option<Rotation> {
        self.loaded.as_ref().map(|loaded| loaded.rotation)
    }

    /// Generation of the most recently issued fetch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_failure_callback(&mut self, callback: impl FnMut(&EnvironmentError) + 'static) {
        self.on_failure = Some(Box::new(callback));
    }

    /// Drains the fetches the host has yet to perform.
    pub fn take_fetch_requests(&mut self) -> Vec<FetchTicket> {
        std::mem::take(&mut self.tickets)
    }

    /// Moves the manager towards `request`.
    pub fn reconcile(
        &mut self,
        backend: &mut B,
        request: &EnvironmentRequest,
        now: Duration,
    ) -> LoadingState {
        self.rotation = request.rotation();
        self.presentation = request.presentation();

        let key = match request.source_key() {
            Ok(Some(key)) => key,
            Ok(None) => {
                self.clear(backend);
                self.state = LoadingState::Idle;
                return self.state.clone();
            }
            Err(err) => {
                self.fail(backend, err.into());
                return self.state.clone();
            }
        };

        if self.applied_source() == Some(&key) {
            self.cancel_load();
            self.update_applied(backend, now);
            self.state = LoadingState::Loaded;
        } else if self.in_flight.as_ref().map_or(false, |load| load.key == key) {
            debug!("`{}' is already loading", key.url);
        } else {
            self.begin_load(key, now);
        }

        self.state.clone()
    }

    /// Answers the fetch issued under `generation` with the file contents.
    pub fn complete_fetch(&mut self, backend: &mut B, generation: u64, bytes: &[u8]) -> LoadOutcome {
        let load = match self.take_current(generation) {
            Some(load) => load,
            None => return LoadOutcome::Discarded,
        };

        let image = match EquirectImage::decode(bytes, load.key.format) {
            Ok(image) => image,
            Err(err) => {
                self.fail(backend, err.into());
                return LoadOutcome::Failed;
            }
        };

        match self.install(backend, load, &image) {
            Ok(()) => LoadOutcome::Applied,
            Err(err) => {
                self.fail(backend, err);
                LoadOutcome::Failed
            }
        }
    }

    /// Reports that the fetch issued under `generation` failed.
    pub fn fail_fetch(&mut self, backend: &mut B, generation: u64, reason: &str) -> LoadOutcome {
        if self.take_current(generation).is_none() {
            return LoadOutcome::Discarded;
        }

        self.fail(backend, EnvironmentError::Fetch(reason.to_owned()));
        LoadOutcome::Failed
    }

    /// Enforces the load timeout and runs a due rotation regeneration.
    pub fn poll(&mut self, backend: &mut B, now: Duration) {
        let timed_out = self.in_flight.as_ref().map_or(false, |load| {
            now.checked_sub(load.started)
                .map_or(false, |elapsed| elapsed >= LOAD_TIMEOUT)
        });

        if timed_out {
            self.fail(backend, EnvironmentError::Timeout(LOAD_TIMEOUT));
        }

        if let Some(pending) = self.pending_rotation {
            if now >= pending.due {
                self.pending_rotation = None;
                self.regenerate(backend, pending.generation);
            }
        }
    }

    /// Releases every GPU resource, including the shared prefilter.
    pub fn dispose(&mut self, backend: &mut B) {
        self.clear(backend);

        if let Some(prefilter) = self.prefilter.take() {
            backend.delete_prefilter(prefilter);
        }

        self.state = LoadingState::Idle;
    }

    fn begin_load(&mut self, key: SourceKey, now: Duration) {
        self.generation += 1;
        self.pending_rotation = None;

        info!("loading environment `{}' ({:?})", key.url, key.format);

        self.tickets.clear();
        self.tickets.push(FetchTicket {
            generation: self.generation,
            url: key.url.clone(),
            format: key.format,
        });

        self.in_flight = Some(InFlight {
            generation: self.generation,
            key,
            started: now,
        });

        self.stats.fetches += 1;
        self.state = LoadingState::Loading;
    }

    fn cancel_load(&mut self) {
        if let Some(load) = self.in_flight.take() {
            debug!("cancelling load of `{}'", load.key.url);
        }

        self.tickets.clear();
    }

    fn take_current(&mut self, generation: u64) -> Option<InFlight> {
        match &self.in_flight {
            Some(load) if load.generation == generation => self.in_flight.take(),
            _ => {
                debug!("discarding stale environment payload (generation {})", generation);
                self.stats.discarded += 1;
                None
            }
        }
    }

    /// Applies a parameter-only change to the loaded environment.
    fn update_applied(&mut self, backend: &mut B, now: Duration) {
        let loaded = match &mut self.loaded {
            Some(loaded) => loaded,
            None => return,
        };

        if loaded.rotation != self.rotation {
            self.pending_rotation = Some(PendingRotation {
                generation: loaded.generation,
                due: now + ROTATION_DEBOUNCE,
            });
        } else {
            self.pending_rotation = None;
        }

        if loaded.presentation != self.presentation {
            loaded.presentation = self.presentation;

            backend.bind_environment(Some(EnvironmentBinding {
                map: &loaded.filtered,
                presentation: loaded.presentation,
            }));
        }
    }

    fn install(
        &mut self,
        backend: &mut B,
        load: InFlight,
        image: &EquirectImage,
    ) -> Result<(), EnvironmentError> {
        self.release_loaded(backend);

        let raw = backend.upload_equirect(image)?;

        let filtered = match self.render_filtered(backend, &raw, self.rotation) {
            Ok(filtered) => filtered,
            Err(err) => {
                backend.delete_texture(raw);
                return Err(err.into());
            }
        };

        backend.bind_environment(Some(EnvironmentBinding {
            map: &filtered,
            presentation: self.presentation,
        }));

        info!(
            "applied environment `{}' ({}x{})",
            load.key.url,
            image.cols(),
            image.rows()
        );

        self.loaded = Some(LoadedEnvironment {
            raw,
            filtered,
            key: load.key,
            generation: load.generation,
            rotation: self.rotation,
            presentation: self.presentation,
        });

        self.stats.applied += 1;
        self.state = LoadingState::Loaded;

        Ok(())
    }

    fn render_filtered(
        &mut self,
        backend: &mut B,
        raw: &B::Texture,
        rotation: Rotation,
    ) -> Result<B::Texture, BackendError> {
        let mut prefilter = match self.prefilter.take() {
            Some(prefilter) => prefilter,
            None => backend.create_prefilter()?,
        };

        let result = backend.prefilter(&mut prefilter, raw, rotation);
        self.prefilter = Some(prefilter);

        result
    }

    fn regenerate(&mut self, backend: &mut B, generation: u64) {
        let mut loaded = match self.loaded.take() {
            Some(loaded) if loaded.generation == generation => loaded,
            other => {
                debug!("discarding rotation scheduled for generation {}", generation);
                self.loaded = other;
                return;
            }
        };

        let rotation = self.rotation;

        if loaded.rotation == rotation {
            self.loaded = Some(loaded);
            return;
        }

        match self.render_filtered(backend, &loaded.raw, rotation) {
            Ok(filtered) => {
                backend.bind_environment(Some(EnvironmentBinding {
                    map: &filtered,
                    presentation: loaded.presentation,
                }));

                let previous = std::mem::replace(&mut loaded.filtered, filtered);
                backend.delete_texture(previous);

                loaded.rotation = rotation;
                self.loaded = Some(loaded);
                self.stats.regenerations += 1;
            }
            Err(err) => {
                self.loaded = Some(loaded);
                self.fail(backend, err.into());
            }
        }
    }

    /// Unbinds and deletes the applied environment, if any.
    fn release_loaded(&mut self, backend: &mut B) {
        if let Some(loaded) = self.loaded.take() {
            backend.bind_environment(None);
            backend.delete_texture(loaded.filtered);
            backend.delete_texture(loaded.raw);

            debug!("disposed environment `{}'", loaded.key.url);
            self.stats.disposed += 1;
        }
    }

    /// Returns to the no-environment state.
    fn clear(&mut self, backend: &mut B) {
        self.cancel_load();
        self.pending_rotation = None;
        self.release_loaded(backend);
    }

    fn fail(&mut self, backend: &mut B, error: EnvironmentError) {
        warn!("environment failed: {}", error);

        self.clear(backend);

        self.stats.failures += 1;
        self.state = LoadingState::Failed(error.clone());

        if let Some(callback) = self.on_failure.as_mut() {
            callback(&error);
        }
    }
}

impl<B: Backend> fmt::Debug for EnvironmentManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EnvironmentManager")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("applied", &self.applied_source())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<B: Backend> Drop for EnvironmentManager<B> {
    fn drop(&mut self) {
        if self.loaded.is_some() || self.prefilter.is_some() {
            warn!("environment manager dropped without dispose, GPU resources leaked");
        }
    }
}
