#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{
    Backend, CropUpdate, Dirty, EnvironmentError, EnvironmentManager, EnvironmentRequest,
    FeedId, FetchTicket, GridSettings, HdriCatalog, LedController, Lighting, LoadOutcome,
    LoadingState, MediaFeed, PostProcess, SceneConfig, ScreenCrop, ScreenMode, StageModel,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;

/// Who is looking at the stage.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Authenticated owner; receives explicit diagnostics.
    Editor,
    Collaborator,
    Client,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "url", rename_all = "lowercase")]
pub enum AssetStatus {
    None,
    Ready(String),
    Missing(String),
}

/// Availability of the content shown on the canvas.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContentStatus {
    pub stage: AssetStatus,
    pub media: AssetStatus,
}

/// Ties the configuration, the environment, the media feed and the LED
/// screens to one renderer and drives them from the render loop.
pub struct SceneComposer<B: Backend> {
    backend: B,
    config: Dirty<SceneConfig>,
    catalog: HdriCatalog,
    environment: EnvironmentManager<B>,
    media: MediaFeed<B::Media>,
    screens: LedController,
    stage: Option<StageModel>,
    restage: bool,
    crop: ScreenCrop,
    role: Role,
    status: ContentStatus,
    last_request: Option<EnvironmentRequest>,
    last_tick: Option<Duration>,
    diagnostics: Vec<String>,
}

impl<B: Backend> SceneComposer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: Dirty::new(SceneConfig::default()),
            catalog: HdriCatalog::default(),
            environment: EnvironmentManager::new(),
            media: MediaFeed::new(),
            screens: LedController::new(),
            stage: None,
            restage: false,
            crop: ScreenCrop::default(),
            role: Role::Client,
            status: ContentStatus {
                stage: AssetStatus::None,
                media: AssetStatus::None,
            },
            last_request: None,
            last_tick: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Replaces the configuration; the changes are applied on the next tick.
    pub fn configure(&mut self, config: SceneConfig) {
        Dirty::replace(&mut self.config, config.normalized());
    }

    pub fn catalog(&self) -> &HdriCatalog {
        &self.catalog
    }

    pub fn set_catalog(&mut self, catalog: HdriCatalog) {
        self.catalog = catalog;
        Dirty::dirty(&mut self.config);
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    pub fn status(&self) -> &ContentStatus {
        &self.status
    }

    /// Drains the messages collected for the editor.
    pub fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn environment(&self) -> &EnvironmentManager<B> {
        &self.environment
    }

    pub fn environment_state(&self) -> &LoadingState {
        self.environment.state()
    }

    pub fn screens(&self) -> &LedController {
        &self.screens
    }

    pub fn media(&self) -> &MediaFeed<B::Media> {
        &self.media
    }

    /// The bound element, for hosts that drive playback themselves.
    pub fn media_element_mut(&mut self) -> Option<&mut B::Media> {
        self.media.element_mut()
    }

    pub fn stage(&self) -> Option<&StageModel> {
        self.stage.as_ref()
    }

    pub fn crop(&self) -> ScreenCrop {
        self.crop
    }

    pub fn set_failure_callback(&mut self, callback: impl FnMut(&EnvironmentError) + 'static) {
        self.environment.set_failure_callback(callback);
    }

    /// Installs a freshly loaded stage model and indexes its screens.
    pub fn load_stage(&mut self, stage: StageModel) {
        self.apply_stage(&stage);
        self.restage = false;

        if !self.screens.screens_found() {
            self.diagnose(format!(
                "no surface in `{}' uses the LED material; media will not be visible",
                stage.url
            ));
        }

        self.status.stage = AssetStatus::Ready(stage.url.clone());
        self.stage = Some(stage);
    }

    /// Records that the stage model could not be loaded. The canvas keeps
    /// rendering the empty scene.
    pub fn report_stage_missing(&mut self, url: &str) {
        self.screens.clear(&mut self.backend);
        self.stage = None;
        self.restage = false;

        self.status.stage = AssetStatus::Missing(url.to_owned());
        self.diagnose(format!("stage model `{}' is missing", url));
    }

    pub fn report_media_missing(&mut self, url: &str) {
        self.unbind_media();

        self.status.media = AssetStatus::Missing(url.to_owned());
        self.diagnose(format!("media `{}' is missing", url));
    }

    /// Feeds `element` to the screens, releasing the previous element.
    pub fn bind_media(&mut self, url: &str, element: B::Media) -> FeedId {
        let feed = self.media.bind(element);

        self.screens.set_feed(&mut self.backend, Some(feed));
        self.status.media = AssetStatus::Ready(url.to_owned());

        feed
    }

    pub fn unbind_media(&mut self) {
        if self.media.feed().is_none() {
            return;
        }

        self.media.unbind();
        self.backend.release_media_frame();
        self.screens.set_feed(&mut self.backend, None);

        self.status.media = AssetStatus::None;
    }

    pub fn set_crop(&mut self, crop: ScreenCrop) {
        self.crop = crop.normalized();
        self.screens.set_crop(&mut self.backend, self.crop);
    }

    /// Applies a crop update received over the realtime channel.
    pub fn apply_crop_update(&mut self, update: &CropUpdate) {
        let mut crop = self.crop;
        crop.apply(update);

        self.set_crop(crop);
    }

    pub fn take_fetch_requests(&mut self) -> Vec<FetchTicket> {
        self.environment.take_fetch_requests()
    }

    pub fn complete_fetch(&mut self, generation: u64, bytes: &[u8]) -> LoadOutcome {
        let outcome = self
            .environment
            .complete_fetch(&mut self.backend, generation, bytes);

        self.check_environment(outcome == LoadOutcome::Failed);
        outcome
    }

    pub fn fail_fetch(&mut self, generation: u64, reason: &str) -> LoadOutcome {
        let outcome = self
            .environment
            .fail_fetch(&mut self.backend, generation, reason);

        self.check_environment(outcome == LoadOutcome::Failed);
        outcome
    }

    /// Advances the stage by one frame.
    pub fn tick(&mut self, now: Duration) {
        if std::mem::take(&mut self.restage) {
            if let Some(stage) = self.stage.take() {
                debug!("reapplying materials of `{}'", stage.url);

                self.apply_stage(&stage);
                self.stage = Some(stage);
            }
        }

        let failures = self.environment.stats().failures;

        let backend = &mut self.backend;
        let environment = &mut self.environment;
        let screens = &mut self.screens;
        let catalog = &self.catalog;
        let last_request = &mut self.last_request;

        let reconfigured = Dirty::clean(&mut self.config, |config| {
            backend.set_lighting(&Lighting::from_config(config));
            backend.set_grid(&GridSettings::from_config(config));
            backend.set_post_process(&PostProcess::from_config(config));

            screens.set_mode(backend, ScreenMode::from_protection(config.protect_led));
            screens.set_env_intensity(backend, config.env_intensity);

            let request = config.environment_request(catalog);

            if last_request.as_ref() != Some(&request) {
                environment.reconcile(backend, &request, now);
                *last_request = Some(request);
            }

            Ok::<_, Infallible>(())
        });

        if let Ok(true) = reconfigured {
            debug!("scene configuration applied");
        }

        self.environment.poll(&mut self.backend, now);
        self.check_environment(self.environment.stats().failures > failures);

        if self.media.refresh(now) {
            if let Some(element) = self.media.element() {
                if let Err(err) = self.backend.upload_media_frame(element) {
                    warn!("failed to upload media frame: {}", err);
                }
            }
        }

        let dt = self
            .last_tick
            .and_then(|last| now.checked_sub(last))
            .unwrap_or_default();
        self.last_tick = Some(now);

        self.screens.advance(&mut self.backend, dt);

        let light_level = if self.media.feed().is_some() {
            self.config.sun_intensity.max(self.config.env_intensity)
        } else {
            0.0
        };

        self.screens
            .update_point_lights(&mut self.backend, self.media.dominant_color(), light_level);
    }

    /// Releases every resource held on the renderer.
    ///
    /// The loaded stage model is kept: a later tick pushes its materials
    /// again, as after a lost context is restored.
    pub fn dispose(&mut self) {
        self.environment.dispose(&mut self.backend);
        self.unbind_media();
        self.screens.clear(&mut self.backend);

        self.restage = self.stage.is_some();
        self.last_request = None;
        Dirty::dirty(&mut self.config);
    }

    fn apply_stage(&mut self, stage: &StageModel) {
        self.screens.apply_to_stage(
            &mut self.backend,
            stage,
            self.media.feed(),
            ScreenMode::from_protection(self.config.protect_led),
            self.config.env_intensity,
        );

        self.screens.set_crop(&mut self.backend, self.crop);
    }

    fn check_environment(&mut self, failed: bool) {
        if !failed {
            return;
        }

        if let LoadingState::Failed(err) = self.environment.state() {
            let message = format!("environment unavailable: {}", err);
            self.diagnose(message);
        }
    }

    fn diagnose(&mut self, message: String) {
        if self.role == Role::Editor {
            warn!("{}", message);
            self.diagnostics.push(message);
        } else {
            debug!("{}", message);
        }
    }
}

impl<B: Backend + std::fmt::Debug> std::fmt::Debug for SceneComposer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SceneComposer")
            .field("backend", &self.backend)
            .field("environment", &self.environment)
            .field("role", &self.role)
            .field("status", &self.status)
            .finish()
    }
}
