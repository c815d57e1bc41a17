#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{
    CropUpdate, HdriCatalog, Role, SceneComposer, SceneConfig, ScreenCrop, StageModel,
    WebGlBackend, WebMedia,
};
use js_sys::{Error, Function};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use wasm_bindgen::prelude::*;
use web_sys::{HtmlImageElement, HtmlVideoElement, WebGl2RenderingContext};

/// WASM binding for a stage rendered into a WebGL2 canvas.
#[wasm_bindgen]
#[derive(Debug)]
pub struct WebStage {
    composer: SceneComposer<WebGlBackend>,
}

#[wasm_bindgen]
impl WebStage {
    #[wasm_bindgen(constructor)]
    pub fn new(context: &WebGl2RenderingContext) -> Result<WebStage, JsValue> {
        let backend = WebGlBackend::new(context.clone()).map_err(as_error)?;

        Ok(Self {
            composer: SceneComposer::new(backend),
        })
    }

    /// Applies a scene configuration, accepting legacy documents.
    ///
    /// Only the parts of the scene affected by the change are touched on the
    /// next tick.
    pub fn configure(&mut self, json: &JsValue) -> Result<(), JsValue> {
        let config: SceneConfig = from_json(json)?;
        self.composer.configure(config);

        Ok(())
    }

    pub fn config_json(&self) -> Result<JsValue, JsValue> {
        as_json(self.composer.config())
    }

    /// Replaces the HDRI presets with a storage listing.
    pub fn set_hdri_catalog(&mut self, listing: &str) -> Result<(), JsValue> {
        let catalog = HdriCatalog::from_listing(listing).map_err(as_error)?;
        self.composer.set_catalog(catalog);

        Ok(())
    }

    /// Installs the flattened surfaces of a loaded glTF stage.
    pub fn load_stage(&mut self, json: &JsValue) -> Result<(), JsValue> {
        let stage: StageModel = from_json(json)?;
        self.composer.load_stage(stage);

        Ok(())
    }

    pub fn report_stage_missing(&mut self, url: &str) {
        self.composer.report_stage_missing(url);
    }

    pub fn report_media_missing(&mut self, url: &str) {
        self.composer.report_media_missing(url);
    }

    /// Feeds a video element to the screens and returns the feed number.
    pub fn bind_video(&mut self, url: &str, element: HtmlVideoElement) -> f64 {
        self.composer.bind_media(url, WebMedia::video(element)).0 as f64
    }

    pub fn bind_image(&mut self, url: &str, element: HtmlImageElement) -> f64 {
        self.composer.bind_media(url, WebMedia::image(element)).0 as f64
    }

    pub fn unbind_media(&mut self) {
        self.composer.unbind_media();
    }

    pub fn set_crop(&mut self, top: f32, bottom: f32, left: f32, right: f32) {
        self.composer.set_crop(ScreenCrop {
            top,
            bottom,
            left,
            right,
        });
    }

    /// Applies a `crop_update` broadcast payload.
    pub fn apply_crop_update(&mut self, payload: &JsValue) -> Result<(), JsValue> {
        let update: CropUpdate = from_json(payload)?;
        self.composer.apply_crop_update(&update);

        Ok(())
    }

    pub fn set_role(&mut self, role: &str) -> Result<(), JsValue> {
        let role: Role = from_json(&JsValue::from_str(role))?;
        self.composer.set_role(role);

        Ok(())
    }

    /// Advances the stage to `now_ms`, a monotonic timestamp such as the one
    /// passed to `requestAnimationFrame` callbacks.
    pub fn tick(&mut self, now_ms: f64) {
        match timestamp(now_ms) {
            Some(now) => self.composer.tick(now),
            None => warn!("skipping tick with invalid timestamp {}", now_ms),
        }
    }

    /// Returns the environment fetches the host should start, as an array of
    /// `{ generation, url, format }` objects.
    pub fn environment_fetches(&mut self) -> Result<JsValue, JsValue> {
        as_json(&self.composer.take_fetch_requests())
    }

    /// Hands the body of a finished fetch to the stage. Returns false when
    /// the payload was stale or could not be applied.
    pub fn complete_environment_fetch(&mut self, generation: f64, bytes: &[u8]) -> bool {
        let outcome = self.composer.complete_fetch(generation as u64, bytes);
        outcome == crate::LoadOutcome::Applied
    }

    pub fn fail_environment_fetch(&mut self, generation: f64, reason: &str) {
        self.composer.fail_fetch(generation as u64, reason);
    }

    /// One of `idle`, `loading`, `loaded` or `failed`.
    pub fn environment_state(&self) -> String {
        self.composer.environment_state().name().to_owned()
    }

    /// Registers `callback` to be invoked with a message whenever the
    /// environment fails to load.
    pub fn on_environment_failure(&mut self, callback: Function) {
        self.composer.set_failure_callback(move |err| {
            let message = JsValue::from_str(&err.to_string());

            if callback.call1(&JsValue::NULL, &message).is_err() {
                warn!("environment failure callback threw");
            }
        });
    }

    pub fn content_status(&self) -> Result<JsValue, JsValue> {
        as_json(self.composer.status())
    }

    /// Returns the per-surface materials, lights and settings the host
    /// applies to its scene graph.
    pub fn frame_json(&self) -> Result<JsValue, JsValue> {
        as_json(self.composer.backend().frame())
    }

    pub fn render_background(
        &mut self,
        width: u32,
        height: u32,
        inverse_view_projection: &[f32],
    ) -> Result<(), JsValue> {
        if inverse_view_projection.len() != 16 {
            return Err(Error::new("expected a 4x4 column-major matrix").into());
        }

        let mut matrix = [[0.0; 4]; 4];

        for (column, values) in matrix.iter_mut().zip(inverse_view_projection.chunks(4)) {
            column.copy_from_slice(values);
        }

        self.composer
            .backend_mut()
            .render_background(width as usize, height as usize, matrix)
            .map_err(as_error)
    }

    pub fn take_diagnostics(&mut self) -> Result<JsValue, JsValue> {
        as_json(&self.composer.take_diagnostics())
    }

    /// Releases every GPU resource held by the stage.
    pub fn dispose(&mut self) {
        self.composer.dispose();
    }

    /// Indicates to the stage that its WebGL context has been lost.
    pub fn context_lost(&mut self) {
        self.composer.backend_mut().context_lost();
        self.composer.dispose();
    }
}

/// Converts a millisecond timestamp, rejecting values `Duration` cannot hold.
fn timestamp(now_ms: f64) -> Option<Duration> {
    if !now_ms.is_finite() {
        return None;
    }

    let secs = now_ms.max(0.0) / 1000.0;

    if secs < u64::MAX as f64 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn as_error(err: impl std::fmt::Display) -> JsValue {
    Error::new(&err.to_string()).into()
}

fn as_json<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    Ok(JsValue::from_serde(value).map_err(|e| Error::new(&e.to_string()))?)
}

fn from_json<T: DeserializeOwned>(json: &JsValue) -> Result<T, JsValue> {
    Ok(json.into_serde().map_err(|e| Error::new(&e.to_string()))?)
}

/// Returns a version string for the WASM module.
#[wasm_bindgen]
pub fn version() -> String {
    concat!("Stageview v", env!("CARGO_PKG_VERSION"), " (WebGL2)").to_owned()
}

/// Configures browser logging functionality.
///
/// This function is safe to call more than once and will do nothing should it
/// be called more than once; this lets it co-exist nicely with hot reloaders.
#[wasm_bindgen]
pub fn initialize_logging() {
    console_error_panic_hook::set_once();
    let _ = console_log::init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_must_be_finite() {
        assert_eq!(timestamp(1500.0), Some(Duration::from_millis(1500)));
        assert_eq!(timestamp(-20.0), Some(Duration::from_secs(0)));
        assert_eq!(timestamp(f64::INFINITY), None);
        assert_eq!(timestamp(f64::NAN), None);
        assert_eq!(timestamp(f64::MAX), None);
    }
}
