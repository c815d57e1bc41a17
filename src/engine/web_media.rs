#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{MediaElement, MediaKind};
use wasm_bindgen::JsCast;
use web_sys::{
    CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement, HtmlMediaElement,
    HtmlVideoElement,
};

#[derive(Debug)]
pub enum MediaSource {
    Video(HtmlVideoElement),
    Image(HtmlImageElement),
}

/// A browser video or image element feeding the screens.
#[derive(Debug)]
pub struct WebMedia {
    source: MediaSource,
    scratch: Option<(HtmlCanvasElement, CanvasRenderingContext2d)>,
}

impl WebMedia {
    pub fn video(element: HtmlVideoElement) -> Self {
        Self {
            source: MediaSource::Video(element),
            scratch: None,
        }
    }

    pub fn image(element: HtmlImageElement) -> Self {
        Self {
            source: MediaSource::Image(element),
            scratch: None,
        }
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    fn scratch_context(&mut self, cols: usize, rows: usize) -> Option<&CanvasRenderingContext2d> {
        if self.scratch.is_none() {
            let document = web_sys::window()?.document()?;

            let canvas: HtmlCanvasElement = document
                .create_element("canvas")
                .ok()?
                .dyn_into()
                .ok()?;

            let context: CanvasRenderingContext2d =
                canvas.get_context("2d").ok()??.dyn_into().ok()?;

            self.scratch = Some((canvas, context));
        }

        let (canvas, context) = self.scratch.as_ref()?;

        if canvas.width() != cols as u32 || canvas.height() != rows as u32 {
            canvas.set_width(cols as u32);
            canvas.set_height(rows as u32);
        }

        Some(context)
    }
}

impl MediaElement for WebMedia {
    fn kind(&self) -> MediaKind {
        match self.source {
            MediaSource::Video(_) => MediaKind::Video,
            MediaSource::Image(_) => MediaKind::Image,
        }
    }

    fn is_playing(&self) -> bool {
        match &self.source {
            MediaSource::Video(video) => !video.paused() && !video.ended() && self.has_frame(),
            MediaSource::Image(_) => false,
        }
    }

    fn has_frame(&self) -> bool {
        match &self.source {
            MediaSource::Video(video) => video.ready_state() >= HtmlMediaElement::HAVE_CURRENT_DATA,
            MediaSource::Image(image) => image.complete() && image.natural_width() > 0,
        }
    }

    fn release(&mut self) {
        match &self.source {
            MediaSource::Video(video) => {
                if video.pause().is_err() {
                    warn!("failed to pause released video");
                }

                if video.remove_attribute("src").is_err() {
                    warn!("failed to clear released video source");
                }

                video.load();
            }
            MediaSource::Image(image) => image.set_src(""),
        }

        self.scratch = None;
    }

    fn sample(&mut self, cols: usize, rows: usize) -> Option<Vec<u8>> {
        if !self.has_frame() {
            return None;
        }

        let (w, h) = (cols as f64, rows as f64);

        // cloned so the scratch context can borrow self mutably
        let source = match &self.source {
            MediaSource::Video(video) => MediaSource::Video(video.clone()),
            MediaSource::Image(image) => MediaSource::Image(image.clone()),
        };

        let context = self.scratch_context(cols, rows)?;

        let drawn = match &source {
            MediaSource::Video(video) => {
                context.draw_image_with_html_video_element_and_dw_and_dh(video, 0.0, 0.0, w, h)
            }
            MediaSource::Image(image) => {
                context.draw_image_with_html_image_element_and_dw_and_dh(image, 0.0, 0.0, w, h)
            }
        };

        if drawn.is_err() {
            return None;
        }

        // tainted (cross-origin) media cannot be read back
        match context.get_image_data(0.0, 0.0, w, h) {
            Ok(image_data) => Some(image_data.data().0),
            Err(_) => {
                debug!("media frame is not readable, keeping previous colour");
                None
            }
        }
    }
}
