#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{MediaKind, Rgb};
use std::fmt::Debug;
use std::time::Duration;

/// Sampling grid used for moving content.
pub const MOTION_SAMPLE_GRID: usize = 16;
/// Sampling grid used, once, for still images.
pub const STILL_SAMPLE_GRID: usize = 8;
/// Interval between colour samples while a video plays.
pub const MOTION_SAMPLE_INTERVAL: Duration = Duration::from_millis(800);
/// Saturation gain applied to the sampled average.
pub const SAMPLE_SATURATION: f32 = 1.6;

/// A playable element or static image that can feed the LED screens.
pub trait MediaElement: Debug {
    fn kind(&self) -> MediaKind;

    /// Whether new frames are currently being produced.
    fn is_playing(&self) -> bool;

    /// Whether a decoded frame is available to upload.
    fn has_frame(&self) -> bool;

    /// Stops playback and drops the underlying source.
    fn release(&mut self);

    /// Downsamples the visible frame into `cols * rows` RGBA8 pixels, or
    /// returns `None` if no frame is available yet.
    fn sample(&mut self, cols: usize, rows: usize) -> Option<Vec<u8>>;
}

/// Identifies one binding of a media element; every `bind` yields a new id.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Serialize)]
pub struct FeedId(pub u64);

/// Owns the single active media element.
#[derive(Debug)]
pub struct MediaFeed<M> {
    element: Option<M>,
    feed: Option<FeedId>,
    next_feed: u64,
    frame_dirty: bool,
    dominant_color: Rgb,
    last_sample: Option<Duration>,
}

impl<M: MediaElement> MediaFeed<M> {
    pub fn new() -> Self {
        Self {
            element: None,
            feed: None,
            next_feed: 1,
            frame_dirty: false,
            dominant_color: Rgb::WHITE,
            last_sample: None,
        }
    }

    /// Attaches `element`, releasing whatever was bound before.
    pub fn bind(&mut self, element: M) -> FeedId {
        self.unbind();

        let feed = FeedId(self.next_feed);
        self.next_feed += 1;

        debug!("binding {:?} media as {:?}", element.kind(), feed);

        self.element = Some(element);
        self.feed = Some(feed);
        self.frame_dirty = true;
        self.dominant_color = Rgb::WHITE;
        self.last_sample = None;

        feed
    }

    /// Releases the active element, if any.
    pub fn unbind(&mut self) {
        if let Some(mut element) = self.element.take() {
            element.release();
        }

        self.feed = None;
        self.frame_dirty = false;
    }

    pub fn feed(&self) -> Option<FeedId> {
        self.feed
    }

    pub fn element(&self) -> Option<&M> {
        self.element.as_ref()
    }

    pub fn element_mut(&mut self) -> Option<&mut M> {
        self.element.as_mut()
    }

    pub fn is_playing(&self) -> bool {
        self.element.as_ref().map_or(false, MediaElement::is_playing)
    }

    pub fn dominant_color(&self) -> Rgb {
        self.dominant_color
    }

    /// Per-tick update. Returns whether the frame texture needs an upload.
    ///
    /// Playing media dirties the frame every tick; a paused video or a still
    /// image is uploaded once its first frame has decoded and then left
    /// alone.
    pub fn refresh(&mut self, now: Duration) -> bool {
        let (playing, ready, kind) = match &self.element {
            Some(element) => (element.is_playing(), element.has_frame(), element.kind()),
            None => return false,
        };

        if playing {
            self.frame_dirty = true;
        }

        let sample_due = match (kind, self.last_sample) {
            (_, None) => true,
            (MediaKind::Video, Some(last)) => {
                playing && now.checked_sub(last).map_or(false, |d| d >= MOTION_SAMPLE_INTERVAL)
            }
            (MediaKind::Image, Some(_)) => false,
        };

        if sample_due && self.sample_dominant_color().is_some() {
            self.last_sample = Some(now);
        }

        // stays dirty until there is a frame to upload
        if !ready {
            return false;
        }

        std::mem::replace(&mut self.frame_dirty, false)
    }

    /// Samples the current frame and updates the dominant colour.
    pub fn sample_dominant_color(&mut self) -> Option<Rgb> {
        let element = self.element.as_mut()?;

        let grid = match element.kind() {
            MediaKind::Video => MOTION_SAMPLE_GRID,
            MediaKind::Image => STILL_SAMPLE_GRID,
        };

        let color = dominant_color(&element.sample(grid, grid)?)?;
        self.dominant_color = color;

        Some(color)
    }
}

impl<M: MediaElement> Default for MediaFeed<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Saturation-boosted average of the opaque pixels of an RGBA8 buffer.
///
/// This is a lighting approximation, not a colour-accurate measurement.
pub fn dominant_color(pixels: &[u8]) -> Option<Rgb> {
    let mut sum = [0u64; 3];
    let mut count = 0u64;

    for pixel in pixels.chunks_exact(4) {
        if pixel[3] < 8 {
            continue;
        }

        for (acc, &channel) in sum.iter_mut().zip(pixel) {
            *acc += channel as u64;
        }

        count += 1;
    }

    if count == 0 {
        return None;
    }

    let average = Rgb([
        sum[0] as f32 / (255.0 * count as f32),
        sum[1] as f32 / (255.0 * count as f32),
        sum[2] as f32 / (255.0 * count as f32),
    ]);

    Some(average.saturated(SAMPLE_SATURATION))
}

/// An in-memory RGBA8 media element.
///
/// Serves headless rendering and previews of already decoded frames; a
/// "video" raster simply reports itself as playing until released.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterMedia {
    kind: MediaKind,
    cols: usize,
    rows: usize,
    pixels: Vec<u8>,
    playing: bool,
    ready: bool,
    released: bool,
}

impl RasterMedia {
    pub fn still(cols: usize, rows: usize, pixels: Vec<u8>) -> Self {
        assert_eq!(pixels.len(), cols * rows * 4, "invalid raster dimensions");

        Self {
            kind: MediaKind::Image,
            cols,
            rows,
            pixels,
            playing: false,
            ready: true,
            released: false,
        }
    }

    pub fn video(cols: usize, rows: usize, pixels: Vec<u8>) -> Self {
        Self {
            kind: MediaKind::Video,
            playing: true,
            ..Self::still(cols, rows, pixels)
        }
    }

    pub fn solid(kind: MediaKind, color: [u8; 4]) -> Self {
        let pixels = color.to_vec();

        match kind {
            MediaKind::Image => Self::still(1, 1, pixels),
            MediaKind::Video => Self::video(1, 1, pixels),
        }
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing && self.kind == MediaKind::Video && !self.released;
    }

    pub fn set_pixels(&mut self, pixels: Vec<u8>) {
        assert_eq!(pixels.len(), self.cols * self.rows * 4, "invalid raster dimensions");
        self.pixels = pixels;
    }

    /// Simulates an element whose frame has not decoded yet.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Texel at `(x, y)` in linear `[0, 1]` RGB.
    pub fn texel(&self, x: usize, y: usize) -> [f32; 3] {
        let offset = 4 * (y * self.cols + x);
        let mut out = [0.0; 3];

        for (value, &byte) in out.iter_mut().zip(&self.pixels[offset..offset + 3]) {
            *value = byte as f32 / 255.0;
        }

        out
    }
}

impl MediaElement for RasterMedia {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn is_playing(&self) -> bool {
        self.playing && self.ready
    }

    fn has_frame(&self) -> bool {
        self.ready && !self.released
    }

    fn release(&mut self) {
        self.playing = false;
        self.released = true;
        self.pixels.clear();
    }

    fn sample(&mut self, cols: usize, rows: usize) -> Option<Vec<u8>> {
        if !self.has_frame() || cols == 0 || rows == 0 {
            return None;
        }

        let mut out = Vec::with_capacity(cols * rows * 4);

        // nearest neighbour, sampling at cell centres
        for y in 0..rows {
            let src_y = ((2 * y + 1) * self.rows) / (2 * rows);

            for x in 0..cols {
                let src_x = ((2 * x + 1) * self.cols) / (2 * cols);
                let offset = 4 * (src_y * self.cols + src_x);

                out.extend_from_slice(&self.pixels[offset..offset + 4]);
            }
        }

        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_releases_previous_element() {
        let mut feed = MediaFeed::new();

        let first = feed.bind(RasterMedia::solid(MediaKind::Video, [255, 0, 0, 255]));
        let second = feed.bind(RasterMedia::solid(MediaKind::Video, [0, 255, 0, 255]));

        assert_ne!(first, second);
        assert_eq!(feed.feed(), Some(second));

        feed.unbind();
        assert_eq!(feed.feed(), None);
        assert!(!feed.refresh(Duration::from_secs(1)));
    }

    #[test]
    fn released_element_is_stopped() {
        let mut video = RasterMedia::solid(MediaKind::Video, [1, 2, 3, 255]);
        video.release();

        assert!(video.is_released());
        assert!(!video.is_playing());
        assert_eq!(video.sample(4, 4), None);
    }

    #[test]
    fn playing_video_dirties_every_tick() {
        let mut feed = MediaFeed::new();
        feed.bind(RasterMedia::solid(MediaKind::Video, [10, 10, 10, 255]));

        for tick in 0..5 {
            assert!(feed.refresh(Duration::from_millis(16 * tick)));
        }
    }

    #[test]
    fn paused_media_uploads_once() {
        let mut video = RasterMedia::solid(MediaKind::Video, [10, 10, 10, 255]);
        video.set_playing(false);

        let mut feed = MediaFeed::new();
        feed.bind(video);

        assert!(feed.refresh(Duration::from_millis(0)));
        assert!(!feed.refresh(Duration::from_millis(16)));
        assert!(!feed.refresh(Duration::from_millis(32)));
    }

    #[test]
    fn undecoded_image_is_uploaded_once_ready() {
        let mut image = RasterMedia::solid(MediaKind::Image, [90, 200, 90, 255]);
        image.set_ready(false);

        let mut feed = MediaFeed::new();
        feed.bind(image);

        for tick in 0..3 {
            assert!(!feed.refresh(Duration::from_millis(16 * tick)));
        }

        assert_eq!(feed.dominant_color(), Rgb::WHITE);

        if let Some(element) = feed.element_mut() {
            element.set_ready(true);
        }

        assert!(feed.refresh(Duration::from_millis(64)));
        assert!(feed.dominant_color().0[1] > feed.dominant_color().0[0]);
        assert!(!feed.refresh(Duration::from_millis(80)));
    }

    #[test]
    fn still_images_are_sampled_once() {
        let mut feed = MediaFeed::new();
        feed.bind(RasterMedia::solid(MediaKind::Image, [200, 40, 40, 255]));

        feed.refresh(Duration::from_millis(0));
        let sampled = feed.dominant_color();

        assert!(sampled.0[0] > sampled.0[1]);
        assert_eq!(feed.last_sample, Some(Duration::from_millis(0)));

        feed.refresh(Duration::from_secs(10));
        assert_eq!(feed.last_sample, Some(Duration::from_millis(0)));
    }

    #[test]
    fn video_resamples_on_fixed_cadence() {
        let mut feed = MediaFeed::new();
        feed.bind(RasterMedia::solid(MediaKind::Video, [0, 0, 255, 255]));

        feed.refresh(Duration::from_millis(0));
        feed.refresh(Duration::from_millis(500));
        assert_eq!(feed.last_sample, Some(Duration::from_millis(0)));

        feed.refresh(Duration::from_millis(800));
        assert_eq!(feed.last_sample, Some(Duration::from_millis(800)));
    }

    #[test]
    fn dominant_color_boosts_saturation() {
        let pixels = [200, 100, 100, 255, 200, 100, 100, 255];
        let color = dominant_color(&pixels).unwrap();

        let plain = [200.0 / 255.0, 100.0 / 255.0];
        assert!(color.0[0] > plain[0]);
        assert!(color.0[1] < plain[1]);
    }

    #[test]
    fn transparent_frames_have_no_color() {
        assert_eq!(dominant_color(&[255, 255, 255, 0]), None);
        assert_eq!(dominant_color(&[]), None);
    }

    #[test]
    fn raster_sampling_picks_cell_centres() {
        let mut pixels = Vec::new();

        for value in 0..16u8 {
            pixels.extend_from_slice(&[value, 0, 0, 255]);
        }

        let mut raster = RasterMedia::still(4, 4, pixels);
        let sample = raster.sample(2, 2).unwrap();

        let reds: Vec<u8> = sample.chunks_exact(4).map(|p| p[0]).collect();
        assert_eq!(reds, vec![5, 7, 13, 15]);
    }
}
