//! Persistence seams for published projects.
//!
//! The stores themselves (database rows, object storage, realtime channels)
//! are supplied by the host; this module only decides what gets written
//! where.

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{
    CameraPreset, CropUpdate, MediaClip, SceneConfig, ScreenCrop, SourceFormat,
    CROP_EVENT, CUSTOM_HDRI_PRESET,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project `{0}' not found")]
    NotFound(String),
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("a project needs a name before it can be published")]
    EmptyName,
    #[error("a project needs a stage model before it can be published")]
    MissingStage,
    #[error("{what} upload failed: {source}")]
    Upload {
        what: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("database save failed: {0}")]
    Save(#[source] StoreError),
}

/// A published project as stored in the `projects` table.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub stage_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub media_playlist: Vec<MediaClip>,
    #[serde(default)]
    pub camera_presets: Vec<CameraPreset>,
    #[serde(default = "default_grid_cell_size")]
    pub grid_cell_size: f32,
    #[serde(default)]
    pub scene_config: SceneConfig,
}

fn default_grid_cell_size() -> f32 {
    1.0
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BlobEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

pub trait ProjectStore {
    fn get(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError>;

    fn upsert(&mut self, record: &ProjectRecord) -> Result<(), StoreError>;

    fn delete(&mut self, id: &str) -> Result<(), StoreError>;
}

pub trait BlobStore {
    /// Stores `bytes` at `path`, replacing any existing object, and returns
    /// its public URL.
    fn upload(&mut self, path: &str, bytes: &[u8]) -> Result<String, StoreError>;

    /// Lists the objects directly below `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, StoreError>;

    fn remove(&mut self, paths: &[String]) -> Result<(), StoreError>;
}

pub trait BroadcastChannel {
    fn publish(&mut self, event: &str, payload: &serde_json::Value) -> Result<(), StoreError>;
}

/// Where an asset of a draft comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum AssetSource {
    /// Already hosted; the URL is stored as is.
    Remote(String),
    /// Picked locally and uploaded on publish.
    Local { file_name: String, bytes: Vec<u8> },
}

impl AssetSource {
    /// Extension of a local file name, lowercased.
    fn extension(&self) -> Option<String> {
        match self {
            Self::Local { file_name, .. } => file_name
                .rsplit_once('.')
                .map(|(_, extension)| extension.to_ascii_lowercase())
                .filter(|extension| !extension.is_empty()),
            Self::Remote(_) => None,
        }
    }
}

/// Editor state to be published as a project.
#[derive(Clone, Debug)]
pub struct ProjectDraft {
    pub id: String,
    pub name: String,
    pub stage: Option<AssetSource>,
    pub media: Option<AssetSource>,
    pub media_playlist: Vec<MediaClip>,
    pub hdri: Option<AssetSource>,
    pub camera_presets: Vec<CameraPreset>,
    pub grid_cell_size: f32,
    pub scene_config: SceneConfig,
}

pub fn stage_path(id: &str) -> String {
    format!("{}/stage.glb", id)
}

pub fn media_path(id: &str, extension: &str) -> String {
    format!("{}/video.{}", id, extension)
}

pub fn environment_path(id: &str, extension: &str) -> String {
    format!("{}/environment.{}", id, extension)
}

fn is_local_handle(url: &str) -> bool {
    url.starts_with("blob:")
}

/// Resolves an asset to a persistent URL, uploading local files.
fn persist(
    blobs: &mut dyn BlobStore,
    source: Option<&AssetSource>,
    what: &'static str,
    path: impl FnOnce(&AssetSource) -> String,
) -> Result<Option<String>, PublishError> {
    let local = match source {
        None => return Ok(None),
        Some(AssetSource::Remote(url)) if is_local_handle(url) => {
            warn!("dropping local {} handle `{}'", what, url);
            return Ok(None);
        }
        Some(AssetSource::Remote(url)) => return Ok(Some(url.clone())),
        Some(local) => local,
    };

    let bytes = match local {
        AssetSource::Local { bytes, .. } => bytes,
        AssetSource::Remote(_) => return Ok(None),
    };

    let path = path(local);

    debug!("uploading {} to `{}' ({} bytes)", what, path, bytes.len());

    blobs
        .upload(&path, bytes)
        .map(Some)
        .map_err(|source| PublishError::Upload { what, source })
}

/// Uploads the local assets of `draft` and saves it as a project record.
///
/// Local preview handles are never persisted; a custom HDRI picked from
/// disk is stored next to the stage and the configuration is pointed at the
/// uploaded copy.
pub fn publish_project(
    projects: &mut dyn ProjectStore,
    blobs: &mut dyn BlobStore,
    draft: &ProjectDraft,
) -> Result<ProjectRecord, PublishError> {
    let name = draft.name.trim();

    if name.is_empty() {
        return Err(PublishError::EmptyName);
    }

    let id = draft.id.as_str();

    let stage_url = persist(blobs, draft.stage.as_ref(), "stage", |_| stage_path(id))?
        .ok_or(PublishError::MissingStage)?;

    let video_url = persist(blobs, draft.media.as_ref(), "video", |source| {
        media_path(id, &source.extension().unwrap_or_else(|| String::from("mp4")))
    })?;

    let mut scene_config = draft.scene_config.clone().normalized();

    let hdri_url = persist(blobs, draft.hdri.as_ref(), "HDRI", |source| {
        environment_path(id, &source.extension().unwrap_or_else(|| String::from("hdr")))
    })?;

    if let Some(AssetSource::Local { .. }) = &draft.hdri {
        scene_config.custom_hdri_format = draft
            .hdri
            .as_ref()
            .and_then(AssetSource::extension)
            .and_then(|extension| SourceFormat::from_extension(&extension))
            .or(scene_config.custom_hdri_format);
    }

    if draft.hdri.is_some() {
        scene_config.custom_hdri_url = hdri_url;
    } else if scene_config
        .custom_hdri_url
        .as_deref()
        .map_or(false, is_local_handle)
    {
        scene_config.custom_hdri_url = None;
    }

    if scene_config.hdri_preset == CUSTOM_HDRI_PRESET && scene_config.custom_hdri_url.is_none() {
        warn!("custom HDRI has no persistent source, it will not be published");
    }

    let record = ProjectRecord {
        id: id.to_owned(),
        name: name.to_owned(),
        stage_url: Some(stage_url),
        video_url,
        media_playlist: draft
            .media_playlist
            .iter()
            .filter(|clip| !is_local_handle(&clip.url))
            .cloned()
            .collect(),
        camera_presets: draft.camera_presets.clone(),
        grid_cell_size: draft.grid_cell_size,
        scene_config,
    };

    projects.upsert(&record).map_err(PublishError::Save)?;

    info!("published project `{}' ({})", record.name, record.id);

    Ok(record)
}

/// Fetches a project, upgrading its configuration to the current schema.
pub fn load_project(projects: &dyn ProjectStore, id: &str) -> Result<ProjectRecord, StoreError> {
    let mut record = projects
        .get(id)?
        .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;

    record.scene_config = record.scene_config.normalized();

    Ok(record)
}

/// Deletes a project and every object stored under its folder.
pub fn delete_project(
    projects: &mut dyn ProjectStore,
    blobs: &mut dyn BlobStore,
    id: &str,
) -> Result<(), StoreError> {
    let paths: Vec<String> = blobs
        .list(id)?
        .into_iter()
        .map(|entry| format!("{}/{}", id, entry.name))
        .collect();

    if !paths.is_empty() {
        blobs.remove(&paths)?;
    }

    projects.delete(id)
}

/// Sends the editor's crop to every viewer of the project. `channel` is
/// expected to be subscribed to [`crate::CROP_CHANNEL`].
pub fn broadcast_crop(channel: &mut dyn BroadcastChannel, crop: ScreenCrop) -> Result<(), StoreError> {
    let payload = serde_json::to_value(CropUpdate::from(crop.normalized()))?;

    channel.publish(CROP_EVENT, &payload)
}
