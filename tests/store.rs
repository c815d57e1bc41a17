use serde_json::{json, Value};
use stageview::{
    broadcast_crop, delete_project, environment_path, load_project, media_path, publish_project,
    stage_path, AssetSource, BlobEntry, BlobStore, BroadcastChannel, MediaClip, MediaKind,
    ProjectDraft, ProjectRecord, ProjectStore, PublishError, SceneConfig, ScreenCrop,
    SourceFormat, StoreError, CROP_EVENT, CUSTOM_HDRI_PRESET,
};
use std::collections::BTreeMap;

#[derive(Default)]
struct MemoryProjects {
    rows: BTreeMap<String, ProjectRecord>,
    fail_saves: bool,
}

impl ProjectStore for MemoryProjects {
    fn get(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        Ok(self.rows.get(id).cloned())
    }

    fn upsert(&mut self, record: &ProjectRecord) -> Result<(), StoreError> {
        if self.fail_saves {
            return Err(StoreError::Backend(String::from("row level security")));
        }

        self.rows.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.rows.remove(id);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryBlobs {
    objects: BTreeMap<String, Vec<u8>>,
}

impl BlobStore for MemoryBlobs {
    fn upload(&mut self, path: &str, bytes: &[u8]) -> Result<String, StoreError> {
        self.objects.insert(path.to_owned(), bytes.to_vec());
        Ok(format!("https://cdn.example/projects/{}", path))
    }

    fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, StoreError> {
        let folder = format!("{}/", prefix);

        Ok(self
            .objects
            .iter()
            .filter_map(|(path, bytes)| {
                Some(BlobEntry {
                    name: path.strip_prefix(&folder)?.to_owned(),
                    size: bytes.len() as u64,
                })
            })
            .collect())
    }

    fn remove(&mut self, paths: &[String]) -> Result<(), StoreError> {
        for path in paths {
            self.objects.remove(path);
        }

        Ok(())
    }
}

#[derive(Default)]
struct MemoryChannel {
    sent: Vec<(String, Value)>,
}

impl BroadcastChannel for MemoryChannel {
    fn publish(&mut self, event: &str, payload: &Value) -> Result<(), StoreError> {
        self.sent.push((event.to_owned(), payload.clone()));
        Ok(())
    }
}

fn local(file_name: &str) -> AssetSource {
    AssetSource::Local {
        file_name: String::from(file_name),
        bytes: vec![1, 2, 3],
    }
}

fn draft() -> ProjectDraft {
    ProjectDraft {
        id: String::from("p-42"),
        name: String::from("  Summer Tour  "),
        stage: Some(local("arena.glb")),
        media: None,
        media_playlist: vec![],
        hdri: None,
        camera_presets: vec![],
        grid_cell_size: 0.5,
        scene_config: SceneConfig::default(),
    }
}

#[test]
fn publishing_uploads_local_assets_under_the_project_folder() {
    let mut projects = MemoryProjects::default();
    let mut blobs = MemoryBlobs::default();

    let draft = ProjectDraft {
        media: Some(local("loop.MOV")),
        hdri: Some(local("studio.exr")),
        scene_config: SceneConfig {
            hdri_preset: String::from(CUSTOM_HDRI_PRESET),
            custom_hdri_url: Some(String::from("blob:https://editor.local/88aa")),
            ..SceneConfig::default()
        },
        ..draft()
    };

    let record = publish_project(&mut projects, &mut blobs, &draft).unwrap();

    assert_eq!(record.name, "Summer Tour");
    assert!(blobs.objects.contains_key(&stage_path("p-42")));
    assert!(blobs.objects.contains_key(&media_path("p-42", "mov")));
    assert!(blobs.objects.contains_key(&environment_path("p-42", "exr")));

    assert_eq!(
        record.scene_config.custom_hdri_url.as_deref(),
        Some("https://cdn.example/projects/p-42/environment.exr")
    );
    assert_eq!(record.scene_config.custom_hdri_format, Some(SourceFormat::Exr));
    assert_eq!(record.stage_url.as_deref(), Some("https://cdn.example/projects/p-42/stage.glb"));
    assert_eq!(projects.rows.get("p-42"), Some(&record));
}

#[test]
fn remote_assets_are_kept_and_local_handles_dropped() {
    let mut projects = MemoryProjects::default();
    let mut blobs = MemoryBlobs::default();

    let draft = ProjectDraft {
        stage: Some(AssetSource::Remote(String::from("https://cdn.example/p-42/stage.glb"))),
        media: Some(AssetSource::Remote(String::from("blob:https://editor.local/11"))),
        media_playlist: vec![
            MediaClip {
                id: 1,
                name: String::from("intro"),
                url: String::from("https://videos.example/intro.mp4"),
                kind: MediaKind::Video,
                external: true,
            },
            MediaClip {
                id: 2,
                name: String::from("preview"),
                url: String::from("blob:https://editor.local/12"),
                kind: MediaKind::Video,
                external: false,
            },
        ],
        scene_config: SceneConfig {
            custom_hdri_url: Some(String::from("blob:https://editor.local/13")),
            ..SceneConfig::default()
        },
        ..draft()
    };

    let record = publish_project(&mut projects, &mut blobs, &draft).unwrap();

    assert!(blobs.objects.is_empty());
    assert_eq!(record.stage_url.as_deref(), Some("https://cdn.example/p-42/stage.glb"));
    assert_eq!(record.video_url, None);
    assert_eq!(record.media_playlist.len(), 1);
    assert_eq!(record.scene_config.custom_hdri_url, None);
}

#[test]
fn publishing_requires_a_name_and_a_stage() {
    let mut projects = MemoryProjects::default();
    let mut blobs = MemoryBlobs::default();

    let unnamed = ProjectDraft {
        name: String::from("   "),
        ..draft()
    };

    assert!(matches!(
        publish_project(&mut projects, &mut blobs, &unnamed),
        Err(PublishError::EmptyName)
    ));

    let stageless = ProjectDraft {
        stage: None,
        ..draft()
    };

    assert!(matches!(
        publish_project(&mut projects, &mut blobs, &stageless),
        Err(PublishError::MissingStage)
    ));

    assert!(projects.rows.is_empty());
}

#[test]
fn failed_save_is_reported() {
    let mut projects = MemoryProjects {
        fail_saves: true,
        ..MemoryProjects::default()
    };
    let mut blobs = MemoryBlobs::default();

    match publish_project(&mut projects, &mut blobs, &draft()) {
        Err(PublishError::Save(StoreError::Backend(reason))) => {
            assert_eq!(reason, "row level security")
        }
        other => panic!("expected a save failure, got {:?}", other),
    }
}

#[test]
fn loading_upgrades_legacy_configurations() {
    let mut projects = MemoryProjects::default();

    let record: ProjectRecord = serde_json::from_value(json!({
        "id": "legacy",
        "name": "Old show",
        "stage_url": "https://cdn.example/legacy/stage.glb",
        "camera_presets": [
            { "id": 1, "name": "Front", "position": { "x": 0, "y": 2, "z": 10 },
              "target": { "x": 0, "y": 2, "z": 0 } }
        ],
        "scene_config": {
            "sunPosition": [0.0, 10.0, 0.0],
            "sunIntensity": 9.0
        }
    }))
    .unwrap();

    projects.rows.insert(record.id.clone(), record);

    let loaded = load_project(&projects, "legacy").unwrap();

    assert_eq!(loaded.grid_cell_size, 1.0);
    assert_eq!(loaded.camera_presets.len(), 1);
    assert!((loaded.scene_config.sun_elevation - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    assert_eq!(loaded.scene_config.sun_intensity, 3.0);
    assert!(loaded.scene_config.sun_position.is_none());

    assert!(matches!(
        load_project(&projects, "missing"),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn deleting_removes_the_row_and_every_object() {
    let mut projects = MemoryProjects::default();
    let mut blobs = MemoryBlobs::default();

    let draft = ProjectDraft {
        media: Some(local("clip.webm")),
        ..draft()
    };

    publish_project(&mut projects, &mut blobs, &draft).unwrap();
    blobs.objects.insert(String::from("other/stage.glb"), vec![]);

    delete_project(&mut projects, &mut blobs, "p-42").unwrap();

    assert!(projects.rows.is_empty());
    assert_eq!(blobs.objects.len(), 1);
    assert!(blobs.objects.contains_key("other/stage.glb"));
}

#[test]
fn crop_broadcasts_carry_every_side() {
    let mut channel = MemoryChannel::default();

    broadcast_crop(
        &mut channel,
        ScreenCrop {
            top: 0.1,
            bottom: 0.0,
            left: 0.2,
            right: 0.3,
        },
    )
    .unwrap();

    let (event, payload) = &channel.sent[0];

    assert_eq!(event, CROP_EVENT);
    assert!((payload["cropLeft"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    assert!((payload["cropTop"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    assert_eq!(payload["cropBottom"].as_f64(), Some(0.0));
    assert!(payload.get("cropRight").is_some());
}
