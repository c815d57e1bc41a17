use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<[f32; 3]> for Point3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

/// A saved viewpoint, stored with the project and replayed by viewers.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CameraPreset {
    pub id: u64,
    pub name: String,
    pub position: Point3,
    pub target: Point3,
}
