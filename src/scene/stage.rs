use serde::{Deserialize, Serialize};

/// Material name marking a surface as an LED screen in exported stage models.
pub const LED_MATERIAL_NAME: &str = "LED_MASTER_MAT";

/// Index of a surface within the loaded stage model.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SurfaceId(pub usize);

/// One material slot of a mesh in the stage model.
///
/// The host flattens the glTF scene graph into this list once per load.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Surface {
    pub mesh: String,
    #[serde(default)]
    pub slot: usize,
    pub material_name: String,
    /// Surface centroid in stage space.
    #[serde(default)]
    pub center: [f32; 3],
    /// Outward facing normal, used to place screen lights.
    #[serde(default = "default_normal")]
    pub normal: [f32; 3],
    #[serde(default = "default_roughness")]
    pub roughness: f32,
    #[serde(default)]
    pub metalness: f32,
}

fn default_normal() -> [f32; 3] {
    [0.0, 0.0, 1.0]
}

fn default_roughness() -> f32 {
    0.5
}

impl Surface {
    pub fn is_screen(&self) -> bool {
        self.material_name == LED_MATERIAL_NAME
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StageModel {
    pub url: String,
    pub surfaces: Vec<Surface>,
}

impl StageModel {
    pub fn new(url: impl Into<String>, surfaces: Vec<Surface>) -> Self {
        Self {
            url: url.into(),
            surfaces,
        }
    }

    pub fn surfaces(&self) -> impl Iterator<Item = (SurfaceId, &Surface)> {
        self.surfaces
            .iter()
            .enumerate()
            .map(|(index, surface)| (SurfaceId(index), surface))
    }
}
