use crate::ShaderInfo;

pub static VS_FULLSCREEN: ShaderInfo = ShaderInfo {
    name: "fullscreen.vert",
    code: include_str!("glsl/fullscreen.vert"),
    defines: &[],
    uniform_blocks: &[],
    texture_units: &[],
};

pub static FS_PREFILTER: ShaderInfo = ShaderInfo {
    name: "prefilter.frag",
    code: include_str!("glsl/prefilter.frag"),
    defines: &["SAMPLES"],
    uniform_blocks: &["Prefilter"],
    texture_units: &["source"],
};

pub static FS_BACKGROUND: ShaderInfo = ShaderInfo {
    name: "background.frag",
    code: include_str!("glsl/background.frag"),
    defines: &[],
    uniform_blocks: &["Background", "Display"],
    texture_units: &["environment"],
};

/// Resolves an `#include <...>` directive.
pub fn shader_header(name: &str) -> Option<&'static str> {
    match name {
        "equirect.glsl" => Some(include_str!("glsl/equirect.glsl")),
        _ => None,
    }
}
