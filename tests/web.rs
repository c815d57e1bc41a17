#![cfg(target_arch = "wasm32")]

use serde_json::json;
use stageview::{version, WebStage};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;
use web_sys::{HtmlCanvasElement, HtmlVideoElement, WebGl2RenderingContext};

wasm_bindgen_test_configure!(run_in_browser);

fn setup_context() -> WebGl2RenderingContext {
    let document = web_sys::window().unwrap().document().unwrap();

    let canvas: HtmlCanvasElement = document
        .create_element("canvas")
        .unwrap()
        .dyn_into()
        .unwrap();

    canvas.set_width(64);
    canvas.set_height(32);

    canvas
        .get_context("webgl2")
        .unwrap()
        .unwrap()
        .dyn_into()
        .unwrap()
}

fn radiance() -> Vec<u8> {
    let mut bytes = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 2 +X 4\n".to_vec();

    for _ in 0..8 {
        bytes.extend_from_slice(&[128, 128, 128, 129]);
    }

    bytes
}

fn to_js(value: serde_json::Value) -> JsValue {
    JsValue::from_serde(&value).unwrap()
}

#[wasm_bindgen_test]
fn version_names_the_backend() {
    assert!(version().contains("WebGL2"));
}

#[wasm_bindgen_test]
fn environment_round_trip_through_the_binding() {
    let mut stage = WebStage::new(&setup_context()).unwrap();

    stage
        .configure(&to_js(json!({
            "hdriPreset": "custom",
            "customHdriUrl": "hdri-a.hdr",
            "showHdriBackground": true
        })))
        .unwrap();

    stage.tick(0.0);
    assert_eq!(stage.environment_state(), "loading");

    let tickets: Vec<serde_json::Value> = stage.environment_fetches().unwrap().into_serde().unwrap();
    assert_eq!(tickets.len(), 1);

    let generation = tickets[0]["generation"].as_f64().unwrap();
    assert!(stage.complete_environment_fetch(generation, &radiance()));
    assert_eq!(stage.environment_state(), "loaded");

    let identity = [
        1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
    ];
    stage.render_background(64, 32, &identity).unwrap();

    let frame: serde_json::Value = stage.frame_json().unwrap().into_serde().unwrap();
    assert_eq!(frame["environment"]["showAsBackground"], json!(true));

    stage.dispose();
    assert_eq!(stage.environment_state(), "idle");
}

#[wasm_bindgen_test]
fn stage_surfaces_are_classified() {
    let mut stage = WebStage::new(&setup_context()).unwrap();

    stage
        .load_stage(&to_js(json!({
            "url": "stage.glb",
            "surfaces": [
                { "mesh": "wall", "materialName": "LED_MASTER_MAT" },
                { "mesh": "truss", "materialName": "steel", "roughness": 0.95 }
            ]
        })))
        .unwrap();

    stage.tick(0.0);

    let frame: serde_json::Value = stage.frame_json().unwrap().into_serde().unwrap();
    assert_eq!(frame["screens"].as_object().unwrap().len(), 1);
    assert_eq!(frame["structures"]["1"]["roughness"], json!(0.9));

    stage.dispose();
}

#[wasm_bindgen_test]
fn non_finite_timestamps_are_skipped() {
    let mut stage = WebStage::new(&setup_context()).unwrap();

    stage.tick(f64::INFINITY);
    stage.tick(f64::NAN);
    stage.tick(16.0);

    assert_eq!(stage.environment_state(), "idle");

    stage.dispose();
}

#[wasm_bindgen_test]
fn screens_are_restored_after_context_loss() {
    let mut stage = WebStage::new(&setup_context()).unwrap();

    stage
        .load_stage(&to_js(json!({
            "url": "stage.glb",
            "surfaces": [{ "mesh": "wall", "materialName": "LED_MASTER_MAT" }]
        })))
        .unwrap();

    stage.tick(0.0);
    stage.context_lost();
    stage.tick(16.0);

    let frame: serde_json::Value = stage.frame_json().unwrap().into_serde().unwrap();
    assert_eq!(frame["screens"].as_object().unwrap().len(), 1);

    stage.dispose();
}

#[wasm_bindgen_test]
fn unbinding_a_video_clears_its_source() {
    let mut stage = WebStage::new(&setup_context()).unwrap();
    let document = web_sys::window().unwrap().document().unwrap();

    let video: HtmlVideoElement = document
        .create_element("video")
        .unwrap()
        .dyn_into()
        .unwrap();

    video.set_attribute("src", "clip.mp4").unwrap();

    stage.bind_video("clip.mp4", video.clone());
    stage.tick(0.0);
    stage.unbind_media();

    assert!(video.paused());
    assert_eq!(video.get_attribute("src"), None);

    stage.dispose();
}
