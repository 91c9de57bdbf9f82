#![cfg(target_arch = "wasm32")]

use gpx_trip_recorder::{gpx_track_coordinates, gpx_to_geojson_string, normalize_gpx, repair_gpx};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

const TRACK: &str = r#"<gpx version="1.1" creator="wasm"><trk><name>Walk</name><trkseg><trkpt lat="1.5" lon="2.5"/><trkpt lat="1.6" lon="2.6"/></trkseg></trk></gpx>"#;

#[wasm_bindgen_test]
fn test_geojson_string() {
    let json = gpx_to_geojson_string(TRACK, JsValue::UNDEFINED).unwrap();
    assert!(json.contains("\"LineString\""));
    assert!(json.contains("\"Walk\""));
}

#[wasm_bindgen_test]
fn test_normalize_uses_fixed_precision() {
    let xml = normalize_gpx(TRACK).unwrap();
    assert!(xml.contains(r#"lat="1.5000000000""#));
    assert!(xml.contains("<name>Walk</name>"));
}

#[wasm_bindgen_test]
fn test_repair_closes_open_elements() {
    let cut = &TRACK[..TRACK.find("<trkpt lat=\"1.6\"").unwrap() + 8];
    let repaired = repair_gpx(cut).unwrap();
    assert!(repaired.ends_with("</gpx>\n"));
    assert!(repair_gpx("not xml at all").is_err());
}

#[wasm_bindgen_test]
fn test_flat_coordinates() {
    let coords = gpx_track_coordinates(TRACK).unwrap().to_vec();
    assert_eq!(coords, vec![2.5, 1.5, 2.6, 1.6]);
}
