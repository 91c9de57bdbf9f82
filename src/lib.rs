pub mod builder;
pub mod codec;
pub mod converter;
pub mod error;
pub mod gpx;
pub mod logging;
pub mod node;
pub mod options;
pub mod query;
pub mod recorder;
pub mod recovery;
pub mod registry;
pub mod serializer;
pub mod stats;
pub mod stream;

use serde::Serialize;
use wasm_bindgen::prelude::*;

pub use crate::builder::{TreeBuilder, parse_bytes, parse_reader, parse_str};
pub use crate::codec::{LeafKind, LeafValue};
pub use crate::error::{GpxError, Result};
pub use crate::gpx::{
    Bounds, Coordinates, Fix, GpxDocument, Link, NodeHandle, Nodes, Route, Track, TrackSegment,
    Waypoint,
};
pub use crate::node::{Document, Element, NodeId};
pub use crate::options::{ExportOptions, GpxElementType, RecorderOptions};
pub use crate::recorder::{FinishedRecording, RecordState, RecordingSession};
pub use crate::recovery::{ExitWitness, PreviousExit, Recovery, Repair};
pub use crate::registry::ElementKind;
pub use crate::serializer::{RenderOptions, Serializer};
pub use crate::stats::RecordingStats;
pub use crate::stream::StreamWriter;

/// Convert GPX string to GeoJSON, returned as a JS object.
#[wasm_bindgen(js_name = gpxToGeoJson)]
pub fn gpx_to_geojson(gpx_string: &str, options: JsValue) -> std::result::Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let gpx = GpxDocument::parse(gpx_string)?;
    let fc = converter::to_feature_collection(&gpx, &opts);
    serde_wasm_bindgen::to_value(&fc).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Convert GPX string to GeoJSON, returned as a JSON string.
#[wasm_bindgen(js_name = gpxToGeoJsonString)]
pub fn gpx_to_geojson_string(gpx_string: &str, options: JsValue) -> std::result::Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let gpx = GpxDocument::parse(gpx_string)?;
    let fc = converter::to_feature_collection(&gpx, &opts);
    serde_json::to_string(&fc).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Parse and re-serialize a GPX document with fixed-precision decimals.
#[wasm_bindgen(js_name = normalizeGpx)]
pub fn normalize_gpx(gpx_string: &str) -> std::result::Result<String, JsValue> {
    console_error_panic_hook::set_once();

    Ok(GpxDocument::parse(gpx_string)?.to_xml_string()?)
}

/// Close a recording that was cut off before its end tags were written.
#[wasm_bindgen(js_name = repairGpx)]
pub fn repair_gpx(gpx_string: &str) -> std::result::Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let repaired = recovery::repair_text(gpx_string)?;
    GpxDocument::parse(&repaired)?;
    Ok(repaired)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary<'a> {
    name: Option<&'a str>,
    creator: Option<&'a str>,
    bounds: Option<Bounds>,
    #[serde(flatten)]
    stats: RecordingStats,
}

/// Name, bounds and recording statistics of a GPX document.
#[wasm_bindgen(js_name = gpxSummary)]
pub fn gpx_summary(gpx_string: &str) -> std::result::Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let gpx = GpxDocument::parse(gpx_string)?;
    let summary = Summary {
        name: gpx.document_name(),
        creator: gpx.creator(),
        bounds: gpx.compute_bounds(),
        stats: RecordingStats::from_document(&gpx),
    };
    serde_wasm_bindgen::to_value(&summary).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Track point coordinates as a flat `[lon, lat, lon, lat, ...]` array.
#[wasm_bindgen(js_name = gpxTrackCoordinates)]
pub fn gpx_track_coordinates(gpx_string: &str) -> std::result::Result<js_sys::Float64Array, JsValue> {
    console_error_panic_hook::set_once();

    let gpx = GpxDocument::parse(gpx_string)?;
    let coords = converter::flat_track_coordinates(&gpx);
    Ok(js_sys::Float64Array::from(coords.as_slice()))
}

fn parse_options(options: JsValue) -> std::result::Result<ExportOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(ExportOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
