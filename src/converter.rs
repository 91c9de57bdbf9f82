use chrono::SecondsFormat;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Value as JsonValue};

use crate::gpx::{Coordinates, GpxDocument, NodeHandle, Route, Track, TrackSegment, Waypoint};
use crate::options::{ExportOptions, GpxElementType};

/// A point whose coordinates could be read.
type Located = (Waypoint, Coordinates);

/// Convert a GPX document to a GeoJSON FeatureCollection.
pub fn to_feature_collection(gpx: &GpxDocument, opts: &ExportOptions) -> FeatureCollection {
    let mut features = Vec::new();

    if opts.should_include(GpxElementType::Waypoint) {
        for wpt in gpx.waypoints().iter() {
            if let Some(c) = gpx.coordinates(wpt) {
                features.push(single_point_feature(gpx, (wpt, c), "waypoint", opts));
            }
        }
    }

    if opts.should_include(GpxElementType::Route) {
        for rte in gpx.routes().iter() {
            let points = located(gpx, gpx.route_points(rte).iter());
            if points.len() >= 2 {
                features.push(route_to_feature(gpx, rte, &points, opts));
            } else if let Some(point) = points.first() {
                features.push(single_point_feature(gpx, *point, "route", opts));
            }
        }
    }

    if opts.should_include(GpxElementType::Track) {
        for trk in gpx.tracks().iter() {
            features.extend(track_to_features(gpx, trk, opts));
        }
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// `[lon, lat]` pairs of every track point, flattened for path overlays.
pub fn flat_track_coordinates(gpx: &GpxDocument) -> Vec<f64> {
    gpx.all_track_points()
        .into_iter()
        .filter_map(|pt| gpx.coordinates(pt))
        .flat_map(|c| [c.longitude, c.latitude])
        .collect()
}

fn located(gpx: &GpxDocument, points: impl Iterator<Item = Waypoint>) -> Vec<Located> {
    points
        .filter_map(|pt| gpx.coordinates(pt).map(|c| (pt, c)))
        .collect()
}

fn route_to_feature(gpx: &GpxDocument, rte: Route, points: &[Located], opts: &ExportOptions) -> Feature {
    let coords = line_coords(gpx, points, opts.include_elevation);
    let geometry = Geometry::new(Value::LineString(coords));

    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String("route".to_string()),
    );

    if opts.include_metadata {
        insert_described(&mut props, gpx, rte);
    }

    if opts.include_time {
        insert_coordinate_times(&mut props, gpx, points);
    }

    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn track_to_features(gpx: &GpxDocument, trk: Track, opts: &ExportOptions) -> Vec<Feature> {
    let non_empty_segments: Vec<Vec<Located>> = gpx
        .track_segments(trk)
        .iter()
        .map(|seg: TrackSegment| located(gpx, gpx.track_points(seg).iter()))
        .filter(|points| !points.is_empty())
        .collect();

    if non_empty_segments.is_empty() {
        return Vec::new();
    }

    // Single point across all segments → Point Feature
    let total_points: usize = non_empty_segments.iter().map(Vec::len).sum();
    if total_points == 1 {
        return vec![single_point_feature(gpx, non_empty_segments[0][0], "track", opts)];
    }

    let lines: Vec<&Vec<Located>> = non_empty_segments.iter().filter(|s| s.len() >= 2).collect();

    if opts.join_track_segments || non_empty_segments.len() == 1 {
        // Single feature: LineString (1 segment) or MultiLineString (multiple)
        if non_empty_segments.len() == 1 {
            let seg = &non_empty_segments[0];
            let geometry = Geometry::new(Value::LineString(line_coords(gpx, seg, opts.include_elevation)));
            let mut props = build_track_props(gpx, trk, opts);

            if opts.include_time {
                insert_coordinate_times(&mut props, gpx, seg);
            }

            return vec![track_feature(geometry, props)];
        }

        if lines.is_empty() {
            return Vec::new();
        }

        let line_strings = lines
            .iter()
            .map(|seg| line_coords(gpx, seg, opts.include_elevation))
            .collect();
        let geometry = Geometry::new(Value::MultiLineString(line_strings));
        let mut props = build_track_props(gpx, trk, opts);

        if opts.include_time {
            let all_times: Vec<Vec<JsonValue>> = lines.iter().map(|seg| times(gpx, seg)).collect();
            if all_times.iter().any(|times| times.iter().any(|t| !t.is_null())) {
                let mut coord_props = Map::new();
                coord_props.insert(
                    "times".to_string(),
                    JsonValue::Array(all_times.into_iter().map(JsonValue::Array).collect()),
                );
                props.insert(
                    "coordinateProperties".to_string(),
                    JsonValue::Object(coord_props),
                );
            }
        }

        vec![track_feature(geometry, props)]
    } else {
        // Each segment as a separate Feature
        lines
            .iter()
            .map(|seg| {
                let geometry =
                    Geometry::new(Value::LineString(line_coords(gpx, seg, opts.include_elevation)));
                let mut props = build_track_props(gpx, trk, opts);

                if opts.include_time {
                    insert_coordinate_times(&mut props, gpx, seg);
                }

                track_feature(geometry, props)
            })
            .collect()
    }
}

fn track_feature(geometry: Geometry, props: Map<String, JsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn single_point_feature(
    gpx: &GpxDocument,
    point: Located,
    gpx_type: &str,
    opts: &ExportOptions,
) -> Feature {
    let coords = point_coords(gpx, point, opts.include_elevation);
    let geometry = Geometry::new(Value::Point(coords));

    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String(gpx_type.to_string()),
    );

    if opts.include_metadata {
        insert_point_metadata(&mut props, gpx, point.0);
    }

    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn build_track_props(gpx: &GpxDocument, trk: Track, opts: &ExportOptions) -> Map<String, JsonValue> {
    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String("track".to_string()),
    );

    if opts.include_metadata {
        insert_described(&mut props, gpx, trk);
    }

    props
}

/// Build [lon, lat] or [lon, lat, ele] coordinate array.
fn point_coords(gpx: &GpxDocument, (pt, c): Located, include_elevation: bool) -> Vec<f64> {
    match (include_elevation, gpx.elevation(pt)) {
        (true, Some(ele)) => vec![c.longitude, c.latitude, ele],
        _ => vec![c.longitude, c.latitude],
    }
}

fn line_coords(gpx: &GpxDocument, points: &[Located], include_elevation: bool) -> Vec<Vec<f64>> {
    points
        .iter()
        .map(|point| point_coords(gpx, *point, include_elevation))
        .collect()
}

fn insert_described(props: &mut Map<String, JsonValue>, gpx: &GpxDocument, item: impl NodeHandle) {
    insert_optional(props, "name", gpx.name(item));
    insert_optional(props, "cmt", gpx.comment(item));
    insert_optional(props, "desc", gpx.description(item));
    insert_optional(props, "src", gpx.source(item));
    insert_optional(props, "type", gpx.item_type(item));
    if let Some(n) = gpx.number(item) {
        props.insert("number".to_string(), JsonValue::Number(n.into()));
    }
    insert_link(props, gpx, item);
}

fn insert_point_metadata(props: &mut Map<String, JsonValue>, gpx: &GpxDocument, pt: Waypoint) {
    insert_optional(props, "name", gpx.name(pt));
    insert_optional(props, "cmt", gpx.comment(pt));
    insert_optional(props, "desc", gpx.description(pt));
    insert_optional(props, "src", gpx.source(pt));
    insert_optional(props, "sym", gpx.symbol(pt));
    insert_optional(props, "type", gpx.item_type(pt));
    if let Some(number) = gpx.elevation(pt).and_then(serde_json::Number::from_f64) {
        props.insert("ele".to_string(), JsonValue::Number(number));
    }
    if let Some(time) = time_string(gpx, pt) {
        props.insert("time".to_string(), JsonValue::String(time));
    }
    insert_link(props, gpx, pt);
}

fn insert_optional(props: &mut Map<String, JsonValue>, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        props.insert(key.to_string(), JsonValue::String(v.to_string()));
    }
}

fn insert_link(props: &mut Map<String, JsonValue>, gpx: &GpxDocument, item: impl NodeHandle) {
    if let Some(link) = gpx.link(item) {
        let mut link_obj = Map::new();
        link_obj.insert("href".to_string(), JsonValue::String(link.href));
        if let Some(t) = link.text {
            link_obj.insert("text".to_string(), JsonValue::String(t));
        }
        if let Some(lt) = link.link_type {
            link_obj.insert("type".to_string(), JsonValue::String(lt));
        }
        props.insert("link".to_string(), JsonValue::Object(link_obj));
    }
}

fn time_string(gpx: &GpxDocument, pt: Waypoint) -> Option<String> {
    gpx.time(pt)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn times(gpx: &GpxDocument, points: &[Located]) -> Vec<JsonValue> {
    points
        .iter()
        .map(|(pt, _)| time_string(gpx, *pt).map_or(JsonValue::Null, JsonValue::String))
        .collect()
}

fn insert_coordinate_times(props: &mut Map<String, JsonValue>, gpx: &GpxDocument, points: &[Located]) {
    let times = times(gpx, points);

    // Only include if at least one time is present
    if times.iter().any(|t| !t.is_null()) {
        let mut coord_props = Map::new();
        coord_props.insert("times".to_string(), JsonValue::Array(times));
        props.insert(
            "coordinateProperties".to_string(),
            JsonValue::Object(coord_props),
        );
    }
}
