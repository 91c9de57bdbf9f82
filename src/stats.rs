//! Running totals kept alongside a recording.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gpx::{Coordinates, Fix, GpxDocument};

/// Mean earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_distance(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * h.sqrt().min(1.0).asin()
}

/// Summary of a recording, as shown in a recordings list.
///
/// Distance and time only accumulate between consecutive points of the same
/// segment, so the gap across a pause counts for neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStats {
    pub point_count: usize,
    pub segment_count: usize,
    pub pause_count: usize,
    /// Meters.
    pub distance: f64,
    /// Meters per second.
    pub max_speed: f64,
    /// Seconds between timestamped points.
    pub recorded_time: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip)]
    last: Option<(Coordinates, Option<DateTime<Utc>>)>,
}

impl RecordingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute from the track points of a loaded document.
    pub fn from_document(gpx: &GpxDocument) -> Self {
        let mut stats = Self::new();
        for track in gpx.tracks().iter() {
            let segments = gpx.track_segments(track);
            stats.pause_count += segments.len().saturating_sub(1);
            for segment in segments.iter() {
                stats.begin_segment();
                for point in gpx.track_points(segment).iter() {
                    if let Some(fix) = gpx.fix(point) {
                        stats.absorb(&fix);
                    }
                }
            }
        }
        stats
    }

    /// Start a new leg. The next point is not joined to the previous one.
    pub fn begin_segment(&mut self) {
        self.segment_count += 1;
        self.last = None;
    }

    pub fn record_pause(&mut self) {
        self.pause_count += 1;
    }

    pub fn absorb(&mut self, fix: &Fix) {
        self.point_count += 1;
        let mut derived_speed = None;

        if let Some((previous, previous_time)) = self.last {
            let step = haversine_distance(previous, fix.coordinates);
            self.distance += step;
            if let (Some(from), Some(to)) = (previous_time, fix.time) {
                let seconds = (to - from).num_milliseconds() as f64 / 1000.0;
                if seconds > 0.0 {
                    self.recorded_time += seconds;
                    derived_speed = Some(step / seconds);
                }
            }
        }

        if let Some(speed) = fix.speed.or(derived_speed) {
            self.max_speed = self.max_speed.max(speed);
        }
        if let Some(time) = fix.time {
            self.start_time.get_or_insert(time);
            self.end_time = Some(time);
        }
        self.last = Some((fix.coordinates, fix.time));
    }

    /// Meters per second over the recorded time.
    pub fn average_speed(&self) -> Option<f64> {
        (self.recorded_time > 0.0).then(|| self.distance / self.recorded_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn timed(lat: f64, lon: f64, seconds: i64) -> Fix {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut fix = Fix::new(lat, lon);
        fix.time = Some(start + Duration::seconds(seconds));
        fix
    }

    #[test]
    fn test_haversine_one_degree_of_longitude_at_equator() {
        let d = haversine_distance(Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 1.0, "{d}");
        assert_eq!(
            haversine_distance(Coordinates::new(35.0, 139.0), Coordinates::new(35.0, 139.0)),
            0.0
        );
    }

    #[test]
    fn test_absorb_accumulates_within_segment() {
        let mut stats = RecordingStats::new();
        stats.begin_segment();
        stats.absorb(&timed(0.0, 0.0, 0));
        stats.absorb(&timed(0.0, 0.001, 10));
        stats.absorb(&timed(0.0, 0.002, 20));

        assert_eq!(stats.point_count, 3);
        assert!((stats.distance - 222.39).abs() < 0.1, "{}", stats.distance);
        assert_eq!(stats.recorded_time, 20.0);
        assert!((stats.max_speed - 11.12).abs() < 0.01);
        assert!((stats.average_speed().unwrap() - 11.12).abs() < 0.01);
        assert_eq!(stats.start_time, timed(0.0, 0.0, 0).time);
        assert_eq!(stats.end_time, timed(0.0, 0.0, 20).time);
    }

    #[test]
    fn test_pause_gap_is_not_counted() {
        let mut stats = RecordingStats::new();
        stats.begin_segment();
        stats.absorb(&timed(0.0, 0.0, 0));
        stats.record_pause();
        stats.begin_segment();
        stats.absorb(&timed(1.0, 1.0, 600));

        assert_eq!(stats.point_count, 2);
        assert_eq!(stats.segment_count, 2);
        assert_eq!(stats.pause_count, 1);
        assert_eq!(stats.distance, 0.0);
        assert_eq!(stats.average_speed(), None);
    }

    #[test]
    fn test_reported_speed_wins() {
        let mut stats = RecordingStats::new();
        stats.begin_segment();
        let mut fix = Fix::new(0.0, 0.0);
        fix.speed = Some(3.5);
        stats.absorb(&fix);
        assert_eq!(stats.max_speed, 3.5);
    }

    #[test]
    fn test_from_document_matches_incremental() {
        let xml = r#"<gpx version="1.1"><trk>
            <trkseg>
              <trkpt lat="0" lon="0"><time>2025-01-01T00:00:00Z</time></trkpt>
              <trkpt lat="0" lon="0.001"><time>2025-01-01T00:00:10Z</time></trkpt>
            </trkseg>
            <trkseg>
              <trkpt lat="0" lon="0.002"><time>2025-01-01T00:05:00Z</time></trkpt>
            </trkseg>
        </trk></gpx>"#;
        let gpx = GpxDocument::parse(xml).unwrap();
        let stats = RecordingStats::from_document(&gpx);
        assert_eq!(stats.point_count, 3);
        assert_eq!(stats.segment_count, 2);
        assert_eq!(stats.pause_count, 1);
        assert_eq!(stats.recorded_time, 10.0);
        assert!((stats.distance - 111.19).abs() < 0.1);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["pointCount"], 3);
        assert_eq!(json["startTime"], "2025-01-01T00:00:00Z");
    }
}
