use serde::Deserialize;

use crate::codec::DEFAULT_DECIMAL_PRECISION;
use crate::error::Result;

/// Options for GPX to GeoJSON export.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Include elevation as the 3rd coordinate value (default: true)
    #[serde(default = "default_true")]
    pub include_elevation: bool,

    /// Include timestamps in coordinateProperties.times (default: true)
    #[serde(default = "default_true")]
    pub include_time: bool,

    /// Include metadata (name, desc, etc.) in properties (default: true)
    #[serde(default = "default_true")]
    pub include_metadata: bool,

    /// Which GPX element types to export (default: all)
    #[serde(default)]
    pub types: Option<Vec<GpxElementType>>,

    /// Join track segments into a single MultiLineString (default: false)
    #[serde(default)]
    pub join_track_segments: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_elevation: true,
            include_time: true,
            include_metadata: true,
            types: None,
            join_track_segments: false,
        }
    }
}

impl ExportOptions {
    pub fn should_include(&self, element_type: GpxElementType) -> bool {
        match &self.types {
            None => true,
            Some(types) => types.contains(&element_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpxElementType {
    Waypoint,
    Route,
    Track,
}

/// How a recording session writes its file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderOptions {
    /// `creator` attribute of the root element.
    pub creator: String,

    /// `version` attribute of the root element (default: "1.1")
    pub version: String,

    /// Written as `<metadata><name>` when set.
    pub recording_name: Option<String>,

    /// Write a `<metadata>` block holding the start time (default: true)
    pub write_metadata: bool,

    /// Declare the GPX 1.1 namespace on the root (default: true)
    pub include_namespace: bool,

    /// One nesting level of output indentation (default: tab)
    pub indent: String,

    /// Fractional digits for coordinates and other decimals (default: 10)
    pub decimal_precision: usize,

    /// Flush file data to disk after every recorded point (default: false)
    pub sync_each_fix: bool,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            creator: concat!("gpx-trip-recorder ", env!("CARGO_PKG_VERSION")).to_string(),
            version: "1.1".to_string(),
            recording_name: None,
            write_metadata: true,
            include_namespace: true,
            indent: "\t".to_string(),
            decimal_precision: DEFAULT_DECIMAL_PRECISION,
            sync_each_fix: false,
        }
    }
}

impl RecorderOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_defaults_include_everything() {
        let opts: ExportOptions = serde_json::from_str("{}").unwrap();
        assert!(opts.include_elevation);
        assert!(opts.include_time);
        assert!(!opts.join_track_segments);
        assert!(opts.should_include(GpxElementType::Route));
    }

    #[test]
    fn test_export_type_filter() {
        let opts: ExportOptions = serde_json::from_str(r#"{"types":["track"]}"#).unwrap();
        assert!(opts.should_include(GpxElementType::Track));
        assert!(!opts.should_include(GpxElementType::Waypoint));
    }

    #[test]
    fn test_recorder_options_partial_json() {
        let opts =
            RecorderOptions::from_json(r#"{"recordingName":"Ride","syncEachFix":true,"indent":"  "}"#)
                .unwrap();
        assert_eq!(opts.recording_name.as_deref(), Some("Ride"));
        assert!(opts.sync_each_fix);
        assert_eq!(opts.indent, "  ");
        assert_eq!(opts.version, "1.1");
        assert_eq!(opts.decimal_precision, DEFAULT_DECIMAL_PRECISION);
        assert!(opts.write_metadata);
    }

    #[test]
    fn test_recorder_options_rejects_bad_json() {
        assert!(RecorderOptions::from_json(r#"{"decimalPrecision":"ten"}"#).is_err());
    }
}
