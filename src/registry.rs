//! Tag name to element kind resolution.
//!
//! Each composite schema declares which kind a child tag becomes. Lookup walks
//! the defining schema's table, then its supertype's, so the nearest
//! declaration wins for a reused name. Tags no table knows fall back to the
//! kind whose canonical tag equals the name, and finally to
//! [`ElementKind::Opaque`].

use crate::codec::LeafKind;

/// The closed set of element kinds the tree knows how to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Pseudo kind for the level above the root element.
    Document,
    Gpx,
    Metadata,
    Person,
    Email,
    Copyright,
    Link,
    Bounds,
    Route,
    Track,
    TrackSegment,
    /// `wpt`, `trkpt` and `rtept`.
    Waypoint,
    Leaf(LeafKind),
    /// Unknown element, kept verbatim and never interpreted.
    Opaque,
}

/// Registry tables. Some of these are abstract and never become a node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schema {
    Element,
    Document,
    Gpx,
    Metadata,
    Person,
    Copyright,
    Link,
    /// Common children of tracks, routes and waypoints.
    Described,
    Route,
    Track,
    TrackSegment,
    Waypoint,
    Opaque,
}

const STRING: ElementKind = ElementKind::Leaf(LeafKind::String);
const INTEGER: ElementKind = ElementKind::Leaf(LeafKind::Integer);
const DECIMAL: ElementKind = ElementKind::Leaf(LeafKind::Decimal);
const DATE: ElementKind = ElementKind::Leaf(LeafKind::Date);
const YEAR: ElementKind = ElementKind::Leaf(LeafKind::Year);

const ELEMENT_TABLE: &[(&str, ElementKind)] = &[("extensions", ElementKind::Opaque)];

const DOCUMENT_TABLE: &[(&str, ElementKind)] = &[("gpx", ElementKind::Gpx)];

const GPX_TABLE: &[(&str, ElementKind)] = &[
    ("metadata", ElementKind::Metadata),
    ("wpt", ElementKind::Waypoint),
    ("rte", ElementKind::Route),
    ("trk", ElementKind::Track),
];

const METADATA_TABLE: &[(&str, ElementKind)] = &[
    ("name", STRING),
    ("desc", STRING),
    ("author", ElementKind::Person),
    ("copyright", ElementKind::Copyright),
    ("link", ElementKind::Link),
    ("time", DATE),
    ("keywords", STRING),
    ("bounds", ElementKind::Bounds),
];

const PERSON_TABLE: &[(&str, ElementKind)] = &[
    ("name", STRING),
    ("email", ElementKind::Email),
    ("link", ElementKind::Link),
];

const COPYRIGHT_TABLE: &[(&str, ElementKind)] = &[("year", YEAR), ("license", STRING)];

const LINK_TABLE: &[(&str, ElementKind)] = &[("text", STRING), ("type", STRING)];

const DESCRIBED_TABLE: &[(&str, ElementKind)] = &[
    ("name", STRING),
    ("cmt", STRING),
    ("desc", STRING),
    ("src", STRING),
    ("link", ElementKind::Link),
    ("number", INTEGER),
    ("type", STRING),
];

const ROUTE_TABLE: &[(&str, ElementKind)] = &[("rtept", ElementKind::Waypoint)];

const TRACK_TABLE: &[(&str, ElementKind)] = &[("trkseg", ElementKind::TrackSegment)];

const TRACK_SEGMENT_TABLE: &[(&str, ElementKind)] = &[("trkpt", ElementKind::Waypoint)];

const WAYPOINT_TABLE: &[(&str, ElementKind)] = &[
    ("ele", DECIMAL),
    ("time", DATE),
    ("magvar", DECIMAL),
    ("geoidheight", DECIMAL),
    ("sym", STRING),
    ("fix", STRING),
    ("sat", INTEGER),
    ("hdop", DECIMAL),
    ("vdop", DECIMAL),
    ("pdop", DECIMAL),
    ("ageofdgpsdata", DECIMAL),
    ("dgpsid", INTEGER),
    // GPX 1.0
    ("course", DECIMAL),
    ("speed", DECIMAL),
];

impl Schema {
    fn table(self) -> &'static [(&'static str, ElementKind)] {
        match self {
            Self::Element => ELEMENT_TABLE,
            Self::Document => DOCUMENT_TABLE,
            Self::Gpx => GPX_TABLE,
            Self::Metadata => METADATA_TABLE,
            Self::Person => PERSON_TABLE,
            Self::Copyright => COPYRIGHT_TABLE,
            Self::Link => LINK_TABLE,
            Self::Described => DESCRIBED_TABLE,
            Self::Route => ROUTE_TABLE,
            Self::Track => TRACK_TABLE,
            Self::TrackSegment => TRACK_SEGMENT_TABLE,
            Self::Waypoint => WAYPOINT_TABLE,
            Self::Opaque => &[],
        }
    }

    fn supertype(self) -> Option<Schema> {
        match self {
            Self::Element | Self::Opaque => None,
            Self::Route | Self::Track | Self::Waypoint => Some(Self::Described),
            _ => Some(Self::Element),
        }
    }
}

impl ElementKind {
    fn schema(self) -> Schema {
        match self {
            Self::Document => Schema::Document,
            Self::Gpx => Schema::Gpx,
            Self::Metadata => Schema::Metadata,
            Self::Person => Schema::Person,
            Self::Copyright => Schema::Copyright,
            Self::Link => Schema::Link,
            Self::Route => Schema::Route,
            Self::Track => Schema::Track,
            Self::TrackSegment => Schema::TrackSegment,
            Self::Waypoint => Schema::Waypoint,
            Self::Opaque => Schema::Opaque,
            Self::Email | Self::Bounds | Self::Leaf(_) => Schema::Element,
        }
    }

    /// Whether the element's content is a single scalar instead of child elements.
    pub fn is_leaf_text(self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    pub fn leaf_kind(self) -> Option<LeafKind> {
        match self {
            Self::Leaf(kind) => Some(kind),
            _ => None,
        }
    }

    /// Attributes holding decimal numbers, written at fixed precision.
    pub fn decimal_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Waypoint => &["lat", "lon"],
            Self::Bounds => &["minlat", "minlon", "maxlat", "maxlon"],
            _ => &[],
        }
    }

    /// Tag names of the children this kind keeps a memoized view of.
    pub fn cached_views(self) -> &'static [&'static str] {
        match self {
            Self::Gpx => &["wpt", "rte", "trk"],
            Self::Route => &["rtept"],
            Self::Track => &["trkseg"],
            Self::TrackSegment => &["trkpt"],
            _ => &[],
        }
    }

    /// The kind whose canonical tag is `tag`, if any.
    pub fn from_tag_name(tag: &str) -> Option<ElementKind> {
        let kind = match tag {
            "gpx" => Self::Gpx,
            "metadata" => Self::Metadata,
            "author" => Self::Person,
            "email" => Self::Email,
            "copyright" => Self::Copyright,
            "link" => Self::Link,
            "bounds" => Self::Bounds,
            "rte" => Self::Route,
            "trk" => Self::Track,
            "trkseg" => Self::TrackSegment,
            "wpt" | "trkpt" | "rtept" => Self::Waypoint,
            "ele" | "magvar" | "geoidheight" | "hdop" | "vdop" | "pdop" | "ageofdgpsdata"
            | "course" | "speed" => DECIMAL,
            "time" => DATE,
            "year" => YEAR,
            "number" | "sat" | "dgpsid" => INTEGER,
            "name" | "cmt" | "desc" | "src" | "sym" | "type" | "fix" | "keywords" | "license"
            | "text" => STRING,
            _ => return None,
        };
        Some(kind)
    }
}

/// Resolve the kind of a `tag` element appearing inside a `defining` element.
///
/// Never fails: unresolvable names come back as [`ElementKind::Opaque`].
pub fn class_for(tag: &str, defining: ElementKind) -> ElementKind {
    let start = defining.schema();
    if start == Schema::Opaque {
        return ElementKind::Opaque;
    }

    let mut schema = Some(start);
    while let Some(current) = schema {
        if let Some((_, kind)) = current.table().iter().find(|(name, _)| *name == tag) {
            return *kind;
        }
        schema = current.supertype();
    }

    ElementKind::from_tag_name(tag).unwrap_or(ElementKind::Opaque)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_table() {
        assert_eq!(class_for("trk", ElementKind::Gpx), ElementKind::Track);
        assert_eq!(
            class_for("trkseg", ElementKind::Track),
            ElementKind::TrackSegment
        );
        assert_eq!(
            class_for("trkpt", ElementKind::TrackSegment),
            ElementKind::Waypoint
        );
        assert_eq!(class_for("gpx", ElementKind::Document), ElementKind::Gpx);
    }

    #[test]
    fn test_supertype_table() {
        assert_eq!(class_for("link", ElementKind::Track), ElementKind::Link);
        assert_eq!(class_for("name", ElementKind::Waypoint), STRING);
        assert_eq!(class_for("number", ElementKind::Route), INTEGER);
        assert_eq!(class_for("extensions", ElementKind::Track), ElementKind::Opaque);
    }

    #[test]
    fn test_nearest_declaration_wins() {
        // Waypoint declares <time> itself; Described never sees it.
        assert_eq!(class_for("time", ElementKind::Waypoint), DATE);
        assert_eq!(class_for("type", ElementKind::Link), STRING);
        assert_eq!(class_for("year", ElementKind::Copyright), YEAR);
        assert_eq!(class_for("email", ElementKind::Person), ElementKind::Email);
    }

    #[test]
    fn test_name_derived_default() {
        // GPX 1.0 allows <time> directly under <gpx>.
        assert_eq!(class_for("time", ElementKind::Gpx), DATE);
        assert_eq!(class_for("bounds", ElementKind::Track), ElementKind::Bounds);
    }

    #[test]
    fn test_unknown_is_opaque() {
        assert_eq!(class_for("foo", ElementKind::TrackSegment), ElementKind::Opaque);
        assert_eq!(
            class_for("gpxtpx:hr", ElementKind::Waypoint),
            ElementKind::Opaque
        );
    }

    #[test]
    fn test_opaque_content_stays_opaque() {
        assert_eq!(class_for("ele", ElementKind::Opaque), ElementKind::Opaque);
        assert_eq!(class_for("trkpt", ElementKind::Opaque), ElementKind::Opaque);
    }

    #[test]
    fn test_leaf_flags() {
        assert!(DECIMAL.is_leaf_text());
        assert!(!ElementKind::Waypoint.is_leaf_text());
        assert_eq!(ElementKind::TrackSegment.cached_views(), &["trkpt"]);
        assert_eq!(ElementKind::Waypoint.decimal_attributes(), &["lat", "lon"]);
        assert!(ElementKind::Opaque.decimal_attributes().is_empty());
    }
}
