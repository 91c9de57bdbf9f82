//! Typed GPX layer over the generic element tree.
//!
//! [`GpxDocument`] owns a [`Document`] whose root is `<gpx>` and hands out
//! small `Copy` handles ([`Track`], [`TrackSegment`], [`Waypoint`], [`Route`])
//! that name slots in it. Listing operations go through the memoized child
//! views, so asking for the last track point of a growing segment is cheap.

use std::io::BufRead;
use std::marker::PhantomData;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::builder::{parse_reader, parse_str};
use crate::codec::{DEFAULT_DECIMAL_PRECISION, LeafValue, decode_decimal, encode_decimal};
use crate::error::{GpxError, Result};
use crate::node::{Document, NodeId};
use crate::options::RecorderOptions;
use crate::registry::ElementKind;
use crate::serializer::RenderOptions;

pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";

/// A typed reference to one element of a [`GpxDocument`].
pub trait NodeHandle: Copy {
    fn from_node(id: NodeId) -> Self;
    fn id(self) -> NodeId;
}

macro_rules! node_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NodeId);

        impl NodeHandle for $name {
            fn from_node(id: NodeId) -> Self {
                Self(id)
            }

            fn id(self) -> NodeId {
                self.0
            }
        }
    };
}

node_handle!(
    /// `<trk>`
    Track
);
node_handle!(
    /// `<trkseg>`
    TrackSegment
);
node_handle!(
    /// `<wpt>`, `<trkpt>` or `<rtept>`
    Waypoint
);
node_handle!(
    /// `<rte>`
    Route
);

/// Snapshot of a memoized child view.
#[derive(Debug, Clone)]
pub struct Nodes<T> {
    ids: Rc<[NodeId]>,
    marker: PhantomData<T>,
}

impl<T: NodeHandle> Nodes<T> {
    fn new(ids: Rc<[NodeId]>) -> Self {
        Self {
            ids,
            marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.ids.get(index).copied().map(T::from_node)
    }

    pub fn first(&self) -> Option<T> {
        self.ids.first().copied().map(T::from_node)
    }

    pub fn last(&self) -> Option<T> {
        self.ids.last().copied().map(T::from_node)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.ids.iter().copied().map(T::from_node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One position report. Every field but the coordinates may be missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fix {
    pub coordinates: Coordinates,
    /// Meters above sea level.
    pub elevation: Option<f64>,
    /// Written as `<hdop>`.
    pub horizontal_accuracy: Option<f64>,
    /// Written as `<vdop>`.
    pub vertical_accuracy: Option<f64>,
    /// Degrees from true north, written as `<course>`.
    pub heading: Option<f64>,
    /// Meters per second. Feeds the statistics only; GPX 1.1 has no slot for it.
    pub speed: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            coordinates: Coordinates::new(latitude, longitude),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Bounds {
    pub fn from_point(c: Coordinates) -> Self {
        Self {
            min_lat: c.latitude,
            min_lon: c.longitude,
            max_lat: c.latitude,
            max_lon: c.longitude,
        }
    }

    pub fn extend(&mut self, c: Coordinates) {
        self.min_lat = self.min_lat.min(c.latitude);
        self.min_lon = self.min_lon.min(c.longitude);
        self.max_lat = self.max_lat.max(c.latitude);
        self.max_lon = self.max_lon.max(c.longitude);
    }

    pub fn contains(&self, c: Coordinates) -> bool {
        (self.min_lat..=self.max_lat).contains(&c.latitude)
            && (self.min_lon..=self.max_lon).contains(&c.longitude)
    }
}

/// A GPX link element.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub href: String,
    pub text: Option<String>,
    pub link_type: Option<String>,
}

#[derive(Debug)]
pub struct GpxDocument {
    doc: Document,
    decimal_precision: usize,
}

impl GpxDocument {
    /// An empty GPX 1.1 document.
    pub fn new(creator: &str) -> Self {
        Self::with_options(&RecorderOptions {
            creator: creator.to_string(),
            ..Default::default()
        })
    }

    /// An empty document carrying the root attributes `options` asks for.
    /// Metadata is left to the caller.
    pub fn with_options(options: &RecorderOptions) -> Self {
        let mut doc = Document::new("gpx");
        let root = doc.root();
        if options.include_namespace {
            doc.set_attribute(root, "xmlns", GPX_NAMESPACE);
        }
        doc.set_attribute(root, "version", options.version.as_str());
        doc.set_attribute(root, "creator", options.creator.as_str());
        Self {
            doc,
            decimal_precision: options.decimal_precision,
        }
    }

    pub fn parse(xml: &str) -> Result<Self> {
        Self::from_document(parse_str(xml)?)
    }

    pub fn parse_reader<R: BufRead>(source: R) -> Result<Self> {
        Self::from_document(parse_reader(source)?)
    }

    /// Wrap a parsed tree, which must have a `<gpx>` root.
    pub fn from_document(doc: Document) -> Result<Self> {
        let root = &doc[doc.root()];
        if root.kind() != ElementKind::Gpx {
            return Err(GpxError::UnexpectedRoot {
                expected: "gpx",
                found: root.name().to_string(),
            });
        }
        Ok(Self {
            doc,
            decimal_precision: DEFAULT_DECIMAL_PRECISION,
        })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    pub fn root(&self) -> NodeId {
        self.doc.root()
    }

    pub fn version(&self) -> Option<&str> {
        self.doc[self.root()].attribute("version")
    }

    pub fn creator(&self) -> Option<&str> {
        self.doc[self.root()].attribute("creator")
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            decimal_precision: self.decimal_precision,
            ..Default::default()
        }
    }

    pub fn to_xml_string(&self) -> Result<String> {
        self.doc.to_xml_string_with(self.render_options())
    }

    // Metadata

    pub fn metadata(&self) -> Option<NodeId> {
        self.doc.first_child_named(self.root(), "metadata")
    }

    /// Fill `<metadata>`, creating it as the first child of the root.
    pub fn set_metadata(&mut self, name: Option<&str>, time: Option<DateTime<Utc>>) -> Result<NodeId> {
        let metadata = match self.metadata() {
            Some(id) => id,
            None => {
                let id = self.doc.create_child_element(ElementKind::Gpx, "metadata");
                let root = self.root();
                self.doc.attach(root, id, 0);
                id
            }
        };
        if let Some(name) = name {
            self.set_leaf(metadata, "name", LeafValue::String(name.to_string()))?;
        }
        if let Some(time) = time {
            self.set_leaf(metadata, "time", LeafValue::Date(time))?;
        }
        Ok(metadata)
    }

    /// Name of the document, from `<metadata>`.
    pub fn document_name(&self) -> Option<&str> {
        self.string_field(self.metadata()?, "name")
    }

    /// `<metadata><time>`, or the GPX 1.0 `<time>` directly under the root.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.metadata()
            .and_then(|m| self.leaf(m, "time"))
            .or_else(|| self.leaf(self.root(), "time"))
            .and_then(LeafValue::as_date)
    }

    /// `<metadata><bounds>` as declared in the file.
    pub fn declared_bounds(&self) -> Option<Bounds> {
        let bounds = self.doc.first_child_named(self.metadata()?, "bounds")?;
        let element = &self.doc[bounds];
        let attr = |key| element.attribute(key).and_then(decode_decimal);
        Some(Bounds {
            min_lat: attr("minlat")?,
            min_lon: attr("minlon")?,
            max_lat: attr("maxlat")?,
            max_lon: attr("maxlon")?,
        })
    }

    // Tracks

    pub fn tracks(&self) -> Nodes<Track> {
        Nodes::new(self.doc.children_named(self.root(), "trk"))
    }

    pub fn first_track(&self) -> Option<Track> {
        self.doc.first_child_named(self.root(), "trk").map(Track)
    }

    pub fn last_track(&self) -> Option<Track> {
        self.doc.last_child_named(self.root(), "trk").map(Track)
    }

    pub fn add_track(&mut self) -> Result<Track> {
        let root = self.root();
        let trk = self.doc.create_child_element(ElementKind::Gpx, "trk");
        self.doc.add_child(root, trk)?;
        Ok(Track(trk))
    }

    pub fn track_segments(&self, track: Track) -> Nodes<TrackSegment> {
        Nodes::new(self.doc.children_named(track.0, "trkseg"))
    }

    pub fn first_track_segment(&self, track: Track) -> Option<TrackSegment> {
        self.doc.first_child_named(track.0, "trkseg").map(TrackSegment)
    }

    pub fn last_track_segment(&self, track: Track) -> Option<TrackSegment> {
        self.doc.last_child_named(track.0, "trkseg").map(TrackSegment)
    }

    pub fn add_track_segment(&mut self, track: Track) -> Result<TrackSegment> {
        let seg = self.doc.create_child_element(ElementKind::Track, "trkseg");
        self.doc.add_child(track.0, seg)?;
        Ok(TrackSegment(seg))
    }

    pub fn remove_all_track_segments(&mut self, track: Track) -> usize {
        self.doc.remove_children_named(track.0, "trkseg")
    }

    pub fn track_points(&self, segment: TrackSegment) -> Nodes<Waypoint> {
        Nodes::new(self.doc.children_named(segment.0, "trkpt"))
    }

    pub fn first_track_point(&self, segment: TrackSegment) -> Option<Waypoint> {
        self.doc.first_child_named(segment.0, "trkpt").map(Waypoint)
    }

    pub fn last_track_point(&self, segment: TrackSegment) -> Option<Waypoint> {
        self.doc.last_child_named(segment.0, "trkpt").map(Waypoint)
    }

    pub fn add_track_point(&mut self, segment: TrackSegment, fix: &Fix) -> Result<Waypoint> {
        let pt = self.build_point(ElementKind::TrackSegment, "trkpt", fix)?;
        self.doc.add_child(segment.0, pt)?;
        Ok(Waypoint(pt))
    }

    pub fn remove_all_track_points(&mut self, segment: TrackSegment) -> usize {
        self.doc.remove_children_named(segment.0, "trkpt")
    }

    /// Track points of every segment of every track, in document order.
    pub fn all_track_points(&self) -> Vec<Waypoint> {
        let mut points = Vec::new();
        for track in self.tracks().iter() {
            for segment in self.track_segments(track).iter() {
                points.extend(self.track_points(segment).iter());
            }
        }
        points
    }

    /// Bounding box of all track points with readable coordinates.
    pub fn compute_bounds(&self) -> Option<Bounds> {
        self.all_track_points()
            .into_iter()
            .filter_map(|pt| self.coordinates(pt))
            .fold(None, |bounds: Option<Bounds>, c| match bounds {
                Some(mut b) => {
                    b.extend(c);
                    Some(b)
                }
                None => Some(Bounds::from_point(c)),
            })
    }

    // Waypoints and routes

    pub fn waypoints(&self) -> Nodes<Waypoint> {
        Nodes::new(self.doc.children_named(self.root(), "wpt"))
    }

    pub fn add_waypoint(&mut self, fix: &Fix) -> Result<Waypoint> {
        let root = self.root();
        let wpt = self.build_point(ElementKind::Gpx, "wpt", fix)?;
        self.doc.add_child(root, wpt)?;
        Ok(Waypoint(wpt))
    }

    pub fn routes(&self) -> Nodes<Route> {
        Nodes::new(self.doc.children_named(self.root(), "rte"))
    }

    pub fn route_points(&self, route: Route) -> Nodes<Waypoint> {
        Nodes::new(self.doc.children_named(route.0, "rtept"))
    }

    // Fields shared by tracks, routes and waypoints

    pub fn name(&self, item: impl NodeHandle) -> Option<&str> {
        self.string_field(item.id(), "name")
    }

    pub fn set_name(&mut self, item: impl NodeHandle, name: &str) -> Result<()> {
        self.set_leaf(item.id(), "name", LeafValue::String(name.to_string()))
    }

    pub fn comment(&self, item: impl NodeHandle) -> Option<&str> {
        self.string_field(item.id(), "cmt")
    }

    pub fn description(&self, item: impl NodeHandle) -> Option<&str> {
        self.string_field(item.id(), "desc")
    }

    pub fn source(&self, item: impl NodeHandle) -> Option<&str> {
        self.string_field(item.id(), "src")
    }

    pub fn item_type(&self, item: impl NodeHandle) -> Option<&str> {
        self.string_field(item.id(), "type")
    }

    pub fn number(&self, item: impl NodeHandle) -> Option<i64> {
        self.leaf(item.id(), "number").and_then(LeafValue::as_integer)
    }

    pub fn link(&self, item: impl NodeHandle) -> Option<Link> {
        let link = self.doc.first_child_named(item.id(), "link")?;
        Some(Link {
            href: self.doc[link].attribute("href")?.to_string(),
            text: self.string_field(link, "text").map(str::to_string),
            link_type: self.string_field(link, "type").map(str::to_string),
        })
    }

    /// Append an empty `<extensions>` element for vendor data.
    pub fn add_extensions(&mut self, item: impl NodeHandle) -> Result<NodeId> {
        let extensions = self.doc.create_element("extensions", ElementKind::Opaque);
        self.doc.add_child(item.id(), extensions)?;
        Ok(extensions)
    }

    // Point fields

    /// `lat`/`lon` attributes, `None` when either is missing or unreadable.
    pub fn coordinates(&self, point: Waypoint) -> Option<Coordinates> {
        let element = &self.doc[point.0];
        let latitude = element.attribute("lat").and_then(decode_decimal)?;
        let longitude = element.attribute("lon").and_then(decode_decimal)?;
        Some(Coordinates::new(latitude, longitude))
    }

    pub fn elevation(&self, point: Waypoint) -> Option<f64> {
        self.decimal_field(point.0, "ele")
    }

    pub fn time(&self, point: Waypoint) -> Option<DateTime<Utc>> {
        self.leaf(point.0, "time").and_then(LeafValue::as_date)
    }

    pub fn heading(&self, point: Waypoint) -> Option<f64> {
        self.decimal_field(point.0, "course")
    }

    pub fn speed(&self, point: Waypoint) -> Option<f64> {
        self.decimal_field(point.0, "speed")
    }

    pub fn horizontal_accuracy(&self, point: Waypoint) -> Option<f64> {
        self.decimal_field(point.0, "hdop")
    }

    pub fn vertical_accuracy(&self, point: Waypoint) -> Option<f64> {
        self.decimal_field(point.0, "vdop")
    }

    pub fn symbol(&self, point: Waypoint) -> Option<&str> {
        self.string_field(point.0, "sym")
    }

    /// Everything a point records, if its coordinates are readable.
    pub fn fix(&self, point: Waypoint) -> Option<Fix> {
        Some(Fix {
            coordinates: self.coordinates(point)?,
            elevation: self.elevation(point),
            horizontal_accuracy: self.horizontal_accuracy(point),
            vertical_accuracy: self.vertical_accuracy(point),
            heading: self.heading(point),
            speed: self.speed(point),
            time: self.time(point),
        })
    }

    fn build_point(&mut self, defining: ElementKind, tag: &str, fix: &Fix) -> Result<NodeId> {
        let pt = self.doc.create_child_element(defining, tag);
        let precision = self.decimal_precision;
        let c = fix.coordinates;
        self.doc.set_attribute(pt, "lat", encode_decimal(c.latitude, precision));
        self.doc.set_attribute(pt, "lon", encode_decimal(c.longitude, precision));

        let fields = [
            ("ele", fix.elevation.map(LeafValue::Decimal)),
            ("time", fix.time.map(LeafValue::Date)),
            ("course", fix.heading.map(LeafValue::Decimal)),
            ("hdop", fix.horizontal_accuracy.map(LeafValue::Decimal)),
            ("vdop", fix.vertical_accuracy.map(LeafValue::Decimal)),
        ];
        for (tag, value) in fields {
            if let Some(value) = value {
                let leaf = self.doc.create_leaf(tag, value);
                self.doc.add_child(pt, leaf)?;
            }
        }
        Ok(pt)
    }

    fn leaf(&self, parent: NodeId, tag: &str) -> Option<&LeafValue> {
        let id = self.doc.first_child_named(parent, tag)?;
        self.doc[id].value()
    }

    fn string_field(&self, parent: NodeId, tag: &str) -> Option<&str> {
        self.leaf(parent, tag).and_then(LeafValue::as_str)
    }

    fn decimal_field(&self, parent: NodeId, tag: &str) -> Option<f64> {
        self.leaf(parent, tag).and_then(LeafValue::as_decimal)
    }

    fn set_leaf(&mut self, parent: NodeId, tag: &str, value: LeafValue) -> Result<()> {
        match self.doc.first_child_named(parent, tag) {
            Some(id) => self.doc.set_value(id, value),
            None => {
                let leaf = self.doc.create_leaf(tag, value);
                self.doc.add_child(parent, leaf)
            }
        }
    }
}
