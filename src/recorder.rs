//! A recording in progress, persisted one fix at a time.
//!
//! The session writes the root, metadata, track and segment start tags once,
//! then appends one rendered `<trkpt>` per fix. End tags are only written on
//! pause (segment) and finish (everything still open). A session that never
//! finishes leaves a file the recovery module can close.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{GpxError, Result};
use crate::gpx::{Fix, GpxDocument, NodeHandle, Track, TrackSegment, Waypoint};
use crate::options::RecorderOptions;
use crate::serializer::RenderOptions;
use crate::stats::RecordingStats;
use crate::stream::StreamWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Recording,
    Paused,
    Stopped,
}

impl RecordState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

/// What is left once a session has been closed cleanly.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedRecording {
    pub path: PathBuf,
    pub stats: RecordingStats,
}

#[derive(Debug)]
pub struct RecordingSession {
    path: PathBuf,
    gpx: GpxDocument,
    writer: StreamWriter<File>,
    track: Track,
    segment: TrackSegment,
    state: RecordState,
    stats: RecordingStats,
    sync_each_fix: bool,
}

impl RecordingSession {
    /// Create (or truncate) `path` and write the document prologue.
    pub fn start(path: impl AsRef<Path>, options: &RecorderOptions) -> Result<Self> {
        Self::start_at(path, options, Utc::now())
    }

    /// Like [`start`](Self::start) with an explicit start time for the metadata.
    pub fn start_at(
        path: impl AsRef<Path>,
        options: &RecorderOptions,
        started: DateTime<Utc>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;

        let mut gpx = GpxDocument::with_options(options);
        if options.write_metadata {
            gpx.set_metadata(options.recording_name.as_deref(), Some(started))?;
        }
        let track = gpx.add_track()?;
        let segment = gpx.add_track_segment(track)?;

        let mut writer = StreamWriter::new(file, RenderOptions::from(options));
        let doc = gpx.document();
        writer.write_declaration()?;
        writer.open_tag(doc, gpx.root())?;
        if let Some(metadata) = gpx.metadata() {
            writer.write_child(doc, metadata)?;
        }
        writer.open_tag(doc, track.id())?;
        writer.open_tag(doc, segment.id())?;
        writer.flush()?;

        let mut stats = RecordingStats::new();
        stats.begin_segment();
        tracing::debug!(path = %path.display(), "recording started");

        Ok(Self {
            path,
            gpx,
            writer,
            track,
            segment,
            state: RecordState::Recording,
            stats,
            sync_each_fix: options.sync_each_fix,
        })
    }

    /// Append one fix to the open segment, on disk and in memory.
    pub fn record(&mut self, fix: &Fix) -> Result<Waypoint> {
        self.require(RecordState::Recording, "record a fix")?;
        let point = self.gpx.add_track_point(self.segment, fix)?;
        self.writer.write_child(self.gpx.document(), point.id())?;
        if self.sync_each_fix {
            self.writer.get_ref().sync_data()?;
        }
        self.stats.absorb(fix);
        Ok(point)
    }

    /// Close the current segment. Fixes are refused until [`resume`](Self::resume).
    pub fn pause(&mut self) -> Result<()> {
        self.require(RecordState::Recording, "pause")?;
        self.writer.close_tag(self.gpx.document())?;
        self.writer.flush()?;
        self.stats.record_pause();
        self.state = RecordState::Paused;
        tracing::debug!(points = self.stats.point_count, "segment closed");
        Ok(())
    }

    /// Open a new segment in the same track.
    pub fn resume(&mut self) -> Result<()> {
        self.require(RecordState::Paused, "resume")?;
        let segment = self.gpx.add_track_segment(self.track)?;
        self.writer.open_tag(self.gpx.document(), segment.id())?;
        self.writer.flush()?;
        self.segment = segment;
        self.stats.begin_segment();
        self.state = RecordState::Recording;
        tracing::debug!(segments = self.stats.segment_count, "segment opened");
        Ok(())
    }

    /// Write every missing end tag and sync the file.
    pub fn finish(mut self) -> Result<FinishedRecording> {
        self.writer.close_all(self.gpx.document())?;
        self.writer.get_ref().sync_all()?;
        self.state = RecordState::Stopped;
        tracing::debug!(
            path = %self.path.display(),
            points = self.stats.point_count,
            "recording finished"
        );
        Ok(FinishedRecording {
            path: std::mem::take(&mut self.path),
            stats: std::mem::take(&mut self.stats),
        })
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn stats(&self) -> &RecordingStats {
        &self.stats
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory mirror of what has been written.
    pub fn document(&self) -> &GpxDocument {
        &self.gpx
    }

    pub fn track(&self) -> Track {
        self.track
    }

    pub fn current_segment(&self) -> TrackSegment {
        self.segment
    }

    fn require(&self, expected: RecordState, action: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(GpxError::InvalidState {
                action,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.state != RecordState::Stopped {
            tracing::warn!(
                path = %self.path.display(),
                state = self.state.as_str(),
                "recording dropped without finish, file left without end tags"
            );
        }
    }
}
