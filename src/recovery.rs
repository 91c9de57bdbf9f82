//! Unclean-exit detection and repair of truncated recordings.
//!
//! An [`ExitWitness`] file exists for as long as the process may be writing a
//! recording; it is removed on clean shutdown. Finding one at startup means the
//! last recording may stop mid-document. Such a file is cut back to its last
//! complete tag and the end tags of every still-open element are appended.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;
use tempfile::NamedTempFile;

use crate::error::{GpxError, Result};
use crate::gpx::GpxDocument;
use crate::registry::{ElementKind, class_for};

/// Marker file whose presence at startup signals an unclean exit.
#[derive(Debug)]
pub struct ExitWitness {
    path: PathBuf,
}

/// How the previous process ended, as told by the witness file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviousExit {
    Clean,
    /// The witness was still there. `recording` is the file that was being
    /// written, if one was registered.
    Unclean { recording: Option<PathBuf> },
}

impl ExitWitness {
    /// Read what the previous process left at `path`, then create a fresh,
    /// empty witness there.
    pub fn arm(path: impl Into<PathBuf>) -> Result<(Self, PreviousExit)> {
        let path = path.into();
        let previous = match fs::read_to_string(&path) {
            Ok(content) => {
                let recording = content.trim();
                PreviousExit::Unclean {
                    recording: (!recording.is_empty()).then(|| PathBuf::from(recording)),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => PreviousExit::Clean,
            Err(e) => return Err(e.into()),
        };
        fs::write(&path, "")?;
        tracing::debug!(path = %path.display(), ?previous, "exit witness armed");
        Ok((Self { path }, previous))
    }

    /// Register the recording currently being written.
    pub fn mark_recording(&self, recording: &Path) -> Result<()> {
        fs::write(&self.path, recording.to_string_lossy().as_bytes())?;
        Ok(())
    }

    /// The registered recording was finished cleanly.
    pub fn clear_recording(&self) -> Result<()> {
        fs::write(&self.path, "")?;
        Ok(())
    }

    /// Remove the witness on clean shutdown.
    pub fn disarm(self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of inspecting a possibly truncated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    AlreadyComplete,
    /// Keep the first `keep` bytes and append `closing`.
    Repaired { keep: usize, closing: String },
}

impl Repair {
    /// Apply to the text the repair was computed from.
    pub fn apply(&self, xml: &str) -> String {
        match self {
            Self::AlreadyComplete => xml.to_string(),
            Self::Repaired { keep, closing } => {
                let mut repaired = String::with_capacity(keep + closing.len());
                repaired.push_str(&xml[..*keep]);
                repaired.push_str(closing);
                repaired
            }
        }
    }
}

/// An element still open at the point of truncation.
struct OpenTag {
    name: String,
    kind: ElementKind,
    /// Where the text ends if this element is dropped along with its start tag.
    before: usize,
}

/// Work out the minimal repair for a document whose tail may be missing.
///
/// Anything after the last complete tag (a partial tag or partial text) is
/// dropped, then every element still open there is closed, innermost first.
/// A text-valued element left open is dropped whole, start tag included.
/// Damage that is not a clean truncation is an error.
pub fn repair_truncated(xml: &str) -> Result<Repair> {
    let mut reader = Reader::from_str(xml);
    let mut open: Vec<OpenTag> = Vec::new();
    let mut saw_root = false;
    let mut last_tag_end = 0;

    loop {
        let event = reader.read_event();
        let position = usize::try_from(reader.buffer_position()).unwrap_or(xml.len());
        match event {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().0).into_owned();
                let parent = open.last().map_or(ElementKind::Document, |tag| tag.kind);
                open.push(OpenTag {
                    kind: class_for(&name, parent),
                    name,
                    before: last_tag_end,
                });
                saw_root = true;
                last_tag_end = position;
            }
            Ok(Event::End(_)) => {
                open.pop();
                last_tag_end = position;
            }
            Ok(Event::Empty(_)) => {
                saw_root = true;
                last_tag_end = position;
            }
            Ok(Event::Text(_) | Event::CData(_) | Event::GeneralRef(_)) => {}
            Ok(Event::Eof) => break,
            Ok(_) => last_tag_end = position,
            Err(e) => {
                let tail = &xml[last_tag_end.min(xml.len())..];
                if tail.contains('>') {
                    return Err(e.into());
                }
                tracing::debug!(cut = tail.len(), "dropping partial tag at end of file");
                break;
            }
        }
    }

    if !saw_root {
        return Err(GpxError::MissingRoot);
    }
    if open.is_empty() {
        return Ok(Repair::AlreadyComplete);
    }
    if open.last().is_some_and(|tag| tag.kind.is_leaf_text()) {
        if let Some(leaf) = open.pop() {
            tracing::debug!(element = %leaf.name, "dropping unfinished value");
            last_tag_end = leaf.before;
        }
    }

    let mut closing = String::new();
    for (depth, tag) in open.iter().enumerate().rev() {
        closing.push('\n');
        closing.push_str(&"\t".repeat(depth));
        closing.push_str("</");
        closing.push_str(&tag.name);
        closing.push('>');
    }
    closing.push('\n');
    Ok(Repair::Repaired {
        keep: last_tag_end,
        closing,
    })
}

/// Repair `xml` and return the completed text.
pub fn repair_text(xml: &str) -> Result<String> {
    Ok(repair_truncated(xml)?.apply(xml))
}

/// Repair the recording at `path` in place and check that it now parses.
///
/// The file is only replaced once the repaired text parses. Any failure,
/// including a repair that still does not parse, is reported as
/// [`GpxError::Unrecoverable`] for that path and leaves the file untouched.
pub fn repair_file(path: &Path) -> Result<Repair> {
    repair_file_in_place(path).map_err(|source| GpxError::Unrecoverable {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

fn repair_file_in_place(path: &Path) -> Result<Repair> {
    let bytes = fs::read(path)?;
    let xml = match std::str::from_utf8(&bytes) {
        Ok(xml) => xml,
        // A multi-byte character cut in half at the very end
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&bytes[..e.valid_up_to()])?,
        Err(e) => return Err(e.into()),
    };

    let repair = repair_truncated(xml)?;
    if repair == Repair::AlreadyComplete && xml.len() == bytes.len() {
        GpxDocument::parse(xml)?;
        return Ok(repair);
    }

    let repaired = repair.apply(xml);
    GpxDocument::parse(&repaired)?;
    replace_contents(path, repaired.as_bytes())?;
    tracing::info!(path = %path.display(), ?repair, "recording repaired");
    Ok(repair)
}

/// Swap in `contents` through a synced temp file renamed over `path`.
fn replace_contents(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// What startup recovery found and did.
#[derive(Debug)]
pub enum Recovery {
    CleanExit,
    /// Unclean exit with no recording in progress.
    NothingToRepair,
    Repaired { path: PathBuf, repair: Repair },
    /// The recording could not be made readable. Holds
    /// [`GpxError::Unrecoverable`].
    Lost(GpxError),
}

/// Arm the witness at `witness_path` and repair whatever recording the
/// previous process left open.
pub fn recover_after_unclean_exit(witness_path: impl Into<PathBuf>) -> Result<(ExitWitness, Recovery)> {
    let (witness, previous) = ExitWitness::arm(witness_path)?;
    let recovery = match previous {
        PreviousExit::Clean => Recovery::CleanExit,
        PreviousExit::Unclean { recording: None } => {
            tracing::info!("unclean exit, no recording was in progress");
            Recovery::NothingToRepair
        }
        PreviousExit::Unclean {
            recording: Some(path),
        } => match repair_file(&path) {
            Ok(repair) => Recovery::Repaired { path, repair },
            Err(e) => {
                tracing::info!(error = %e, "recording lost after unclean exit");
                // Arming cleared the witness; keep the recording registered.
                witness.mark_recording(&path)?;
                Recovery::Lost(e)
            }
        },
    };
    Ok((witness, recovery))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUNCATED: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
        <gpx version=\"1.1\" creator=\"t\">\n\
        \t<trk>\n\
        \t\t<trkseg>\n\
        \t\t\t<trkpt lat=\"1.0\" lon=\"2.0\"/>\n\
        \t\t\t<trkpt lat=\"1.1\" lon=\"2.1\"/>\n";

    fn point_count(xml: &str) -> usize {
        let gpx = GpxDocument::parse(xml).unwrap();
        let seg = gpx
            .first_track()
            .and_then(|t| gpx.first_track_segment(t))
            .unwrap();
        gpx.track_points(seg).len()
    }

    #[test]
    fn test_missing_end_tags_are_appended() {
        let repair = repair_truncated(TRUNCATED).unwrap();
        let Repair::Repaired { keep, closing } = &repair else {
            panic!("expected a repair, got {repair:?}");
        };
        assert_eq!(closing, "\n\t\t</trkseg>\n\t</trk>\n</gpx>\n");
        assert!(TRUNCATED[..*keep].ends_with("/>"));
        assert_eq!(point_count(&repair.apply(TRUNCATED)), 2);
    }

    #[test]
    fn test_partial_tag_is_cut() {
        let cut = format!("{TRUNCATED}\t\t\t<trkpt lat=\"1.2\" lo");
        let repaired = repair_text(&cut).unwrap();
        assert!(!repaired.contains("1.2"));
        assert_eq!(point_count(&repaired), 2);
    }

    #[test]
    fn test_partial_text_is_cut() {
        let cut = format!("{TRUNCATED}\t\t\t<trkpt lat=\"1.2\" lon=\"2.2\"><ele>12.");
        let repair = repair_truncated(&cut).unwrap();
        let Repair::Repaired { keep, closing } = &repair else {
            panic!("expected a repair, got {repair:?}");
        };
        assert!(cut[..*keep].ends_with("lon=\"2.2\">"));
        assert!(closing.starts_with("\n\t\t\t</trkpt>"));

        let repaired = repair.apply(&cut);
        assert!(!repaired.contains("<ele>"));
        assert_eq!(point_count(&repaired), 3);
        let gpx = GpxDocument::parse(&repaired).unwrap();
        assert_eq!(gpx.document().invalid_leaves().count(), 0);
    }

    #[test]
    fn test_value_cut_inside_end_tag_is_dropped() {
        let cut = format!("{TRUNCATED}\t\t\t<trkpt lat=\"1.2\" lon=\"2.2\"><time>2025-01-01T00:00:00Z</ti");
        let repaired = repair_text(&cut).unwrap();
        assert!(!repaired.contains("<time>"));
        assert_eq!(point_count(&repaired), 3);
    }

    #[test]
    fn test_just_opened_leaf_is_dropped() {
        let cut = format!("{TRUNCATED}\t\t\t<trkpt lat=\"1.2\" lon=\"2.2\">\n\t\t\t\t<ele>");
        let repaired = repair_text(&cut).unwrap();
        assert!(!repaired.contains("<ele>"));
        let gpx = GpxDocument::parse(&repaired).unwrap();
        assert_eq!(gpx.document().invalid_leaves().count(), 0);
    }

    #[test]
    fn test_partial_end_tag_is_cut() {
        let cut = format!("{TRUNCATED}\t\t</trkse");
        assert_eq!(point_count(&repair_text(&cut).unwrap()), 2);
    }

    #[test]
    fn test_complete_document_is_left_alone() {
        let xml = "<gpx><trk></trk></gpx>\n";
        assert_eq!(repair_truncated(xml).unwrap(), Repair::AlreadyComplete);
        assert_eq!(repair_text(xml).unwrap(), xml);
    }

    #[test]
    fn test_corruption_is_not_truncation() {
        assert!(repair_truncated("<gpx><trk></trkseg><trk>").is_err());
        assert!(matches!(repair_truncated(""), Err(GpxError::MissingRoot)));
    }

    #[test]
    fn test_witness_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let witness_path = dir.path().join("running");

        let (witness, previous) = ExitWitness::arm(&witness_path).unwrap();
        assert_eq!(previous, PreviousExit::Clean);
        assert!(witness_path.exists());

        let recording = dir.path().join("ride.gpx");
        witness.mark_recording(&recording).unwrap();
        drop(witness);

        let (witness, previous) = ExitWitness::arm(&witness_path).unwrap();
        assert_eq!(
            previous,
            PreviousExit::Unclean {
                recording: Some(recording)
            }
        );
        witness.disarm().unwrap();
        assert!(!witness_path.exists());

        let (witness, _) = ExitWitness::arm(&witness_path).unwrap();
        drop(witness);
        let (_, previous) = ExitWitness::arm(&witness_path).unwrap();
        assert_eq!(previous, PreviousExit::Unclean { recording: None });
    }

    #[test]
    fn test_repair_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ride.gpx");
        fs::write(&path, format!("{TRUNCATED}\t\t\t<trkpt la")).unwrap();

        let repair = repair_file(&path).unwrap();
        assert!(matches!(repair, Repair::Repaired { .. }));
        assert_eq!(point_count(&fs::read_to_string(&path).unwrap()), 2);

        assert_eq!(repair_file(&path).unwrap(), Repair::AlreadyComplete);
    }

    #[test]
    fn test_repair_file_reports_unrecoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ride.gpx");
        fs::write(&path, "<gpx><trk></trkseg>\n").unwrap();
        let err = repair_file(&path).unwrap_err();
        assert!(matches!(err, GpxError::Unrecoverable { path: ref p, .. } if *p == path));
        assert_eq!(fs::read_to_string(&path).unwrap(), "<gpx><trk></trkseg>\n");

        let missing = dir.path().join("missing.gpx");
        assert!(matches!(
            repair_file(&missing),
            Err(GpxError::Unrecoverable { .. })
        ));
    }

    #[test]
    fn test_failed_repair_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ride.gpx");
        let damaged = "<gpx></gpx><gpx><trk><trkseg><trkpt lat=\"1\" lon=\"2\"><ele>12.";
        fs::write(&path, damaged).unwrap();

        assert!(matches!(
            repair_file(&path),
            Err(GpxError::Unrecoverable { .. })
        ));
        assert_eq!(fs::read(&path).unwrap(), damaged.as_bytes());
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_lost_recording_stays_registered() {
        let dir = tempfile::tempdir().unwrap();
        let witness_path = dir.path().join("running");
        let recording = dir.path().join("ride.gpx");
        fs::write(&recording, "<gpx><trk></trkseg>").unwrap();
        fs::write(&witness_path, recording.to_string_lossy().as_bytes()).unwrap();

        let (witness, recovery) = recover_after_unclean_exit(&witness_path).unwrap();
        assert!(matches!(recovery, Recovery::Lost(GpxError::Unrecoverable { .. })));
        assert_eq!(
            fs::read_to_string(witness.path()).unwrap(),
            recording.to_string_lossy()
        );
        drop(witness);

        let (_, previous) = ExitWitness::arm(&witness_path).unwrap();
        assert_eq!(
            previous,
            PreviousExit::Unclean {
                recording: Some(recording)
            }
        );
    }
}
