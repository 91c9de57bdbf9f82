use std::path::PathBuf;

use wasm_bindgen::JsValue;

use crate::codec::LeafKind;

#[derive(Debug, thiserror::Error)]
pub enum GpxError {
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::Error),

    #[error("Invalid UTF-8 in document: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Mismatched end tag: expected </{expected}>, found </{found}>")]
    MismatchedEndTag { expected: String, found: String },

    #[error("End tag </{0}> has no matching start tag")]
    UnmatchedEndTag(String),

    #[error("Document ended with {open} unclosed element(s), innermost <{innermost}>")]
    Truncated { open: usize, innermost: String },

    #[error("Document has no root element")]
    MissingRoot,

    #[error("Second root element <{0}>")]
    MultipleRoots(String),

    #[error("Expected <{expected}> as the root element, found <{found}>")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },

    #[error("Invalid value '{value}' for attribute '{attribute}' on <{element}>")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },

    #[error("Invalid {kind} value '{text}'")]
    InvalidLeaf { kind: LeafKind, text: String },

    #[error("Index {index} is past the {count} <{tag}> children of <{parent}>")]
    IndexOutOfRange {
        parent: String,
        tag: String,
        index: usize,
        count: usize,
    },

    #[error("<{0}> is already attached to a parent")]
    AlreadyAttached(String),

    #[error("<{0}> cannot be placed inside its own subtree")]
    Cycle(String),

    #[error("<{0}> holds a text value and cannot have children")]
    LeafParent(String),

    #[error("<{0}> is not a leaf-text element")]
    NotALeaf(String),

    #[error("Cannot {action} while the recording is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    #[error("Stream writer: {0}")]
    Stream(&'static str),

    #[error("Recording {path:?} is unrecoverable: {source}")]
    Unrecoverable {
        path: PathBuf,
        #[source]
        source: Box<GpxError>,
    },

    #[error("Invalid options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GpxError>;

impl From<GpxError> for JsValue {
    fn from(e: GpxError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
