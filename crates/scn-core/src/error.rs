use std::fmt;

use crate::identity::NodePath;

/// Blob byte length or layout does not match its declared type tag.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown type tag '{0}'")]
    UnknownTag(String),

    #[error("{tag}: unsupported version {version}")]
    UnsupportedVersion { tag: String, version: u32 },

    #[error("{tag}: expected {expected} bytes, found {found}")]
    LengthMismatch {
        tag: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{tag}: payload truncated at offset {offset:#x}")]
    Truncated { tag: &'static str, offset: usize },

    #[error("{tag}: invalid {field} byte {value:#04x} at offset {offset:#x}")]
    InvalidByte {
        tag: &'static str,
        field: &'static str,
        value: u8,
        offset: usize,
    },

    #[error("{tag}: vertex count {count} does not fit a {len}-byte payload")]
    BadVertexCount {
        tag: &'static str,
        count: u32,
        len: usize,
    },

    #[error("text payload is not utf-8 (valid up to {offset})")]
    InvalidUtf8 { offset: usize },

    #[error("invalid hex digit at position {0}")]
    InvalidHex(usize),

    #[error("odd-length hex string ({0} digits)")]
    OddHex(usize),
}

/// Missing or unsupported structure in a mapping, or a refused child.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("unsupported {what} kind '{kind}'")]
    UnknownKind { what: &'static str, kind: String },

    #[error("'{parent}' refuses child stream '{match_name}'")]
    CapabilityRefused { parent: String, match_name: String },

    #[error("'{match_name}' is a {found}, described as a {expected}")]
    KindMismatch {
        match_name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("'{match_name}' cannot hold keyframes")]
    NotKeyframeable { match_name: String },

    #[error("'{match_name}' cannot hold a binary payload")]
    NotBinaryCapable { match_name: String },

    #[error("duplicate keyframe time {time}")]
    DuplicateKeyframe { time: f64 },

    #[error("vector of {0} components is not a supported value")]
    VectorArity(usize),

    #[error("{0} layer requires a source item")]
    MissingSource(&'static str),

    #[error("tree deeper than {0} levels")]
    DepthExceeded(usize),

    #[error("'{0}' follows a same-named sibling that was left out")]
    SiblingLeftOut(String),

    #[error("{what} time {time} is not finite")]
    NonFiniteTime { what: &'static str, time: f64 },
}

/// A create/get/set call against the host scene failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("host {op} failed: {message}")]
pub struct HostOperationError {
    pub op: &'static str,
    pub message: String,
}

impl HostOperationError {
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

/// A layer source names an item that was not resolved in the item pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("source {kind} '{name}' (ordinal {ordinal}) not found")]
pub struct ReferenceError {
    pub kind: &'static str,
    pub name: String,
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Host(#[from] HostOperationError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("cancelled by caller")]
    Cancelled,
}

/// Error recorded against one node of the tree; siblings carry on.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeError {
    pub path: NodePath,
    pub error: SyncError,
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.error)
    }
}

impl std::error::Error for NodeError {}

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("walk: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("not a directory: {0}")]
    NotADirectory(std::path::PathBuf),
}
