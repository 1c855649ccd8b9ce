//! scn-core: bidirectional scene serialization engine
//!
//! This crate focuses on a small, well-factored surface:
//! - Type codec between typed property values and versioned binary blobs
//! - Exporter: read-only walk from a live scene to a portable JSON mapping
//! - Reconciler: update-in-place import of a mapping into a live scene
//! - Host traits the engine talks through, plus an in-memory scene model
//! - Mapping validation and file helpers (load/save, discovery, zip snapshot)
//!
pub mod codec;
pub mod error;
pub mod export;
pub mod files;
pub mod host;
pub mod identity;
pub mod import;
pub mod memory;
pub mod schema;
pub mod validate;

pub use codec::{Blob, PropValue, TypeTag, decode, encode};
pub use error::{
    DecodeError, FileError, HostOperationError, NodeError, ReferenceError, SchemaError, SyncError,
};
pub use export::{ExportOptions, ExportReport, Exporter, export_project};
pub use files::{
    find_scene_files, load_project_file, save_project_file, snapshot_dir, snapshot_file,
};
pub use host::{ExclusivePass, SceneRead, SceneWrite};
pub use identity::{NodePath, SiblingKey};
pub use import::{
    ImportOptions, ImportReport, MarkerPolicy, MutationStats, Reconciler, import_project,
};
pub use memory::{MemoryHost, StreamCatalog};
pub use schema::ProjectDesc;
pub use validate::validate_project;
