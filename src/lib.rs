//! wordref: citation markers, numbering and bibliographies for editable documents.
//!
//! This library provides functionality to:
//! - Scan citation markers in a document and recover their reading order
//! - Number citations by first appearance and keep that order persisted
//! - Render in-text labels and bibliography lines in seven built-in styles
//! - Merge adjacent citations into groups and split them again
//! - Refresh every label and the bibliography section in one pass

pub mod config;
pub mod document;
pub mod formatter;
pub mod host;
pub mod library;
pub mod marker;
pub mod merge;
pub mod order;
pub mod ranges;
pub mod scanner;
pub mod style;
pub mod sync;

pub use config::{load_from, Config, ConfigError};
pub use document::MemoryDocument;
pub use formatter::{format_bibliography_entry, format_group, format_in_text, Labeler, Member};
pub use host::{DocumentHost, HostError, MarkerHandle, Relation};
pub use library::{
    load_library, parse_library, Entry, Library, LibraryError, LibraryStore, MemoryLibrary,
    MemoryOrder, OrderStore,
};
pub use marker::{Marker, MarkerError};
pub use merge::{MergeOutcome, UnmergeOutcome};
pub use order::{canonical_order, CitedOrder, OrderTracker};
pub use ranges::compress;
pub use scanner::{scan, ScannedMarker};
pub use style::{style_names, Style, StyleError};
pub use sync::{
    build_bibliography, InsertReport, Placement, RefreshOutcome, RefreshReport, SyncError,
    SyncSettings, Synchronizer,
};
