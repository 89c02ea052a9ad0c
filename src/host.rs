//! The editable document, as seen by the engine.
//!
//! A host (a word processor add-in, an editor buffer, [`MemoryDocument`]...)
//! exposes tagged marker spans and a handful of mutations. It does not expose
//! a global order: the only way to know whether one marker comes before
//! another is to [`compare`](DocumentHost::compare) them, and every call may
//! be a round trip.
//!
//! [`MemoryDocument`]: crate::document::MemoryDocument

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a host.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("marker {0} no longer exists")]
    MissingMarker(MarkerHandle),

    #[error("section {0} no longer exists")]
    MissingSection(SectionHandle),

    #[error("host rejected the operation: {0}")]
    Rejected(String),
}

/// Opaque reference to a marker span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(pub u64);

impl std::fmt::Display for MarkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque reference to a heading that starts a document section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionHandle(pub u64);

impl std::fmt::Display for SectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "§{}", self.0)
    }
}

/// Where the first position lies relative to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Before,
    After,
    /// Same location, different spans.
    Same,
    /// The first span lies inside the second.
    Inside,
    /// Both references denote the same span.
    Equal,
}

/// A marker span together with its raw tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedMarker {
    pub handle: MarkerHandle,
    pub tag: String,
}

/// A piece of paragraph content.
#[derive(Debug, Clone, PartialEq)]
pub enum Run {
    Text(String),
    Marker(TaggedMarker),
}

/// A section heading.
#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    pub handle: SectionHandle,
    pub text: String,
}

#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// Every tagged span, in whatever order the host discovers them.
    async fn markers(&self) -> Result<Vec<TaggedMarker>, HostError>;

    /// Position of `a` relative to `b`.
    async fn compare(&self, a: MarkerHandle, b: MarkerHandle) -> Result<Relation, HostError>;

    /// Tagged spans touched by the current selection.
    async fn selected_markers(&self) -> Result<Vec<TaggedMarker>, HostError>;

    /// Body paragraphs as runs of text and markers.
    async fn paragraphs(&self) -> Result<Vec<Vec<Run>>, HostError>;

    /// Replaces the visible text of a marker, keeping its tag.
    async fn set_marker_text(&self, marker: MarkerHandle, text: &str) -> Result<(), HostError>;

    /// Replaces both tag and visible text of a marker in place.
    async fn rewrite_marker(
        &self,
        marker: MarkerHandle,
        tag: &str,
        text: &str,
    ) -> Result<(), HostError>;

    /// Removes a marker together with its content.
    async fn delete_marker(&self, marker: MarkerHandle) -> Result<(), HostError>;

    async fn insert_marker_at_selection(
        &self,
        tag: &str,
        text: &str,
    ) -> Result<MarkerHandle, HostError>;

    /// Inserts at the end of the document body.
    async fn insert_marker_at_end(&self, tag: &str, text: &str)
        -> Result<MarkerHandle, HostError>;

    /// Inserts a new marker directly in front of `anchor`.
    async fn insert_marker_before(
        &self,
        anchor: MarkerHandle,
        tag: &str,
        text: &str,
    ) -> Result<MarkerHandle, HostError>;

    /// Inserts plain text directly in front of `anchor`.
    async fn insert_text_before(&self, anchor: MarkerHandle, text: &str) -> Result<(), HostError>;

    /// Inserts plain, untagged text at the selection.
    async fn insert_text_at_selection(&self, text: &str) -> Result<(), HostError>;

    async fn headings(&self) -> Result<Vec<Heading>, HostError>;

    /// Adds a heading at the end of the document.
    async fn append_heading(&self, text: &str) -> Result<SectionHandle, HostError>;

    /// Replaces everything between `heading` and the next heading with one
    /// paragraph per line.
    async fn replace_section(
        &self,
        heading: SectionHandle,
        lines: &[String],
    ) -> Result<(), HostError>;
}
