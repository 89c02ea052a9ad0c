//! The refresh pipeline and the user actions built on it.
//!
//! A refresh scans every marker, rebuilds the cited order from what it
//! found, rewrites every marker's text and regenerates the bibliography.
//! Running it twice with no edit in between yields identical output.
//!
//! Only one refresh runs at a time. A request that arrives while one is in
//! flight is dropped, not queued: the next user action triggers another.
//! Style changes are debounced so a burst of toggles costs one refresh.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::formatter::{format_bibliography_entry, Labeler};
use crate::host::{DocumentHost, HostError, MarkerHandle};
use crate::library::{Library, LibraryStore, OrderStore};
use crate::marker::Marker;
use crate::merge::{merge_adjacent, merge_selection, unmerge_selection, MergeOutcome, UnmergeOutcome};
use crate::order::{CitedOrder, OrderTracker};
use crate::scanner::{decode_markers, flatten, scan};
use crate::style::Style;

/// Errors that can occur while synchronizing a document.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("document operation failed: {0}")]
    Host(#[from] HostError),

    #[error("Entry not found in library: {0}")]
    UnknownEntry(String),

    #[error("could not insert a citation for {id}: {source}")]
    InsertFailed { id: String, source: HostError },
}

/// Knobs for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Heading text used when the document has no bibliography section yet.
    pub bibliography_heading: String,
    /// Merge adjacent citations after an insert under numeric styles.
    pub tidy_on_insert: bool,
    /// Quiet period before a style change triggers a refresh.
    pub debounce: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            bibliography_heading: "References".to_string(),
            tidy_on_insert: true,
            debounce: Duration::from_millis(150),
        }
    }
}

/// Single-flight guard: `Idle → Running → Idle`.
#[derive(Debug, Default)]
pub struct RefreshGate {
    running: AtomicBool,
}

impl RefreshGate {
    /// Moves to `Running` if idle. The permit moves back to `Idle` when
    /// finished or dropped.
    pub fn try_start(&self) -> Option<RefreshPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshPermit { gate: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof that a refresh holds the gate.
#[derive(Debug)]
pub struct RefreshPermit<'a> {
    gate: &'a RefreshGate,
}

impl RefreshPermit<'_> {
    pub fn finish(self) {}
}

impl Drop for RefreshPermit<'_> {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}

/// What a completed refresh did.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub style: Style,
    /// The cited order that was persisted.
    pub cited: Vec<String>,
    pub markers_updated: usize,
    pub marker_failures: usize,
    /// The bibliography lines that were written.
    pub bibliography: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Completed(RefreshReport),
    /// Another refresh was already running.
    Skipped,
}

/// Where an inserted citation ended up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    AtSelection(MarkerHandle),
    AtEnd(MarkerHandle),
    /// The host refused markers; only the label text was inserted.
    PlainText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertReport {
    pub placement: Placement,
    pub tidied: Vec<MergeOutcome>,
    pub refresh: RefreshOutcome,
}

/// Returns true for headings that anchor the bibliography.
pub fn is_bibliography_heading(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    text == "references" || text.contains("bibliography")
}

/// Renders the bibliography for `order`.
///
/// Ids that no longer resolve in the library are left out. Numeric styles
/// keep citation order; author-year styles sort by author.
pub fn build_bibliography(order: &CitedOrder, library: &Library, style: Style) -> Vec<String> {
    let mut entries: Vec<(usize, &crate::library::Entry)> = Vec::with_capacity(order.len());
    for (i, id) in order.ids().iter().enumerate() {
        match library.get(id) {
            Some(entry) => entries.push((i + 1, entry)),
            None => debug!(id = %id, "cited entry missing from library, left out of bibliography"),
        }
    }
    style.class().arrange_bibliography(&mut entries);
    entries
        .into_iter()
        .map(|(index, entry)| format_bibliography_entry(entry, style, index))
        .collect()
}

/// Debounced style changes.
#[derive(Debug, Default)]
struct StyleRequests {
    generation: u64,
    /// The latest request, still sleeping out the debounce window.
    waiting: Option<JoinHandle<()>>,
    /// The request whose refresh has started. Never aborted.
    fired: Option<JoinHandle<()>>,
}

/// Keeps one document's markers, cited order and bibliography consistent.
pub struct Synchronizer<H: DocumentHost + ?Sized> {
    host: Arc<H>,
    library: Arc<dyn LibraryStore>,
    order: OrderTracker,
    settings: SyncSettings,
    gate: RefreshGate,
    style_requests: Mutex<StyleRequests>,
    completed: AtomicUsize,
}

impl<H: DocumentHost + ?Sized> Synchronizer<H> {
    pub fn new(
        host: Arc<H>,
        library: Arc<dyn LibraryStore>,
        order: Arc<dyn OrderStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            host,
            library,
            order: OrderTracker::new(order),
            settings,
            gate: RefreshGate::default(),
            style_requests: Mutex::new(StyleRequests::default()),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn gate(&self) -> &RefreshGate {
        &self.gate
    }

    pub fn order(&self) -> &OrderTracker {
        &self.order
    }

    pub fn library(&self) -> &dyn LibraryStore {
        self.library.as_ref()
    }

    /// Number of refreshes that ran to completion.
    pub fn completed_refreshes(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Runs the full pipeline, unless a refresh is already in flight.
    pub async fn refresh_all(&self, style: Style) -> Result<RefreshOutcome, SyncError> {
        let Some(permit) = self.gate.try_start() else {
            info!(%style, "refresh already running, request dropped");
            return Ok(RefreshOutcome::Skipped);
        };

        let result = self.run_refresh(style).await;
        permit.finish();

        match result {
            Ok(report) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                Ok(RefreshOutcome::Completed(report))
            }
            Err(e) => {
                error!(%style, error = %e, "refresh failed");
                Err(e)
            }
        }
    }

    async fn run_refresh(&self, style: Style) -> Result<RefreshReport, SyncError> {
        let markers = scan(self.host.as_ref()).await?;
        let order = self.order.rebuild(&flatten(&markers));
        let library = self.library.get();
        let labeler = Labeler::new(style, &library, &order);

        let mut updated = 0;
        let mut failures = 0;
        for scanned in &markers {
            let text = labeler.label(&scanned.marker);
            match self.host.set_marker_text(scanned.handle, &text).await {
                Ok(()) => updated += 1,
                Err(e) => {
                    failures += 1;
                    warn!(marker = %scanned.handle, error = %e, "could not update citation text");
                }
            }
        }

        let bibliography = build_bibliography(&order, &library, style);
        self.write_bibliography(&bibliography).await?;

        info!(
            %style,
            markers = markers.len(),
            cited = order.len(),
            failures,
            "refreshed citations"
        );
        Ok(RefreshReport {
            style,
            cited: order.ids().to_vec(),
            markers_updated: updated,
            marker_failures: failures,
            bibliography,
        })
    }

    /// Replaces the bibliography section, creating it on first write.
    async fn write_bibliography(&self, lines: &[String]) -> Result<(), HostError> {
        let existing = self
            .host
            .headings()
            .await?
            .into_iter()
            .find(|h| {
                is_bibliography_heading(&h.text)
                    || h.text.trim().eq_ignore_ascii_case(self.settings.bibliography_heading.trim())
            });

        let section = match existing {
            Some(heading) => heading.handle,
            None if lines.is_empty() => return Ok(()),
            None => {
                self.host
                    .append_heading(&self.settings.bibliography_heading)
                    .await?
            }
        };
        self.host.replace_section(section, lines).await
    }

    fn labeler_inputs(&self) -> (Library, CitedOrder) {
        (self.library.get(), self.order.current())
    }

    /// Inserts a citation of `id` at the selection, then refreshes.
    ///
    /// Falls back to the end of the document, then to plain text, before
    /// giving up.
    pub async fn insert_citation(&self, id: &str, style: Style) -> Result<InsertReport, SyncError> {
        if self.library.entry(id).is_none() {
            return Err(SyncError::UnknownEntry(id.to_string()));
        }

        let library = self.library.get();
        let mut provisional = self.order.current().ids().to_vec();
        provisional.push(id.to_string());
        let provisional = CitedOrder::new(provisional);
        let marker = Marker::single(id);
        let tag = marker.encode();
        let text = Labeler::new(style, &library, &provisional).label(&marker);

        let placement = match self.host.insert_marker_at_selection(&tag, &text).await {
            Ok(handle) => Placement::AtSelection(handle),
            Err(e) => {
                warn!(id, error = %e, "insertion at selection failed, appending instead");
                match self.host.insert_marker_at_end(&tag, &text).await {
                    Ok(handle) => Placement::AtEnd(handle),
                    Err(e) => {
                        warn!(id, error = %e, "marker insertion failed, inserting plain text");
                        self.host
                            .insert_text_at_selection(&text)
                            .await
                            .map_err(|source| SyncError::InsertFailed {
                                id: id.to_string(),
                                source,
                            })?;
                        Placement::PlainText
                    }
                }
            }
        };

        if placement != Placement::PlainText {
            self.order.mark_cited(id);
        }

        let mut tidied = Vec::new();
        if style.is_numeric() && self.settings.tidy_on_insert {
            let (library, order) = self.labeler_inputs();
            match merge_adjacent(self.host.as_ref(), &Labeler::new(style, &library, &order)).await {
                Ok(merged) => tidied = merged,
                Err(e) => warn!(error = %e, "could not merge adjacent citations"),
            }
        }

        let refresh = self.refresh_all(style).await?;
        Ok(InsertReport {
            placement,
            tidied,
            refresh,
        })
    }

    /// Merges the selected citations; refreshes if anything changed.
    pub async fn merge_selection(&self, style: Style) -> Result<MergeOutcome, SyncError> {
        let (library, order) = self.labeler_inputs();
        let outcome =
            merge_selection(self.host.as_ref(), &Labeler::new(style, &library, &order)).await?;
        if matches!(outcome, MergeOutcome::Merged { .. }) {
            self.refresh_all(style).await?;
        }
        Ok(outcome)
    }

    /// Splits the selected group; refreshes if anything changed.
    pub async fn unmerge_selection(&self, style: Style) -> Result<UnmergeOutcome, SyncError> {
        let (library, order) = self.labeler_inputs();
        let outcome =
            unmerge_selection(self.host.as_ref(), &Labeler::new(style, &library, &order)).await?;
        if matches!(outcome, UnmergeOutcome::Split { .. }) {
            self.refresh_all(style).await?;
        }
        Ok(outcome)
    }

    /// Merges every run of adjacent citations, then refreshes.
    pub async fn tidy(&self, style: Style) -> Result<Vec<MergeOutcome>, SyncError> {
        let (library, order) = self.labeler_inputs();
        let merged =
            merge_adjacent(self.host.as_ref(), &Labeler::new(style, &library, &order)).await?;
        self.refresh_all(style).await?;
        Ok(merged)
    }

    /// Deletes every citation touched by the selection, then refreshes.
    pub async fn delete_selected_citations(&self, style: Style) -> Result<usize, SyncError> {
        let selected = decode_markers(self.host.selected_markers().await?);
        let mut deleted = 0;
        for marker in &selected {
            match self.host.delete_marker(marker.handle).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(marker = %marker.handle, error = %e, "could not delete citation"),
            }
        }
        self.refresh_all(style).await?;
        Ok(deleted)
    }

    /// Forgets the stored order and rebuilds it from the document.
    pub async fn reset(&self, style: Style) -> Result<RefreshOutcome, SyncError> {
        self.order.clear();
        self.refresh_all(style).await
    }

    /// Removes an entry from the library. Its markers stay in the document
    /// and drop out of the bibliography at the next refresh.
    pub fn remove_entry(&self, id: &str) -> bool {
        self.library.remove(id).is_some()
    }

    pub fn upsert_entry(&self, entry: crate::library::Entry) {
        self.library.upsert(entry);
    }

    pub fn clear_library(&self) {
        self.library.clear();
    }

    fn style_requests(&self) -> std::sync::MutexGuard<'_, StyleRequests> {
        self.style_requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Waits until every debounced style change has been applied.
    pub async fn settle(&self) {
        loop {
            let next = {
                let mut requests = self.style_requests();
                requests.waiting.take().or_else(|| requests.fired.take())
            };
            let Some(handle) = next else { break };
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "debounced refresh task failed");
                }
            }
        }
    }
}

impl<H: DocumentHost + ?Sized + 'static> Synchronizer<H> {
    /// Schedules a refresh with `style` after the debounce window.
    ///
    /// A newer request cancels one that is still waiting. A request whose
    /// refresh has started runs to completion, and the newer one waits for
    /// it before refreshing.
    pub fn request_style_change(self: &Arc<Self>, style: Style) {
        let mut requests = self.style_requests();
        requests.generation += 1;
        let generation = requests.generation;
        if let Some(previous) = requests.waiting.take() {
            debug!(%style, "superseding pending style change");
            previous.abort();
        }

        let this = Arc::clone(self);
        let delay = self.settings.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let earlier = {
                let mut requests = this.style_requests();
                if requests.generation != generation {
                    return;
                }
                // Past this point nothing aborts the task.
                let own = requests.waiting.take();
                std::mem::replace(&mut requests.fired, own)
            };
            if let Some(earlier) = earlier {
                if let Err(e) = earlier.await {
                    if !e.is_cancelled() {
                        warn!(error = %e, "debounced refresh task failed");
                    }
                }
            }
            if let Err(e) = this.refresh_all(style).await {
                warn!(%style, error = %e, "debounced refresh failed");
            }
        });
        requests.waiting = Some(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use crate::host::{Heading, Relation, Run, SectionHandle, TaggedMarker};
    use crate::library::{Entry, MemoryLibrary, MemoryOrder};

    fn library() -> Library {
        let mut library = Library::new();
        for (id, author, year) in [
            ("zed", "Zimmer, Z.", "2001"),
            ("amy", "Adams, A.", "1999"),
            ("max", "Miller, M.", "2010"),
        ] {
            library.insert(
                id.to_string(),
                Entry::new(id, "article")
                    .with_field("author", author)
                    .with_field("year", year)
                    .with_field("title", format!("Title {}", id)),
            );
        }
        library
    }

    fn synchronizer(text: &str) -> Synchronizer<MemoryDocument> {
        Synchronizer::new(
            Arc::new(MemoryDocument::parse(text)),
            Arc::new(MemoryLibrary::new(library())),
            Arc::new(MemoryOrder::new()),
            SyncSettings::default(),
        )
    }

    fn completed(outcome: RefreshOutcome) -> RefreshReport {
        match outcome {
            RefreshOutcome::Completed(report) => report,
            RefreshOutcome::Skipped => panic!("refresh was skipped"),
        }
    }

    /// A [`MemoryDocument`] that suspends for 10ms on every call.
    struct SlowDocument {
        inner: MemoryDocument,
    }

    async fn pause() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[async_trait::async_trait]
    impl DocumentHost for SlowDocument {
        async fn markers(&self) -> Result<Vec<TaggedMarker>, HostError> {
            pause().await;
            self.inner.markers().await
        }
        async fn compare(&self, a: MarkerHandle, b: MarkerHandle) -> Result<Relation, HostError> {
            pause().await;
            self.inner.compare(a, b).await
        }
        async fn selected_markers(&self) -> Result<Vec<TaggedMarker>, HostError> {
            pause().await;
            self.inner.selected_markers().await
        }
        async fn paragraphs(&self) -> Result<Vec<Vec<Run>>, HostError> {
            pause().await;
            self.inner.paragraphs().await
        }
        async fn set_marker_text(&self, marker: MarkerHandle, text: &str) -> Result<(), HostError> {
            pause().await;
            self.inner.set_marker_text(marker, text).await
        }
        async fn rewrite_marker(
            &self,
            marker: MarkerHandle,
            tag: &str,
            text: &str,
        ) -> Result<(), HostError> {
            pause().await;
            self.inner.rewrite_marker(marker, tag, text).await
        }
        async fn delete_marker(&self, marker: MarkerHandle) -> Result<(), HostError> {
            pause().await;
            self.inner.delete_marker(marker).await
        }
        async fn insert_marker_at_selection(
            &self,
            tag: &str,
            text: &str,
        ) -> Result<MarkerHandle, HostError> {
            pause().await;
            self.inner.insert_marker_at_selection(tag, text).await
        }
        async fn insert_marker_at_end(
            &self,
            tag: &str,
            text: &str,
        ) -> Result<MarkerHandle, HostError> {
            pause().await;
            self.inner.insert_marker_at_end(tag, text).await
        }
        async fn insert_marker_before(
            &self,
            anchor: MarkerHandle,
            tag: &str,
            text: &str,
        ) -> Result<MarkerHandle, HostError> {
            pause().await;
            self.inner.insert_marker_before(anchor, tag, text).await
        }
        async fn insert_text_before(&self, anchor: MarkerHandle, text: &str) -> Result<(), HostError> {
            pause().await;
            self.inner.insert_text_before(anchor, text).await
        }
        async fn insert_text_at_selection(&self, text: &str) -> Result<(), HostError> {
            pause().await;
            self.inner.insert_text_at_selection(text).await
        }
        async fn headings(&self) -> Result<Vec<Heading>, HostError> {
            pause().await;
            self.inner.headings().await
        }
        async fn append_heading(&self, text: &str) -> Result<SectionHandle, HostError> {
            pause().await;
            self.inner.append_heading(text).await
        }
        async fn replace_section(
            &self,
            heading: SectionHandle,
            lines: &[String],
        ) -> Result<(), HostError> {
            pause().await;
            self.inner.replace_section(heading, lines).await
        }
    }

    #[test]
    fn test_gate_is_single_flight() {
        let gate = RefreshGate::default();
        let permit = gate.try_start().expect("idle gate should start");
        assert!(gate.is_running());
        assert!(gate.try_start().is_none());
        permit.finish();
        assert!(!gate.is_running());
        assert!(gate.try_start().is_some());
    }

    #[test]
    fn test_is_bibliography_heading() {
        assert!(is_bibliography_heading("References"));
        assert!(is_bibliography_heading(" REFERENCES "));
        assert!(is_bibliography_heading("Selected Bibliography"));
        assert!(!is_bibliography_heading("Further references"));
    }

    #[tokio::test]
    async fn test_refresh_numbers_and_builds_bibliography() {
        // Given: Citations in a document without a bibliography section
        let sync = synchronizer("First {cite:zed} then {group:amy,zed} and {cite:max}.");

        // When: We refresh under a numeric style
        let report = completed(sync.refresh_all(Style::Ieee).await.unwrap());

        // Then: Numbers follow first appearance and a section is created
        assert_eq!(report.cited, vec!["zed", "amy", "max"]);
        assert_eq!(
            sync.host().to_text(),
            "First {cite:zed|[1]} then {group:amy,zed|[1,2]} and {cite:max|[3]}.\n\n\
             # References\n\n\
             [1] Zimmer, Z., \"Title zed,\" 2001.\n\n\
             [2] Adams, A., \"Title amy,\" 1999.\n\n\
             [3] Miller, M., \"Title max,\" 2010.\n"
        );
    }

    #[tokio::test]
    async fn test_refresh_author_year_sorts_bibliography() {
        let sync = synchronizer("{cite:zed} {cite:max} {cite:amy}\n\n# Bibliography\n\nstale");

        let report = completed(sync.refresh_all(Style::Apa).await.unwrap());

        assert_eq!(
            report.bibliography,
            vec![
                "Adams, A. (1999). Title amy.",
                "Miller, M. (2010). Title max.",
                "Zimmer, Z. (2001). Title zed.",
            ]
        );
        assert_eq!(sync.host().section_lines("Bibliography"), report.bibliography);
        assert_eq!(
            sync.host().marker_texts()[0],
            ("cite:zed".to_string(), "(Zimmer, 2001)".to_string())
        );
    }

    #[tokio::test]
    async fn test_refresh_skipped_while_running() {
        let sync = synchronizer("{cite:zed}");
        let permit = sync.gate().try_start().unwrap();

        assert_eq!(sync.refresh_all(Style::Ieee).await.unwrap(), RefreshOutcome::Skipped);

        drop(permit);
        assert!(matches!(
            sync.refresh_all(Style::Ieee).await.unwrap(),
            RefreshOutcome::Completed(_)
        ));
        assert!(!sync.gate().is_running());
    }

    #[tokio::test]
    async fn test_marker_failure_does_not_stop_others() {
        let sync = synchronizer("{cite:zed} {cite:amy} {cite:max}");
        let locked = sync.host().markers_in_order()[1];
        sync.host().reject_writes_to(locked);

        let report = completed(sync.refresh_all(Style::Numeric).await.unwrap());

        assert_eq!(report.markers_updated, 2);
        assert_eq!(report.marker_failures, 1);
        assert_eq!(sync.host().marker_texts()[2].1, "[3]");
    }

    #[tokio::test]
    async fn test_refresh_without_citations_adds_no_section() {
        let sync = synchronizer("Nothing cited here.");
        completed(sync.refresh_all(Style::Apa).await.unwrap());
        assert_eq!(sync.host().to_text(), "Nothing cited here.\n");
    }

    #[tokio::test]
    async fn test_custom_heading_is_found_again() {
        let sync = Synchronizer::new(
            Arc::new(MemoryDocument::parse("{cite:amy}")),
            Arc::new(MemoryLibrary::new(library())),
            Arc::new(MemoryOrder::new()),
            SyncSettings {
                bibliography_heading: "Works Cited".to_string(),
                ..SyncSettings::default()
            },
        );

        completed(sync.refresh_all(Style::Mla).await.unwrap());
        completed(sync.refresh_all(Style::Mla).await.unwrap());

        assert_eq!(sync.host().to_text().matches("# Works Cited").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_style_changes_are_debounced() {
        // Given: A shared synchronizer
        let sync = Arc::new(synchronizer("{cite:amy}"));

        // When: Styles are toggled rapidly
        sync.request_style_change(Style::Ieee);
        sync.request_style_change(Style::Mla);
        sync.request_style_change(Style::Vancouver);
        sync.settle().await;

        // Then: Only the last request produced a refresh
        assert_eq!(sync.completed_refreshes(), 1);
        assert_eq!(sync.host().marker_texts()[0].1, "[1]");
        assert_eq!(
            sync.host().section_lines("References"),
            vec!["1. Adams, A. Title amy. 1999."]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_refresh_survives_newer_style_change() {
        // Given: A host that suspends on every call
        let sync = Arc::new(Synchronizer::new(
            Arc::new(SlowDocument {
                inner: MemoryDocument::parse("{cite:amy|x} {cite:zed|x} {cite:max|x}"),
            }),
            Arc::new(MemoryLibrary::new(library())),
            Arc::new(MemoryOrder::new()),
            SyncSettings::default(),
        ));

        // When: A second style arrives while the first refresh is in flight
        sync.request_style_change(Style::Ieee);
        tokio::time::sleep(Duration::from_millis(175)).await;
        assert!(sync.gate().is_running());
        sync.request_style_change(Style::Vancouver);
        sync.settle().await;

        // Then: Both refreshes ran to completion and the last style wins
        assert_eq!(sync.completed_refreshes(), 2);
        assert!(!sync.gate().is_running());
        let doc = &sync.host().inner;
        let texts: Vec<String> = doc.marker_texts().into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["[1]", "[2]", "[3]"]);
        assert_eq!(
            doc.section_lines("References")[0],
            "1. Adams, A. Title amy. 1999."
        );
    }
}
