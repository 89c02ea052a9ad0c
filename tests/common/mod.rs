//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use wordref::{
    Entry, Library, MemoryDocument, MemoryLibrary, MemoryOrder, RefreshOutcome, RefreshReport,
    SyncSettings, Synchronizer,
};

/// Build a library of test entries from a list of ids.
///
/// Each entry gets an auto-generated author (`AuthorX, A.` where X is the
/// last char of the id, uppercased) and a title (`Title {id}`), all dated
/// 2020.
pub fn build_library(ids: &[&str]) -> Library {
    ids.iter()
        .map(|id| {
            let last = id
                .chars()
                .last()
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or('X');
            let entry = Entry::new(*id, "article")
                .with_field("author", format!("Author{}, A.", last))
                .with_field("title", format!("Title {}", id))
                .with_field("year", "2020");
            (id.to_string(), entry)
        })
        .collect()
}

/// Same library as [`build_library`], as a JSON array.
pub fn build_library_json(ids: &[&str]) -> String {
    let entries: Vec<Entry> = build_library(ids).into_values().collect();
    serde_json::to_string(&entries).unwrap()
}

/// A synchronizer over an in-memory document parsed from `text`.
pub fn synchronizer(text: &str, library: Library) -> Synchronizer<MemoryDocument> {
    Synchronizer::new(
        Arc::new(MemoryDocument::parse(text)),
        Arc::new(MemoryLibrary::new(library)),
        Arc::new(MemoryOrder::new()),
        SyncSettings::default(),
    )
}

/// Unwraps a refresh that is expected to have run.
pub fn completed(outcome: RefreshOutcome) -> RefreshReport {
    match outcome {
        RefreshOutcome::Completed(report) => report,
        RefreshOutcome::Skipped => panic!("refresh was unexpectedly skipped"),
    }
}

/// Visible text of every marker, in reading order.
pub fn labels(doc: &MemoryDocument) -> Vec<String> {
    doc.marker_texts().into_iter().map(|(_, text)| text).collect()
}
