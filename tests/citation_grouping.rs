//! Tests for grouping citations: merge, unmerge and adjacent tidy.
//!
//! The grouping rules are:
//! - Single citations separated only by spaces (or directly adjacent) are merged by tidy
//! - Citations separated by punctuation or text are NOT merged
//! - Numeric group labels compress runs of three or more into a range

mod common;

use wordref::{MergeOutcome, Style, SyncError, UnmergeOutcome};

use common::{build_library, completed, labels, synchronizer};

/// Sorted ids of every marker, groups expanded.
fn cited_ids(doc: &wordref::MemoryDocument) -> Vec<String> {
    let mut ids: Vec<String> = doc
        .marker_texts()
        .into_iter()
        .flat_map(|(tag, _)| {
            wordref::Marker::decode(&tag)
                .map(|m| m.ids().to_vec())
                .unwrap_or_default()
        })
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_tidy_compresses_four_adjacent_into_range() {
    // Given: Two citations split by punctuation, then four adjacent ones
    let sync = synchronizer(
        "X {cite:a}, {cite:b} then {cite:c} {cite:d} {cite:e} {cite:f}.",
        build_library(&["a", "b", "c", "d", "e", "f"]),
    );
    completed(sync.refresh_all(Style::Ieee).await.unwrap());

    // When: We tidy
    let merged = sync.tidy(Style::Ieee).await.unwrap();

    // Then: Only the adjacent run is merged, labelled as a range
    assert_eq!(merged.len(), 1);
    assert_eq!(
        sync.host().to_text().lines().next().unwrap(),
        "X {cite:a|[1]}, {cite:b|[2]} then {group:c,d,e,f|[3-6]}."
    );
}

#[tokio::test]
async fn test_tidy_keeps_pairs_comma_separated() {
    let sync = synchronizer(
        "{cite:a} {cite:b}",
        build_library(&["a", "b"]),
    );

    sync.tidy(Style::Numeric).await.unwrap();

    assert_eq!(labels(sync.host()), vec!["[1,2]"]);
}

#[tokio::test]
async fn test_merge_then_unmerge_restores_document() {
    // Given: Three refreshed single citations
    let sync = synchronizer(
        "See {cite:a} {cite:b} {cite:c}.",
        build_library(&["a", "b", "c"]),
    );
    completed(sync.refresh_all(Style::Ieee).await.unwrap());
    let original = sync.host().to_text();
    let ids_before = cited_ids(sync.host());

    // When: We merge all three, then split the group
    sync.host().select(&sync.host().markers_in_order());
    let merged = sync.merge_selection(Style::Ieee).await.unwrap();
    assert!(matches!(merged, MergeOutcome::Merged { ref text, .. } if text == "[1-3]"));
    assert_eq!(
        sync.host().to_text().lines().next().unwrap(),
        "See {group:a,b,c|[1-3]}."
    );

    sync.host().select(&sync.host().markers_in_order());
    let split = sync.unmerge_selection(Style::Ieee).await.unwrap();

    // Then: The same ids are cited and the text matches the original
    assert!(matches!(split, UnmergeOutcome::Split { ref created } if created.len() == 3));
    assert_eq!(cited_ids(sync.host()), ids_before);
    assert_eq!(sync.host().to_text(), original);
}

#[tokio::test]
async fn test_merge_selection_across_text() {
    // Given: Two citations in different sentences
    let sync = synchronizer(
        "One {cite:a}. Two {cite:b}.",
        build_library(&["a", "b"]),
    );
    sync.host().select(&sync.host().markers_in_order());

    // When: The user merges them explicitly
    sync.merge_selection(Style::Apa).await.unwrap();

    // Then: The group sits where the first one was
    assert_eq!(
        sync.host().to_text().lines().next().unwrap(),
        "One {group:a,b|(AuthorA, 2020; AuthorB, 2020)}. Two."
    );
}

#[tokio::test]
async fn test_merge_with_empty_selection_is_a_message() {
    let sync = synchronizer("{cite:a} {cite:b}", build_library(&["a", "b"]));

    let outcome = sync.merge_selection(Style::Ieee).await.unwrap();

    assert_eq!(outcome, MergeOutcome::NotEnough { eligible: 0 });
    assert_eq!(sync.host().to_text(), "{cite:a} {cite:b}\n");
    assert_eq!(sync.completed_refreshes(), 0);
}

#[tokio::test]
async fn test_unmerge_without_group_is_a_message() {
    let sync = synchronizer("{cite:a}", build_library(&["a"]));
    sync.host().select(&sync.host().markers_in_order());

    let outcome = sync.unmerge_selection(Style::Ieee).await.unwrap();

    assert_eq!(outcome, UnmergeOutcome::NothingToUnmerge);
    assert_eq!(outcome.message(), "nothing to unmerge");
}

#[tokio::test]
async fn test_failed_unmerge_does_not_duplicate_ids() {
    // Given: A refreshed group, and a host that refuses the second insert
    let sync = synchronizer(
        "See {group:a,b|[1,2]}.",
        build_library(&["a", "b"]),
    );
    completed(sync.refresh_all(Style::Ieee).await.unwrap());
    let before = sync.host().to_text();
    sync.host().select(&sync.host().markers_in_order());
    sync.host().reject_marker_inserts_after(1);

    // When: We try to split it
    let err = sync.unmerge_selection(Style::Ieee).await.unwrap_err();

    // Then: Nothing changed and each id is cited once
    assert!(matches!(err, SyncError::Host(_)));
    assert_eq!(sync.host().to_text(), before);
    assert_eq!(cited_ids(sync.host()), vec!["a", "b"]);
}
