//! Merging single citations into grouped ones, and splitting them back.
//!
//! Merging rewrites the first marker (in reading order) as a group carrying
//! every id, then deletes the others. Unmerging inserts one single marker per
//! id in front of the group and deletes the group.

use tracing::{debug, info, warn};

use crate::formatter::Labeler;
use crate::host::{DocumentHost, HostError, MarkerHandle, Run};
use crate::marker::{Marker, MarkerError};
use crate::scanner::{decode_markers, sort_by_position, ScannedMarker};

/// Result of a merge request.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged {
        handle: MarkerHandle,
        marker: Marker,
        text: String,
    },
    /// Fewer than two single citations were selected.
    NotEnough { eligible: usize },
}

impl MergeOutcome {
    /// A short message suitable for the user.
    pub fn message(&self) -> String {
        match self {
            MergeOutcome::Merged { marker, text, .. } => {
                format!("merged {} citations into {}", marker.ids().len(), text)
            }
            MergeOutcome::NotEnough { eligible } => format!(
                "select at least two citations to merge ({} selected)",
                eligible
            ),
        }
    }
}

/// Result of an unmerge request.
#[derive(Debug, Clone, PartialEq)]
pub enum UnmergeOutcome {
    Split { created: Vec<MarkerHandle> },
    NothingToUnmerge,
    EmptyGroup,
}

impl UnmergeOutcome {
    pub fn message(&self) -> String {
        match self {
            UnmergeOutcome::Split { created } => {
                format!("split group into {} citations", created.len())
            }
            UnmergeOutcome::NothingToUnmerge => "nothing to unmerge".to_string(),
            UnmergeOutcome::EmptyGroup => "empty group".to_string(),
        }
    }
}

/// Turns `parts` (already in reading order) into one group marker.
async fn combine<H>(
    host: &H,
    parts: &[ScannedMarker],
    labeler: &Labeler<'_>,
) -> Result<MergeOutcome, HostError>
where
    H: DocumentHost + ?Sized,
{
    let ids: Vec<String> = parts
        .iter()
        .flat_map(|m| m.marker.ids().iter().cloned())
        .collect();
    let marker = Marker::Group { ids };
    let text = labeler.label(&marker);
    let first = parts[0].handle;

    host.rewrite_marker(first, &marker.encode(), &text).await?;
    for part in &parts[1..] {
        if let Err(e) = host.delete_marker(part.handle).await {
            warn!(marker = %part.handle, error = %e, "could not remove merged citation");
        }
    }

    debug!(marker = %first, tag = %marker, "merged citations");
    Ok(MergeOutcome::Merged {
        handle: first,
        marker,
        text,
    })
}

/// Merges the single citations touched by the selection.
pub async fn merge_selection<H>(host: &H, labeler: &Labeler<'_>) -> Result<MergeOutcome, HostError>
where
    H: DocumentHost + ?Sized,
{
    let singles: Vec<ScannedMarker> = decode_markers(host.selected_markers().await?)
        .into_iter()
        .filter(|m| m.marker.is_single())
        .collect();

    if singles.len() < 2 {
        info!(eligible = singles.len(), "merge needs at least two citations");
        return Ok(MergeOutcome::NotEnough {
            eligible: singles.len(),
        });
    }

    let ordered = sort_by_position(host, singles, |m| m.handle).await?;
    combine(host, &ordered, labeler).await
}

/// Splits the first group marker touched by the selection.
pub async fn unmerge_selection<H>(
    host: &H,
    labeler: &Labeler<'_>,
) -> Result<UnmergeOutcome, HostError>
where
    H: DocumentHost + ?Sized,
{
    let mut groups = Vec::new();
    let mut saw_empty_group = false;
    for tagged in host.selected_markers().await? {
        match Marker::decode(&tagged.tag) {
            Ok(Marker::Group { ids }) => groups.push((tagged.handle, ids)),
            Err(MarkerError::EmptyGroup(_)) => saw_empty_group = true,
            _ => {}
        }
    }

    if groups.is_empty() {
        return Ok(if saw_empty_group {
            UnmergeOutcome::EmptyGroup
        } else {
            UnmergeOutcome::NothingToUnmerge
        });
    }

    let groups = sort_by_position(host, groups, |(h, _)| *h).await?;
    let (group, ids) = &groups[0];

    let mut created = Vec::with_capacity(ids.len());
    if let Err(e) = split_group(host, *group, ids, labeler, &mut created).await {
        // Leave the group as it was rather than next to copies of its ids.
        for handle in &created {
            if let Err(undo) = host.delete_marker(*handle).await {
                warn!(marker = %handle, error = %undo, "could not roll back split citation");
            }
        }
        return Err(e);
    }

    debug!(marker = %group, singles = created.len(), "split grouped citation");
    Ok(UnmergeOutcome::Split { created })
}

/// Inserts one single per id in front of `group`, then deletes `group`.
/// Every marker inserted so far is recorded in `created`.
async fn split_group<H>(
    host: &H,
    group: MarkerHandle,
    ids: &[String],
    labeler: &Labeler<'_>,
    created: &mut Vec<MarkerHandle>,
) -> Result<(), HostError>
where
    H: DocumentHost + ?Sized,
{
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            host.insert_text_before(group, " ").await?;
        }
        let single = Marker::single(id.clone());
        let handle = host
            .insert_marker_before(group, &single.encode(), &labeler.label(&single))
            .await?;
        created.push(handle);
    }
    host.delete_marker(group).await
}

/// Merges every run of two or more single citations that sit next to each
/// other in a paragraph, with nothing but whitespace between them.
pub async fn merge_adjacent<H>(
    host: &H,
    labeler: &Labeler<'_>,
) -> Result<Vec<MergeOutcome>, HostError>
where
    H: DocumentHost + ?Sized,
{
    let mut runs: Vec<Vec<ScannedMarker>> = Vec::new();

    for paragraph in host.paragraphs().await? {
        let mut current: Vec<ScannedMarker> = Vec::new();
        for run in paragraph {
            match run {
                Run::Text(text) if text.chars().all(|c| c == ' ' || c == '\t') => {}
                Run::Text(_) => runs.push(std::mem::take(&mut current)),
                Run::Marker(tagged) => match Marker::decode(&tagged.tag) {
                    Ok(marker @ Marker::Single { .. }) => current.push(ScannedMarker {
                        handle: tagged.handle,
                        marker,
                    }),
                    _ => runs.push(std::mem::take(&mut current)),
                },
            }
        }
        runs.push(current);
    }

    let mut merged = Vec::new();
    for run in runs.into_iter().filter(|r| r.len() >= 2) {
        merged.push(combine(host, &run, labeler).await?);
    }
    Ok(merged)
}
