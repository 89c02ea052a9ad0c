//! Marker discovery and reading-order recovery.
//!
//! Hosts list markers in no particular order and only answer pairwise
//! position questions, so markers are placed by insertion sort: each newly
//! discovered marker goes in front of the first already-placed marker it
//! compares `Before`. That costs O(n²) comparisons in the worst case, which
//! is fine for the tens of citations a document usually carries. Anything
//! other than `Before` (including `Same`) keeps discovery order.

use tracing::{debug, warn};

use crate::host::{DocumentHost, HostError, MarkerHandle, Relation, TaggedMarker};
use crate::marker::{Marker, MarkerError};

/// A citation marker with its decoded tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedMarker {
    pub handle: MarkerHandle,
    pub marker: Marker,
}

/// Sorts `items` into document order using only pairwise comparison.
///
/// The sort is stable with respect to the input order for items the host
/// reports at the same position.
pub async fn sort_by_position<H, T, F>(
    host: &H,
    items: Vec<T>,
    handle_of: F,
) -> Result<Vec<T>, HostError>
where
    H: DocumentHost + ?Sized,
    F: Fn(&T) -> MarkerHandle,
{
    let mut sorted: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        let handle = handle_of(&item);
        let mut slot = sorted.len();
        for (i, placed) in sorted.iter().enumerate() {
            if host.compare(handle, handle_of(placed)).await? == Relation::Before {
                slot = i;
                break;
            }
        }
        sorted.insert(slot, item);
    }

    Ok(sorted)
}

/// Decodes tagged spans, dropping anything that is not a usable citation.
pub fn decode_markers(tagged: Vec<TaggedMarker>) -> Vec<ScannedMarker> {
    tagged
        .into_iter()
        .filter_map(|t| match Marker::decode(&t.tag) {
            Ok(marker) => Some(ScannedMarker {
                handle: t.handle,
                marker,
            }),
            Err(MarkerError::NotACitation(_)) => None,
            Err(e) => {
                warn!(marker = %t.handle, error = %e, "skipping malformed citation marker");
                None
            }
        })
        .collect()
}

/// Every citation marker in the document, in reading order.
///
/// Never mutates the document.
pub async fn scan<H>(host: &H) -> Result<Vec<ScannedMarker>, HostError>
where
    H: DocumentHost + ?Sized,
{
    let found = decode_markers(host.markers().await?);
    debug!(markers = found.len(), "scanning citation markers");
    sort_by_position(host, found, |m| m.handle).await
}

/// The ids of scanned markers in reading order; groups expand in place.
pub fn flatten(markers: &[ScannedMarker]) -> Vec<String> {
    markers
        .iter()
        .flat_map(|m| m.marker.ids().iter().cloned())
        .collect()
}
