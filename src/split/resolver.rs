use super::TrackCorpus;
use crate::error::{Result, SplitError};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};

pub const TRACK_URI_PREFIX: &str = "spotify:track:";

/// Ids shorter than this are placeholders or local files and are not written
pub const MIN_TRACK_ID_LEN: usize = 6;

const MAX_NAMES_IN_LOG: usize = 5;

#[derive(Debug, Deserialize)]
struct RawGrouping {
    #[serde(alias = "Playlists")]
    playlists: Vec<RawGroup>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(default)]
    id: Option<serde_json::Value>,
    name: String,
    #[serde(default)]
    description: String,
    song_ids: Vec<serde_json::Value>,
}

/// One sub-playlist proposed by the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Valid corpus indices in the order the classifier listed them
    pub indices: Vec<usize>,
    /// `spotify:track:<id>` for every index whose track has a usable id
    pub track_uris: Vec<String>,
}

/// The classifier's grouping, checked against the corpus
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposedGrouping {
    pub groups: Vec<ProposedGroup>,
    /// Entries that are not an index into `0..corpus.len()`, as sent
    pub out_of_range: Vec<serde_json::Value>,
    /// Indices that appear in more than one group
    pub duplicates: Vec<usize>,
    /// Corpus indices that no group claimed
    pub unassigned: Vec<usize>,
}

/// Return the text between the first `{` and the last `}`.
pub fn extract_payload(raw: &str) -> Result<&str> {
    let start = raw.find('{').ok_or(SplitError::NoPayloadFound)?;
    match raw.rfind('}') {
        Some(end) if end > start => Ok(&raw[start..=end]),
        _ => Err(SplitError::MalformedPayload(
            "JSON object is never closed".to_string(),
        )),
    }
}

/// Parse the classifier's answer and resolve its indices to track URIs.
///
/// Only the structured `{"playlists": [{..., "song_ids": [..]}]}` form is
/// accepted. Invalid indices are dropped with a warning; they never fail the
/// resolution. Groups left without tracks are kept.
pub fn resolve(raw: &str, corpus: &TrackCorpus) -> Result<ProposedGrouping> {
    let payload = extract_payload(raw)?;
    let parsed: RawGrouping =
        serde_json::from_str(payload).map_err(|e| SplitError::MalformedPayload(e.to_string()))?;

    let mut grouping = ProposedGrouping::default();
    let mut claimed = HashSet::new();
    let mut duplicates = BTreeSet::new();

    for (position, raw_group) in parsed.playlists.into_iter().enumerate() {
        let id = match raw_group.id {
            Some(serde_json::Value::String(id)) => id,
            Some(serde_json::Value::Null) | None => format!("p{}", position + 1),
            Some(other) => other.to_string(),
        };

        let mut indices = Vec::new();
        let mut in_group = HashSet::new();
        for raw_index in raw_group.song_ids {
            let index = match raw_index.as_u64().and_then(|n| usize::try_from(n).ok()) {
                Some(index) if index < corpus.len() => index,
                _ => {
                    warn!(
                        "Group '{}': index {} is outside 0..{}, dropping it",
                        raw_group.name,
                        raw_index,
                        corpus.len()
                    );
                    grouping.out_of_range.push(raw_index);
                    continue;
                }
            };
            if !in_group.insert(index) {
                warn!(
                    "Group '{}': index {} listed twice, keeping one",
                    raw_group.name, index
                );
                continue;
            }
            if !claimed.insert(index) {
                duplicates.insert(index);
            }
            indices.push(index);
        }

        let track_uris = track_uris(&indices, corpus);
        if track_uris.len() < indices.len() {
            debug!(
                "Group '{}': {} tracks without a usable id left out",
                raw_group.name,
                indices.len() - track_uris.len()
            );
        }
        if track_uris.is_empty() {
            warn!("Group '{}' has no tracks after resolution", raw_group.name);
        }

        grouping.groups.push(ProposedGroup {
            id,
            name: raw_group.name,
            description: raw_group.description,
            indices,
            track_uris,
        });
    }

    if !duplicates.is_empty() {
        warn!(
            "{} tracks were placed in more than one group: {:?}",
            duplicates.len(),
            duplicates
        );
    }
    grouping.duplicates = duplicates.into_iter().collect();

    grouping.unassigned = (0..corpus.len())
        .filter(|index| !claimed.contains(index))
        .collect();
    if !grouping.unassigned.is_empty() {
        let names: Vec<&str> = grouping
            .unassigned
            .iter()
            .take(MAX_NAMES_IN_LOG)
            .filter_map(|&index| corpus.get(index))
            .map(|track| track.name.as_str())
            .collect();
        warn!(
            "{} of {} tracks were not placed in any group (e.g. {:?})",
            grouping.unassigned.len(),
            corpus.len(),
            names
        );
    }

    Ok(grouping)
}

fn track_uris(indices: &[usize], corpus: &TrackCorpus) -> Vec<String> {
    indices
        .iter()
        .filter_map(|&index| corpus.get(index))
        .filter(|track| track.id.len() >= MIN_TRACK_ID_LEN)
        .map(|track| format!("{TRACK_URI_PREFIX}{}", track.id))
        .collect()
}
