use crate::models::Track;
use std::collections::BTreeMap;

/// The tracks of one source playlist, indexed `0..len` in playlist order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackCorpus {
    tracks: Vec<Track>,
    skipped_offsets: Vec<usize>,
}

impl TrackCorpus {
    #[cfg(test)]
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            skipped_offsets: Vec::new(),
        }
    }

    /// Flatten pages keyed by their offset. Indices follow offset order no
    /// matter in which order the pages were inserted.
    pub fn from_pages(pages: BTreeMap<usize, Vec<Track>>, skipped_offsets: Vec<usize>) -> Self {
        let mut skipped_offsets = skipped_offsets;
        skipped_offsets.sort_unstable();
        Self {
            tracks: pages.into_values().flatten().collect(),
            skipped_offsets,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    #[cfg(test)]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Track)> {
        self.tracks.iter().enumerate()
    }

    /// Offsets of pages that could not be fetched
    pub fn skipped_offsets(&self) -> &[usize] {
        &self.skipped_offsets
    }

    pub fn is_degraded(&self) -> bool {
        !self.skipped_offsets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_flatten_in_offset_order() {
        let mut pages = BTreeMap::new();
        pages.insert(100, vec![Track::new("cccccc", "C", &[])]);
        pages.insert(0, vec![Track::new("aaaaaa", "A", &[]), Track::new("bbbbbb", "B", &[])]);

        let corpus = TrackCorpus::from_pages(pages, vec![]);
        let names: Vec<_> = corpus.iter().map(|(i, t)| (i, t.name.as_str())).collect();
        assert_eq!(names, vec![(0, "A"), (1, "B"), (2, "C")]);
        assert!(!corpus.is_degraded());
    }
}
