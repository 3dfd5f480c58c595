//! Concurrent page aggregation.
//!
//! The first page is fetched alone to learn the playlist length. When the
//! service reports a total, the remaining pages are fetched on the shared
//! rayon pool and a single collector keys the slices by offset, so completion
//! order never affects track order. Without a total, pages are fetched one
//! after another until a page with fewer than `PAGE_SIZE` items comes back.

use super::TrackCorpus;
use crate::cancel::CancellationToken;
use crate::error::{Result, SplitError};
use crate::models::{Track, TrackPage};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Page size requested from the playlist-items endpoint
pub const PAGE_SIZE: usize = crate::client::MAX_PAGE_SIZE;

/// Number of pages needed to cover `total` tracks
pub fn page_count(total: usize) -> usize {
    total.div_ceil(PAGE_SIZE)
}

/// Fetch every page of `playlist_id` through `fetch` and merge them in order.
///
/// `fetch(offset)` retrieves the page at `offset`; retries are its business.
/// Failed pages are logged and skipped. Fails with `AggregationFailed` when
/// no page at all could be fetched, and with `Cancelled` if `cancel` fires.
pub fn aggregate<F>(playlist_id: &str, fetch: F, cancel: &CancellationToken) -> Result<TrackCorpus>
where
    F: Fn(usize) -> Result<TrackPage> + Sync,
{
    cancel.check()?;

    let first = match fetch(0) {
        Ok(page) => page,
        Err(SplitError::Cancelled) => return Err(SplitError::Cancelled),
        Err(e) => {
            warn!("[{playlist_id}] First page failed, playlist length unknown: {e}");
            return Err(SplitError::AggregationFailed {
                playlist_id: playlist_id.to_string(),
            });
        }
    };

    let mut pages = BTreeMap::new();
    let mut skipped = Vec::new();

    match first.total {
        Some(total) => {
            info!(
                "[{playlist_id}] {} tracks in {} pages",
                total,
                page_count(total)
            );
            pages.insert(0, first.tracks);
            let offsets: Vec<usize> = (PAGE_SIZE..total).step_by(PAGE_SIZE).collect();
            fetch_concurrently(
                playlist_id,
                &offsets,
                &fetch,
                cancel,
                &mut pages,
                &mut skipped,
            );
        }
        None => {
            info!("[{playlist_id}] No total reported, paging until a short page");
            // Removed tracks are dropped from `tracks`, so page length is
            // judged on the raw item count.
            let mut last_items = first.item_count;
            pages.insert(0, first.tracks);
            let mut offset = PAGE_SIZE;

            while last_items >= PAGE_SIZE {
                cancel.check()?;
                match fetch(offset) {
                    Ok(page) => {
                        last_items = page.item_count;
                        debug!(
                            "[{playlist_id}] Page at {offset}: {last_items} items, {} tracks",
                            page.tracks.len()
                        );
                        if last_items == 0 {
                            break;
                        }
                        pages.insert(offset, page.tracks);
                        offset += PAGE_SIZE;
                    }
                    Err(SplitError::Cancelled) => return Err(SplitError::Cancelled),
                    Err(e) => {
                        // Without a total there is no way to know what lies past this page.
                        warn!("[{playlist_id}] Page at {offset} failed, stopping: {e}");
                        skipped.push(offset);
                        break;
                    }
                }
            }
        }
    }

    cancel.check()?;

    let corpus = TrackCorpus::from_pages(pages, skipped);
    if corpus.is_degraded() {
        warn!(
            "[{playlist_id}] Continuing with {} tracks; pages at offsets {:?} are missing",
            corpus.len(),
            corpus.skipped_offsets()
        );
    } else {
        info!("[{playlist_id}] Aggregated {} tracks", corpus.len());
    }
    Ok(corpus)
}

fn fetch_concurrently<F>(
    playlist_id: &str,
    offsets: &[usize],
    fetch: &F,
    cancel: &CancellationToken,
    pages: &mut BTreeMap<usize, Vec<Track>>,
    skipped: &mut Vec<usize>,
) where
    F: Fn(usize) -> Result<TrackPage> + Sync,
{
    let results: Vec<(usize, Result<TrackPage>)> = offsets
        .par_iter()
        .map(|&offset| (offset, cancel.check().and_then(|_| fetch(offset))))
        .collect();

    for (offset, result) in results {
        match result {
            Ok(page) => {
                debug!(
                    "[{playlist_id}] Page at {offset}: {} tracks",
                    page.tracks.len()
                );
                pages.insert(offset, page.tracks);
            }
            Err(e) => {
                warn!("[{playlist_id}] Skipping page at {offset}: {e}");
                skipped.push(offset);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlaylistTracksResponse;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn tracks(offset: usize, count: usize) -> Vec<Track> {
        (offset..offset + count)
            .map(|i| Track::new(&format!("track{i:04}"), &format!("Song {i}"), &["Artist"]))
            .collect()
    }

    /// A fake playlist of `total` tracks whose later pages finish first
    fn playlist(
        total: usize,
        report_total: bool,
    ) -> impl Fn(usize) -> Result<TrackPage> + Sync {
        move |offset| {
            let count = total.saturating_sub(offset).min(PAGE_SIZE);
            let pages_after = total.saturating_sub(offset) / PAGE_SIZE;
            thread::sleep(Duration::from_millis(pages_after as u64 * 15));
            Ok(TrackPage {
                offset,
                tracks: tracks(offset, count),
                item_count: count,
                total: report_total.then_some(total),
            })
        }
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 0);
        assert_eq!(page_count(1), 1);
        assert_eq!(page_count(100), 1);
        assert_eq!(page_count(101), 2);
        assert_eq!(page_count(250), 3);
    }

    #[test]
    fn test_250_tracks_three_fetches_in_order() {
        let offsets = Mutex::new(Vec::new());
        let inner = playlist(250, true);
        let fetch = |offset: usize| {
            offsets.lock().unwrap().push(offset);
            inner(offset)
        };

        let corpus = aggregate("pl", fetch, &CancellationToken::new()).unwrap();

        let mut seen = offsets.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![0, 100, 200]);
        assert_eq!(corpus.len(), 250);
        for (index, track) in corpus.iter() {
            assert_eq!(track.id, format!("track{index:04}"));
        }
    }

    #[test]
    fn test_order_survives_reversed_completion() {
        let total = 1234;
        let calls = AtomicUsize::new(0);
        let inner = playlist(total, true);
        let fetch = |offset: usize| {
            calls.fetch_add(1, Ordering::SeqCst);
            inner(offset)
        };

        let corpus = aggregate("pl", fetch, &CancellationToken::new()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), page_count(total));
        assert_eq!(corpus.tracks(), tracks(0, total).as_slice());
    }

    #[test]
    fn test_remaining_pages_fetched_on_rayon_pool() {
        let pooled = AtomicUsize::new(0);
        let inner = playlist(500, true);
        let fetch = |offset: usize| {
            if offset > 0 && rayon::current_thread_index().is_some() {
                pooled.fetch_add(1, Ordering::SeqCst);
            }
            inner(offset)
        };

        let corpus = aggregate("pl", fetch, &CancellationToken::new()).unwrap();

        assert_eq!(corpus.len(), 500);
        assert_eq!(pooled.load(Ordering::SeqCst), page_count(500) - 1);
    }

    #[test]
    fn test_missing_total_pages_until_short_page() {
        let calls = AtomicUsize::new(0);
        let inner = playlist(230, false);
        let fetch = |offset: usize| {
            calls.fetch_add(1, Ordering::SeqCst);
            inner(offset)
        };

        let corpus = aggregate("pl", fetch, &CancellationToken::new()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(corpus.len(), 230);
    }

    #[test]
    fn test_missing_total_stops_on_empty_page() {
        let calls = AtomicUsize::new(0);
        let inner = playlist(200, false);
        let fetch = |offset: usize| {
            calls.fetch_add(1, Ordering::SeqCst);
            inner(offset)
        };

        let corpus = aggregate("pl", fetch, &CancellationToken::new()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(corpus.len(), 200);
    }

    #[test]
    fn test_removed_track_does_not_end_paging_early() {
        let calls = AtomicUsize::new(0);
        let fetch = |offset: usize| -> Result<TrackPage> {
            calls.fetch_add(1, Ordering::SeqCst);
            let items: Vec<serde_json::Value> = (offset..(offset + PAGE_SIZE).min(150))
                .map(|i| {
                    if i == 5 {
                        json!({"track": null})
                    } else {
                        json!({"track": {
                            "id": format!("track{i:04}"),
                            "name": format!("Song {i}"),
                            "artists": [{"name": "Artist"}]
                        }})
                    }
                })
                .collect();
            let response: PlaylistTracksResponse =
                serde_json::from_value(json!({ "items": items })).unwrap();
            Ok(response.into_page(offset))
        };

        let corpus = aggregate("pl", fetch, &CancellationToken::new()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(corpus.len(), 149);
        assert!(!corpus.is_degraded());
        assert_eq!(corpus.get(4).unwrap().id, "track0004");
        assert_eq!(corpus.get(5).unwrap().id, "track0006");
        assert_eq!(corpus.get(148).unwrap().id, "track0149");
    }

    #[test]
    fn test_failed_page_is_skipped() {
        let inner = playlist(300, true);
        let fetch = |offset: usize| {
            if offset == 100 {
                Err(SplitError::Upstream {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                inner(offset)
            }
        };

        let corpus = aggregate("pl", fetch, &CancellationToken::new()).unwrap();

        assert_eq!(corpus.len(), 200);
        assert_eq!(corpus.skipped_offsets(), &[100]);
        assert_eq!(corpus.get(99).unwrap().id, "track0099");
        assert_eq!(corpus.get(100).unwrap().id, "track0200");
    }

    #[test]
    fn test_no_pages_is_aggregation_failure() {
        let fetch = |_offset: usize| -> Result<TrackPage> {
            Err(SplitError::Transport("connection refused".to_string()))
        };

        let result = aggregate("pl", fetch, &CancellationToken::new());

        assert!(matches!(
            result,
            Err(SplitError::AggregationFailed { playlist_id }) if playlist_id == "pl"
        ));
    }

    #[test]
    fn test_empty_playlist() {
        let corpus = aggregate("pl", playlist(0, true), &CancellationToken::new()).unwrap();
        assert!(corpus.is_empty());
    }

    #[test]
    fn test_cancelled_before_start_fetches_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);
        let fetch = |offset: usize| {
            calls.fetch_add(1, Ordering::SeqCst);
            playlist(500, true)(offset)
        };

        let result = aggregate("pl", fetch, &cancel);

        assert!(matches!(result, Err(SplitError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_after_first_page_stops_remaining_fetches() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let inner = playlist(500, true);
        let fetch = |offset: usize| {
            calls.fetch_add(1, Ordering::SeqCst);
            let page = inner(offset);
            cancel.cancel();
            page
        };

        let result = aggregate("pl", fetch, &cancel);

        assert!(matches!(result, Err(SplitError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
