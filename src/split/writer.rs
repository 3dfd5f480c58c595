use crate::cancel::CancellationToken;
use crate::client::PlaylistSink;
use crate::error::{Result, SplitError};
use log::{debug, error, info};
use std::time::Duration;

/// Most track URIs the service accepts in one append
pub const MAX_URIS_PER_WRITE: usize = 100;

/// Split `uris` into consecutive windows of at most [`MAX_URIS_PER_WRITE`],
/// each paired with the playlist position it must be inserted at.
pub fn windows(
    uris: &[String],
    start_position: usize,
) -> impl Iterator<Item = (usize, &[String])> {
    uris.chunks(MAX_URIS_PER_WRITE)
        .enumerate()
        .map(move |(i, window)| (start_position + i * MAX_URIS_PER_WRITE, window))
}

/// Creates destination playlists and fills them window by window
pub struct DistributionWriter<'a> {
    sink: &'a dyn PlaylistSink,
    public: bool,
    pause: Duration,
}

impl<'a> DistributionWriter<'a> {
    pub fn new(sink: &'a dyn PlaylistSink, public: bool) -> Self {
        Self {
            sink,
            public,
            pause: Duration::ZERO,
        }
    }

    /// Wait this long between two windows of the same playlist
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn create_playlist(&self, owner_id: &str, name: &str, description: &str) -> Result<String> {
        self.sink
            .create_playlist(owner_id, name, description, self.public)
    }

    /// Append `uris` starting at `start_position`, one write per window.
    ///
    /// Windows are written in order. The first failure, or `cancel` firing
    /// between windows, stops the rest and is returned as `PartialWrite`;
    /// windows already written stay in place.
    pub fn append_tracks(
        &self,
        playlist_id: &str,
        uris: &[String],
        start_position: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut written = 0;

        for (window_index, (position, window)) in windows(uris, start_position).enumerate() {
            let ready = if window_index == 0 {
                cancel.check()
            } else {
                cancel.sleep(self.pause)
            };

            let result = ready.and_then(|_| self.sink.add_tracks(playlist_id, window, position));
            if let Err(e) = result {
                error!(
                    "Window at position {} of playlist {} failed after {}/{} tracks: {}",
                    position,
                    playlist_id,
                    written,
                    uris.len(),
                    e
                );
                return Err(SplitError::PartialWrite {
                    playlist_id: playlist_id.to_string(),
                    written,
                    total: uris.len(),
                    cause: e.to_string(),
                });
            }

            written += window.len();
            debug!(
                "Wrote {} tracks to {} at position {}",
                window.len(),
                playlist_id,
                position
            );
        }

        info!("Wrote {} tracks to playlist {}", written, playlist_id);
        Ok(())
    }
}
