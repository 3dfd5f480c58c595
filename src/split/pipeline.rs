use super::aggregator::{self, PAGE_SIZE};
use super::config::{ClassificationDirective, SOURCE_NAME_PREFIX};
use super::encoder;
use super::resolver::{self, ProposedGroup};
use super::writer::DistributionWriter;
use crate::cancel::CancellationToken;
use crate::classifier::Classifier;
use crate::client::{PlaylistSink, PlaylistSource};
use crate::error::{Result, SplitError};
use log::{debug, error, info, warn};
use rand::Rng;
use rayon::prelude::*;
use std::fmt;
use std::time::Duration;

/// Where one playlist's pipeline currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Fetching,
    Aggregated,
    Classifying,
    Resolving,
    Distributing,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Fetching => "fetching",
            PipelineState::Aggregated => "aggregated",
            PipelineState::Classifying => "classifying",
            PipelineState::Resolving => "resolving",
            PipelineState::Distributing => "distributing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Retries transport failures with exponential back-off and jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Run `operation`, retrying it while it fails with a retryable error.
    pub fn run<T>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut operation: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            cancel.check()?;
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        "{label} failed ({e}), retry {attempt}/{} in {delay:?}",
                        self.max_retries
                    );
                    cancel.sleep(delay)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(6);
        let base = self.base_delay * (1u32 << exponent);
        let jitter_ms = self.base_delay.as_millis() as u64 / 2;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Settings shared by every playlist of one run
#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub directive: ClassificationDirective,
    pub public: bool,
    pub name_prefix: Option<String>,
    /// Stop after resolving and report the proposed groups without writing
    pub dry_run: bool,
    pub write_pause: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupStatus {
    /// Dry run: the playlist would have been created
    Planned,
    Created,
    /// Created, but only `written` of `total` tracks made it in
    Partial { written: usize, total: usize },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupOutcome {
    pub name: String,
    pub description: String,
    pub playlist_id: Option<String>,
    pub track_count: usize,
    pub status: GroupStatus,
}

/// Final report for one requested playlist
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistOutcome {
    pub playlist_id: String,
    pub state: PipelineState,
    pub failure: Option<String>,
    pub track_count: usize,
    pub skipped_pages: usize,
    pub unassigned_tracks: usize,
    /// Indices the classifier invented that were dropped
    pub invalid_indices: usize,
    /// Tracks placed in more than one group
    pub duplicate_tracks: usize,
    pub groups: Vec<GroupOutcome>,
}

impl PlaylistOutcome {
    fn new(playlist_id: &str) -> Self {
        Self {
            playlist_id: playlist_id.to_string(),
            state: PipelineState::Fetching,
            failure: None,
            track_count: 0,
            skipped_pages: 0,
            unassigned_tracks: 0,
            invalid_indices: 0,
            duplicate_tracks: 0,
            groups: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done
    }

    /// Done, but with pages, tracks or groups lost along the way
    pub fn is_degraded(&self) -> bool {
        self.skipped_pages > 0
            || self.unassigned_tracks > 0
            || self.groups.iter().any(|g| {
                matches!(g.status, GroupStatus::Partial { .. } | GroupStatus::Failed(_))
            })
    }

    fn advance(&mut self, next: PipelineState) {
        info!("[{}] {} -> {}", self.playlist_id, self.state, next);
        self.state = next;
    }
}

/// Drives fetch → classify → resolve → write for each requested playlist
pub struct Splitter<'a> {
    source: &'a dyn PlaylistSource,
    sink: &'a dyn PlaylistSink,
    classifier: &'a dyn Classifier,
    options: SplitOptions,
}

impl<'a> Splitter<'a> {
    pub fn new(
        source: &'a dyn PlaylistSource,
        sink: &'a dyn PlaylistSink,
        classifier: &'a dyn Classifier,
        options: SplitOptions,
    ) -> Self {
        Self {
            source,
            sink,
            classifier,
            options,
        }
    }

    /// Process every playlist concurrently. Outcomes come back in request order.
    pub fn run_all(
        &self,
        playlist_ids: &[String],
        cancel: &CancellationToken,
    ) -> Vec<PlaylistOutcome> {
        playlist_ids
            .par_iter()
            .map(|playlist_id| self.run_playlist(playlist_id, cancel))
            .collect()
    }

    pub fn run_playlist(&self, playlist_id: &str, cancel: &CancellationToken) -> PlaylistOutcome {
        let mut outcome = PlaylistOutcome::new(playlist_id);

        if let Err(e) = self.drive(&mut outcome, cancel) {
            error!("[{}] Failed while {}: {}", playlist_id, outcome.state, e);
            outcome.failure = Some(e.to_string());
            outcome.advance(PipelineState::Failed);
            return outcome;
        }

        outcome.advance(PipelineState::Done);
        outcome
    }

    fn drive(&self, outcome: &mut PlaylistOutcome, cancel: &CancellationToken) -> Result<()> {
        let playlist_id = outcome.playlist_id.clone();
        let retry = &self.options.retry;

        let corpus = aggregator::aggregate(
            &playlist_id,
            |offset| {
                retry.run(&format!("[{playlist_id}] page at {offset}"), cancel, || {
                    self.source.fetch_page(&playlist_id, offset, PAGE_SIZE)
                })
            },
            cancel,
        )?;
        outcome.track_count = corpus.len();
        outcome.skipped_pages = corpus.skipped_offsets().len();
        outcome.advance(PipelineState::Aggregated);

        if corpus.is_empty() {
            warn!("[{playlist_id}] Playlist has no tracks, nothing to split");
            return Ok(());
        }

        cancel.check()?;
        outcome.advance(PipelineState::Classifying);
        let encoded = encoder::encode(&corpus);
        debug!("[{playlist_id}] Encoded corpus is {} bytes", encoded.len());
        let raw = self.classifier.classify(&encoded, &self.options.directive)?;

        outcome.advance(PipelineState::Resolving);
        let grouping = resolver::resolve(&raw, &corpus)?;
        drop(corpus);
        outcome.unassigned_tracks = grouping.unassigned.len();
        outcome.invalid_indices = grouping.out_of_range.len();
        outcome.duplicate_tracks = grouping.duplicates.len();
        info!(
            "[{playlist_id}] Classifier proposed {} groups",
            grouping.groups.len()
        );

        if self.options.dry_run {
            outcome.groups = grouping
                .groups
                .into_iter()
                .map(|group| planned(&group))
                .collect();
            return Ok(());
        }

        cancel.check()?;
        outcome.advance(PipelineState::Distributing);
        let owner_id = retry.run("current user lookup", cancel, || self.source.current_user_id())?;
        let prefix = self.name_prefix(&playlist_id, cancel);
        let writer = DistributionWriter::new(self.sink, self.options.public)
            .with_pause(self.options.write_pause);

        for group in grouping.groups {
            if cancel.is_cancelled() {
                outcome.groups.push(GroupOutcome {
                    status: GroupStatus::Failed("cancelled".to_string()),
                    ..planned(&group)
                });
                continue;
            }
            let group_outcome =
                self.distribute(&writer, &owner_id, prefix.as_deref(), group, cancel);
            outcome.groups.push(group_outcome);
        }
        cancel.check()
    }

    fn name_prefix(&self, playlist_id: &str, cancel: &CancellationToken) -> Option<String> {
        match self.options.name_prefix.as_deref() {
            None | Some("") => None,
            Some(SOURCE_NAME_PREFIX) => {
                let looked_up = self.options.retry.run("playlist name lookup", cancel, || {
                    self.source.playlist_name(playlist_id)
                });
                match looked_up {
                    Ok(name) => Some(name),
                    Err(e) => {
                        warn!("[{playlist_id}] Could not look up playlist name, no prefix: {e}");
                        None
                    }
                }
            }
            Some(prefix) => Some(prefix.to_string()),
        }
    }

    fn distribute(
        &self,
        writer: &DistributionWriter<'_>,
        owner_id: &str,
        prefix: Option<&str>,
        group: ProposedGroup,
        cancel: &CancellationToken,
    ) -> GroupOutcome {
        let name = match prefix {
            Some(prefix) => format!("{} - {}", prefix, group.name),
            None => group.name.clone(),
        };
        debug!(
            "Distributing group {} as '{}': {} indices, {} tracks",
            group.id,
            name,
            group.indices.len(),
            group.track_uris.len()
        );
        let mut outcome = GroupOutcome {
            name,
            ..planned(&group)
        };

        let created = writer.create_playlist(owner_id, &outcome.name, &group.description);
        let playlist_id = match created {
            Ok(id) => id,
            Err(e) => {
                error!("Could not create playlist '{}': {}", outcome.name, e);
                outcome.status = GroupStatus::Failed(e.to_string());
                return outcome;
            }
        };
        outcome.playlist_id = Some(playlist_id.clone());

        let written = writer.append_tracks(&playlist_id, &group.track_uris, 0, cancel);
        outcome.status = match written {
            Ok(()) => GroupStatus::Created,
            Err(SplitError::PartialWrite { written, total, .. }) => {
                GroupStatus::Partial { written, total }
            }
            Err(e) => GroupStatus::Failed(e.to_string()),
        };
        outcome
    }
}

fn planned(group: &ProposedGroup) -> GroupOutcome {
    GroupOutcome {
        name: group.name.clone(),
        description: group.description.clone(),
        playlist_id: None,
        track_count: group.track_uris.len(),
        status: GroupStatus::Planned,
    }
}
