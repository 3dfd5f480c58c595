use serde::{Deserialize, Serialize};

/// A track as the pipeline sees it: id, display name and artist names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Spotify track id; empty for local files
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
}

impl Track {
    #[cfg(test)]
    pub fn new(id: &str, name: &str, artists: &[&str]) -> Self {
        Track {
            id: id.to_string(),
            name: name.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// One page of playlist tracks starting at `offset`
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPage {
    pub offset: usize,
    pub tracks: Vec<Track>,
    /// Items the service returned, including removed tracks that were dropped
    pub item_count: usize,
    /// Total number of items in the playlist, when the API reported it
    pub total: Option<usize>,
}

/// Response structure for GET /playlists/{id}/tracks
#[derive(Debug, Deserialize)]
pub struct PlaylistTracksResponse {
    pub total: Option<usize>,
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    /// `null` for tracks removed from the catalogue
    pub track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
pub struct TrackObject {
    /// `null` for local files
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistObject>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistObject {
    #[serde(default)]
    pub name: String,
}

impl From<TrackObject> for Track {
    fn from(track: TrackObject) -> Self {
        Track {
            id: track.id.unwrap_or_default(),
            name: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
        }
    }
}

impl PlaylistTracksResponse {
    pub fn into_page(self, offset: usize) -> TrackPage {
        TrackPage {
            offset,
            item_count: self.items.len(),
            total: self.total,
            tracks: self
                .items
                .into_iter()
                .filter_map(|item| item.track)
                .map(Track::from)
                .collect(),
        }
    }
}

/// Response structure for GET /me
#[derive(Debug, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub display_name: Option<String>,
}

/// Response structure for GET /me/playlists
#[derive(Debug, Deserialize)]
pub struct PlaylistsResponse {
    #[serde(default)]
    pub items: Vec<PlaylistInfo>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub name: String,
    pub tracks: Option<TracksRef>,
    pub owner: Option<PlaylistOwner>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracksRef {
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistOwner {
    pub id: String,
}

/// Response structure for GET /playlists/{id}?fields=name
#[derive(Debug, Deserialize)]
pub struct PlaylistName {
    pub name: String,
}

/// Request body for POST /users/{id}/playlists
#[derive(Debug, Serialize)]
pub struct CreatePlaylistRequest<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub public: bool,
}

/// Response structure for POST /users/{id}/playlists
#[derive(Debug, Deserialize)]
pub struct CreatedPlaylist {
    pub id: String,
}

/// Request body for POST /playlists/{id}/tracks
#[derive(Debug, Serialize)]
pub struct AddTracksRequest<'a> {
    pub uris: &'a [String],
    pub position: usize,
}

/// Response structure for POST /playlists/{id}/tracks
#[derive(Debug, Deserialize)]
pub struct AddTracksResponse {
    pub snapshot_id: Option<String>,
}
