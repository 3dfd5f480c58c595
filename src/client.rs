use crate::config::{Config, CredentialProvider};
use crate::error::{Result, SplitError};
use crate::models::{
    AddTracksRequest, AddTracksResponse, CreatePlaylistRequest, CreatedPlaylist, CurrentUser,
    PlaylistInfo, PlaylistName, PlaylistTracksResponse, PlaylistsResponse, TrackPage,
};
use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use ureq::{Agent, AgentBuilder};
use urlencoding::encode;

/// Largest page the playlist-items endpoint will return
pub const MAX_PAGE_SIZE: usize = 100;

const TRACK_FIELDS: &str = "total,items(track(id,name,artists(name)))";
const PLAYLISTS_PAGE_SIZE: usize = 50;

/// Read side of the streaming service.
#[cfg_attr(test, mockall::automock)]
pub trait PlaylistSource: Send + Sync {
    /// Fetch the tracks at `[offset, offset + page_size)`. Never retries.
    fn fetch_page(&self, playlist_id: &str, offset: usize, page_size: usize) -> Result<TrackPage>;

    fn current_user_id(&self) -> Result<String>;

    fn list_playlists(&self) -> Result<Vec<PlaylistInfo>>;

    fn playlist_name(&self, playlist_id: &str) -> Result<String>;
}

/// Write side of the streaming service.
#[cfg_attr(test, mockall::automock)]
pub trait PlaylistSink: Send + Sync {
    fn create_playlist(
        &self,
        owner_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<String>;

    /// Insert at most [`MAX_PAGE_SIZE`] uris at `position`.
    fn add_tracks(&self, playlist_id: &str, uris: &[String], position: usize) -> Result<()>;
}

/// A blocking Spotify Web API client using bearer authentication
pub struct SpotifyClient {
    agent: Agent,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl SpotifyClient {
    pub fn new(config: &Config, credentials: Arc<dyn CredentialProvider>) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(config.http_timeout)
            .timeout_read(config.http_timeout)
            .timeout_write(config.http_timeout)
            .build();

        SpotifyClient {
            agent,
            base_url: config.spotify_api_base.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorization(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.credentials.current_token()?))
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut request = self
            .agent
            .get(&self.url(path))
            .set("Authorization", &self.authorization()?);
        for &(key, value) in query {
            request = request.query(key, value);
        }

        debug!("GET {path} {query:?}");
        Self::decode(request.call()?)
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        debug!("POST {path}");
        let response = self
            .agent
            .post(&self.url(path))
            .set("Authorization", &self.authorization()?)
            .send_json(body)?;
        Self::decode(response)
    }

    fn decode<T: DeserializeOwned>(response: ureq::Response) -> Result<T> {
        let text = response
            .into_string()
            .map_err(|e| SplitError::Transport(format!("Failed to read response body: {e}")))?;
        serde_json::from_str(&text).map_err(|e| SplitError::Decode(e.to_string()))
    }
}

impl PlaylistSource for SpotifyClient {
    fn fetch_page(&self, playlist_id: &str, offset: usize, page_size: usize) -> Result<TrackPage> {
        let limit = page_size.clamp(1, MAX_PAGE_SIZE).to_string();
        let offset_param = offset.to_string();
        let response: PlaylistTracksResponse = self.get(
            &format!("/playlists/{}/tracks", encode(playlist_id)),
            &[
                ("offset", offset_param.as_str()),
                ("limit", limit.as_str()),
                ("fields", TRACK_FIELDS),
            ],
        )?;
        Ok(response.into_page(offset))
    }

    fn current_user_id(&self) -> Result<String> {
        let user: CurrentUser = self.get("/me", &[])?;
        debug!(
            "Authenticated as {} ({})",
            user.display_name.as_deref().unwrap_or("no display name"),
            user.id
        );
        Ok(user.id)
    }

    fn list_playlists(&self) -> Result<Vec<PlaylistInfo>> {
        let mut playlists = Vec::new();
        let limit = PLAYLISTS_PAGE_SIZE.to_string();

        loop {
            let offset = playlists.len().to_string();
            let page: PlaylistsResponse = self.get(
                "/me/playlists",
                &[("limit", limit.as_str()), ("offset", offset.as_str())],
            )?;
            let received = page.items.len();
            playlists.extend(page.items);

            if page.next.is_none() || received == 0 {
                break;
            }
        }

        Ok(playlists)
    }

    fn playlist_name(&self, playlist_id: &str) -> Result<String> {
        let playlist: PlaylistName = self.get(
            &format!("/playlists/{}", encode(playlist_id)),
            &[("fields", "name")],
        )?;
        Ok(playlist.name)
    }
}

impl PlaylistSink for SpotifyClient {
    fn create_playlist(
        &self,
        owner_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<String> {
        let created: CreatedPlaylist = self.post(
            &format!("/users/{}/playlists", encode(owner_id)),
            &CreatePlaylistRequest {
                name,
                description,
                public,
            },
        )?;
        info!("Created playlist '{}' with ID: {}", name, created.id);
        Ok(created.id)
    }

    fn add_tracks(&self, playlist_id: &str, uris: &[String], position: usize) -> Result<()> {
        let response: AddTracksResponse = self.post(
            &format!("/playlists/{}/tracks", encode(playlist_id)),
            &AddTracksRequest { uris, position },
        )?;
        debug!(
            "Added {} tracks to {} at position {} (snapshot {:?})",
            uris.len(),
            playlist_id,
            position,
            response.snapshot_id
        );
        Ok(())
    }
}
