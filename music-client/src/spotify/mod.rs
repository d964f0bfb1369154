//! Spotify Web API client.

mod api;
mod client;
mod models;

pub use api::SpotifyApi;
pub use client::{HealthStatus, ServiceHealth, SpotifyClient, USER_CALL_RETRIES};
pub use models::{AlbumRef, ArtistRef, Image, Paging, SearchResults, TimeRange, Track};
