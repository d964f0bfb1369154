use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RawFailure;
use crate::http::{send_empty, send_json};
use crate::search::{SEARCH_LIMIT, TrackSearch};
use crate::spotify::SearchResults;

/// Single-attempt calls against `{api_url}/v1`. Retry and deadlines are
/// layered on by the caller.
#[derive(Clone)]
pub struct SpotifyApi {
    http: reqwest::Client,
    base_url: String,
}

impl SpotifyApi {
    pub fn new(http: reqwest::Client, api_url: &str) -> Self {
        Self {
            http,
            base_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: &str,
        query: &[(&str, String)],
    ) -> Result<T, RawFailure> {
        send_json(
            self.http
                .get(self.endpoint(path))
                .bearer_auth(bearer)
                .query(query),
        )
        .await
    }

    pub async fn put_empty(
        &self,
        path: &str,
        bearer: &str,
        query: &[(&str, String)],
        body: &Value,
    ) -> Result<(), RawFailure> {
        send_empty(
            self.http
                .put(self.endpoint(path))
                .bearer_auth(bearer)
                .query(query)
                .json(body),
        )
        .await
    }
}

#[async_trait]
impl TrackSearch for SpotifyApi {
    async fn search_tracks(&self, query: &str, bearer: &str) -> Result<SearchResults, RawFailure> {
        self.get_json(
            "search",
            bearer,
            &[
                ("q", query.to_string()),
                ("type", "track".to_string()),
                ("limit", SEARCH_LIMIT.to_string()),
            ],
        )
        .await
    }
}
