//! TMDb v3 REST client.
//!
//! Features:
//! - Token-bucket rate limiting via [`governor`], shared by every endpoint.
//! - Retry on HTTP 429 honouring `Retry-After` (max 3 retries).
//! - Fixed per-request timeout from configuration.
//! - API error bodies (`status_code` + `status_message`) recognised on any
//!   HTTP status.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use cinesync_common::{ExternalId, QueryKind};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::FetchError;
use super::source::CatalogSource;
use super::types::{
    select_trailer, CreditsResponse, Credits, GenreEntry, GenreListResponse, ListPage,
    MovieRecord, PageQuery, VideoListResponse,
};
use crate::config::TmdbConfig;

const MAX_RETRIES: u32 = 3;

/// Key shipped in sample configuration files.
const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// TMDb catalog client.
///
/// # Examples
///
/// ```no_run
/// use cinesync::config::TmdbConfig;
/// use cinesync::tmdb::TmdbClient;
///
/// let config = TmdbConfig {
///     api_key: "your-api-key".into(),
///     ..Default::default()
/// };
/// let client = TmdbClient::new(&config);
/// assert!(client.has_api_key());
/// ```
pub struct TmdbClient {
    client: reqwest::Client,
    api_key: String,
    language: String,
    base_url: String,
    rate_limiter: DirectRateLimiter,
}

impl TmdbClient {
    pub fn new(config: &TmdbConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Self {
            client,
            api_key: config.api_key.trim().to_string(),
            language: config.language.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter,
        }
    }

    /// Whether a usable API key is configured.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty() && self.api_key != PLACEHOLDER_API_KEY
    }

    fn check_api_key(&self) -> Result<(), FetchError> {
        if self.has_api_key() {
            Ok(())
        } else {
            Err(FetchError::Configuration(
                "TMDb API key is not configured; set [tmdb].api_key or TMDB_API_KEY".into(),
            ))
        }
    }

    /// Build a full API URL with the API key and language query parameters.
    fn url(&self, path: &str, extra_params: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}{path}?api_key={}&language={}",
            self.base_url,
            urlencoded(&self.api_key),
            urlencoded(&self.language)
        );
        for (key, value) in extra_params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoded(value));
        }
        url
    }

    /// GET a path and decode the body, with rate limiting and 429 retries.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        self.check_api_key()?;
        let url = self.url(path, params);

        let mut retries = 0u32;
        loop {
            self.rate_limiter.until_ready().await;
            debug!(path, "TMDb request");

            let resp = self.client.get(&url).send().await?;
            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RETRIES {
                retries += 1;
                let wait = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                warn!(
                    path,
                    retry = retries,
                    wait_secs = wait,
                    "TMDb returned 429, backing off"
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            let body = resp.bytes().await?;
            return decode_body(status, &body);
        }
    }
}

/// Classify a response body.
///
/// An API error body wins over the HTTP status; a non-success status
/// without one is a transport failure; a success body that does not fit `T`
/// is malformed.
fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, FetchError> {
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) if status.is_success() => return Err(FetchError::MalformedResponse(e.to_string())),
        Err(_) => return Err(FetchError::Transport(format!("HTTP {}", status))),
    };

    let code = value.get("status_code").and_then(serde_json::Value::as_i64);
    let message = value.get("status_message").and_then(serde_json::Value::as_str);
    if let (Some(code), Some(message)) = (code, message) {
        return Err(FetchError::RemoteApi {
            code,
            message: message.to_string(),
        });
    }

    if !status.is_success() {
        return Err(FetchError::Transport(format!("HTTP {}", status)));
    }

    serde_json::from_value(value).map_err(|e| FetchError::MalformedResponse(e.to_string()))
}

/// Minimal percent-encoding for query parameter values.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0x0f) as usize]));
            }
        }
    }
    out
}

const HEX: [u8; 16] = *b"0123456789ABCDEF";

#[async_trait]
impl CatalogSource for TmdbClient {
    async fn list_page(&self, query: &PageQuery) -> Result<ListPage, FetchError> {
        let page = query.page.to_string();
        match &query.kind {
            QueryKind::Browse => {
                self.get_json("/movie/popular", &[("page", page.as_str())])
                    .await
            }
            QueryKind::Search(text) => {
                self.get_json(
                    "/search/movie",
                    &[("query", text.as_str()), ("page", page.as_str())],
                )
                .await
            }
        }
    }

    async fn movie_detail(&self, id: ExternalId) -> Result<MovieRecord, FetchError> {
        self.get_json(&format!("/movie/{id}"), &[]).await
    }

    async fn genres(&self) -> Result<Vec<GenreEntry>, FetchError> {
        let resp: GenreListResponse = self.get_json("/genre/movie/list", &[]).await?;
        Ok(resp.genres)
    }

    async fn trailer(&self, id: ExternalId) -> Result<Option<String>, FetchError> {
        let resp: VideoListResponse = self.get_json(&format!("/movie/{id}/videos"), &[]).await?;
        Ok(select_trailer(&resp.results))
    }

    async fn credits(&self, id: ExternalId) -> Result<Credits, FetchError> {
        let resp: CreditsResponse = self.get_json(&format!("/movie/{id}/credits"), &[]).await?;
        Ok(resp.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TmdbClient {
        TmdbClient::new(&TmdbConfig {
            api_key: "test-key".into(),
            base_url: server.uri(),
            ..Default::default()
        })
    }

    fn page_body(page: u32, total_pages: u32, ids: &[i64]) -> serde_json::Value {
        let results: Vec<_> = ids
            .iter()
            .map(|id| json!({"id": id, "title": format!("Movie {id}"), "genre_ids": [18]}))
            .collect();
        json!({
            "page": page,
            "total_pages": total_pages,
            "total_results": ids.len(),
            "results": results
        })
    }

    #[tokio::test]
    async fn browse_uses_popular_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/popular"))
            .and(query_param("api_key", "test-key"))
            .and(query_param("language", "en-US"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(2, 5, &[1, 2])))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server)
            .list_page(&PageQuery::new(QueryKind::Browse, 2))
            .await
            .unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 5);
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].genre_ids, Some(vec![18]));
    }

    #[tokio::test]
    async fn search_uses_search_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("query", "star wars"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(1, 1, &[11])))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server)
            .list_page(&PageQuery::new(QueryKind::Search("star wars".into()), 1))
            .await
            .unwrap();
        assert_eq!(page.results[0].id, 11);
    }

    #[tokio::test]
    async fn api_error_body_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/550"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "status_code": 7,
                "status_message": "Invalid API key: You must be granted a valid key.",
                "success": false
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .movie_detail(ExternalId::new(550))
            .await
            .unwrap_err();
        assert_matches!(err, FetchError::RemoteApi { code: 7, ref message } if message.starts_with("Invalid API key"));
    }

    #[tokio::test]
    async fn api_error_body_wins_on_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 34,
                "status_message": "The resource you requested could not be found."
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .movie_detail(ExternalId::new(1))
            .await
            .unwrap_err();
        assert_matches!(err, FetchError::RemoteApi { code: 34, .. });
    }

    #[tokio::test]
    async fn server_error_without_body_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/genre/movie/list"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).genres().await.unwrap_err();
        assert_matches!(err, FetchError::Transport(_));
    }

    #[tokio::test]
    async fn unparseable_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/popular"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "no id"})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .list_page(&PageQuery::new(QueryKind::Browse, 1))
            .await
            .unwrap_err();
        assert_matches!(err, FetchError::MalformedResponse(_));

        let err = client.movie_detail(ExternalId::new(2)).await.unwrap_err();
        assert_matches!(err, FetchError::MalformedResponse(_));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        for key in ["", "   ", PLACEHOLDER_API_KEY] {
            let client = TmdbClient::new(&TmdbConfig {
                api_key: key.into(),
                base_url: server.uri(),
                ..Default::default()
            });
            assert!(!client.has_api_key());
            let err = client.genres().await.unwrap_err();
            assert_matches!(err, FetchError::Configuration(_));
        }
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": 3}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = TmdbClient::new(&TmdbConfig {
            api_key: "test-key".into(),
            base_url: server.uri(),
            timeout_secs: 1,
            ..Default::default()
        });
        let err = client.movie_detail(ExternalId::new(3)).await.unwrap_err();
        assert_matches!(err, FetchError::Transport(_));
    }

    #[tokio::test]
    async fn rate_limited_request_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/4"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4, "runtime": 101})))
            .mount(&server)
            .await;

        let record = client_for(&server)
            .movie_detail(ExternalId::new(4))
            .await
            .unwrap();
        assert_eq!(record.runtime, Some(101));
    }

    #[tokio::test]
    async fn trailer_and_credits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/550/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 550,
                "results": [
                    {"key": "BdJKm16Co6M", "site": "YouTube", "type": "Trailer", "official": true}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/550/credits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 550,
                "cast": [{"name": "Brad Pitt", "character": "Tyler Durden", "order": 0}],
                "crew": [{"name": "David Fincher", "job": "Director"}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.trailer(ExternalId::new(550)).await.unwrap().as_deref(),
            Some("https://www.youtube.com/watch?v=BdJKm16Co6M")
        );
        let credits = client.credits(ExternalId::new(550)).await.unwrap();
        assert_eq!(credits.directors, vec!["David Fincher"]);
        assert_eq!(credits.cast.len(), 1);
    }

    #[tokio::test]
    async fn genres_are_listed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/genre/movie/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "genres": [{"id": 28, "name": "Action"}, {"id": 35, "name": "Comedy"}]
            })))
            .mount(&server)
            .await;

        let genres = client_for(&server).genres().await.unwrap();
        assert_eq!(genres.len(), 2);
        assert_eq!(genres[1].name, "Comedy");
    }

    #[test]
    fn url_encoding() {
        assert_eq!(urlencoded("hello world"), "hello+world");
        assert_eq!(urlencoded("foo&bar"), "foo%26bar");
        assert_eq!(urlencoded("simple"), "simple");
    }
}
