//! TMDb response shapes and their normalization into catalog entities.

use cinesync_common::{ExternalId, QueryKind};
use cinesync_db::models::CatalogEntity;
use serde::{Deserialize, Serialize};

use crate::sync::genres::GenreDirectory;

/// One list request: which listing, and which page of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub kind: QueryKind,
    pub page: u32,
}

impl PageQuery {
    pub fn new(kind: QueryKind, page: u32) -> Self {
        Self { kind, page }
    }
}

/// One page of `/movie/popular` or `/search/movie`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPage {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
    #[serde(default)]
    pub results: Vec<MovieRecord>,
}

/// A movie as the service returns it, from either a list or a detail call.
///
/// List results carry `genre_ids`; detail results carry `genres` and
/// `runtime`. Everything but the id may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovieRecord {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<GenreEntry>>,
    #[serde(default)]
    pub genre_ids: Option<Vec<i64>>,
}

impl MovieRecord {
    pub fn external_id(&self) -> ExternalId {
        ExternalId::new(self.id)
    }

    /// Normalize into a catalog entity.
    ///
    /// Explicit genre names win over `genre_ids`; ids the directory does not
    /// know are dropped.
    pub fn into_entity(self, directory: &GenreDirectory, image_base: &str) -> CatalogEntity {
        let genres = match (self.genres, self.genre_ids) {
            (Some(named), _) => named.into_iter().map(|g| g.name).collect(),
            (None, Some(ids)) => directory.resolve(&ids),
            (None, None) => Vec::new(),
        };

        let poster_reference = match self.poster_path.as_deref() {
            Some(path) if !path.is_empty() => format!("{image_base}{path}"),
            _ => String::new(),
        };

        CatalogEntity {
            external_id: ExternalId::new(self.id),
            local_id: None,
            title: self.title.unwrap_or_default(),
            release_year: parse_year(self.release_date.as_deref()),
            rating_average: self.vote_average.unwrap_or(0.0),
            runtime_minutes: self.runtime.unwrap_or(0),
            poster_reference,
            genres,
            is_favorite: false,
            is_in_watchlist: false,
        }
    }
}

/// Year from the first four characters of a date like `"2023-04-15"`, or 0.
pub fn parse_year(date: Option<&str>) -> u16 {
    date.and_then(|d| d.get(..4))
        .and_then(|y| y.parse::<u16>().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GenreEntry {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenreListResponse {
    #[serde(default)]
    pub genres: Vec<GenreEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoListResponse {
    #[serde(default)]
    pub results: Vec<Video>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Video {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub site: String,
    #[serde(rename = "type", default)]
    pub video_type: String,
    #[serde(default)]
    pub official: bool,
}

impl Video {
    fn is_youtube(&self) -> bool {
        self.site == "YouTube" && !self.key.is_empty()
    }

    fn is_trailer(&self) -> bool {
        self.video_type == "Trailer"
    }

    fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.key)
    }
}

/// Pick a trailer: an official YouTube trailer, then any YouTube trailer,
/// then the first video if it is on YouTube.
pub(crate) fn select_trailer(videos: &[Video]) -> Option<String> {
    videos
        .iter()
        .find(|v| v.is_youtube() && v.is_trailer() && v.official)
        .or_else(|| videos.iter().find(|v| v.is_youtube() && v.is_trailer()))
        .or_else(|| videos.first().filter(|v| v.is_youtube()))
        .map(Video::watch_url)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreditsResponse {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CastMember {
    pub name: String,
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CrewMember {
    pub name: String,
    #[serde(default)]
    pub job: String,
}

/// Cast in billing order and the crew grouped by role.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Credits {
    pub cast: Vec<CastMember>,
    pub directors: Vec<String>,
    pub writers: Vec<String>,
    pub producers: Vec<String>,
    pub cinematographers: Vec<String>,
    pub composers: Vec<String>,
}

impl From<CreditsResponse> for Credits {
    fn from(resp: CreditsResponse) -> Self {
        let mut credits = Credits {
            cast: resp.cast,
            ..Default::default()
        };
        credits.cast.sort_by_key(|c| c.order);

        for member in resp.crew {
            let group = match member.job.as_str() {
                "Director" => &mut credits.directors,
                "Screenplay" | "Writer" | "Story" => &mut credits.writers,
                "Producer" | "Executive Producer" => &mut credits.producers,
                "Director of Photography" => &mut credits.cinematographers,
                "Original Music Composer" => &mut credits.composers,
                _ => continue,
            };
            if !group.contains(&member.name) {
                group.push(member.name);
            }
        }

        credits
    }
}
