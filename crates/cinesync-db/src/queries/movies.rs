//! Movie catalog queries.
//!
//! Upserts are keyed by the remote service's external id, which is unique in
//! the `movies` table. List reads join the requesting user's relation rows in
//! the same statement so membership flags arrive with each row.

use cinesync_common::{Error, ExternalId, LocalId, Result, SortSpec, UserId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{decode_genres, encode_genres, CatalogEntity, UpsertSummary, Upserted};

/// Row filter for catalog listings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MovieFilter {
    /// Every movie.
    #[default]
    All,
    /// Movies whose genre column matches the genre as a list element.
    ///
    /// Matching uses SQL `LIKE`, so it is case-insensitive for ASCII.
    Genre(String),
    /// Case-insensitive title substring.
    Title(String),
}

const SELECT_MOVIES: &str = "SELECT m.id, m.external_id, m.title, m.release_year, m.rating_average,
        m.runtime_minutes, m.poster_reference, m.genres,
        f.user_id IS NOT NULL AS is_favorite,
        w.user_id IS NOT NULL AS is_in_watchlist
     FROM movies m
     LEFT JOIN favorites f ON f.movie_id = m.id AND f.user_id = :user_id
     LEFT JOIN watchlist w ON w.movie_id = m.id AND w.user_id = :user_id";

/// Parse a catalog entity from a row selected with [`SELECT_MOVIES`] columns.
pub(crate) fn parse_movie_row(row: &rusqlite::Row) -> rusqlite::Result<CatalogEntity> {
    let genres: String = row.get(7)?;
    Ok(CatalogEntity {
        local_id: Some(LocalId::new(row.get(0)?)),
        external_id: ExternalId::new(row.get(1)?),
        title: row.get(2)?,
        release_year: u16::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
        rating_average: row.get(4)?,
        runtime_minutes: u32::try_from(row.get::<_, i64>(5)?).unwrap_or(0),
        poster_reference: row.get(6)?,
        genres: decode_genres(&genres),
        is_favorite: row.get(8)?,
        is_in_watchlist: row.get(9)?,
    })
}

/// Escape `LIKE` wildcards so user text matches literally.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Whether a movie with this external id has been persisted.
pub fn exists_by_external_id(conn: &Connection, external_id: ExternalId) -> Result<bool> {
    Ok(local_id(conn, external_id)?.is_some())
}

/// Look up the local row id for an external id.
pub fn local_id(conn: &Connection, external_id: ExternalId) -> Result<Option<LocalId>> {
    conn.query_row(
        "SELECT id FROM movies WHERE external_id = ?",
        [external_id.get()],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map(|id| id.map(LocalId::new))
    .map_err(|e| Error::database(e.to_string()))
}

/// Insert a movie if its external id is unseen, otherwise update it in place.
///
/// The update never downgrades stored data: a zero runtime, an empty poster
/// reference, an unknown year or an empty genre list leave the stored value
/// untouched. The rating is only overwritten while no local user has rated
/// the movie. Re-ingesting identical values is a no-op in effect.
pub fn upsert_movie(conn: &Connection, movie: &CatalogEntity) -> Result<Upserted> {
    let genres = encode_genres(&movie.genres);

    if let Some(id) = local_id(conn, movie.external_id)? {
        conn.execute(
            "UPDATE movies SET
                title = CASE WHEN :title != '' THEN :title ELSE title END,
                release_year = CASE WHEN :release_year > 0 THEN :release_year ELSE release_year END,
                rating_average = CASE WHEN votes <= 1 THEN :rating_average ELSE rating_average END,
                runtime_minutes = CASE WHEN :runtime_minutes > 0 THEN :runtime_minutes ELSE runtime_minutes END,
                poster_reference = CASE WHEN :poster_reference != '' THEN :poster_reference ELSE poster_reference END,
                genres = CASE WHEN :genres != '' THEN :genres ELSE genres END,
                updated_at = datetime('now')
             WHERE id = :id",
            rusqlite::named_params! {
                ":id": id.get(),
                ":title": &movie.title,
                ":release_year": movie.release_year,
                ":rating_average": movie.rating_average,
                ":runtime_minutes": movie.runtime_minutes,
                ":poster_reference": &movie.poster_reference,
                ":genres": genres,
            },
        )
        .map_err(|e| Error::database(e.to_string()))?;
        return Ok(Upserted::Updated(id));
    }

    conn.execute(
        "INSERT INTO movies (
            external_id, title, release_year, rating_average, runtime_minutes,
            poster_reference, genres
         ) VALUES (
            :external_id, :title, :release_year, :rating_average, :runtime_minutes,
            :poster_reference, :genres
         )",
        rusqlite::named_params! {
            ":external_id": movie.external_id.get(),
            ":title": &movie.title,
            ":release_year": movie.release_year,
            ":rating_average": movie.rating_average,
            ":runtime_minutes": movie.runtime_minutes,
            ":poster_reference": &movie.poster_reference,
            ":genres": genres,
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Upserted::Inserted(LocalId::new(conn.last_insert_rowid())))
}

/// Upsert a batch of movies inside one transaction.
pub fn upsert_movies(conn: &Connection, movies: &[CatalogEntity]) -> Result<UpsertSummary> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let mut summary = UpsertSummary::default();
    for movie in movies {
        match upsert_movie(&tx, movie)? {
            Upserted::Inserted(_) => summary.inserted += 1,
            Upserted::Updated(_) => summary.updated += 1,
        }
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(summary)
}

/// Set the runtime of a movie. Returns `false` if no row matched.
pub fn update_runtime(conn: &Connection, external_id: ExternalId, minutes: u32) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE movies SET runtime_minutes = ?, updated_at = datetime('now')
             WHERE external_id = ?",
            rusqlite::params![minutes, external_id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(changed > 0)
}

/// Whether the stored row for this external id has a runtime above zero.
pub fn has_known_runtime(conn: &Connection, external_id: ExternalId) -> Result<bool> {
    conn.query_row(
        "SELECT runtime_minutes > 0 FROM movies WHERE external_id = ?",
        [external_id.get()],
        |row| row.get::<_, bool>(0),
    )
    .optional()
    .map(|known| known.unwrap_or(false))
    .map_err(|e| Error::database(e.to_string()))
}

/// Fold a user rating into the movie's running average.
///
/// Returns the new average. Ratings outside 0-10 are rejected.
pub fn record_rating(conn: &Connection, local_id: LocalId, rating: f64) -> Result<f64> {
    if !(0.0..=10.0).contains(&rating) {
        return Err(Error::invalid_input(format!(
            "rating {} is outside 0-10",
            rating
        )));
    }

    let changed = conn
        .execute(
            "UPDATE movies
             SET rating_average = (rating_average * votes + ?) / (votes + 1),
                 votes = votes + 1,
                 updated_at = datetime('now')
             WHERE id = ?",
            rusqlite::params![rating, local_id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if changed == 0 {
        return Err(Error::not_found(format!("movie {}", local_id)));
    }

    conn.query_row(
        "SELECT rating_average FROM movies WHERE id = ?",
        [local_id.get()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Get a single movie by external id, with the user's membership flags.
pub fn get_movie(
    conn: &Connection,
    external_id: ExternalId,
    user_id: Option<UserId>,
) -> Result<Option<CatalogEntity>> {
    let sql = format!("{SELECT_MOVIES} WHERE m.external_id = :external_id");
    conn.query_row(
        &sql,
        rusqlite::named_params! {
            ":user_id": user_id.map(UserId::get),
            ":external_id": external_id.get(),
        },
        parse_movie_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// List movies matching a filter, ordered by `sort`.
pub fn list_movies(
    conn: &Connection,
    filter: &MovieFilter,
    sort: SortSpec,
    user_id: Option<UserId>,
) -> Result<Vec<CatalogEntity>> {
    let user = user_id.map(UserId::get);
    let order = sort.field.order_clause();

    let rows = match filter {
        MovieFilter::All => {
            let sql = format!("{SELECT_MOVIES} ORDER BY {order}");
            query_movies(conn, &sql, rusqlite::named_params! { ":user_id": user })
        }
        MovieFilter::Genre(genre) => {
            let genre = genre.trim();
            let escaped = escape_like(genre);
            let sql = format!(
                "{SELECT_MOVIES}
                 WHERE m.genres = :genre
                    OR m.genres LIKE :leading ESCAPE '\\'
                    OR m.genres LIKE :middle ESCAPE '\\'
                    OR m.genres LIKE :trailing ESCAPE '\\'
                 ORDER BY {order}"
            );
            query_movies(
                conn,
                &sql,
                rusqlite::named_params! {
                    ":user_id": user,
                    ":genre": genre,
                    ":leading": format!("{escaped},%"),
                    ":middle": format!("%,{escaped},%"),
                    ":trailing": format!("%,{escaped}"),
                },
            )
        }
        MovieFilter::Title(text) => {
            let sql = format!(
                "{SELECT_MOVIES}
                 WHERE LOWER(m.title) LIKE LOWER(:pattern) ESCAPE '\\'
                 ORDER BY {order}"
            );
            query_movies(
                conn,
                &sql,
                rusqlite::named_params! {
                    ":user_id": user,
                    ":pattern": format!("%{}%", escape_like(text.trim())),
                },
            )
        }
    };

    rows.map_err(|e| Error::database(e.to_string()))
}

fn query_movies(
    conn: &Connection,
    sql: &str,
    params: &[(&str, &dyn rusqlite::ToSql)],
) -> rusqlite::Result<Vec<CatalogEntity>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, parse_movie_row)?;
    rows.collect()
}

/// All distinct genre names in the catalog, sorted alphabetically.
pub fn distinct_genres(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT genres FROM movies WHERE genres != ''")
        .map_err(|e| Error::database(e.to_string()))?;

    let raw = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))?;

    let mut genres: Vec<String> = raw.iter().flat_map(|r| decode_genres(r)).collect();
    genres.sort();
    genres.dedup();
    Ok(genres)
}

/// Number of movies in the catalog.
pub fn count_movies(conn: &Connection) -> Result<u64> {
    conn.query_row("SELECT COUNT(*) FROM movies", [], |row| row.get::<_, i64>(0))
        .map(|n| u64::try_from(n).unwrap_or(0))
        .map_err(|e| Error::database(e.to_string()))
}
