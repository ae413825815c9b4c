//! Per-user favorite and watchlist relations.
//!
//! Both relations share one shape, a `(user_id, movie_id)` row whose
//! presence is the flag, so the operations are written once over [`Relation`].

use cinesync_common::{Error, LocalId, Result, SortSpec, UserId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::CatalogEntity;
use crate::queries::movies::parse_movie_row;

/// A per-user membership list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Favorites,
    Watchlist,
}

impl Relation {
    fn table(self) -> &'static str {
        match self {
            Self::Favorites => "favorites",
            Self::Watchlist => "watchlist",
        }
    }
}

/// Whether the movie is in the user's list.
pub fn contains(conn: &Connection, relation: Relation, user_id: UserId, movie_id: LocalId) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE user_id = ? AND movie_id = ?",
        relation.table()
    );
    conn.query_row(&sql, [user_id.get(), movie_id.get()], |_| Ok(()))
        .optional()
        .map(|row| row.is_some())
        .map_err(|e| Error::database(e.to_string()))
}

/// Add or remove the movie from the user's list.
pub fn set(
    conn: &Connection,
    relation: Relation,
    user_id: UserId,
    movie_id: LocalId,
    member: bool,
) -> Result<()> {
    let sql = if member {
        format!(
            "INSERT OR IGNORE INTO {} (user_id, movie_id) VALUES (?, ?)",
            relation.table()
        )
    } else {
        format!(
            "DELETE FROM {} WHERE user_id = ? AND movie_id = ?",
            relation.table()
        )
    };

    conn.execute(&sql, [user_id.get(), movie_id.get()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Flip membership and return the new state.
pub fn toggle(conn: &Connection, relation: Relation, user_id: UserId, movie_id: LocalId) -> Result<bool> {
    let member = !contains(conn, relation, user_id, movie_id)?;
    set(conn, relation, user_id, movie_id, member)?;
    Ok(member)
}

/// All movies in the user's list, with both membership flags populated.
pub fn list(
    conn: &Connection,
    relation: Relation,
    user_id: UserId,
    sort: SortSpec,
) -> Result<Vec<CatalogEntity>> {
    let sql = format!(
        "SELECT m.id, m.external_id, m.title, m.release_year, m.rating_average,
                m.runtime_minutes, m.poster_reference, m.genres,
                f.user_id IS NOT NULL, w.user_id IS NOT NULL
         FROM movies m
         JOIN {table} r ON r.movie_id = m.id AND r.user_id = :user_id
         LEFT JOIN favorites f ON f.movie_id = m.id AND f.user_id = :user_id
         LEFT JOIN watchlist w ON w.movie_id = m.id AND w.user_id = :user_id
         ORDER BY {order}",
        table = relation.table(),
        order = sort.field.order_clause(),
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(
            rusqlite::named_params! { ":user_id": user_id.get() },
            parse_movie_row,
        )
        .map_err(|e| Error::database(e.to_string()))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}
