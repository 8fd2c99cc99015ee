//! Tweet storage
//!
//! Queries run on a single pooled session. The repository borrows the
//! session's connection for the duration of a request.

use chrono::{DateTime, Utc};
use geotweet_pool::{PgSessionSource, SessionFactory, SessionPool};
use sqlx::PgConnection;

use crate::models::{BoundingBox, TimeRange, Tweet, TweetQuery, PAGE_SIZE};

/// Name of the session pool, used in logs and errors.
pub const SESSION_POOL: &str = "sessions";

/// A lazily initialized session pool for `database_url`. Nothing connects
/// until the first borrow.
pub fn session_pool(database_url: impl Into<String>) -> SessionPool<PgSessionSource> {
    let database_url = database_url.into();
    SessionPool::lazy(SESSION_POOL, move || {
        let database_url = database_url.clone();
        async move { PgSessionSource::from_url(&database_url).map(SessionFactory::new) }
    })
}

/// Create the tweet table and its indexes if they are missing.
pub async fn ensure_schema(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    tracing::info!("Ensuring tweet schema...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS twitterstream (
            tweetid TEXT NOT NULL,
            time TIMESTAMPTZ NOT NULL,
            lat DOUBLE PRECISION NOT NULL,
            long DOUBLE PRECISION NOT NULL,
            text TEXT NOT NULL DEFAULT '',
            userid TEXT NOT NULL DEFAULT '',
            boundingbox TEXT,
            PRIMARY KEY (tweetid, time)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS twitterstream_time_idx ON twitterstream (time)")
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS twitterstream_position_idx ON twitterstream (lat, long)",
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

const MATCHES: &str = "
    WHERE long > $1 AND long < $2
      AND lat > $3 AND lat < $4
      AND time > $5 AND time < $6";

/// Tweet repository
pub struct TweetRepo<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> TweetRepo<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }

    /// Number of tweets strictly inside the query's bounds.
    pub async fn count(&mut self, query: &TweetQuery) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM twitterstream {}", MATCHES);
        sqlx::query_scalar(&sql)
            .bind(query.west)
            .bind(query.east)
            .bind(query.south)
            .bind(query.north)
            .bind(query.min_time)
            .bind(query.max_time)
            .fetch_one(&mut *self.conn)
            .await
    }

    /// One page of matching tweets, oldest first.
    pub async fn page(&mut self, query: &TweetQuery) -> Result<Vec<Tweet>, sqlx::Error> {
        let sql = format!(
            "SELECT tweetid, time, lat, long, text, userid, boundingbox
             FROM twitterstream {}
             ORDER BY time, tweetid
             LIMIT $7 OFFSET $8",
            MATCHES
        );
        sqlx::query_as(&sql)
            .bind(query.west)
            .bind(query.east)
            .bind(query.south)
            .bind(query.north)
            .bind(query.min_time)
            .bind(query.max_time)
            .bind(PAGE_SIZE)
            .bind(query.offset)
            .fetch_all(&mut *self.conn)
            .await
    }

    /// Extent of all stored positions, or `None` when the table is empty.
    pub async fn map_range(&mut self) -> Result<Option<BoundingBox>, sqlx::Error> {
        let (north, east, west, south): (Option<f64>, Option<f64>, Option<f64>, Option<f64>) =
            sqlx::query_as(
                "SELECT MAX(lat), MAX(long), MIN(long), MIN(lat) FROM twitterstream",
            )
            .fetch_one(&mut *self.conn)
            .await?;

        Ok(match (north, east, west, south) {
            (Some(north), Some(east), Some(west), Some(south)) => Some(BoundingBox {
                north,
                east,
                west,
                south,
            }),
            _ => None,
        })
    }

    /// Earliest and latest tweet times, or `None` when the table is empty.
    pub async fn time_range(&mut self) -> Result<Option<TimeRange>, sqlx::Error> {
        let (min_time, max_time) = sqlx::query_as::<_, (Option<DateTime<Utc>>, Option<DateTime<Utc>>)>(
            "SELECT MIN(time), MAX(time) FROM twitterstream",
        )
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(min_time
            .zip(max_time)
            .map(|(min_time, max_time)| TimeRange { min_time, max_time }))
    }

    pub async fn insert(&mut self, tweet: &Tweet) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO twitterstream (tweetid, time, lat, long, text, userid, boundingbox)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tweetid, time) DO NOTHING
            "#,
        )
        .bind(&tweet.tweetid)
        .bind(tweet.time)
        .bind(tweet.lat)
        .bind(tweet.lon)
        .bind(&tweet.text)
        .bind(&tweet.userid)
        .bind(&tweet.boundingbox)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }
}
