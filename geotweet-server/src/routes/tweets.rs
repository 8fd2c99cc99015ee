//! Tweet endpoints
//!
//! Every handler borrows one session from the pool, runs its queries, and
//! hands the session back. Early returns drop the session guard, which
//! returns it too.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use tracing::debug;

use crate::db::TweetRepo;
use crate::error::ApiError;
use crate::models::{BoundingBox, TimeRange, TweetParams, Tweets};
use crate::state::AppState;

/// GET /tweet - one page of tweets inside a box and time window
async fn search(
    State(state): State<AppState>,
    Query(params): Query<TweetParams>,
) -> Result<Json<Tweets>, ApiError> {
    let query = params.normalize(Utc::now())?;
    debug!(
        west = query.west,
        east = query.east,
        south = query.south,
        north = query.north,
        min_time = %query.min_time,
        max_time = %query.max_time,
        offset = query.offset,
        "tweet search"
    );

    let mut session = state.sessions().session().await?;
    let mut repo = TweetRepo::new(session.connection());
    let total = repo.count(&query).await?;
    let tweet = if total > query.offset {
        repo.page(&query).await?
    } else {
        Vec::new()
    };
    session.release().await;

    debug!(total, returned = tweet.len(), "tweet search done");
    Ok(Json(Tweets {
        offset: query.offset,
        total,
        tweet,
    }))
}

/// GET /tweet/maprange - geographic extent of the stored tweets
async fn map_range(State(state): State<AppState>) -> Result<Json<BoundingBox>, ApiError> {
    let mut session = state.sessions().session().await?;
    let range = TweetRepo::new(session.connection()).map_range().await?;
    session.release().await;

    range
        .map(Json)
        .ok_or(ApiError::NotFound { resource: "tweets" })
}

/// GET /tweet/timerange - earliest and latest tweet times
async fn time_range(State(state): State<AppState>) -> Result<Json<TimeRange>, ApiError> {
    let mut session = state.sessions().session().await?;
    let range = TweetRepo::new(session.connection()).time_range().await?;
    session.release().await;

    range
        .map(Json)
        .ok_or(ApiError::NotFound { resource: "tweets" })
}

/// Tweet routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tweet", get(search))
        .route("/tweet/maprange", get(map_range))
        .route("/tweet/timerange", get(time_range))
}
