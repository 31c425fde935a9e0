use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::Authorized,
        permissions::{MoviesRead, MoviesWrite},
    },
    error::ApiError,
    movies::{
        dto::{MovieInput, MovieListResponse, MovieResponse},
        filters::MovieFilters,
        repo_types::{MovieDraft, Runtime},
    },
    response::{created, ok, JsonBody},
    state::AppState,
    validator::Validator,
};

pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

pub fn movie_routes() -> Router<AppState> {
    Router::new()
        .route("/movies", get(list_movies).post(create_movie))
        .route(
            "/movies/:id",
            get(show_movie).patch(update_movie).delete(delete_movie),
        )
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("invalid id parameter".into()))
}

/// Version the client last observed, if it sent one.
fn expected_version(headers: &HeaderMap) -> Result<Option<i32>, ApiError> {
    headers
        .get(EXPECTED_VERSION_HEADER)
        .map(|v| {
            v.to_str()
                .ok()
                .and_then(|s| s.trim().parse::<i32>().ok())
                .ok_or_else(|| ApiError::BadRequest("invalid expected version header".into()))
        })
        .transpose()
}

#[instrument(skip(state, _auth))]
pub async fn list_movies(
    State(state): State<AppState>,
    _auth: Authorized<MoviesRead>,
    Query(qs): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    let filters = MovieFilters::from_query(&qs, &mut v);
    v.into_result()?;

    let (movies, metadata) = state.movies.list(&filters).await?;
    Ok(ok(MovieListResponse { movies, metadata }))
}

#[instrument(skip(state, _auth))]
pub async fn show_movie(
    State(state): State<AppState>,
    _auth: Authorized<MoviesRead>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let movie = state.movies.get(id).await?;
    Ok(ok(MovieResponse { movie }))
}

#[instrument(skip(state, auth, input))]
pub async fn create_movie(
    State(state): State<AppState>,
    auth: Authorized<MoviesWrite>,
    JsonBody(input): JsonBody<MovieInput>,
) -> Result<Response, ApiError> {
    let draft = MovieDraft {
        title: input.title.unwrap_or_default(),
        year: input.year.unwrap_or_default(),
        runtime: input.runtime.unwrap_or(Runtime(0)),
        genres: input.genres.unwrap_or_default(),
    };
    let mut v = Validator::new();
    draft.validate(&mut v);
    v.into_result()?;

    let movie = state.movies.insert(draft).await?;
    info!(movie_id = %movie.id, user_id = %auth.user.id, "movie created");

    let mut res = created(MovieResponse { movie: movie.clone() });
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id)) {
        res.headers_mut().insert(header::LOCATION, location);
    }
    Ok(res)
}

#[instrument(skip(state, auth, headers, input))]
pub async fn update_movie(
    State(state): State<AppState>,
    auth: Authorized<MoviesWrite>,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<MovieInput>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let expected = expected_version(&headers)?;

    let mut movie = state.movies.get(id).await?;
    if expected.is_some_and(|ev| ev != movie.version) {
        return Err(ApiError::EditConflict);
    }

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres.filter(|g| !g.is_empty()) {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    movie.validate(&mut v);
    v.into_result()?;

    movie.version = state.movies.update(&movie).await?;
    info!(movie_id = %movie.id, version = movie.version, user_id = %auth.user.id, "movie updated");
    Ok(ok(MovieResponse { movie }))
}

#[instrument(skip(state, auth))]
pub async fn delete_movie(
    State(state): State<AppState>,
    auth: Authorized<MoviesWrite>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    state.movies.delete(id).await?;
    info!(movie_id = %id, user_id = %auth.user.id, "movie deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}
