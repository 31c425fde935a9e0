use serde::{Deserialize, Serialize};

use crate::movies::{
    filters::Metadata,
    repo_types::{Movie, Runtime},
};

/// Body for create and partial update. Absent fields are left untouched on
/// update and fail validation on create.
#[derive(Debug, Default, Deserialize)]
pub struct MovieInput {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct MovieResponse {
    pub movie: Movie,
}

#[derive(Debug, Serialize)]
pub struct MovieListResponse {
    pub movies: Vec<Movie>,
    pub metadata: Metadata,
}
