use std::collections::HashMap;

use serde::Serialize;

use crate::validator::Validator;

pub const SORT_SAFELIST: &[&str] = &["id", "title", "year", "runtime"];

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 20;
const MAX_PAGE: i64 = 10_000_000;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Validated listing query. `sort` only ever holds a safelisted column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFilters {
    pub title: String,
    pub genres: Vec<String>,
    pub year: i32,
    pub page: i64,
    pub limit: i64,
    pub sort: Option<(&'static str, SortDirection)>,
}

impl Default for MovieFilters {
    fn default() -> Self {
        Self {
            title: String::new(),
            genres: Vec::new(),
            year: 0,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            sort: None,
        }
    }
}

fn read_int<T: std::str::FromStr>(
    qs: &HashMap<String, String>,
    key: &str,
    fallback: T,
    v: &mut Validator,
) -> T {
    match qs.get(key).map(String::as_str) {
        None | Some("") => fallback,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            fallback
        }),
    }
}

fn parse_sort(raw: &str) -> Option<(&'static str, SortDirection)> {
    let (column, direction) = match raw.strip_prefix('-') {
        Some(col) => (col, SortDirection::Desc),
        None => (raw, SortDirection::Asc),
    };
    SORT_SAFELIST
        .iter()
        .find(|c| **c == column)
        .map(|c| (*c, direction))
}

impl MovieFilters {
    pub fn from_query(qs: &HashMap<String, String>, v: &mut Validator) -> Self {
        let title = qs
            .get("title")
            .or_else(|| qs.get("search_term"))
            .cloned()
            .unwrap_or_default();
        let genres = qs
            .get("genres")
            .map(|g| {
                g.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let year = read_int(qs, "year", 0, v);
        let page = read_int(qs, "page", DEFAULT_PAGE, v);
        let limit = read_int(qs, "limit", DEFAULT_LIMIT, v);

        v.check(page < 1, "page", "must be greater than zero");
        v.check(page > MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(limit < 1, "limit", "must be greater than zero");
        v.check(limit > MAX_LIMIT, "limit", "must be a maximum of 100");

        let sort = match qs.get("sort").map(String::as_str) {
            None | Some("") => None,
            Some(raw) => {
                let parsed = parse_sort(raw);
                v.check(parsed.is_none(), "sort", "invalid sort value");
                parsed
            }
        };

        Self {
            title,
            genres,
            year,
            page,
            limit,
            sort,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<i64>,
}

impl Metadata {
    /// Empty when there are no records at all.
    pub fn calculate(total_records: i64, page: i64, limit: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        Self {
            current_page: Some(page),
            limit: Some(limit),
            first_page: Some(1),
            last_page: Some((total_records + limit - 1) / limit),
            total_records: Some(total_records),
        }
    }
}
