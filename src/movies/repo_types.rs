use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::validator::{unique, Validator};

const TITLE_MAX_BYTES: usize = 500;
const EARLIEST_YEAR: i32 = 1888;

/// Running time in minutes. Serialized as `"<n> mins"`; accepted either as a
/// bare integer or in that same string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, sqlx::Type)]
#[sqlx(transparent)]
pub struct Runtime(pub i32);

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Minutes(i32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Minutes(m) => Ok(Runtime(m)),
            Raw::Text(s) => s
                .strip_suffix(" mins")
                .and_then(|n| n.parse::<i32>().ok())
                .map(Runtime)
                .ok_or_else(|| de::Error::custom("invalid runtime format")),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Movie {
    pub id: Uuid,
    #[serde(skip)]
    pub created_at: OffsetDateTime,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

/// Movie fields prior to insertion.
#[derive(Debug, Clone, Default)]
pub struct MovieDraft {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

pub fn validate_movie(v: &mut Validator, title: &str, year: i32, runtime: Runtime, genres: &[String]) {
    v.check(title.trim().is_empty(), "title", "must be provided");
    v.check(title.len() > TITLE_MAX_BYTES, "title", "must not be more than 500 bytes long");
    v.check(year == 0, "year", "must be provided");
    v.check(year <= EARLIEST_YEAR, "year", "must be greater than 1888");
    v.check(year > OffsetDateTime::now_utc().year(), "year", "must not be in the future");
    v.check(runtime.0 <= 0, "runtime", "must be a positive integer");
    v.check(genres.is_empty() || genres.len() > 5, "genres", "must contain between 1 and 5 genres");
    v.check(!unique(genres), "genres", "must not contain duplicate values");
}

impl MovieDraft {
    pub fn validate(&self, v: &mut Validator) {
        validate_movie(v, &self.title, self.year, self.runtime, &self.genres);
    }
}

impl Movie {
    pub fn validate(&self, v: &mut Validator) {
        validate_movie(v, &self.title, self.year, self.runtime, &self.genres);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> MovieDraft {
        MovieDraft {
            title: "Casablanca".into(),
            year: 1942,
            runtime: Runtime(102),
            genres: vec!["drama".into(), "romance".into()],
        }
    }

    #[test]
    fn runtime_serializes_with_unit() {
        assert_eq!(serde_json::to_string(&Runtime(102)).unwrap(), "\"102 mins\"");
    }

    #[test]
    fn runtime_accepts_integer_or_unit_string() {
        assert_eq!(serde_json::from_str::<Runtime>("102").unwrap(), Runtime(102));
        assert_eq!(serde_json::from_str::<Runtime>("\"95 mins\"").unwrap(), Runtime(95));
        assert!(serde_json::from_str::<Runtime>("\"95 minutes\"").is_err());
    }

    #[test]
    fn valid_draft_passes() {
        let mut v = Validator::new();
        draft().validate(&mut v);
        assert!(v.valid());
    }

    #[test]
    fn invalid_fields_are_reported() {
        let cases: Vec<Box<dyn Fn(&mut MovieDraft)>> = vec![
            Box::new(|d| d.title = "  ".into()),
            Box::new(|d| d.title = "x".repeat(501)),
            Box::new(|d| d.year = 0),
            Box::new(|d| d.year = 1888),
            Box::new(|d| d.year = OffsetDateTime::now_utc().year() + 1),
            Box::new(|d| d.runtime = Runtime(0)),
            Box::new(|d| d.genres.clear()),
            Box::new(|d| d.genres = (0..6).map(|i| format!("g{i}")).collect()),
            Box::new(|d| d.genres = vec!["drama".into(), "drama".into()]),
        ];
        for mutate in cases {
            let mut d = draft();
            mutate(&mut d);
            let mut v = Validator::new();
            d.validate(&mut v);
            assert!(!v.valid(), "{d:?} should be invalid");
        }
    }

    #[test]
    fn created_at_is_not_serialized() {
        let movie = Movie {
            id: Uuid::new_v4(),
            created_at: OffsetDateTime::now_utc(),
            title: "Heat".into(),
            year: 1995,
            runtime: Runtime(170),
            genres: vec!["crime".into()],
            version: 1,
        };
        let value = serde_json::to_value(&movie).unwrap();
        assert!(value.get("created_at").is_none());
        assert_eq!(value["runtime"], "170 mins");
        assert_eq!(value["version"], 1);
    }
}
