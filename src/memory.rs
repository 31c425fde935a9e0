//! In-process store implementing every storage trait with the same observable
//! semantics as [`PgStore`](crate::db::PgStore). Used by tests and local runs
//! without a database.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        permissions::{Permissions, MOVIES_READ, MOVIES_WRITE},
        repo::{PermissionStore, TokenStore, UserStore},
        repo_types::{NewUser, User},
        token::{hash_token, Token, TokenScope},
    },
    db::{StoreError, StoreResult},
    movies::{
        filters::{Metadata, MovieFilters, SortDirection},
        repo::MovieStore,
        repo_types::{Movie, MovieDraft},
    },
};

const KNOWN_PERMISSIONS: &[&str] = &[MOVIES_READ, MOVIES_WRITE];

struct StoredToken {
    hash: Vec<u8>,
    user_id: Uuid,
    expiry: OffsetDateTime,
    scope: TokenScope,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tokens: Vec<StoredToken>,
    grants: HashMap<Uuid, HashSet<String>>,
    movies: HashMap<Uuid, Movie>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_permission_reads: Arc<AtomicBool>,
    fail_token_reads: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes permission lookups fail with `Unavailable` until switched off.
    pub fn fail_permission_reads(&self, fail: bool) {
        self.fail_permission_reads.store(fail, Ordering::SeqCst);
    }

    /// Same for token lookups.
    pub fn fail_token_reads(&self, fail: bool) {
        self.fail_token_reads.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let mut t = self.lock()?;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            created_at: OffsetDateTime::now_utc(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated: false,
            version: 1,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let t = self.lock()?;
        t.users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &User) -> StoreResult<i32> {
        let mut t = self.lock()?;
        if t
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::DuplicateEmail);
        }
        let stored = t
            .users
            .get_mut(&user.id)
            .filter(|u| u.version == user.version)
            .ok_or(StoreError::EditConflict)?;
        *stored = User {
            version: user.version + 1,
            created_at: stored.created_at,
            ..user.clone()
        };
        Ok(stored.version)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &Token) -> StoreResult<()> {
        let mut t = self.lock()?;
        if !t.users.contains_key(&token.user_id) {
            return Err(StoreError::Unavailable(format!(
                "token references unknown user {}",
                token.user_id
            )));
        }
        t.tokens.push(StoredToken {
            hash: token.hash.clone(),
            user_id: token.user_id,
            expiry: token.expiry,
            scope: token.scope,
        });
        Ok(())
    }

    async fn find_user_by_token(&self, scope: TokenScope, plaintext: &str) -> StoreResult<User> {
        if self.fail_token_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("token reads disabled".into()));
        }
        let hash = hash_token(plaintext);
        let now = OffsetDateTime::now_utc();
        let t = self.lock()?;
        t.tokens
            .iter()
            .find(|tok| tok.hash == hash && tok.scope == scope && tok.expiry > now)
            .and_then(|tok| t.users.get(&tok.user_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: Uuid) -> StoreResult<()> {
        let mut t = self.lock()?;
        t.tokens
            .retain(|tok| !(tok.user_id == user_id && tok.scope == scope));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_all_for_user(&self, user_id: Uuid) -> StoreResult<Permissions> {
        if self.fail_permission_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("permission reads disabled".into()));
        }
        let t = self.lock()?;
        Ok(t.grants
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: Uuid, codes: &[&str]) -> StoreResult<()> {
        let mut t = self.lock()?;
        let granted = t.grants.entry(user_id).or_default();
        for code in codes.iter().filter(|c| KNOWN_PERMISSIONS.contains(c)) {
            granted.insert(code.to_string());
        }
        Ok(())
    }
}

fn words(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn movie_matches(movie: &Movie, filters: &MovieFilters) -> bool {
    let title_words = words(&movie.title);
    words(&filters.title)
        .iter()
        .all(|w| title_words.contains(w))
        && filters.genres.iter().all(|g| movie.genres.contains(g))
        && (filters.year == 0 || movie.year == filters.year)
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, draft: MovieDraft) -> StoreResult<Movie> {
        let movie = Movie {
            id: Uuid::new_v4(),
            created_at: OffsetDateTime::now_utc(),
            title: draft.title,
            year: draft.year,
            runtime: draft.runtime,
            genres: draft.genres,
            version: 1,
        };
        self.lock()?.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Movie> {
        self.lock()?
            .movies
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &Movie) -> StoreResult<i32> {
        let mut t = self.lock()?;
        let stored = t
            .movies
            .get_mut(&movie.id)
            .filter(|m| m.version == movie.version)
            .ok_or(StoreError::EditConflict)?;
        *stored = Movie {
            version: movie.version + 1,
            created_at: stored.created_at,
            ..movie.clone()
        };
        Ok(stored.version)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.lock()?
            .movies
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, filters: &MovieFilters) -> StoreResult<(Vec<Movie>, Metadata)> {
        let mut found: Vec<Movie> = self
            .lock()?
            .movies
            .values()
            .filter(|m| movie_matches(m, filters))
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            let primary = match filters.sort {
                Some(("title", _)) => a.title.cmp(&b.title),
                Some(("year", _)) => a.year.cmp(&b.year),
                Some(("runtime", _)) => a.runtime.cmp(&b.runtime),
                _ => std::cmp::Ordering::Equal,
            };
            let primary = match filters.sort {
                Some((_, SortDirection::Desc)) => primary.reverse(),
                _ => primary,
            };
            let tiebreak = match filters.sort {
                Some(("id", SortDirection::Desc)) => b.id.cmp(&a.id),
                _ => a.id.cmp(&b.id),
            };
            primary.then(tiebreak)
        });

        let matched = found.len() as i64;
        let page: Vec<Movie> = found
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit as usize)
            .collect();
        // The windowed count only exists on returned rows, so a page past the
        // end reports no records.
        let total = if page.is_empty() { 0 } else { matched };
        Ok((page, Metadata::calculate(total, filters.page, filters.limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movies::repo_types::Runtime;

    fn draft(title: &str, year: i32, genres: &[&str]) -> MovieDraft {
        MovieDraft {
            title: title.into(),
            year,
            runtime: Runtime(100),
            genres: genres.iter().map(|g| g.to_string()).collect(),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for d in [
            draft("The Godfather", 1972, &["crime", "drama"]),
            draft("The Godfather Part II", 1974, &["crime", "drama"]),
            draft("Heat", 1995, &["crime", "action"]),
            draft("Amelie", 2001, &["comedy", "romance"]),
        ] {
            MovieStore::insert(&store, d).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn concurrent_updates_at_same_version_have_one_winner() {
        let store = MemoryStore::new();
        let movie = MovieStore::insert(&store, draft("Heat", 1995, &["crime"]))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let mut copy = movie.clone();
            copy.title = format!("Heat #{i}");
            handles.push(tokio::spawn(async move {
                MovieStore::update(&store, &copy).await
            }));
        }

        let mut won = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(v) => {
                    assert_eq!(v, movie.version + 1);
                    won += 1;
                }
                Err(StoreError::EditConflict) => conflicts += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!((won, conflicts), (1, 7));
        assert_eq!(store.get(movie.id).await.unwrap().version, movie.version + 1);
    }

    #[tokio::test]
    async fn user_update_checks_version_and_email() {
        let store = MemoryStore::new();
        let new = |email: &str| NewUser {
            name: "Ada".into(),
            email: email.into(),
            password_hash: "h".into(),
        };
        let mut ada = UserStore::insert(&store, new("ada@x.com")).await.unwrap();
        UserStore::insert(&store, new("bob@x.com")).await.unwrap();
        assert!(matches!(
            UserStore::insert(&store, new("ada@x.com")).await,
            Err(StoreError::DuplicateEmail)
        ));

        ada.activated = true;
        ada.version = UserStore::update(&store, &ada).await.unwrap();
        assert_eq!(ada.version, 2);

        let mut stale = ada.clone();
        stale.version = 1;
        assert!(matches!(
            UserStore::update(&store, &stale).await,
            Err(StoreError::EditConflict)
        ));

        ada.email = "bob@x.com".into();
        assert!(matches!(
            UserStore::update(&store, &ada).await,
            Err(StoreError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn expired_tokens_are_not_found() {
        let store = MemoryStore::new();
        let user = UserStore::insert(
            &store,
            NewUser {
                name: "Ada".into(),
                email: "ada@x.com".into(),
                password_hash: "h".into(),
            },
        )
        .await
        .unwrap();

        let expired =
            Token::generate(user.id, time::Duration::seconds(-1), TokenScope::Activation).unwrap();
        TokenStore::insert(&store, &expired).await.unwrap();
        assert!(matches!(
            store
                .find_user_by_token(TokenScope::Activation, &expired.plaintext)
                .await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn grants_are_idempotent_and_ignore_unknown_codes() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.add_for_user(id, &[MOVIES_READ, "movies:burn"]).await.unwrap();
        store.add_for_user(id, &[MOVIES_READ]).await.unwrap();
        let perms = store.get_all_for_user(id).await.unwrap();
        assert_eq!(perms, [MOVIES_READ].into_iter().collect::<Permissions>());
        assert_eq!(
            store.get_all_for_user(Uuid::new_v4()).await.unwrap(),
            Permissions::default()
        );
    }

    #[tokio::test]
    async fn list_filters_sorts_and_pages() {
        let store = seeded().await;

        let filters = MovieFilters {
            title: "godfather".into(),
            ..MovieFilters::default()
        };
        let (movies, meta) = store.list(&filters).await.unwrap();
        assert_eq!(movies.len(), 2);
        assert_eq!(meta.total_records, Some(2));

        let filters = MovieFilters {
            genres: vec!["crime".into(), "action".into()],
            ..MovieFilters::default()
        };
        let (movies, _) = store.list(&filters).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Heat");

        let filters = MovieFilters {
            sort: Some(("year", SortDirection::Desc)),
            page: 2,
            limit: 3,
            ..MovieFilters::default()
        };
        let (movies, meta) = store.list(&filters).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].year, 1972);
        assert_eq!(meta.last_page, Some(2));
        assert_eq!(meta.current_page, Some(2));

        let filters = MovieFilters {
            year: 1850,
            ..MovieFilters::default()
        };
        let (movies, meta) = store.list(&filters).await.unwrap();
        assert!(movies.is_empty());
        assert_eq!(meta, Metadata::default());
    }

    #[tokio::test]
    async fn page_past_the_end_has_empty_metadata() {
        let store = seeded().await;
        let filters = MovieFilters {
            page: 3,
            limit: 2,
            ..MovieFilters::default()
        };
        let (movies, meta) = store.list(&filters).await.unwrap();
        assert!(movies.is_empty());
        assert_eq!(meta, Metadata::default());
    }

    #[tokio::test]
    async fn token_read_failure_is_not_a_miss() {
        let store = MemoryStore::new();
        store.fail_token_reads(true);
        assert!(matches!(
            store
                .find_user_by_token(TokenScope::Authentication, &"A".repeat(26))
                .await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn delete_twice_is_not_found() {
        let store = seeded().await;
        let (movies, _) = store.list(&MovieFilters::default()).await.unwrap();
        let id = movies[0].id;
        store.delete(id).await.unwrap();
        assert!(matches!(store.delete(id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound)));
    }
}
