use std::collections::BTreeSet;

use serde::Serialize;

pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";

/// Grant set of a single user. Codes are opaque and matched exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Compile-time permission code, used to parameterize the authorizing extractor.
pub trait PermissionCode: Send + Sync + 'static {
    const CODE: &'static str;
}

pub struct MoviesRead;
impl PermissionCode for MoviesRead {
    const CODE: &'static str = MOVIES_READ;
}

pub struct MoviesWrite;
impl PermissionCode for MoviesWrite {
    const CODE: &'static str = MOVIES_WRITE;
}
