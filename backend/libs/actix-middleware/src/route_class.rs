//! Request path classification
//!
//! Every request is labelled before any handler runs:
//! - `Public`: authentication endpoints and health checks
//! - `Static`: assets and anything that looks like a file
//! - `Protected`: everything else, requires a session
//!
//! Only the path is inspected; the query string never influences the result.

/// Route category of a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Public,
    Static,
    Protected,
}

impl RouteClass {
    /// Public and static routes are never blocked by the session gate.
    pub fn requires_session(self) -> bool {
        matches!(self, RouteClass::Protected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteClass::Public => "public",
            RouteClass::Static => "static",
            RouteClass::Protected => "protected",
        }
    }
}

pub const DEFAULT_PUBLIC_PREFIXES: &[&str] = &["/login", "/register", "/api/auth", "/api/health"];

pub const DEFAULT_STATIC_PREFIXES: &[&str] = &[
    "/_next",
    "/images",
    "/favicon.ico",
    "/robots.txt",
    "/sitemap.xml",
];

/// Maps a request path to its [`RouteClass`].
#[derive(Debug, Clone)]
pub struct PathClassifier {
    public_prefixes: Vec<String>,
    static_prefixes: Vec<String>,
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_PUBLIC_PREFIXES.iter().copied(),
            DEFAULT_STATIC_PREFIXES.iter().copied(),
        )
    }
}

impl PathClassifier {
    pub fn new<P, S>(public_prefixes: P, static_prefixes: S) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            public_prefixes: public_prefixes.into_iter().map(Into::into).collect(),
            static_prefixes: static_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Classify `path`. A trailing `?query` is stripped if the caller passed one.
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = path.split_once('?').map_or(path, |(p, _)| p);

        if self.public_prefixes.iter().any(|p| is_under(path, p)) {
            return RouteClass::Public;
        }

        if self.static_prefixes.iter().any(|p| is_under(path, p)) || has_file_extension(path) {
            return RouteClass::Static;
        }

        RouteClass::Protected
    }
}

/// `path` equals `prefix` or is nested below it.
fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Last segment contains a `.` followed by at least one character.
fn has_file_extension(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or(path);
    matches!(last.find('.'), Some(idx) if idx + 1 < last.len())
}
