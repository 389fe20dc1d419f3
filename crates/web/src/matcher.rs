//! Path matching for routes.
//!
//! A route is selected by a [`PathSpec`]: an exact path, a regular expression
//! tested against the path, or an arbitrary [`Filter`] over the whole request.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::ServerError;
use crate::request::Request;
use crate::utils::ensure;

pub trait Filter: Send + Sync {
    fn check(&self, req: &Request) -> bool;
}

struct FnFilter<F: Fn(&Request) -> bool>(F);

impl<F: Fn(&Request) -> bool + Send + Sync> Filter for FnFilter<F> {
    fn check(&self, req: &Request) -> bool {
        (self.0)(req)
    }
}

pub fn fn_filter<F>(f: F) -> impl Filter
where
    F: Fn(&Request) -> bool + Send + Sync,
{
    FnFilter(f)
}

/// Decides whether a request belongs to a route.
#[derive(Clone)]
pub enum PathSpec {
    /// the request path equals the string
    Exact(String),

    /// the regular expression finds a match in the request path
    Pattern(Regex),

    /// the filter accepts the request
    Predicate(Arc<dyn Filter>),
}

impl PathSpec {
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    /// Compiles `pattern`, failing with [`ServerError::InvalidArgument`] when it is not a valid regular expression.
    pub fn pattern(pattern: &str) -> Result<Self, ServerError> {
        Regex::new(pattern).map(Self::Pattern).map_err(ServerError::invalid_argument)
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(fn_filter(f)))
    }

    pub fn filter<F: Filter + 'static>(filter: F) -> Self {
        Self::Predicate(Arc::new(filter))
    }

    pub fn matches(&self, req: &Request) -> bool {
        match self {
            Self::Exact(path) => req.path() == path,
            Self::Pattern(regex) => regex.is_match(req.path()),
            Self::Predicate(filter) => filter.check(req),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ServerError> {
        if let Self::Exact(path) = self {
            ensure!(!path.is_empty(), ServerError::invalid_argument("route path must not be empty"));
        }
        Ok(())
    }
}

impl From<&str> for PathSpec {
    fn from(path: &str) -> Self {
        Self::Exact(path.to_owned())
    }
}

impl From<String> for PathSpec {
    fn from(path: String) -> Self {
        Self::Exact(path)
    }
}

impl From<Regex> for PathSpec {
    fn from(regex: Regex) -> Self {
        Self::Pattern(regex)
    }
}

impl fmt::Debug for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(path) => f.debug_tuple("Exact").field(path).finish(),
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate"),
        }
    }
}
