//! Declarative route table and the dispatcher built on top of it.
//!
//! Routing is a pure lookup over [`RouteTable`]; the axum side only hands
//! every request to [`dispatch`], which turns the [`Resolution`] into a
//! handler call, a 405, or a 404.

use axum::{
    extract::{Request, State},
    http::Method,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;

use crate::{error::ApiError, handlers, AppState};

/// Everything after this prefix is the requested filename.
pub const DOWNLOAD_PREFIX: &str = "/download/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Stats,
    Sleep,
    PhoneNotification,
    Upload,
    ListFiles,
    Download,
    InhibitLidSleep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Exact(&'static str),
    Prefix(&'static str),
}

impl Pattern {
    /// Returns the part of `path` left after the pattern when it matches.
    fn match_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        match *self {
            Pattern::Exact(p) => (path == p).then_some(""),
            Pattern::Prefix(p) => path.strip_prefix(p),
        }
    }

    fn is_prefix(&self) -> bool {
        matches!(self, Pattern::Prefix(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub pattern: Pattern,
    pub endpoint: Endpoint,
}

impl Route {
    pub fn new(method: Method, pattern: Pattern, endpoint: Endpoint) -> Self {
        Self {
            method,
            pattern,
            endpoint,
        }
    }

    pub fn get(pattern: Pattern, endpoint: Endpoint) -> Self {
        Self::new(Method::GET, pattern, endpoint)
    }

    pub fn post(pattern: Pattern, endpoint: Endpoint) -> Self {
        Self::new(Method::POST, pattern, endpoint)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Resolution<'p> {
    Matched { endpoint: Endpoint, tail: &'p str },
    MethodNotAllowed { allow: Vec<Method> },
    NotFound,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("duplicate route: {method} {pattern:?}")]
pub struct DuplicateRoute {
    pub method: Method,
    pub pattern: Pattern,
}

/// Immutable after construction; shared read-only by every request.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build a table, rejecting two routes with the same method and pattern.
    /// Exact patterns are consulted before prefix patterns.
    pub fn new(mut routes: Vec<Route>) -> Result<Self, DuplicateRoute> {
        for (i, route) in routes.iter().enumerate() {
            if routes[..i]
                .iter()
                .any(|r| r.method == route.method && r.pattern == route.pattern)
            {
                return Err(DuplicateRoute {
                    method: route.method.clone(),
                    pattern: route.pattern,
                });
            }
        }
        routes.sort_by_key(|r| r.pattern.is_prefix());
        Ok(Self { routes })
    }

    /// The daemon's HTTP surface.
    pub fn standard() -> Self {
        use Endpoint::*;
        use Pattern::{Exact, Prefix};

        // Unique by construction, exact routes first.
        Self {
            routes: vec![
                Route::get(Exact("/stats"), Stats),
                Route::post(Exact("/sleep"), Sleep),
                Route::post(Exact("/phone-notification"), PhoneNotification),
                Route::post(Exact("/upload"), Upload),
                Route::post(Exact("/inhibit-lid-sleep"), InhibitLidSleep),
                Route::get(Exact("/list-files"), ListFiles),
                Route::get(Prefix(DOWNLOAD_PREFIX), Download),
            ],
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Select the route for `(method, path)`. Matching is exact on the method:
    /// a known path with another verb yields `MethodNotAllowed` listing the
    /// verbs that path does accept.
    pub fn resolve<'p>(&self, method: &Method, path: &'p str) -> Resolution<'p> {
        let mut allow: Vec<Method> = Vec::new();
        for route in &self.routes {
            let Some(tail) = route.pattern.match_path(path) else {
                continue;
            };
            if route.method == *method {
                return Resolution::Matched {
                    endpoint: route.endpoint,
                    tail,
                };
            }
            if !allow.contains(&route.method) {
                allow.push(route.method.clone());
            }
        }
        if allow.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::MethodNotAllowed { allow }
        }
    }
}

/// Router fallback: every request passes through here.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let resolution = state.routes.resolve(&method, &path);
    match resolution {
        Resolution::Matched { endpoint, tail } => {
            let tail = tail.to_owned();
            handlers::call(endpoint, state, tail, request).await
        }
        Resolution::MethodNotAllowed { allow } => {
            warn!(%method, path = %path, "method not allowed");
            ApiError::MethodNotAllowed { allow }.into_response()
        }
        Resolution::NotFound => {
            warn!(%method, path = %path, "path not found");
            ApiError::not_found("not found").into_response()
        }
    }
}
