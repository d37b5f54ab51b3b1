//! Resource path resolution.
//!
//! ```text
//! [/v/{version}]/{category}                      collection
//! [/v/{version}]/{category}/{id}                 object
//! [/v/{version}]/{parent}/{parent_id}/{category} nested collection
//! ```

use crate::domain::request::RoutePath;
use axum::http::Method;
use shared_types::Operation;

/// Map a method and path to an operation, or `None` when unroutable.
pub fn resolve_route(method: &Method, path: &str) -> Option<(Operation, RoutePath)> {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut version = None;
    if segments.first() == Some(&"v") && segments.len() > 1 {
        version = Some(segments[1].to_string());
        segments.drain(..2);
    }

    let (route, single) = match segments.as_slice() {
        [category] => (
            RoutePath {
                category: category.to_string(),
                ..RoutePath::default()
            },
            false,
        ),
        [category, id] => (
            RoutePath {
                category: category.to_string(),
                id: Some(id.to_string()),
                ..RoutePath::default()
            },
            true,
        ),
        [parent, parent_id, category] => (
            RoutePath {
                category: category.to_string(),
                parent_category: Some(parent.to_string()),
                parent_id: Some(parent_id.to_string()),
                ..RoutePath::default()
            },
            false,
        ),
        _ => return None,
    };

    let operation = if single {
        match *method {
            Method::GET => Operation::Retrieve,
            Method::PUT => Operation::Update,
            Method::DELETE => Operation::Delete,
            _ => return None,
        }
    } else {
        match *method {
            Method::GET => Operation::RetrieveMany,
            Method::POST => Operation::Create,
            Method::HEAD => Operation::Info,
            Method::PATCH => Operation::Patch,
            _ => return None,
        }
    };

    Some((operation, RoutePath { version, ..route }))
}
