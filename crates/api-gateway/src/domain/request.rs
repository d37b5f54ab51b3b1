//! Operation requests.
//!
//! Transports hand the dispatcher a [`RawRequest`]: path segments as they
//! appeared on the wire plus query, headers and body. Parsing resolves the
//! categories against the relationship registry of the requested version and
//! yields an [`OperationRequest`].

use crate::domain::error::ApiError;
use crate::domain::request_id::RequestId;
use axum::http::HeaderMap;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use shared_types::{Identity, VersionedRelationships};
use std::net::IpAddr;
use url::Url;

/// Path segments of a resource route, unparsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePath {
    /// Version segment of `/v/{version}/...`, if present
    pub version: Option<String>,
    /// Category addressed
    pub category: String,
    /// Object id for single-object routes
    pub id: Option<String>,
    /// Parent category for nested collection routes
    pub parent_category: Option<String>,
    /// Parent object id for nested collection routes
    pub parent_id: Option<String>,
}

/// A request as received by a transport.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub request_id: RequestId,
    pub route: RoutePath,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Absolute request URL, used for pagination links
    pub url: Option<Url>,
    pub client_ip: Option<IpAddr>,
}

/// A parsed request, addressed at a known identity.
#[derive(Debug, Clone, Default)]
pub struct OperationRequest {
    pub request_id: RequestId,
    /// API version, `0` when unversioned
    pub version: u32,
    pub identity: Identity,
    pub object_id: Option<String>,
    pub parent_identity: Option<Identity>,
    pub parent_id: Option<String>,
    /// Decoded query parameters, in order of appearance
    pub parameters: Vec<(String, String)>,
    pub headers: HeaderMap,
    /// Raw body
    pub data: Bytes,
    pub url: Option<Url>,
    pub client_ip: Option<IpAddr>,
}

impl OperationRequest {
    /// Parse a raw request. Every failure is a `Bad Request`.
    pub fn parse(raw: RawRequest, relationships: &VersionedRelationships) -> Result<Self, ApiError> {
        let version = match raw.route.version.as_deref() {
            None => 0,
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| ApiError::bad_request(format!("Invalid api version number '{v}'")))?,
        };

        let registry = relationships
            .get(version)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown api version {version}")))?;

        let identity = registry
            .identity_from_category(&raw.route.category)
            .ok_or_else(|| {
                ApiError::bad_request(format!("Unknown category '{}'", raw.route.category))
            })?;

        let parent_identity = match raw.route.parent_category.as_deref() {
            None => None,
            Some(category) => Some(registry.identity_from_category(category).ok_or_else(|| {
                ApiError::bad_request(format!("Unknown parent category '{category}'"))
            })?),
        };

        if parent_identity.is_some() && raw.route.parent_id.is_none() {
            return Err(ApiError::bad_request("Missing parent id"));
        }

        let parameters = raw
            .query
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            request_id: raw.request_id,
            version,
            identity,
            object_id: raw.route.id,
            parent_identity,
            parent_id: raw.route.parent_id,
            parameters,
            headers: raw.headers,
            data: raw.body,
            url: raw.url,
            client_ip: raw.client_ip,
        })
    }

    /// First value of a query parameter.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decode the body as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.data)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))
    }
}
