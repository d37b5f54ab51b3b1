//! Per-request operation context.
//!
//! A [`Context`] is created for every dispatched request and owned by it
//! alone. It carries the parsed request, the pagination cursor, the errors
//! and output the processor produced and the events it queued. Once the
//! response is rendered the context is dropped.

use crate::domain::error::ApiError;
use crate::domain::request::OperationRequest;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::Serialize;
use shared_types::{Event, Operation};
use thiserror::Error;
use url::Url;

/// Page used when the request names none.
pub const DEFAULT_PAGE: u64 = 1;

/// Page size used when the request names none.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

pub mod headers {
    pub const PAGE_CURRENT: &str = "x-page-current";
    pub const PAGE_SIZE: &str = "x-page-size";
    pub const PAGE_FIRST: &str = "x-page-first";
    pub const PAGE_PREV: &str = "x-page-prev";
    pub const PAGE_NEXT: &str = "x-page-next";
    pub const PAGE_LAST: &str = "x-page-last";
    pub const COUNT_TOTAL: &str = "x-count-total";
    pub const COUNT_LOCAL: &str = "x-count-local";
}

/// Errors raised while ingesting a request or rendering a context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A pagination parameter is not a positive integer.
    #[error("invalid value for parameter '{parameter}': '{value}'")]
    InvalidPagination { parameter: &'static str, value: String },

    /// The output could not be encoded.
    #[error("unable to encode response body: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::InvalidPagination { .. } => ApiError::bad_request(err.to_string()),
            ContextError::Serialization(_) => ApiError::internal(err.to_string()),
        }
    }
}

/// Output a processor can hand back. Anything serializable qualifies.
pub trait Payload: Send + Sync {
    fn encode(&self) -> Result<Vec<u8>, serde_json::Error>;
}

impl<T: Serialize + Send + Sync> Payload for T {
    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Pagination cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub current: u64,
    pub size: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            current: DEFAULT_PAGE,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Object counts reported to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Count {
    /// Objects matching the request across all pages
    pub total: u64,
    /// Objects in this response
    pub local: u64,
}

/// First/prev/next/last page numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLinks {
    pub first: u64,
    pub prev: u64,
    pub next: u64,
    pub last: u64,
}

impl PageLinks {
    /// Compute links for `current` of pages of `size` over `total` objects.
    ///
    /// `first` and `prev` never go below 1; `next` and `last` never go past
    /// `max(1, ceil(total / size))`.
    pub fn compute(current: u64, size: u64, total: u64) -> Self {
        let last = total.div_ceil(size.max(1)).max(1);
        Self {
            first: 1,
            prev: current.saturating_sub(1).max(1),
            next: current.saturating_add(1).min(last),
            last,
        }
    }
}

/// A rendered context, ready for any transport.
#[derive(Debug, Clone)]
pub struct RenderedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Working state of one request.
pub struct Context {
    operation: Operation,
    request: OperationRequest,
    pub page: Page,
    pub count: Count,
    status: Option<StatusCode>,
    errors: Vec<ApiError>,
    output: Option<Box<dyn Payload>>,
    events: Vec<Event>,
}

impl Context {
    /// Create a context for `operation` on page 1 with the default size.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            request: OperationRequest::default(),
            page: Page::default(),
            count: Count::default(),
            status: None,
            errors: Vec::new(),
            output: None,
            events: Vec::new(),
        }
    }

    /// Create a context and ingest `request` into it.
    pub fn from_request(
        operation: Operation,
        request: OperationRequest,
    ) -> Result<Self, ContextError> {
        let mut ctx = Self::new(operation);
        ctx.ingest(request)?;
        Ok(ctx)
    }

    /// Take ownership of the request and read pagination from its
    /// parameters.
    pub fn ingest(&mut self, request: OperationRequest) -> Result<(), ContextError> {
        if let Some(page) = request.parameter("page") {
            self.page.current = parse_positive("page", page)?;
        }
        if let Some(size) = request.parameter("per_page") {
            self.page.size = parse_positive("per_page", size)?;
        }
        self.request = request;
        Ok(())
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn request(&self) -> &OperationRequest {
        &self.request
    }

    pub fn add_error(&mut self, error: ApiError) {
        self.errors.push(error);
    }

    pub fn add_errors(&mut self, errors: impl IntoIterator<Item = ApiError>) {
        self.errors.extend(errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ApiError] {
        &self.errors
    }

    pub fn enqueue_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn enqueue_events(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    /// Queued events, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Drain the event queue.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn set_output<T: Serialize + Send + Sync + 'static>(&mut self, output: T) {
        self.output = Some(Box::new(output));
    }

    /// Set a list as output and report its length as the local count.
    pub fn set_output_list<T: Serialize + Send + Sync + 'static>(&mut self, items: Vec<T>) {
        self.count.local = items.len() as u64;
        self.output = Some(Box::new(items));
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Status the response will carry: the explicit one, else the first
    /// error's, else 200.
    pub fn status(&self) -> StatusCode {
        if let Some(status) = self.status {
            return status;
        }
        match self.errors.first() {
            Some(error) => error.status(),
            None => StatusCode::OK,
        }
    }

    /// Render headers and body.
    ///
    /// Fails without producing anything if the body cannot be encoded.
    pub fn serialize(&self) -> Result<RenderedResponse, ContextError> {
        let body = if self.has_errors() {
            serde_json::to_vec(&self.errors).map_err(ContextError::Serialization)?
        } else if let Some(output) = &self.output {
            output.encode().map_err(ContextError::Serialization)?
        } else {
            Vec::new()
        };

        let mut map = HeaderMap::new();
        insert(&mut map, headers::PAGE_CURRENT, self.page.current.to_string());
        insert(&mut map, headers::PAGE_SIZE, self.page.size.to_string());
        insert(&mut map, headers::COUNT_TOTAL, self.count.total.to_string());
        insert(&mut map, headers::COUNT_LOCAL, self.count.local.to_string());

        if let Some(url) = &self.request.url {
            let links = PageLinks::compute(self.page.current, self.page.size, self.count.total);
            let size = self.page.size;
            insert(&mut map, headers::PAGE_FIRST, page_url(url, links.first, size));
            insert(&mut map, headers::PAGE_PREV, page_url(url, links.prev, size));
            insert(&mut map, headers::PAGE_NEXT, page_url(url, links.next, size));
            insert(&mut map, headers::PAGE_LAST, page_url(url, links.last, size));
        }

        Ok(RenderedResponse {
            status: self.status(),
            headers: map,
            body: Bytes::from(body),
        })
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("operation", &self.operation)
            .field("identity", &self.request.identity)
            .field("page", &self.page)
            .field("count", &self.count)
            .field("errors", &self.errors)
            .field("events", &self.events.len())
            .finish()
    }
}

fn parse_positive(parameter: &'static str, value: &str) -> Result<u64, ContextError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ContextError::InvalidPagination {
            parameter,
            value: value.to_string(),
        }),
    }
}

fn page_url(base: &Url, page: u64, size: u64) -> String {
    let retained: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != "page" && k != "per_page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("page", &page.to_string())
        .append_pair("per_page", &size.to_string());
    url.to_string()
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: String) {
    if let Ok(value) = HeaderValue::try_from(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}
