//! REST plumbing for Kiroku: an authenticated JSON client, typed resource
//! endpoints, and the cursor pagination envelope they share.

pub mod auth;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod page;
pub mod traits;
pub mod transport;
pub mod types;

#[cfg(test)]
mod mock;

pub use auth::AuthContext;
pub use client::{ApiClient, ApiRequest, ClientIdentity, RequestBody};
pub use endpoint::{Filters, Listing, PathTemplate, ResourceEndpoint, TemplateError};
pub use error::{ApiError, ApiResult, ErrorKind, Outcome};
pub use page::{Cursor, Page};
pub use traits::PageSource;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportFailure};
pub use types::{EntityId, Identified, RawEntity};
