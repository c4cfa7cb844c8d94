//! Trait definitions for paginated resources.
//!
//! List controllers depend on [`PageSource`] rather than on a concrete
//! endpoint, so screens can be driven by any backend or by a test double.

use std::future::Future;

use crate::error::ApiResult;
use crate::page::{Cursor, Page};
use crate::types::EntityId;

/// A cursor-paginated collection whose members can also be fetched one at a time.
pub trait PageSource<T>: Send + Sync {
    /// Fetch the page after `cursor`, or the first page when `cursor` is `None`.
    fn fetch_page(
        &self,
        cursor: Option<&Cursor>,
    ) -> impl Future<Output = ApiResult<Page<T>>> + Send;

    /// Fetch the full representation of a single entity.
    fn fetch_one(&self, id: &EntityId) -> impl Future<Output = ApiResult<T>> + Send;
}
