//! Sheet service trait.

use async_trait::async_trait;

use super::model::{RemoteRow, RemoteSlice};
use crate::error::Result;

/// Port to the external spreadsheet-like data source.
///
/// Implementations must report transient failures as
/// [`crate::BizdashError::ServiceUnavailable`] and rejected credentials as
/// [`crate::BizdashError::AuthFailure`]; the sync engine retries the former
/// and stops on the latter.
#[async_trait]
pub trait SheetService: Send + Sync {
    /// Fetches all rows of a slice together with the current revision.
    async fn fetch_slice(&self, name: &str) -> Result<RemoteSlice>;

    /// Replaces the rows of a slice and returns the new revision.
    ///
    /// Keys missing from `rows` are deleted remotely.
    async fn push_slice(&self, name: &str, rows: &[RemoteRow]) -> Result<String>;
}
