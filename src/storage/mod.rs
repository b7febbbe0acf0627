//! Pluggable key/value storage for state that outlives a page session.
//!
//! The in-page engine persists its feedback records and the cached
//! supplementary block list through this trait. The crate ships with two
//! backends:
//!
//! - [`FsStorage`] -- one file per key under a base directory.
//! - [`MemoryStorage`] -- an in-process map, for tests and storage-less pages.
//!
//! Implement the [`Storage`] trait to add your own backend.

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

use std::future::Future;

/// Trait for storage backends that can persist small blobs by key.
///
/// # Implementing a custom backend
///
/// ```rust,no_run
/// use arx_sentinel::{Storage, Result};
///
/// struct MyStorage;
///
/// impl Storage for MyStorage {
///     async fn put(&self, key: &str, content: &[u8], content_type: &str) -> Result<()> {
///         // write content somewhere ...
///         Ok(())
///     }
///
///     async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
///         Ok(None)
///     }
/// }
/// ```
pub trait Storage: Send + Sync + 'static {
    /// Persist `content` under the given `key` with the specified MIME
    /// `content_type` (typically `"application/json"`).
    fn put(
        &self,
        key: &str,
        content: &[u8],
        content_type: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Read the content stored under `key`, or `None` if nothing was stored.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;
}
