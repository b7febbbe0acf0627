//! String-level sanitizer pipeline run by the gateway on fetched documents.
//!
//! Sanitizers implement the [`Sanitizer`] trait and are composed into a
//! [`SanitizerPipeline`] that runs them sequentially.
//!
//! Built-in sanitizers:
//!
//! - [`DocumentSanitizer`] -- parse, run the sanitization and rewrite passes,
//!   serialize.
//! - [`ScriptInjector`] -- inject the in-page engine script.

mod document;
mod inject;

pub use document::DocumentSanitizer;
pub use inject::ScriptInjector;

use url::Url;

/// Trait for HTML document sanitizers.
///
/// Each sanitizer receives an HTML string plus the URL it was fetched from
/// and returns a transformed version. Implementations must be
/// `Send + Sync` so they can be shared across request handlers.
pub trait Sanitizer: Send + Sync {
    /// Transform the given HTML content, returning the sanitized result.
    fn sanitize(&self, html: &str, page: &Url) -> String;
}

/// An ordered chain of [`Sanitizer`] implementations applied sequentially.
///
/// Each sanitizer receives the output of the previous one. An empty pipeline
/// is a no-op.
pub struct SanitizerPipeline {
    sanitizers: Vec<Box<dyn Sanitizer>>,
}

impl SanitizerPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            sanitizers: Vec::new(),
        }
    }

    /// Append a sanitizer to the end of the pipeline.
    pub fn add(&mut self, sanitizer: impl Sanitizer + 'static) {
        self.sanitizers.push(Box::new(sanitizer));
    }

    /// Run the full pipeline on the given HTML, returning the final result.
    pub fn sanitize(&self, html: &str, page: &Url) -> String {
        self.sanitizers
            .iter()
            .fold(html.to_string(), |acc, s| s.sanitize(&acc, page))
    }

    /// Returns `true` if no sanitizers have been added.
    pub fn is_empty(&self) -> bool {
        self.sanitizers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sanitizers.len()
    }
}

impl Default for SanitizerPipeline {
    fn default() -> Self {
        Self::new()
    }
}
