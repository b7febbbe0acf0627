//! Document passes shared by the gateway and in-page sessions.
//!
//! Each pass works against any [`Document`](crate::dom::Document)
//! implementation and reports what it changed.

pub mod consent;
pub mod rewrite;
pub mod sweep;

pub use consent::ConsentAcceptor;
pub use rewrite::{Rewrite, RewriteMode, RewriteReport, Rewriter};
pub use sweep::{SweepReport, sweep};
