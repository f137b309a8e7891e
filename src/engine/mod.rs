//! The two computation strategies over the paired tables.
//!
//! [`BatchLof`] assumes exclusive ownership of fresh tables and fills them
//! in three full passes; [`OnlineLof`] owns a table pair long-term and keeps
//! it exact across single-object insertions. They share no state beyond the
//! table layout — callers pick one explicitly.

mod batch;
mod online;

pub use batch::BatchLof;
pub use online::OnlineLof;
