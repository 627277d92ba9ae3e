//! THEN-action appliers.
//!
//! Each applier folds one action into the processor's working copy. The
//! caller's snapshot is never touched.

mod property;
mod title;

pub use property::{apply_property, split_values};
pub use title::apply_title;
