//! Filter and sort primitives over in-memory collections

pub mod filter;
pub mod sort;

pub use filter::{apply_filter, matches_filter, Filter, FilterRule};
pub use sort::{apply_sort, Sorting};
