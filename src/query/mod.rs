pub mod element_set;
pub mod predicate;

pub use element_set::{ElementSet, Selector, DEFAULT_SCROLL_DELTA};
pub use predicate::{Predicate, PredicateExt};
