pub mod filter;
pub mod predicate;
