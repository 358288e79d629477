pub mod drop;
pub mod stat;
