pub mod fuzzy;
pub mod results;
pub mod executor;
pub mod highlight;
