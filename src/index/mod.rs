pub mod posting;
pub mod skiplist;
pub mod term_dict;
pub mod inverted;
