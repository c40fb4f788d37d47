pub mod segment;
pub mod layout;
pub mod manifest;
pub mod file_lock;
pub mod segment_writer;
pub mod segment_reader;
pub mod merge_policy;
