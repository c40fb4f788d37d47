pub mod vbyte;
pub mod delta;
pub mod compress;
