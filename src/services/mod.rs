//! Services separating I/O from the pipeline

pub mod io;

pub use io::ImageIOService;
