pub mod category;
pub mod dedup;
pub mod error;
pub mod features;
pub mod fit;
pub mod io;
pub mod logger;
pub mod mapq;
pub mod matrix;
pub mod model;
pub mod postprocess;
pub mod predict;
pub mod predictions;
pub mod report;
pub mod table;

#[cfg(test)]
pub(crate) mod testing;
