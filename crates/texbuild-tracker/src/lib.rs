mod scan;
mod tracker;

pub use scan::*;
pub use tracker::*;
