pub mod bib;
pub mod cycle;

pub use bib::*;
pub use cycle::*;
