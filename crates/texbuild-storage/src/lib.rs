mod file;
mod memory;
mod traits;

pub use file::*;
pub use memory::*;
pub use traits::*;
