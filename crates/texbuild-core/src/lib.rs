pub mod cancel;
pub mod error;
pub mod exts;
pub mod ids;
pub mod model;
pub mod path;
pub mod registry;
pub mod runner;
pub mod session;

pub use cancel::*;
pub use error::*;
pub use exts::*;
pub use ids::*;
pub use model::*;
pub use path::*;
pub use registry::*;
pub use runner::*;
pub use session::*;
