pub mod build;
pub mod config;
pub mod doctor;
pub mod invoke;
pub mod outputs;
pub mod project;
pub mod signals;

pub use build::*;
pub use config::*;
pub use doctor::*;
pub use invoke::*;
pub use outputs::*;
pub use project::*;
pub use signals::*;
