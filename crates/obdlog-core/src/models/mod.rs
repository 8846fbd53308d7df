//! Shared data models for capture sessions and discovery runs

mod command;
mod discovery;
mod reading;
mod sample;
mod scenario;
mod session;

pub use command::*;
pub use discovery::*;
pub use reading::*;
pub use sample::*;
pub use scenario::*;
pub use session::*;
