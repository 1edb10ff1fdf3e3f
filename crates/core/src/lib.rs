pub mod config;
pub mod dimension;
pub mod error;
pub mod run;
pub mod task;

pub use config::Config;
pub use dimension::*;
pub use error::*;
pub use run::*;
pub use task::*;
