//! Configuration: settings file and per-run deploy options

pub mod options;
pub mod settings;

pub use options::{Annotation, DeployOptions, VersionMode};
pub use settings::Settings;
