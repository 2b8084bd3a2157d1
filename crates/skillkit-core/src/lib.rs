pub mod cloudrun;
pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod http;
pub mod io;
pub mod normalize;
pub mod paths;
pub mod posthog;
pub mod process;
pub mod sentry;
pub mod trigger;

pub use error::{Result, SkillError};
