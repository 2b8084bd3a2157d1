pub mod cloudrun;
pub mod db;
pub mod posthog;
pub mod sentry;
pub mod trigger;
