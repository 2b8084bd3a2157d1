use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File name constants
// ---------------------------------------------------------------------------

pub const DOTENV_FILE: &str = ".env";
pub const SKILLKIT_DIR: &str = ".config/skillkit";
pub const CLOUDRUN_SETTINGS_FILE: &str = "cloudrun.env";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn skillkit_dir(home: &Path) -> PathBuf {
    home.join(SKILLKIT_DIR)
}

/// Last-resort `.env` consulted after the project walk.
pub fn fallback_env(home: &Path) -> PathBuf {
    skillkit_dir(home).join(DOTENV_FILE)
}

pub fn cloudrun_settings(home: &Path) -> PathBuf {
    skillkit_dir(home).join(CLOUDRUN_SETTINGS_FILE)
}
