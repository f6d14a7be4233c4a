use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// What [`load_dotenv`] found. Loading runs before logging is set up (so the
/// file may carry `RUST_LOG`); call [`DotenvOutcome::log`] once it is.
#[derive(Debug)]
pub enum DotenvOutcome {
    Loaded(PathBuf),
    Skipped(String),
}

impl DotenvOutcome {
    pub fn log(&self) {
        match self {
            DotenvOutcome::Loaded(path) => {
                info!(path = %path.display(), "loaded environment file")
            }
            DotenvOutcome::Skipped(why) => debug!(reason = %why, "no .env file loaded"),
        }
    }
}

/// Load `.env` from the working directory (or a parent) into the process
/// environment. Variables already set win. A missing file is not an error.
pub fn load_dotenv() -> DotenvOutcome {
    match dotenv::dotenv() {
        Ok(path) => DotenvOutcome::Loaded(path),
        Err(e) => DotenvOutcome::Skipped(e.to_string()),
    }
}

/// Load a specific env file.
pub fn load_dotenv_from(path: &Path) -> DotenvOutcome {
    match dotenv::from_path(path) {
        Ok(()) => DotenvOutcome::Loaded(path.to_path_buf()),
        Err(e) => DotenvOutcome::Skipped(e.to_string()),
    }
}
