//! Access to the on-disk fixtures under `crates/testkit/fixtures`.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::{fmt, fs};

/// Errors raised while loading fixtures.
#[derive(Debug)]
pub enum FixtureError {
    /// Fixture file does not exist.
    Missing {
        /// Path that could not be found.
        path: PathBuf,
    },
    /// Fixture file could not be read.
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Fixture file is not valid JSON for the requested type.
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl fmt::Display for FixtureError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { path } => write!(formatter, "missing fixture: {}", path.display()),
            Self::Read { path, source } => {
                write!(formatter, "failed to read fixture {}: {source}", path.display())
            },
            Self::Parse { path, source } => {
                write!(formatter, "failed to parse fixture {}: {source}", path.display())
            },
        }
    }
}

impl std::error::Error for FixtureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Missing { .. } => None,
        }
    }
}

/// Root of the fixture tree.
pub fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Absolute path of a fixture.
pub fn fixture_path(relative: &str) -> PathBuf {
    fixture_root().join(relative)
}

/// The small markdown vault used by adapter and infra tests.
pub fn basic_vault_root() -> PathBuf {
    fixture_path("vault/basic")
}

/// Read a fixture as UTF-8 text.
pub fn read_fixture(relative: &str) -> Result<String, FixtureError> {
    let path = fixture_path(relative);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(contents),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            Err(FixtureError::Missing { path })
        },
        Err(source) => Err(FixtureError::Read { path, source }),
    }
}

/// Read and deserialize a JSON fixture.
pub fn load_json_fixture<T: DeserializeOwned>(relative: &str) -> Result<T, FixtureError> {
    let contents = read_fixture(relative)?;
    serde_json::from_str(&contents).map_err(|source| FixtureError::Parse {
        path: fixture_path(relative),
        source,
    })
}
