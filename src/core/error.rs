//! Error types of the orchestration core.

use std::path::PathBuf;
use thiserror::Error;

/// A malformed configuration. Aborts configuration resolution for the whole
/// adapter, which then has no test executables.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Test executable #{index} in test group #{group} needs either a `path` or a `glob`")]
    MissingSource { group: usize, index: usize },

    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Failed to substitute variables in '{value}': {reason}")]
    Variable { value: String, reason: String },

    #[error("Failed to write default configuration '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A failure while listing or running one test executable. Reported for that
/// executable only; siblings keep going.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Test executable '{0}' does not exist or is not executable")]
    NotExecutable(PathBuf),

    #[error("Failed to launch '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read environment file '{path}': {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Listing tests of '{path}' failed with {status}:\n{stderr}")]
    ListFailed {
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("Could not parse the test list of '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Debug(#[from] DebugError),
}

/// Output of a test binary that could not be understood.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("no test tree found in the list output")]
    EmptyTree,

    #[error("edge references unknown test unit '{0}'")]
    UnknownUnit(String),

    #[error("test unit '{0}' has more than one parent")]
    MultipleParents(String),
}

/// The host could not start a debug session.
#[derive(Error, Debug)]
pub enum DebugError {
    #[error("Invalid debugger command '{0}'")]
    InvalidCommand(String),

    #[error("Failed to start debugger '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A file watcher could not be installed.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Cannot watch '{0}': no existing parent directory")]
    NoParent(PathBuf),

    #[error("Failed to watch '{path}': {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}
