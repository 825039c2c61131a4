pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Occurs when `apiprobe.toml` fails to load.
    #[error("failed to load apiprobe.toml: {0}")]
    LoadError(String),
    /// Occurs when a configured value cannot be used.
    #[error("invalid value for \"{key}\": {reason}")]
    ValueError { key: String, reason: String },
    /// Occurs when a scenario id is not part of the scenario table.
    #[error("unknown scenario \"{0}\"")]
    UnknownScenario(String),
    /// Occurs when no token could be obtained from the user endpoint.
    #[error("token unavailable: {0}")]
    TokenUnavailable(String),
    /// Occurs when a run is triggered while another one holds the run lock.
    #[error("another run is in progress")]
    RunInProgress,
    #[error(transparent)]
    Http(#[from] crate::http::Error),
    #[error("{0:#}")]
    Unexpected(#[from] eyre::Error),
}
