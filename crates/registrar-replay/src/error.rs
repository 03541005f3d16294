//! Error types for the replay binary.
//!
//! [`ReplayError`] wraps every failure mode so that `main` can propagate
//! with `?`.

/// Top-level error for the replay binary.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: registrar_registry::ConfigError,
    },

    /// The replay script could not be read.
    #[error("failed to read script {path}: {source}")]
    ScriptIo {
        /// Script path.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The replay script is not valid YAML or has an unknown step.
    #[error("failed to parse script: {source}")]
    ScriptYaml {
        /// The underlying YAML parse error.
        #[from]
        source: serde_yml::Error,
    },

    /// A registry operation failed.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: registrar_registry::RegistryError,
    },

    /// The notification printer task did not finish cleanly.
    #[error("printer error: {message}")]
    Printer {
        /// Description of the failure.
        message: String,
    },
}
