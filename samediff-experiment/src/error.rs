use samediff_core::UnknownResponse;
use std::path::PathBuf;
use thiserror::Error;

/// The trial list or a preload asset could not be obtained. Fatal.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not load {resource}: {message}")]
    Unavailable { resource: String, message: String },

    #[error("could not load {resource}: HTTP {status}")]
    Status { resource: String, status: u16 },

    #[error("{resource} has no header line")]
    Empty { resource: String },

    #[error("{resource} is missing required column `{column}`")]
    MissingColumn {
        resource: String,
        column: &'static str,
    },

    #[error("could not preload {resource}: {message}")]
    Preload { resource: String, message: String },
}

impl LoadError {
    /// The resource the failed attempt was for, for diagnostics.
    pub fn resource(&self) -> &str {
        match self {
            LoadError::Unavailable { resource, .. }
            | LoadError::Status { resource, .. }
            | LoadError::Empty { resource }
            | LoadError::MissingColumn { resource, .. }
            | LoadError::Preload { resource, .. } => resource,
        }
    }
}

/// The trial list can't produce a scoreable timeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("trial list has no \"identity\" record to build practice trials from")]
    MissingIdentitySeed,

    #[error(
        "trial list has no \"category\" record and only {available} record(s) for the positional fallback"
    )]
    InsufficientFallback { available: usize },

    #[error(transparent)]
    CorrectResponse(#[from] UnknownResponse),

    #[error("{block} trial {position}: {source}")]
    AtTrial {
        block: &'static str,
        position: usize,
        #[source]
        source: Box<ConfigError>,
    },
}

/// Saving results failed. Logged, never fatal.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload of {filename} failed: {source}")]
    Transport {
        filename: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upload of {filename} rejected: HTTP {status}")]
    Rejected { filename: String, status: u16 },

    #[error("could not encode {filename}: {source}")]
    Encode {
        filename: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_names_resource() {
        let err = LoadError::Status {
            resource: "trial_lists/trials_condition_2.csv".into(),
            status: 404,
        };
        assert_eq!(err.resource(), "trial_lists/trials_condition_2.csv");
        assert_eq!(
            err.to_string(),
            "could not load trial_lists/trials_condition_2.csv: HTTP 404"
        );
    }

    #[test]
    fn trial_position_wraps_source() {
        let err = ConfigError::AtTrial {
            block: "main",
            position: 3,
            source: Box::new(UnknownResponse("maybe".into()).into()),
        };
        let text = err.to_string();
        assert!(text.starts_with("main trial 3: "), "{text}");
        assert!(text.contains("\"maybe\""), "{text}");
    }
}
