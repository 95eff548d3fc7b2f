use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the sort, dataset and fetch jobs.
///
/// Most variants describe a single item (one image, one pair, one download) and are
/// recorded in a run summary instead of aborting the batch. See [`PipelineError::is_skip`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("cannot move {from} to {to}: {reason}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("cannot copy {from} to {to}: {reason}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("no label file for {image}")]
    MissingPair { image: PathBuf },

    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("failed to acquire access token: {0}")]
    Token(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Per-item errors that the caller reports as a skip rather than a failure.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::Move { .. } | Self::MissingPair { .. }
        )
    }

    /// Errors that end the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Token(_) | Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_and_fatal_classes() {
        let decode = PipelineError::decode("a.jpg", "truncated");
        assert!(decode.is_skip());
        assert!(!decode.is_fatal());

        let token = PipelineError::Token("401".into());
        assert!(token.is_fatal());
        assert!(!token.is_skip());

        let network = PipelineError::Network {
            url: "http://x".into(),
            reason: "timeout".into(),
        };
        assert!(!network.is_skip());
        assert!(!network.is_fatal());
    }

    #[test]
    fn test_error_messages_name_the_path() {
        let err = PipelineError::MissingPair {
            image: PathBuf::from("pre/A.jpg"),
        };
        assert_eq!(err.to_string(), "no label file for pre/A.jpg");
    }
}
