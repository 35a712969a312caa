//! Error types for topology collection

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a single collector or correlator.
///
/// A collector error is fatal for that collector only; the pipeline records it
/// and carries on with the remaining workers.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to list {resource}: {source}")]
    Api {
        resource: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("cluster instance is incomplete: type={instance_type:?} url={url:?}")]
    InvalidInstance { instance_type: String, url: String },

    #[error("topology run was cancelled")]
    Cancelled,

    #[error("{channel} channel closed before the run finished")]
    ChannelClosed { channel: &'static str },
}

impl CollectorError {
    /// Wrap an API client failure for the given resource kind
    pub fn api(resource: &'static str, source: anyhow::Error) -> Self {
        Self::Api { resource, source }
    }
}

/// Errors raised by the pipeline orchestrator itself
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("topology run did not finish within {0:?}")]
    Timeout(Duration),

    #[error("topology run was stopped")]
    Cancelled,

    #[error("topology worker panicked: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Collector(#[from] CollectorError),
}

pub type CollectorResult<T> = std::result::Result<T, CollectorError>;
