use thiserror::Error;

/// Errors surfaced by the tiled cache, the clip toolbox and the loaders.
///
/// The enum is `Clone` because one coalesced bundle request hands the same
/// outcome to every waiter.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Caller supplied empty or invalid geometry input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Metadata or bundle index could not be loaded.
    #[error("datasource fetch error: {0}")]
    DatasourceFetch(String),

    /// A single bundle (or a streamed file) could not be fetched or decoded.
    #[error("bundle fetch error: {0}")]
    BundleFetch(String),

    /// The request was cancelled.
    #[error("request aborted")]
    Aborted,

    /// Bytes were fetched but could not be parsed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Datasource configuration could not be resolved.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for cancellation, which callers treat as a non-failure.
    #[inline]
    pub fn is_aborted(&self) -> bool { matches!(self, Self::Aborted) }

    /// Wrap a parse failure, keeping the full `anyhow` context chain.
    pub(crate) fn decode(err: anyhow::Error) -> Self {
        Self::Decode(format!("{err:#}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
