/// Rejections raised while validating relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rewrite rule {index} has an empty pattern")]
    EmptyPattern { index: usize },

    #[error("rewrite rule {index} has a pattern that cannot be compiled: {source}")]
    InvalidPattern { index: usize, source: regex::Error },

    #[error("destination {index} has an empty target")]
    EmptyTarget { index: usize },

    #[error("no enabled destinations configured")]
    NoDestinations,

    #[error("Evolution API configuration missing")]
    MissingEvolutionCredentials,

    #[error("source group is not configured")]
    MissingSource,
}

/// Errors from control-surface operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Invalid(#[from] ConfigError),

    #[error("failed to set up webhook with Evolution API: {0:#}")]
    Registration(anyhow::Error),
}
