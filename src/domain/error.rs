//! Domain error types.

/// Top-level error type for navtree.
#[derive(Debug, thiserror::Error)]
pub enum NavtreeError {
    #[error("{node} used before setup")]
    NotInitialized { node: String },

    #[error("unknown child {name} under {parent}")]
    UnknownChild { parent: String, name: String },

    #[error("duplicate child {name} under {parent}")]
    DuplicateChild { parent: String, name: String },

    #[error("{name} is not a strategy node")]
    NotAStrategy { name: String },

    #[error("invalid tree: {reason}")]
    InvalidTree { reason: String },

    #[error("date {date} is outside the simulation horizon")]
    DateOutOfHorizon { date: chrono::NaiveDate },

    #[error("date {date} is before the current date {now}")]
    StaleDate {
        date: chrono::NaiveDate,
        now: chrono::NaiveDate,
    },

    #[error("no usable market price for {name}")]
    MissingPrice { name: String },

    #[error("invalid commission for {name}: {reason}")]
    InvalidCommission { name: String, reason: String },

    #[error("invalid price table: {reason}")]
    InvalidPriceTable { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&NavtreeError> for std::process::ExitCode {
    fn from(err: &NavtreeError) -> Self {
        let code: u8 = match err {
            NavtreeError::Io(_) | NavtreeError::Data { .. } => 1,
            NavtreeError::ConfigParse { .. }
            | NavtreeError::ConfigMissing { .. }
            | NavtreeError::ConfigInvalid { .. } => 2,
            NavtreeError::NotInitialized { .. }
            | NavtreeError::UnknownChild { .. }
            | NavtreeError::DuplicateChild { .. }
            | NavtreeError::NotAStrategy { .. }
            | NavtreeError::InvalidTree { .. }
            | NavtreeError::DateOutOfHorizon { .. }
            | NavtreeError::StaleDate { .. } => 3,
            NavtreeError::MissingPrice { .. }
            | NavtreeError::InvalidCommission { .. }
            | NavtreeError::InvalidPriceTable { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
