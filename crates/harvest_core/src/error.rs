use thiserror::Error;

/// Problems with user-supplied configuration: task files, model files, filters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("malformed task file: {0}")]
    MalformedTask(String),
    #[error("task field `{0}` is missing or empty")]
    MissingField(&'static str),
    #[error("task field `{field}` must not be negative (got {value})")]
    NegativeField { field: &'static str, value: i64 },
    #[error("unknown site model `{0}`")]
    UnknownModel(String),
    #[error("site model `{model}` has an invalid link pattern: {message}")]
    InvalidPattern { model: String, message: String },
    #[error("malformed model file: {0}")]
    MalformedModels(String),
    #[error("invalid image filter pattern: {0}")]
    InvalidFilterPattern(String),
    #[error("search depth must be 0, 1 or 2 (got {0})")]
    InvalidDepth(u8),
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("last chapter must not be negative (got {0})")]
    NegativeLastChapter(i64),
    #[error("last chapter {last} is beyond the {total} chapters available")]
    LastChapterBeyondTotal { last: i64, total: usize },
    #[error("chapter length must not be negative (got {0})")]
    NegativeLength(i64),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("chapter {0} was never requested")]
    UnknownIndex(usize),
    #[error("chapter {index} cannot move from {from} to {to}")]
    IllegalTransition {
        index: usize,
        from: &'static str,
        to: &'static str,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("content present for chapter {0} which was never requested")]
    UnrequestedChapter(usize),
}
