use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("HTML parsing error: {0}")]
    HtmlParseError(String),

    #[error("bulletin board error: {0}")]
    BulletinBoardError(#[from] redis::RedisError),

    #[error("task bus error: {0}")]
    TaskBusError(String),

    #[error("artifact store error: {0}")]
    ArtifactStoreError(String),

    #[error("search backend error: {0}")]
    SearchError(#[from] tantivy::TantivyError),

    #[error("query parse error: {0}")]
    QueryParseError(#[from] tantivy::query::QueryParserError),

    #[error("configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("rate limit exceeded for domain: {0}")]
    RateLimitError(String),

    #[error("robots.txt forbids crawling: {0}")]
    RobotsForbidden(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timeout occurred")]
    Timeout,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl<E: std::fmt::Display> From<aws_sdk_s3::error::SdkError<E>> for Error {
    fn from(e: aws_sdk_s3::error::SdkError<E>) -> Self {
        Error::ArtifactStoreError(e.to_string())
    }
}

impl<E: std::fmt::Display> From<aws_sdk_sqs::error::SdkError<E>> for Error {
    fn from(e: aws_sdk_sqs::error::SdkError<E>) -> Self {
        Error::TaskBusError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
