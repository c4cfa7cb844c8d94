use thiserror::Error;

#[derive(Debug, Error)]
pub enum KirokuError {
    #[error("config error: {0}")]
    Config(String),

    #[error("transport setup failed: {0}")]
    Transport(String),

    #[error("invalid endpoint: {0}")]
    Template(#[from] kiroku_api::TemplateError),

    #[error(transparent)]
    Api(#[from] kiroku_api::ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
