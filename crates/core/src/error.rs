#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {name}")]
    NotFound { entity: &'static str, name: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
