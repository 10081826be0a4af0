use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("ambiguous classification: {0}")]
    ClassificationAmbiguity(String),
    #[error("messaging failure: {0}")]
    Messaging(String),
    #[error("unhandled failure: {0}")]
    Unhandled(String),
}

impl LedgerError {
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(format!("{err:#}"))
    }

    pub fn messaging(err: impl std::fmt::Display) -> Self {
        Self::Messaging(format!("{err:#}"))
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Persistence(_) => "persistence",
            Self::ClassificationAmbiguity(_) => "classification_ambiguity",
            Self::Messaging(_) => "messaging",
            Self::Unhandled(_) => "unhandled",
        }
    }
}
