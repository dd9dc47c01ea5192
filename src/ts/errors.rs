use crate::language::Language;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeSitterError {
    #[error("failed to set {language} grammar for parser")]
    LanguageSet { language: Language },

    #[error("failed to parse {language} source code")]
    ParseFailed { language: Language },
}
