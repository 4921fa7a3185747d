//! Types d'erreurs pour le crate gml

use thiserror::Error;

/// Erreurs pouvant survenir lors de la lecture d'un document GML
#[derive(Debug, Error)]
pub enum GmlError {
    /// Erreur d'I/O lors de la lecture du document
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Aucun backend XML n'est compilé dans le crate
    #[error("No XML parser backend available: enable the pull-parser or push-parser feature")]
    NoParserAvailable,

    /// Aucun fichier source n'a été fourni au lecteur
    #[error("No source document: call set_source_file() first")]
    NoSource,

    /// Erreur du tokenizer XML
    #[error("XML parsing failed: {reason} (near byte {offset})")]
    Xml { reason: String, offset: u64 },

    /// Contenu non UTF-8 dans le document
    #[error("Invalid UTF-8 in document: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Fichier de classes invalide
    #[error("Invalid feature class file {file}: {reason}")]
    InvalidClassFile { file: String, reason: String },

    /// Définition de classe malformée dans un fichier de classes
    #[error("Invalid GMLFeatureClass definition: {0}")]
    ClassDefinition(String),
}

impl GmlError {
    /// Crée une erreur de tokenizer avec la position approximative
    pub fn xml(reason: impl Into<String>, offset: u64) -> Self {
        Self::Xml {
            reason: reason.into(),
            offset,
        }
    }

    /// Crée une erreur de fichier de classes avec contexte
    pub fn invalid_class_file(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidClassFile {
            file: file.into(),
            reason: reason.into(),
        }
    }
}
