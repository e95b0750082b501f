//! Client configuration.
//!
//! Everything here has a sensible default; an empty TOML document is a
//! valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML was invalid.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for a negotiation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Location discovery requests address and the fallback request URL
    /// for elements without a base URL of their own.
    #[serde(default = "default_location")]
    pub location: String,

    /// Selector injected against when a discovery response grants verbs
    /// document-wide (a bare `Allow` header, no multipart body).
    #[serde(default = "default_document_selector")]
    pub document_selector: String,

    /// Attribute marking an element editable once it gains PUT.
    #[serde(default = "default_editable_attr")]
    pub editable_attr: String,

    /// Value written to the editable marker attribute.
    #[serde(default = "default_editable_value")]
    pub editable_value: String,

    /// Whether document growth re-runs discovery on the next pump.
    #[serde(default = "default_true")]
    pub renegotiate_on_mutation: bool,
}

fn default_location() -> String {
    "/".to_string()
}

fn default_document_selector() -> String {
    "html".to_string()
}

fn default_editable_attr() -> String {
    "contenteditable".to_string()
}

fn default_editable_value() -> String {
    "plaintext-only".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            document_selector: default_document_selector(),
            editable_attr: default_editable_attr(),
            editable_value: default_editable_value(),
            renegotiate_on_mutation: default_true(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration addressing `location`, defaults elsewhere.
    #[must_use]
    pub fn for_location(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config.location, "/");
        assert_eq!(config.document_selector, "html");
        assert_eq!(config.editable_attr, "contenteditable");
        assert_eq!(config.editable_value, "plaintext-only");
        assert!(config.renegotiate_on_mutation);
    }

    #[test]
    fn fields_override_individually() {
        let config = ClientConfig::from_toml(
            "location = \"https://api.example/page\"\nrenegotiate_on_mutation = false\n",
        )
        .unwrap();
        assert_eq!(config.location, "https://api.example/page");
        assert!(!config.renegotiate_on_mutation);
        assert_eq!(config.document_selector, "html");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "document_selector = \"body\"").unwrap();
        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.document_selector, "body");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        assert!(matches!(
            ClientConfig::from_toml("location = ["),
            Err(ConfigError::Parse(_))
        ));
    }
}
