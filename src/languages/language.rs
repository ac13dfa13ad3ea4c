//! Language type: a name validated against the catalog.

use crate::languages::{LanguageRegistry, LanguageSpec};
use anyhow::{bail, Result};

/// A language known to be in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    spec: &'static LanguageSpec,
}

impl Language {
    /// Create a Language from its display name (e.g. "Spanish").
    ///
    /// # Returns
    /// * `Ok(Language)` if the name is in the catalog
    /// * `Err` otherwise
    pub fn from_name(name: &str) -> Result<Language> {
        match LanguageRegistry::get().lookup(name) {
            Some(spec) => Ok(Language { spec }),
            None => bail!("Unsupported language: '{}'", name),
        }
    }

    /// Create a Language from its provider code (e.g. "es").
    pub fn from_code(code: &str) -> Result<Language> {
        match LanguageRegistry::get().lookup_code(code) {
            Some(spec) => Ok(Language { spec }),
            None => bail!("Unknown language code: '{}'", code),
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn code(&self) -> &'static str {
        self.spec.code
    }

    pub fn voice(&self) -> &'static str {
        self.spec.voice
    }

    pub fn spec(&self) -> &'static LanguageSpec {
        self.spec
    }
}

/// Provider code for a language name.
///
/// Falls back to the first two characters of the name, lower-cased, when
/// the name is not in the catalog. The fallback is a placeholder and may
/// not be a real code.
pub fn language_code_or_fallback(name: &str) -> String {
    match LanguageRegistry::get().lookup(name) {
        Some(spec) => spec.code.to_string(),
        None => name.chars().take(2).collect::<String>().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_spanish() {
        let language = Language::from_name("Spanish").expect("Should succeed");
        assert_eq!(language.code(), "es");
        assert_eq!(language.name(), "Spanish");
        assert_eq!(language.voice(), "ef_dora");
    }

    #[test]
    fn test_from_name_invalid() {
        let result = Language::from_name("Elvish");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Unsupported"));
    }

    #[test]
    fn test_from_code_roundtrips_to_name() {
        let language = Language::from_code("ja").expect("Should succeed");
        assert_eq!(language, Language::from_name("Japanese").unwrap());
    }

    #[test]
    fn test_from_code_invalid() {
        assert!(Language::from_code("xx").is_err());
        assert!(Language::from_code("").is_err());
    }

    #[test]
    fn test_code_fallback_uses_catalog() {
        assert_eq!(language_code_or_fallback("Portuguese"), "pt");
    }

    #[test]
    fn test_code_fallback_for_unknown_language() {
        assert_eq!(language_code_or_fallback("Dutch"), "du");
        assert_eq!(language_code_or_fallback("X"), "x");
        assert_eq!(language_code_or_fallback("Ελληνικά"), "ελ");
    }
}
