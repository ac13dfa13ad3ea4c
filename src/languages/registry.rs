//! Language registry: the catalog of supported languages.
//!
//! Loaded once on first access through a `OnceLock` and immutable
//! afterwards. Lookups are by display name, which is unique across the
//! catalog; codes and voices are opaque and passed through to providers.

use serde::Serialize;
use std::sync::OnceLock;

/// One supported language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageSpec {
    /// Code sent to the translation provider (e.g. "en", "es")
    pub code: &'static str,

    /// Display name, unique across the catalog (e.g. "English")
    pub name: &'static str,

    /// Voice identifier sent to the speech provider
    pub voice: &'static str,
}

/// Global language catalog singleton.
pub struct LanguageRegistry {
    languages: Vec<LanguageSpec>,
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Get the global catalog, initialising it on first call.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    /// Look up a language by its display name.
    ///
    /// # Returns
    /// * `Some(&LanguageSpec)` if the language exists
    /// * `None` otherwise; callers treat this as a validation error
    pub fn lookup(&self, name: &str) -> Option<&LanguageSpec> {
        self.languages.iter().find(|lang| lang.name == name)
    }

    /// Look up a language by its provider code.
    pub fn lookup_code(&self, code: &str) -> Option<&LanguageSpec> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    /// All languages in catalog order.
    pub fn all(&self) -> &[LanguageSpec] {
        &self.languages
    }
}

fn default_languages() -> Vec<LanguageSpec> {
    vec![
        LanguageSpec { code: "en", name: "English", voice: "af_jessica" },
        LanguageSpec { code: "de", name: "German", voice: "df_gisela" },
        LanguageSpec { code: "fr", name: "French", voice: "ff_siwis" },
        LanguageSpec { code: "es", name: "Spanish", voice: "ef_dora" },
        LanguageSpec { code: "it", name: "Italian", voice: "if_sara" },
        LanguageSpec { code: "ja", name: "Japanese", voice: "jf_alpha" },
        LanguageSpec { code: "ko", name: "Korean", voice: "kf_alpha" },
        LanguageSpec { code: "pt", name: "Portuguese", voice: "pm_alex" },
        LanguageSpec { code: "ru", name: "Russian", voice: "rf_alpha" },
        LanguageSpec { code: "zh", name: "Chinese", voice: "zf_xiaobei" },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_get_returns_singleton() {
        let registry1 = LanguageRegistry::get();
        let registry2 = LanguageRegistry::get();

        assert!(std::ptr::eq(registry1, registry2));
    }

    #[test]
    fn test_lookup_spanish() {
        let spec = LanguageRegistry::get().lookup("Spanish").expect("Spanish exists");
        assert_eq!(spec.code, "es");
        assert_eq!(spec.voice, "ef_dora");
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(LanguageRegistry::get().lookup("spanish").is_none());
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(LanguageRegistry::get().lookup("Klingon").is_none());
        assert!(LanguageRegistry::get().lookup("").is_none());
    }

    #[test]
    fn test_lookup_code() {
        let spec = LanguageRegistry::get().lookup_code("zh").expect("zh exists");
        assert_eq!(spec.name, "Chinese");
    }

    #[test]
    fn test_all_keeps_catalog_order() {
        let names: Vec<_> = LanguageRegistry::get().all().iter().map(|l| l.name).collect();
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "English");
        assert_eq!(names[9], "Chinese");
    }

    #[test]
    fn test_names_and_codes_are_unique() {
        let all = LanguageRegistry::get().all();
        let names: HashSet<_> = all.iter().map(|l| l.name).collect();
        let codes: HashSet<_> = all.iter().map(|l| l.code).collect();
        assert_eq!(names.len(), all.len());
        assert_eq!(codes.len(), all.len());
    }
}
