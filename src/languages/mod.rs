//! Language catalog.
//!
//! Static table of every language the translator supports, mapping the
//! display name users pick to the code sent to translation providers and
//! the voice used for speech synthesis.
//!
//! # Architecture
//!
//! - `registry`: Single source of truth for all supported languages
//! - `language`: Validated `Language` handle looked up by name or code
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::languages::{Language, LanguageRegistry};
//!
//! let spanish = Language::from_name("Spanish")?;
//! assert_eq!(spanish.code(), "es");
//!
//! let all = LanguageRegistry::get().all();
//! ```

mod language;
mod registry;

pub use language::{language_code_or_fallback, Language};
pub use registry::{LanguageRegistry, LanguageSpec};
