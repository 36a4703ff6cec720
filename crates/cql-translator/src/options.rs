//! Translation options shared by a root library and everything it includes.

use crate::diagnostics::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default limit on include nesting
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 64;

/// Which resolved operand signatures are attached to call nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureLevel {
    #[default]
    None,
    /// Only where the arguments needed a conversion to match
    Differences,
    /// Only for operators with more than one overload
    Overloads,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslatorOption {
    /// Error annotations on libraries, narrative annotations on definitions
    EnableAnnotations,
    /// `line:col-line:col` locators on definitions
    EnableLocators,
    /// Result type names on definitions
    EnableResultTypes,
}

/// Settings that flow unchanged to every transitively included library
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TranslationOptions {
    /// Diagnostics below this severity are kept but not reportable
    pub error_level: Severity,
    pub signature_level: SignatureLevel,
    pub options: BTreeSet<TranslatorOption>,
    pub max_include_depth: usize,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            error_level: Severity::Info,
            signature_level: SignatureLevel::None,
            options: BTreeSet::new(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }
}

impl TranslationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error_level(mut self, level: Severity) -> Self {
        self.error_level = level;
        self
    }

    pub fn with_signature_level(mut self, level: SignatureLevel) -> Self {
        self.signature_level = level;
        self
    }

    pub fn with_option(mut self, option: TranslatorOption) -> Self {
        self.options.insert(option);
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn enabled(&self, option: TranslatorOption) -> bool {
        self.options.contains(&option)
    }
}
