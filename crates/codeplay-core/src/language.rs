//! Editor language selection.
//!
//! The wire carries languages as plain strings and the server forwards them
//! untouched. `Language` is the catalog the editor offers; it is advisory
//! and never used to reject an identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

/// Display text for identifiers outside the catalog.
pub const UNKNOWN_LANGUAGE_LABEL: &str = "Select Language";

/// Identifier of the language currently selected in a session.
///
/// Any non-blank string is a valid identifier. Use [`LanguageId::language`]
/// to look it up in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageId(String);

impl LanguageId {
    /// Creates a LanguageId without validation.
    ///
    /// Used for identifiers received off the wire, which are forwarded
    /// verbatim whatever they contain.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a LanguageId from user input, rejecting blank identifiers.
    pub fn parse(id: &str) -> DomainResult<Self> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(DomainError::BlankLanguage);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Looks the identifier up in the catalog.
    pub fn language(&self) -> Option<Language> {
        Language::from_id(&self.0)
    }

    /// Returns the catalog display name, or [`UNKNOWN_LANGUAGE_LABEL`].
    pub fn display_name(&self) -> &'static str {
        self.language()
            .map(|l| l.display_name())
            .unwrap_or(UNKNOWN_LANGUAGE_LABEL)
    }
}

impl Default for LanguageId {
    fn default() -> Self {
        Language::default().id()
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LanguageId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Language> for LanguageId {
    fn from(language: Language) -> Self {
        language.id()
    }
}

impl AsRef<str> for LanguageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Languages offered by the editor's selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    JavaScript,
    TypeScript,
    Html,
    Css,
    Python,
    Java,
    CSharp,
    Cpp,
    Go,
    Rust,
}

impl Language {
    /// Every catalog entry, in selector order.
    pub const ALL: [Language; 10] = [
        Self::JavaScript,
        Self::TypeScript,
        Self::Html,
        Self::Css,
        Self::Python,
        Self::Java,
        Self::CSharp,
        Self::Cpp,
        Self::Go,
        Self::Rust,
    ];

    /// Returns the wire identifier.
    pub fn as_id(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Html => "html",
            Self::Css => "css",
            Self::Python => "python",
            Self::Java => "java",
            Self::CSharp => "csharp",
            Self::Cpp => "cpp",
            Self::Go => "go",
            Self::Rust => "rust",
        }
    }

    /// Returns a human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
            Self::Html => "HTML",
            Self::Css => "CSS",
            Self::Python => "Python",
            Self::Java => "Java",
            Self::CSharp => "C#",
            Self::Cpp => "C++",
            Self::Go => "Go",
            Self::Rust => "Rust",
        }
    }

    /// Returns the wire identifier as an owned [`LanguageId`].
    pub fn id(&self) -> LanguageId {
        LanguageId::new(self.as_id())
    }

    /// Parses a catalog entry from its wire identifier (exact match).
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_id() == id)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
