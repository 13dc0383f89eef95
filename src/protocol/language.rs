//! Supported languages and their wire codes.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ui::Style;

/// A language a participant can choose as their preferred language.
///
/// Serialized as its upper-case code (`"DE"`, `"JA"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    En,
    De,
    Fr,
    Es,
    It,
    Nl,
    Pl,
    Pt,
    Ru,
    Ja,
    Zh,
    Ko,
    Id,
    Tr,
    Ar,
    Th,
}

/// Supported languages in the order clients present them.
pub const SUPPORTED_LANGUAGES: &[Language] = &[
    Language::En,
    Language::De,
    Language::Fr,
    Language::Es,
    Language::It,
    Language::Nl,
    Language::Pl,
    Language::Pt,
    Language::Ru,
    Language::Ja,
    Language::Zh,
    Language::Ko,
    Language::Id,
    Language::Tr,
    Language::Ar,
    Language::Th,
];

impl Language {
    /// The upper-case wire code.
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "EN",
            Self::De => "DE",
            Self::Fr => "FR",
            Self::Es => "ES",
            Self::It => "IT",
            Self::Nl => "NL",
            Self::Pl => "PL",
            Self::Pt => "PT",
            Self::Ru => "RU",
            Self::Ja => "JA",
            Self::Zh => "ZH",
            Self::Ko => "KO",
            Self::Id => "ID",
            Self::Tr => "TR",
            Self::Ar => "AR",
            Self::Th => "TH",
        }
    }

    /// English name, used in translation prompts.
    pub const fn name(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::De => "German",
            Self::Fr => "French",
            Self::Es => "Spanish",
            Self::It => "Italian",
            Self::Nl => "Dutch",
            Self::Pl => "Polish",
            Self::Pt => "Portuguese",
            Self::Ru => "Russian",
            Self::Ja => "Japanese",
            Self::Zh => "Chinese (Simplified)",
            Self::Ko => "Korean",
            Self::Id => "Indonesian",
            Self::Tr => "Turkish",
            Self::Ar => "Arabic",
            Self::Th => "Thai",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    /// Parses a language code, ignoring case. Wire decoding is exact; this is
    /// for command-line and config input.
    fn from_str(s: &str) -> Result<Self> {
        SUPPORTED_LANGUAGES
            .iter()
            .copied()
            .find(|lang| lang.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid language code: '{s}'\n\n\
                     Valid language codes: EN, DE, FR, ES, JA, ZH, ...\n\
                     Run 'tl-relay languages' to see all supported codes."
                )
            })
    }
}

/// Prints all supported language codes to stdout.
pub fn print_languages() {
    println!("{}", Style::header("Supported language codes"));
    for lang in SUPPORTED_LANGUAGES {
        println!(
            "  {:4} {}",
            Style::code(lang.code()),
            Style::secondary(lang.name())
        );
    }
}
