//! The fixed patterns of the document miner and the name normalization
//! used to compare party names against extracted or OCR'd text.

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

lazy_static! {
    /// 11-digit CPF, tolerating `.`, space, `/` and `-` as group
    /// separators (123.456.789-00, 12345678900, 123 456 789 00, ...).
    pub static ref CPF: Regex =
        Regex::new(r"\d{3}[.\s/-]?\d{3}[.\s/-]?\d{3}[.\s/-]?\d{2}").unwrap();

    /// 14-digit CNPJ with the same separator tolerance.
    pub static ref CNPJ: Regex =
        Regex::new(r"\d{2}[.\s/-]?\d{3}[.\s/-]?\d{3}[.\s/-]?\d{4}[.\s/-]?\d{2}").unwrap();

    /// Field-label variants of "CPF" / "CNPJ" (C.P.F, c n p j, ...),
    /// used to locate the nearest numeric match.
    pub static ref DOC_LABEL: Regex =
        Regex::new(r"(?i)c\.?\s*p\.?\s*f\.?|c\.?\s*n\.?\s*p\.?\s*j\.?").unwrap();
}

pub fn first_cpf(text: &str) -> Option<String> {
    CPF.find(text).map(|m| m.as_str().to_string())
}

pub fn first_cnpj(text: &str) -> Option<String> {
    CNPJ.find(text).map(|m| m.as_str().to_string())
}

/// First CPF in the text, else the first CNPJ. CPF always wins the tie,
/// matching how every search stage prioritizes the two shapes.
pub fn first_document(text: &str) -> Option<String> {
    first_cpf(text).or_else(|| first_cnpj(text))
}

/// Strips diacritics (NFD, drop combining marks), lowercases and collapses
/// whitespace, so "Maurício  Ferreira" and "mauricio ferreira" compare
/// equal.
pub fn normalize_name(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
