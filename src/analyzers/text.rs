//! Text helpers for contract documents: whitespace normalisation and
//! extraction of monetary amounts and percentages.

use lazy_static::lazy_static;
use regex::Regex;

/// Fee names that consumer-credit practice treats as inadmissible.
pub const ILLEGAL_FEE_KEYWORDS: &[&str] = &[
    "такса за разглеждане",
    "такса бързо разглеждане",
    "такса експресно",
    "такса администриране",
    "такса управление",
    "такса оценка на риск",
];

/// A money figure with two decimals, optionally grouped in thousands by
/// spaces (`1 500,00`). Ungrouped figures need at least two integer digits.
pub const AMOUNT_NUMBER: &str = r"\d{1,3}(?:[ \x{a0}]\d{3})+[.,]\d{2}|\d{2,9}[.,]\d{2}";

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref AMOUNT: Regex = Regex::new(&format!(r"({AMOUNT_NUMBER})\s*(?:лева|лв|BGN)")).unwrap();
    static ref PERCENT: Regex = Regex::new(r"(\d{1,3}[.,]\d{1,2})\s*%").unwrap();
}

pub fn normalize_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Parses a decimal written with either `.` or `,` as the separator and
/// optional space-grouped thousands.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().replace([' ', '\u{a0}'], "").replace(',', ".").parse().ok()
}

/// Amounts in лв, лева or BGN (`1234.56 лв`, `1 234,56 лева`, `99,00 BGN`),
/// in document order.
pub fn extract_amounts(text: &str) -> Vec<f64> {
    AMOUNT
        .captures_iter(text)
        .filter_map(|c| c.get(1).and_then(|m| parse_decimal(m.as_str())))
        .collect()
}

/// Percentages written as `12.5 %` / `12,50%`, in document order.
pub fn extract_percentages(text: &str) -> Vec<f64> {
    PERCENT
        .captures_iter(text)
        .filter_map(|c| c.get(1).and_then(|m| parse_decimal(m.as_str())))
        .collect()
}

/// Largest byte index `<= idx` that sits on a char boundary.
pub fn floor_char_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Smallest byte index `>= idx` that sits on a char boundary.
pub fn ceil_char_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
