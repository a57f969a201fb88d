//! Contract Analyzer
//!
//! Reads an uploaded credit contract, pulls out the commercial terms,
//! re-checks the declared GPR and runs the unfair clause detector. The
//! individual findings are folded into one overall risk level.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use super::clauses::{ClauseDetector, ClauseRisk, DetectedClause, Severity};
use super::gpr::{Fee, FeeTiming, GprCalculator, GprRequest, GprVerification};
use super::text::{
    extract_amounts, extract_percentages, normalize_text, parse_decimal, AMOUNT_NUMBER, ILLEGAL_FEE_KEYWORDS,
};
use crate::error::{GuardianError, GuardianResult};

pub const UNSUPPORTED_DOCUMENT: &str = "Поддържат се .pdf .txt";
pub const UNKNOWN_CREDITOR: &str = "Неразпознат";
pub const ILLEGAL_FEE_BASIS: &str = "ЗПК / практика КЗП (недопустима такса)";

/// Amounts above this are assumed to be something other than the principal.
const MAX_PLAUSIBLE_PRINCIPAL: f64 = 200_000.0;
const MAX_PLAUSIBLE_GPR: f64 = 200.0;
/// Used when the contract never states the total amount owed.
const FALLBACK_REPAYMENT_FACTOR: f64 = 1.25;

lazy_static! {
    static ref LABELLED_CREDITOR: Regex =
        Regex::new(r#"(?:Кредитор|Банка|Фирма)\s*[:\-]\s*([A-ZА-Я0-9"„][^,;]*)"#).unwrap();
    static ref COMPANY: Regex = Regex::new(
        r#"([A-ZА-Я„"][\w"„“\-]*(?:\s+[A-ZА-Я„"][\w"„“\-]*){0,3}\s+(?:ЕООД|ООД|ЕАД|АД))\b"#
    )
    .unwrap();
    static ref COMPANY_SUFFIX: Regex = Regex::new(r"\s(?:ЕООД|ООД|ЕАД|АД)\b").unwrap();
    static ref DECLARED_GPR: Regex = Regex::new(r"ГПР[^0-9]{0,20}(\d{1,3}[.,]\d{1,2})\s*%").unwrap();
    static ref TERM_MONTHS: Regex = Regex::new(r"срок.*?(\d{1,3})\s*мес").unwrap();
    static ref TERM_YEARS: Regex = Regex::new(r"срок.*?(\d{1,2})\s*год").unwrap();
    static ref TOTAL_REPAYMENT: Regex =
        Regex::new(&format!(r"(?:общо.*?дължима|общ размер).*?({AMOUNT_NUMBER})")).unwrap();
    static ref FEES: Vec<Regex> = vec![
        Regex::new(&format!(
            r"((?:такса|комисиона) [a-zа-я\s]+?)\s*[:\-]?\s*({AMOUNT_NUMBER}|\d[.,]\d{{2}})\s*(?:лева|лв|bgn)"
        ))
        .unwrap(),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Txt,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> GuardianResult<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "txt" => Ok(DocumentKind::Txt),
            _ => Err(GuardianError::UnsupportedDocument(UNSUPPORTED_DOCUMENT.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IllegalFee {
    pub name: String,
    pub amount: f64,
    pub legal_basis: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractAnalysis {
    pub id: Uuid,
    pub filename: String,
    pub document_sha256: String,
    pub creditor: String,
    pub amount: f64,
    pub declared_gpr: f64,
    pub estimated_total_repayment: f64,
    /// True when the total owed was not stated and had to be estimated.
    pub total_repayment_estimated: bool,
    pub term_months: u32,
    pub fees: Vec<Fee>,
    pub illegal_fees: Vec<IllegalFee>,
    pub gpr_verification: Option<GprVerification>,
    pub unfair_clauses: Vec<DetectedClause>,
    pub clause_risk: ClauseRisk,
    pub risk_level: Severity,
    pub text_length: usize,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ContractAnalyzer {
    gpr: GprCalculator,
    clauses: ClauseDetector,
}

impl ContractAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clause_detector(&self) -> &ClauseDetector {
        &self.clauses
    }

    pub fn gpr_calculator(&self) -> &GprCalculator {
        &self.gpr
    }

    /// Extracts plain text from an uploaded document. PDF parsing is CPU
    /// bound; async callers should run this on a blocking thread.
    pub fn read_document(&self, filename: &str, bytes: &[u8]) -> GuardianResult<String> {
        if bytes.is_empty() {
            return Err(GuardianError::validation("Файлът е празен"));
        }

        match DocumentKind::from_filename(filename)? {
            DocumentKind::Txt => Ok(String::from_utf8_lossy(bytes).into_owned()),
            DocumentKind::Pdf => {
                // malformed PDFs can panic inside the parser
                let extracted = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
                    .map_err(|_| GuardianError::Extraction("PDF файлът не може да бъде прочетен".to_string()))?;
                extracted.map_err(|e| GuardianError::Extraction(e.to_string()))
            }
        }
    }

    pub fn analyze_document(&self, filename: &str, bytes: &[u8]) -> GuardianResult<ContractAnalysis> {
        let raw = self.read_document(filename, bytes)?;
        let mut analysis = self.analyze_text(filename, &raw);
        analysis.document_sha256 = hex::encode(Sha256::digest(bytes));
        Ok(analysis)
    }

    pub fn analyze_text(&self, filename: &str, raw: &str) -> ContractAnalysis {
        let text = normalize_text(raw);
        let lower = text.to_lowercase();

        let creditor = extract_creditor(&text);
        let amount = extract_loan_amount(&text);
        let declared_gpr = extract_declared_gpr(&text);
        let term_months = extract_term(&lower);
        let (total_repayment, estimated) = match extract_total_repayment(&lower) {
            Some(total) => (total, false),
            None => (amount * FALLBACK_REPAYMENT_FACTOR, true),
        };
        let fees = extract_fees(&lower);
        let illegal_fees = find_illegal_fees(&fees);

        let gpr_verification = if declared_gpr > 0.0 && amount > 0.0 && total_repayment > 0.0 && term_months > 0 {
            let loan = GprRequest {
                amount,
                total_repayment,
                term_months,
                fees: fees.clone(),
                schedule: None,
            };
            self.gpr.verify(declared_gpr, &loan).ok()
        } else {
            debug!("Skipping GPR verification, contract terms incomplete");
            None
        };

        let unfair_clauses = self.clauses.detect(&text);
        let clause_risk = self.clauses.assess(&unfair_clauses);
        let risk_level = aggregate_risk(gpr_verification.as_ref(), &clause_risk, &illegal_fees);

        info!(
            "Analyzed {}: creditor={}, clauses={}, illegal_fees={}, risk={}",
            filename,
            creditor,
            unfair_clauses.len(),
            illegal_fees.len(),
            risk_level
        );

        ContractAnalysis {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            document_sha256: hex::encode(Sha256::digest(raw.as_bytes())),
            creditor,
            amount,
            declared_gpr,
            estimated_total_repayment: total_repayment,
            total_repayment_estimated: estimated && total_repayment > 0.0,
            term_months,
            fees,
            illegal_fees,
            gpr_verification,
            unfair_clauses,
            clause_risk,
            risk_level,
            text_length: text.chars().count(),
            analyzed_at: Utc::now(),
        }
    }
}

fn extract_creditor(text: &str) -> String {
    if let Some(name) = LABELLED_CREDITOR.captures(text).and_then(|c| c.get(1)) {
        let name = name.as_str();
        // keep the name up to its legal form when one follows
        let name = match COMPANY_SUFFIX.find(name) {
            Some(m) => &name[..m.end()],
            None => name,
        };
        let name = name.trim().trim_end_matches('.').trim();
        if !name.is_empty() {
            return name.chars().take(120).collect();
        }
    }

    COMPANY
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| UNKNOWN_CREDITOR.to_string())
}

fn extract_loan_amount(text: &str) -> f64 {
    let amounts = extract_amounts(text);
    let plausible = amounts.iter().copied().filter(|a| *a <= MAX_PLAUSIBLE_PRINCIPAL).fold(None, max_opt);
    plausible
        .or_else(|| amounts.iter().copied().fold(None, max_opt))
        .unwrap_or(0.0)
}

fn extract_declared_gpr(text: &str) -> f64 {
    if let Some(value) = DECLARED_GPR
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_decimal(m.as_str()))
    {
        return value;
    }

    let percents = extract_percentages(text);
    percents
        .iter()
        .copied()
        .filter(|p| *p < MAX_PLAUSIBLE_GPR)
        .fold(None, max_opt)
        .or_else(|| percents.iter().copied().fold(None, max_opt))
        .unwrap_or(0.0)
}

fn extract_term(lower: &str) -> u32 {
    if let Some(months) = TERM_MONTHS
        .captures(lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        return months;
    }

    TERM_YEARS
        .captures(lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|years| years * 12)
        .unwrap_or(0)
}

fn extract_total_repayment(lower: &str) -> Option<f64> {
    TOTAL_REPAYMENT
        .captures(lower)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_decimal(m.as_str()))
}

fn extract_fees(lower: &str) -> Vec<Fee> {
    FEES.iter()
        .flat_map(|re| re.captures_iter(lower))
        .filter_map(|c| {
            let name = c.get(1)?.as_str().trim().to_string();
            let amount = parse_decimal(c.get(2)?.as_str())?;
            Some(Fee::new(name, amount, FeeTiming::Unknown))
        })
        .collect()
}

fn find_illegal_fees(fees: &[Fee]) -> Vec<IllegalFee> {
    fees.iter()
        .filter(|f| ILLEGAL_FEE_KEYWORDS.iter().any(|k| f.name.contains(k)))
        .map(|f| IllegalFee {
            name: f.name.clone(),
            amount: f.amount,
            legal_basis: ILLEGAL_FEE_BASIS.to_string(),
        })
        .collect()
}

/// Folds GPR mismatch, illegal fees and clause risk into one level.
pub fn aggregate_risk(
    gpr: Option<&GprVerification>,
    clause_risk: &ClauseRisk,
    illegal_fees: &[IllegalFee],
) -> Severity {
    let mut score = 0;
    if gpr.is_some_and(|v| !v.is_correct) {
        score += 5;
    }
    if !illegal_fees.is_empty() {
        score += 5;
    }
    score += match clause_risk.overall_risk {
        Severity::Low => 1,
        Severity::Medium => 3,
        Severity::High => 6,
        Severity::Critical => 10,
    };

    match score {
        s if s >= 15 => Severity::Critical,
        s if s >= 10 => Severity::High,
        s if s >= 5 => Severity::Medium,
        _ => Severity::Low,
    }
}

fn max_opt(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.max(v)))
}
