//! GPR (ГПР) Calculator
//!
//! Annual percentage rate of charge per Annex 1 of the Consumer Credit Act
//! (ЗПК). Two figures are produced:
//!
//! - a simple compound estimate from total cost over the term, and
//! - an exact rate solving `NPV(r) = 0` over the payment schedule with
//!   Newton–Raphson, compounding monthly.
//!
//! A declared GPR is considered correct when it is within
//! [`GPR_TOLERANCE`] percentage points of the exact figure.

use serde::{Deserialize, Serialize};

use super::text::round_to;
use crate::error::{GuardianError, GuardianResult};

/// Maximum allowed gap, in percentage points, between declared and computed GPR.
pub const GPR_TOLERANCE: f64 = 0.1;
/// Longest accepted term (50 years). Also bounds schedule months and
/// remaining months on early repayment.
pub const MAX_TERM_MONTHS: u32 = 600;

const NEWTON_START_RATE: f64 = 0.10;
const NEWTON_MAX_ITERATIONS: usize = 100;
const NPV_EPSILON: f64 = 0.01;
const DERIVATIVE_EPSILON: f64 = 1e-10;

pub const VERDICT_OK: &str = "Съответства";
pub const VERDICT_MISMATCH: &str = "НЕСЪОТВЕТСТВИЕ - Възможно нарушение на чл. 10а ЗПК";
pub const EARLY_REPAYMENT_REFERENCE: &str = "чл. 29, ал. 3 ЗПК";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeeTiming {
    /// Withheld from the disbursed amount.
    Upfront,
    Monthly,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fee {
    pub name: String,
    /// Total charged over the life of the loan, in лв.
    pub amount: f64,
    #[serde(default)]
    pub when: FeeTiming,
}

impl Fee {
    pub fn new(name: impl Into<String>, amount: f64, when: FeeTiming) -> Self {
        Self {
            name: name.into(),
            amount,
            when,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    /// Months after disbursement, starting at 1.
    pub month: u32,
    pub amount: f64,
}

/// Loan parameters as submitted by the calculator form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GprRequest {
    /// Principal, in лв.
    pub amount: f64,
    /// Everything repaid over the term, fees excluded.
    pub total_repayment: f64,
    /// 1 to [`MAX_TERM_MONTHS`].
    pub term_months: u32,
    #[serde(default)]
    pub fees: Vec<Fee>,
    /// Explicit payment plan; equal monthly instalments when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Vec<Payment>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GprVerifyRequest {
    pub declared_gpr: f64,
    #[serde(flatten)]
    pub loan: GprRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostBreakdown {
    pub principal: f64,
    /// Total cost minus principal and fees.
    pub interest: f64,
    pub fees_breakdown: Vec<Fee>,
    pub monthly_payment: f64,
    pub term_months: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GprCalculation {
    /// Compound estimate from total cost over the term, in percent.
    pub gpr_simple: f64,
    /// Rate solving NPV = 0 over the schedule, in percent.
    pub gpr_exact: f64,
    /// Total repayment plus all fees.
    pub total_cost: f64,
    pub total_fees: f64,
    /// Principal actually received after upfront fees.
    pub effective_amount: f64,
    /// Total cost minus principal.
    pub overpayment: f64,
    pub overpayment_percent: f64,
    pub breakdown: CostBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GprVerification {
    /// Declared and exact GPR agree within [`GPR_TOLERANCE`].
    pub is_correct: bool,
    pub declared_gpr: f64,
    pub calculated_gpr: f64,
    /// Absolute gap in percentage points.
    pub difference: f64,
    pub tolerance: f64,
    /// Human-readable verdict in Bulgarian.
    pub verdict: String,
    pub details: GprCalculation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarlyRepaymentRequest {
    pub remaining_principal: f64,
    /// Months left on the contract, at most [`MAX_TERM_MONTHS`].
    pub remaining_months: u32,
    /// Annual contractual interest rate, in percent.
    pub interest_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarlyRepaymentCompensation {
    pub remaining_principal: f64,
    pub remaining_months: u32,
    /// Legal cap as a percentage of the remaining principal.
    pub max_compensation_rate: f64,
    /// The lesser of lost interest and the legal limit.
    pub calculated_compensation: f64,
    /// Interest the creditor forgoes over the remaining months.
    pub lost_interest: f64,
    /// Cap in лв.
    pub legal_limit: f64,
    pub legal_reference: String,
}

#[derive(Debug, Clone, Default)]
pub struct GprCalculator;

impl GprCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn calculate(&self, req: &GprRequest) -> GuardianResult<GprCalculation> {
        validate(req)?;

        let total_fees: f64 = req.fees.iter().map(|f| f.amount).sum();
        let total_cost = req.total_repayment + total_fees;
        let upfront: f64 = req
            .fees
            .iter()
            .filter(|f| f.when == FeeTiming::Upfront)
            .map(|f| f.amount)
            .sum();
        let effective_amount = req.amount - upfront;

        let gpr_simple = simple_gpr(effective_amount, total_cost, req.term_months);
        let schedule = match &req.schedule {
            Some(schedule) if !schedule.is_empty() => schedule.clone(),
            _ => equal_instalments(total_cost, req.term_months),
        };
        let gpr_exact = exact_gpr(effective_amount, &schedule);

        let overpayment = total_cost - req.amount;

        Ok(GprCalculation {
            gpr_simple: round_to(gpr_simple, 2),
            gpr_exact: round_to(gpr_exact, 2),
            total_cost,
            total_fees,
            effective_amount,
            overpayment,
            overpayment_percent: round_to(overpayment / req.amount * 100.0, 2),
            breakdown: CostBreakdown {
                principal: req.amount,
                interest: total_cost - req.amount - total_fees,
                fees_breakdown: req.fees.clone(),
                monthly_payment: total_cost / req.term_months as f64,
                term_months: req.term_months,
            },
        })
    }

    /// Checks a GPR declared in a contract against the recomputed exact figure.
    pub fn verify(&self, declared_gpr: f64, loan: &GprRequest) -> GuardianResult<GprVerification> {
        if !declared_gpr.is_finite() || declared_gpr < 0.0 {
            return Err(GuardianError::validation("Декларираният ГПР трябва да е неотрицателно число"));
        }

        let details = self.calculate(loan)?;
        let difference = (details.gpr_exact - declared_gpr).abs();
        // compare on the rounded figure so 0.1 exactly is still inside the tolerance
        let is_correct = round_to(difference, 6) <= GPR_TOLERANCE;

        Ok(GprVerification {
            is_correct,
            declared_gpr,
            calculated_gpr: details.gpr_exact,
            difference: round_to(difference, 3),
            tolerance: GPR_TOLERANCE,
            verdict: if is_correct { VERDICT_OK } else { VERDICT_MISMATCH }.to_string(),
            details,
        })
    }

    /// Compensation a creditor may claim on early repayment (чл. 29, ал. 3 ЗПК):
    /// the lost interest, capped at 1% of the remaining principal when more
    /// than a year remains and 0.5% otherwise.
    pub fn early_repayment_compensation(
        &self,
        req: &EarlyRepaymentRequest,
    ) -> GuardianResult<EarlyRepaymentCompensation> {
        if !req.remaining_principal.is_finite() || req.remaining_principal < 0.0 {
            return Err(GuardianError::validation("Остатъчната главница не може да е отрицателна"));
        }
        if !req.interest_rate.is_finite() || req.interest_rate < 0.0 {
            return Err(GuardianError::validation("Лихвеният процент не може да е отрицателен"));
        }
        if req.remaining_months > MAX_TERM_MONTHS {
            return Err(GuardianError::validation(format!(
                "Оставащият срок не може да надвишава {MAX_TERM_MONTHS} месеца"
            )));
        }

        let cap_rate = if req.remaining_months > 12 { 0.01 } else { 0.005 };
        let monthly_rate = req.interest_rate / 100.0 / 12.0;
        let lost_interest = req.remaining_principal * monthly_rate * req.remaining_months as f64;
        let legal_limit = req.remaining_principal * cap_rate;
        let compensation = lost_interest.min(legal_limit);

        Ok(EarlyRepaymentCompensation {
            remaining_principal: req.remaining_principal,
            remaining_months: req.remaining_months,
            max_compensation_rate: cap_rate * 100.0,
            calculated_compensation: round_to(compensation, 2),
            lost_interest: round_to(lost_interest, 2),
            legal_limit: round_to(legal_limit, 2),
            legal_reference: EARLY_REPAYMENT_REFERENCE.to_string(),
        })
    }
}

fn validate(req: &GprRequest) -> GuardianResult<()> {
    if !req.amount.is_finite() || req.amount <= 0.0 {
        return Err(GuardianError::validation("Сумата на кредита трябва да е положителна"));
    }
    if req.term_months == 0 {
        return Err(GuardianError::validation("Срокът трябва да е поне 1 месец"));
    }
    if req.term_months > MAX_TERM_MONTHS {
        return Err(GuardianError::validation(format!(
            "Срокът не може да надвишава {MAX_TERM_MONTHS} месеца"
        )));
    }
    if !req.total_repayment.is_finite() || req.total_repayment < 0.0 {
        return Err(GuardianError::validation("Общата сума за връщане не може да е отрицателна"));
    }
    if let Some(fee) = req.fees.iter().find(|f| !f.amount.is_finite() || f.amount < 0.0) {
        return Err(GuardianError::validation(format!(
            "Невалидна стойност на такса „{}“",
            fee.name
        )));
    }
    if let Some(schedule) = &req.schedule {
        if schedule.len() > MAX_TERM_MONTHS as usize {
            return Err(GuardianError::validation(format!(
                "Погасителният план не може да има повече от {MAX_TERM_MONTHS} вноски"
            )));
        }
        if schedule
            .iter()
            .any(|p| p.month == 0 || p.month > MAX_TERM_MONTHS || !p.amount.is_finite() || p.amount < 0.0)
        {
            return Err(GuardianError::validation(
                "Погасителният план съдържа невалидна вноска",
            ));
        }
    }
    Ok(())
}

fn simple_gpr(amount: f64, total: f64, months: u32) -> f64 {
    if amount <= 0.0 || months == 0 {
        return 0.0;
    }

    let gpr = ((total / amount).powf(12.0 / months as f64) - 1.0) * 100.0;
    gpr.max(0.0)
}

fn exact_gpr(amount: f64, schedule: &[Payment]) -> f64 {
    if amount <= 0.0 || schedule.is_empty() {
        return 0.0;
    }

    let npv = |rate: f64| -> f64 {
        schedule.iter().fold(-amount, |pv, p| {
            pv + p.amount / (1.0 + rate / 12.0).powi(p.month as i32)
        })
    };
    let npv_derivative = |rate: f64| -> f64 {
        schedule.iter().fold(0.0, |d, p| {
            let m = p.month as f64;
            d - (m * p.amount) / (12.0 * (1.0 + rate / 12.0).powi(p.month as i32 + 1))
        })
    };

    let mut rate = NEWTON_START_RATE;
    for _ in 0..NEWTON_MAX_ITERATIONS {
        let value = npv(rate);
        if value.abs() < NPV_EPSILON {
            break;
        }

        let deriv = npv_derivative(rate);
        if deriv.abs() < DERIVATIVE_EPSILON {
            break;
        }

        rate -= value / deriv;
        if rate < 0.0 {
            rate = 0.001;
        }
        if !rate.is_finite() {
            return 0.0;
        }
    }

    rate * 100.0
}

fn equal_instalments(total: f64, months: u32) -> Vec<Payment> {
    let monthly = total / months as f64;
    (1..=months).map(|month| Payment { month, amount: monthly }).collect()
}
