//! Plain-text reports on a single creditor and on the registry as a whole.

use chrono::NaiveDate;

use crate::registry::{CreditorProfile, RegistryStats};

const REPORT_CASE_LIMIT: usize = 20;
const DATE_FORMAT: &str = "%d.%m.%Y";

pub fn creditor_report(profile: &CreditorProfile, date: NaiveDate) -> String {
    let c = &profile.creditor;
    let mut lines = vec![
        format!("ДОКЛАД ЗА КРЕДИТОР: {}", c.name),
        format!("Дата: {}", date.format(DATE_FORMAT)),
        format!("Тип: {}", c.kind),
        format!("Нарушения: {}", c.violations_count),
        format!("Риск скор: {:.1}", c.risk_score),
    ];
    if c.is_blacklisted {
        lines.push("СТАТУС: ЧЕРЕН СПИСЪК".to_string());
    }

    lines.push("\n=== НАРУШЕНИЯ ===".to_string());
    for v in &profile.violations {
        lines.push(format!(
            "- {} ({}) | {} | {}",
            v.violation_type.as_deref().unwrap_or("-"),
            v.severity,
            v.decision_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_else(|| "-".to_string()),
            v.authority.as_deref().unwrap_or("-"),
        ));
    }

    lines.push("\n=== НЕРАВНОПРАВНИ КЛАУЗИ ===".to_string());
    for cl in &profile.unfair_clauses {
        lines.push(format!(
            "- {} | {} | {}",
            cl.clause_type.as_deref().unwrap_or("-"),
            cl.legal_basis.as_deref().unwrap_or("-"),
            if cl.is_confirmed_illegal { "потвърдена" } else { "непотвърдена" },
        ));
    }

    lines.push("\n=== СЪДЕБНИ ДЕЛА ===".to_string());
    for case in profile.court_cases.iter().take(REPORT_CASE_LIMIT) {
        lines.push(format!(
            "- {} | {} | {} | финално: {}",
            case.case_number.as_deref().unwrap_or("-"),
            case.court_name.as_deref().unwrap_or("-"),
            case.decision_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_else(|| "-".to_string()),
            if case.is_final { "да" } else { "не" },
        ));
    }

    lines.join("\n")
}

pub fn summary_report(stats: &RegistryStats, date: NaiveDate) -> String {
    [
        "ОБЩ СВОДЕН ДОКЛАД".to_string(),
        format!("Дата: {}", date.format(DATE_FORMAT)),
        format!("Кредитори: {}", stats.creditors),
        format!("Нарушения: {} (критични: {})", stats.violations, stats.critical_violations),
        format!("Съдебни дела: {}", stats.court_cases),
        format!("Неравноправни клаузи: {}", stats.unfair_clauses),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::Severity;
    use crate::registry::{CourtCase, Creditor, CreditorKind, UnfairClauseRecord, Violation};
    use chrono::Utc;

    fn profile(cases: usize) -> CreditorProfile {
        let now = Utc::now();
        CreditorProfile {
            creditor: Creditor {
                id: 1,
                name: "БързЗаем ЕАД".into(),
                kind: CreditorKind::NonBank,
                bulstat: None,
                license_number: None,
                address: None,
                violations_count: 1,
                risk_score: 9.25,
                is_blacklisted: true,
                created_at: now,
                updated_at: now,
            },
            violations: vec![Violation {
                violation_type: Some("некоректен ГПР".into()),
                severity: Severity::Critical,
                authority: Some("KZP".into()),
                decision_date: NaiveDate::from_ymd_opt(2024, 2, 9),
                ..Default::default()
            }],
            unfair_clauses: vec![UnfairClauseRecord {
                clause_type: Some("Едностранно изменение".into()),
                legal_basis: Some("чл. 143 ЗЗП".into()),
                is_confirmed_illegal: true,
                ..Default::default()
            }],
            court_cases: (0..cases)
                .map(|i| CourtCase {
                    case_number: Some(format!("{i}/2024")),
                    ..Default::default()
                })
                .collect(),
            products: vec![],
        }
    }

    #[test]
    fn test_creditor_report() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let report = creditor_report(&profile(1), date);

        assert!(report.starts_with("ДОКЛАД ЗА КРЕДИТОР: БързЗаем ЕАД\nДата: 31.01.2025"));
        assert!(report.contains("Тип: non-bank"));
        assert!(report.contains("Риск скор: 9.2") || report.contains("Риск скор: 9.3"));
        assert!(report.contains("СТАТУС: ЧЕРЕН СПИСЪК"));
        assert!(report.contains("- некоректен ГПР (critical) | 09.02.2024 | KZP"));
        assert!(report.contains("- Едностранно изменение | чл. 143 ЗЗП | потвърдена"));
        assert!(report.contains("- 0/2024 | - | - | финално: не"));
    }

    #[test]
    fn test_creditor_report_caps_cases() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let report = creditor_report(&profile(25), date);
        assert!(report.contains("19/2024"));
        assert!(!report.contains("20/2024"));
    }

    #[test]
    fn test_summary_report() {
        let stats = RegistryStats {
            creditors: 2,
            violations: 3,
            critical_violations: 1,
            court_cases: 0,
            unfair_clauses: 4,
        };
        let report = summary_report(&stats, NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
        assert_eq!(
            report,
            "ОБЩ СВОДЕН ДОКЛАД\nДата: 07.03.2025\nКредитори: 2\nНарушения: 3 (критични: 1)\nСъдебни дела: 0\nНеравноправни клаузи: 4"
        );
    }
}
