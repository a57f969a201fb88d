//! Unfair Clause Detector
//!
//! Scans contract text for clause families that consumer-protection practice
//! treats as unfair (ЗЗП / ЗПК), scores the overall severity and drafts a
//! complaint to the Commission for Consumer Protection (КЗП).

use std::collections::HashSet;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::text::{ceil_char_boundary, floor_char_boundary};

const CONTEXT_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Weight of one clause of this severity in [`ClauseRisk::risk_score`].
    fn clause_weight(&self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 5,
            Severity::Critical => 10,
        }
    }

    /// Risk points a registered violation of this severity adds to its creditor.
    pub fn violation_weight(&self) -> u32 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Severity::Critical => {
                "СИЛНО НЕ ПРЕПОРЪЧВАМЕ подписване на този договор! \
                 Съдържа сериозни нарушения на закона. \
                 Консултирайте се с юрист незабавно."
            }
            Severity::High => {
                "НЕ ПРЕПОРЪЧВАМЕ подписване без промени. \
                 Договорът съдържа множество неравноправни клаузи. \
                 Поискайте преразглеждане на условията."
            }
            Severity::Medium => {
                "ВНИМАНИЕ! Договорът съдържа проблемни клаузи. \
                 Обсъдете условията с кредитора преди подписване."
            }
            Severity::Low => {
                "Договорът е относително приемлив, но прочетете внимателно \
                 всички условия преди подписване."
            }
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// One family of unfair clauses and the phrasings that reveal it.
#[derive(Debug, Clone)]
pub struct ClausePattern {
    pub clause_type: &'static str,
    pub keywords: Vec<Regex>,
    pub legal_basis: &'static str,
    pub severity: Severity,
    pub explanation: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedClause {
    #[serde(rename = "type")]
    pub clause_type: String,
    /// The full sentence the match sits in.
    pub text: String,
    pub legal_basis: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub context: String,
    /// Character offset of the match in the analysed text.
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub keyword: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityCounts {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClauseRisk {
    pub severity_counts: SeverityCounts,
    pub risk_score: u32,
    pub overall_risk: Severity,
    pub total_clauses: usize,
    pub recommendation: String,
}

pub struct ClauseDetector {
    patterns: Vec<ClausePattern>,
}

impl ClauseDetector {
    pub fn new() -> Self {
        Self {
            patterns: Self::build_patterns(),
        }
    }

    fn build_patterns() -> Vec<ClausePattern> {
        let compile = |sources: &[&str]| -> Vec<Regex> {
            sources
                .iter()
                .map(|s| Regex::new(&format!("(?is){s}")).unwrap())
                .collect()
        };

        vec![
            ClausePattern {
                clause_type: "Едностранно изменение",
                keywords: compile(&[
                    r"кредиторът\s+има\s+право\s+едностранно\s+да\s+промен",
                    r"(?:банката|кредиторът)\s+може\s+да\s+измен[яи]\s+по\s+всяко\s+време",
                    r"едностранно\s+да\s+промен",
                    r"правото\s+за\s+промяна\s+на\s+условията",
                    r"изменение\s+без\s+предварително\s+уведомление",
                ]),
                legal_basis: "чл. 143, ал. 1, т. 5 ЗЗП",
                severity: Severity::High,
                explanation: "Клаузата позволява едностранно изменение на съществени условия",
            },
            ClausePattern {
                clause_type: "Прекомерна неустойка",
                keywords: compile(&[
                    r"неустойка\s+в\s+размер",
                    r"договорна\s+лихва.{0,80}?процент",
                    r"обезщетение\s+за\s+забава",
                ]),
                legal_basis: "чл. 143, ал. 1, т. 3 ЗЗП",
                severity: Severity::Medium,
                explanation: "Неустойката може да е прекомерна спрямо претърпените вреди",
            },
            ClausePattern {
                clause_type: "Ограничаване правото на предсрочно погасяване",
                keywords: compile(&[
                    r"предсрочното\s+погасяване.{0,60}?не\s+се\s+допуска",
                    r"не\s+се\s+допуска\s+предсрочно",
                    r"забрана\s+за\s+предсрочно\s+погасяване",
                    r"обезщетение\s+за\s+предсрочно.{0,60}?процент",
                ]),
                legal_basis: "чл. 29 ЗПК",
                severity: Severity::Critical,
                explanation: "Потребителят има право на предсрочно погасяване",
            },
            ClausePattern {
                clause_type: "Автоматично подновяване",
                keywords: compile(&[r"автоматично\s+подновяване", r"подновява\s+се\s+автоматично"]),
                legal_basis: "чл. 143, ал. 1, т. 8 ЗЗП",
                severity: Severity::Medium,
                explanation: "Договорът се удължава без изрично съгласие на потребителя",
            },
            ClausePattern {
                clause_type: "Отказ от права и дискреция на кредитора",
                keywords: compile(&[r"се\s+отказва\s+от\s+правото", r"по\s+преценка\s+на\s+кредитора"]),
                legal_basis: "чл. 143, ал. 1 ЗЗП",
                severity: Severity::High,
                explanation: "Потребителят се лишава от законови права или кредиторът решава едностранно",
            },
        ]
    }

    pub fn patterns(&self) -> &[ClausePattern] {
        &self.patterns
    }

    /// Finds every unfair clause in `text`. A sentence is reported at most
    /// once per clause family even when several phrasings match it.
    pub fn detect(&self, text: &str) -> Vec<DetectedClause> {
        let mut detected = Vec::new();
        let mut seen: HashSet<(&'static str, usize)> = HashSet::new();

        for pattern in &self.patterns {
            for keyword in &pattern.keywords {
                for m in keyword.find_iter(text) {
                    let (sentence_start, sentence_end) = sentence_bounds(text, m.start(), m.end());
                    if !seen.insert((pattern.clause_type, sentence_start)) {
                        continue;
                    }

                    let context_start = back_chars(text, m.start(), CONTEXT_CHARS);
                    let context_end = forward_chars(text, m.end(), CONTEXT_CHARS);

                    detected.push(DetectedClause {
                        clause_type: pattern.clause_type.to_string(),
                        text: text[sentence_start..sentence_end].trim().to_string(),
                        legal_basis: pattern.legal_basis.to_string(),
                        severity: pattern.severity,
                        explanation: pattern.explanation.to_string(),
                        context: text[context_start..context_end].to_string(),
                        position: text[..m.start()].chars().count(),
                        keyword: keyword.as_str().trim_start_matches("(?is)").to_string(),
                    });
                }
            }
        }

        detected.sort_by_key(|c| c.position);
        detected
    }

    pub fn assess(&self, clauses: &[DetectedClause]) -> ClauseRisk {
        let mut counts = SeverityCounts::default();
        for clause in clauses {
            match clause.severity {
                Severity::Critical => counts.critical += 1,
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
        }

        let risk_score: u32 = clauses.iter().map(|c| c.severity.clause_weight()).sum();
        let overall_risk = match risk_score {
            s if s >= 20 => Severity::Critical,
            s if s >= 10 => Severity::High,
            s if s >= 5 => Severity::Medium,
            _ => Severity::Low,
        };

        ClauseRisk {
            severity_counts: counts,
            risk_score,
            overall_risk,
            total_clauses: clauses.len(),
            recommendation: overall_risk.recommendation().to_string(),
        }
    }

    /// Drafts a complaint to КЗП listing every clause, dated `date`.
    pub fn complaint(&self, clauses: &[DetectedClause], creditor: &str, date: NaiveDate) -> String {
        let mut out = format!(
            "\nДО\nКОМИСИЯТА ЗА ЗАЩИТА НА ПОТРЕБИТЕЛИТЕ\n\n\
             ЖАЛБА\nот: [ИМЕ НА ПОТРЕБИТЕЛ]\nсрещу: {creditor}\n\n\
             Уважаеми дами и господа,\n\n\
             Подавам жалба срещу {creditor} за използване на неравноправни клаузи в договор \n\
             за потребителски кредит, в нарушение на Закона за защита на потребителите.\n\n\
             УСТАНОВЕНИ НАРУШЕНИЯ:\n\n"
        );

        for (i, clause) in clauses.iter().enumerate() {
            out.push_str(&format!(
                "\n{}. {}\n\nТекст на клаузата:\n\"{}\"\n\nПравно основание: {}\nОбяснение: {}\n\n",
                i + 1,
                clause.clause_type,
                clause.text,
                clause.legal_basis,
                clause.explanation
            ));
        }

        out.push_str(&format!(
            "\nНа основание горепосоченото, моля да се образува производство и да се наложат \n\
             предвидените в закона санкции на {creditor}.\n\n\
             Моля също така да се прогласи нищожността на неравноправните клаузи.\n\n\
             Дата: {}\nПодпис: _________________\n",
            date.format("%d.%m.%Y")
        ));

        out
    }
}

impl Default for ClauseDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte range of the sentence around `[start, end)`, delimited by periods.
fn sentence_bounds(text: &str, start: usize, end: usize) -> (usize, usize) {
    let sentence_start = text[..start].rfind('.').map(|i| i + 1).unwrap_or(0);
    let sentence_end = text[end..].find('.').map(|i| end + i).unwrap_or(text.len());
    (sentence_start, sentence_end)
}

fn back_chars(text: &str, idx: usize, n: usize) -> usize {
    text[..idx]
        .char_indices()
        .rev()
        .nth(n.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0)
        .min(floor_char_boundary(text, idx))
}

fn forward_chars(text: &str, idx: usize, n: usize) -> usize {
    text[idx..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| idx + i)
        .unwrap_or_else(|| ceil_char_boundary(text, text.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> ClauseDetector {
        ClauseDetector::new()
    }

    fn clause(severity: Severity) -> DetectedClause {
        DetectedClause {
            clause_type: "Test".into(),
            text: "test".into(),
            legal_basis: "test".into(),
            severity,
            explanation: String::new(),
            context: String::new(),
            position: 0,
            keyword: String::new(),
        }
    }

    #[test]
    fn test_detect_unilateral_change() {
        let contract = "
    Член 5. Кредиторът има право едностранно да промени лихвения процент
    по всяко време без предварително уведомление на заемателя.
    ";
        let clauses = detector().detect(contract);
        assert_eq!(clauses.len(), 1, "one sentence, one family: {clauses:?}");
        assert_eq!(clauses[0].clause_type, "Едностранно изменение");
        assert_eq!(clauses[0].severity, Severity::High);
        assert!(clauses[0].text.starts_with("Кредиторът има право"));
    }

    #[test]
    fn test_every_family_detected_once() {
        let contract = "Кредиторът има право едностранно да промени таксите. \
            Заемателят дължи неустойка в размер на 50%. \
            Не се допуска предсрочно погасяване. \
            Предвидено е автоматично подновяване на договора. \
            Размерът на таксите се определя по преценка на кредитора.";
        let detector = detector();
        assert_eq!(detector.patterns().len(), 5);

        let clauses = detector.detect(contract);
        let families: HashSet<&str> = clauses.iter().map(|c| c.clause_type.as_str()).collect();
        assert_eq!(clauses.len(), 5, "{clauses:?}");
        assert_eq!(families.len(), 5);
    }

    #[test]
    fn test_detect_excessive_penalty_across_lines() {
        let contract = "
    При забава на плащането, заемателят дължи неустойка в размер
    на 50% от непогасената главница.
    ";
        let clauses = detector().detect(contract);
        assert!(clauses.iter().any(|c| c.clause_type.to_lowercase().contains("неустойка")));
    }

    #[test]
    fn test_detect_prepayment_restriction() {
        let contract = "
    Предсрочното погасяване на кредита не се допуска през
    първите 12 месеца от договора.
    ";
        let clauses = detector().detect(contract);
        let hit = clauses
            .iter()
            .find(|c| c.clause_type.to_lowercase().contains("предсрочно"))
            .expect("prepayment restriction detected");
        assert_eq!(hit.severity, Severity::Critical);
        assert_eq!(hit.legal_basis, "чл. 29 ЗПК");
    }

    #[test]
    fn test_clean_contract() {
        let contract = "
    Кредиторът се задължава да предостави на заемателя договорения кредит.
    Заемателят се задължава да върне кредита в уговорения срок.
    ";
        assert!(detector().detect(contract).is_empty());
    }

    #[test]
    fn test_position_and_context_are_char_based() {
        let contract = "Общи условия. Договорът подлежи на автоматично подновяване всяка година.";
        let clauses = detector().detect(contract);
        assert_eq!(clauses.len(), 1);
        let expected = contract.find("автоматично").unwrap();
        assert_eq!(clauses[0].position, contract[..expected].chars().count());
        assert!(clauses[0].context.contains("автоматично подновяване"));
        assert_eq!(clauses[0].text, "Договорът подлежи на автоматично подновяване всяка година");
    }

    #[test]
    fn test_results_ordered_by_position() {
        let contract = "Предсрочното погасяване не се допуска. \
                        Кредиторът има право едностранно да промени таксите.";
        let clauses = detector().detect(contract);
        assert_eq!(clauses.len(), 2);
        assert!(clauses[0].position < clauses[1].position);
        assert_eq!(clauses[0].severity, Severity::Critical);
    }

    #[test]
    fn test_severity_calculation() {
        let clauses = vec![
            clause(Severity::Critical),
            clause(Severity::High),
            clause(Severity::Medium),
        ];
        let risk = detector().assess(&clauses);
        assert_eq!(risk.severity_counts.critical, 1);
        assert_eq!(risk.severity_counts.high, 1);
        assert_eq!(risk.severity_counts.medium, 1);
        assert_eq!(risk.risk_score, 17);
        assert_eq!(risk.overall_risk, Severity::High);
        assert_eq!(risk.total_clauses, 3);
    }

    #[test]
    fn test_severity_thresholds() {
        let d = detector();
        assert_eq!(d.assess(&[]).overall_risk, Severity::Low);
        assert_eq!(d.assess(&[clause(Severity::High)]).overall_risk, Severity::Medium);
        assert_eq!(
            d.assess(&[clause(Severity::Critical), clause(Severity::Critical)]).overall_risk,
            Severity::Critical
        );
    }

    #[test]
    fn test_generate_complaint() {
        let mut c = clause(Severity::High);
        c.clause_type = "Едностранно изменение".into();
        c.text = "Кредиторът може да променя лихвата.".into();
        c.legal_basis = "чл. 143 ЗЗП".into();
        c.explanation = "Недопустимо".into();

        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let complaint = detector().complaint(&[c], "ТестБанка АД", date);
        assert!(complaint.contains("КОМИСИЯТА ЗА ЗАЩИТА НА ПОТРЕБИТЕЛИТЕ"));
        assert!(complaint.contains("срещу: ТестБанка АД"));
        assert!(complaint.contains("1. Едностранно изменение"));
        assert!(complaint.contains("Дата: 07.03.2025"));
    }

    #[test]
    fn test_minimal_clause_deserializes() {
        let c: DetectedClause = serde_json::from_str(
            r#"{"type":"Едностранно изменение","text":"x","legal_basis":"чл. 143 ЗЗП"}"#,
        )
        .unwrap();
        assert_eq!(c.severity, Severity::Low);
        assert_eq!(c.position, 0);
    }
}
