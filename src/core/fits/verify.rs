//! Standard-conformance checks for a single HDU, with optional repair.

use crate::domain::header::{Card, HeaderValue};
use crate::domain::model::{HduKind, ImageHdu};
use crate::utils::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyOption {
    /// Fail on any problem.
    #[default]
    Exception,
    Ignore,
    /// Log problems, change nothing.
    Warn,
    /// Repair what can be repaired, logging each repair; fail otherwise.
    Fix,
    /// As `Fix`, without the log noise.
    SilentFix,
}

#[derive(Debug, Clone, PartialEq)]
enum Issue {
    LowercaseKeyword { index: usize },
    IllegalKeyword { index: usize },
    NonPrintableValue { index: usize },
    MissingMarker { keyword: &'static str, value: HeaderValue },
    WrongStructural { keyword: String, expected: i64 },
    MissingStructural { keyword: &'static str, expected: i64 },
}

impl Issue {
    fn is_fixable(&self) -> bool {
        !matches!(self, Issue::IllegalKeyword { .. })
    }

    fn describe(&self, hdu: &ImageHdu) -> String {
        let keyword = |index: &usize| hdu.header.cards()[*index].keyword.clone();
        match self {
            Issue::LowercaseKeyword { index } => {
                format!("keyword '{}' is not upper case", keyword(index))
            }
            Issue::IllegalKeyword { index } => {
                format!("keyword '{}' is not a legal FITS keyword", keyword(index))
            }
            Issue::NonPrintableValue { index } => {
                format!("value of '{}' contains non-printable characters", keyword(index))
            }
            Issue::MissingMarker { keyword, .. } => format!("mandatory '{}' card is missing", keyword),
            Issue::WrongStructural { keyword, expected } => {
                format!("'{}' should be {} to match the data", keyword, expected)
            }
            Issue::MissingStructural { keyword, expected } => {
                format!("mandatory '{}' card is missing (expected {})", keyword, expected)
            }
        }
    }

    fn apply(self, hdu: &mut ImageHdu) {
        match self {
            Issue::LowercaseKeyword { index } => {
                let card = &mut hdu.header.cards_mut()[index];
                card.keyword = card.keyword.to_ascii_uppercase();
            }
            Issue::NonPrintableValue { index } => {
                if let Some(HeaderValue::String(s)) = &mut hdu.header.cards_mut()[index].value {
                    s.retain(is_printable);
                }
            }
            Issue::MissingMarker { keyword, value } => {
                hdu.header.insert(0, Card::new(keyword, value));
            }
            Issue::WrongStructural { keyword, expected } => hdu.header.set(&keyword, expected),
            Issue::MissingStructural { keyword, expected } => hdu.header.set(keyword, expected),
            Issue::IllegalKeyword { .. } => {}
        }
    }
}

fn is_printable(c: char) -> bool {
    (' '..='~').contains(&c)
}

fn is_legal_keyword(keyword: &str) -> bool {
    keyword.len() <= 8
        && keyword
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn card_issues(hdu: &ImageHdu) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (index, card) in hdu.header.cards().iter().enumerate() {
        let upper = card.keyword.to_ascii_uppercase();
        if !is_legal_keyword(&upper) {
            issues.push(Issue::IllegalKeyword { index });
            continue;
        }
        if upper != card.keyword {
            issues.push(Issue::LowercaseKeyword { index });
        }
        if let Some(HeaderValue::String(s)) = &card.value {
            if !s.chars().all(is_printable) {
                issues.push(Issue::NonPrintableValue { index });
            }
        }
    }
    issues
}

fn structural_issues(hdu: &ImageHdu) -> Vec<Issue> {
    let mut issues = Vec::new();
    let header = &hdu.header;

    match hdu.kind {
        HduKind::Primary if !header.contains("SIMPLE") => issues.push(Issue::MissingMarker {
            keyword: "SIMPLE",
            value: HeaderValue::Logical(true),
        }),
        HduKind::Image if !header.contains("XTENSION") => issues.push(Issue::MissingMarker {
            keyword: "XTENSION",
            value: HeaderValue::String("IMAGE".to_string()),
        }),
        HduKind::Other(_) => return issues,
        _ => {}
    }

    let mut expect = |keyword: String, expected: i64| {
        if header.get_i64(&keyword) != Some(expected) {
            issues.push(Issue::WrongStructural { keyword, expected });
        }
    };

    match &hdu.data {
        Some(data) => {
            expect("BITPIX".to_string(), data.bitpix());
            expect("NAXIS".to_string(), data.naxis() as i64);
            for (axis, &extent) in data.shape().iter().enumerate() {
                expect(format!("NAXIS{}", axis + 1), extent as i64);
            }
        }
        None => {
            if !header.contains("BITPIX") {
                expect("BITPIX".to_string(), 8);
            }
            let empty_axis = (1..=header.get_i64("NAXIS").unwrap_or(0).min(999))
                .any(|axis| header.get_i64(&format!("NAXIS{}", axis)) == Some(0));
            if !empty_axis {
                expect("NAXIS".to_string(), 0);
            }
        }
    }

    if hdu.kind == HduKind::Image {
        if !header.contains("PCOUNT") {
            issues.push(Issue::MissingStructural {
                keyword: "PCOUNT",
                expected: 0,
            });
        }
        if !header.contains("GCOUNT") {
            issues.push(Issue::MissingStructural {
                keyword: "GCOUNT",
                expected: 1,
            });
        }
    }
    issues
}

/// Report of a verification pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifyReport {
    pub fixed: Vec<String>,
    pub unfixed: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.fixed.is_empty() && self.unfixed.is_empty()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let all: Vec<&str> = self
            .fixed
            .iter()
            .chain(self.unfixed.iter())
            .map(String::as_str)
            .collect();
        write!(f, "{}", all.join("; "))
    }
}

impl ImageHdu {
    /// Checks the header against the data it describes. Repairing options
    /// edit the header in place; unrepairable problems are errors under
    /// every option except `Ignore` and `Warn`.
    pub fn verify(&mut self, option: VerifyOption) -> Result<VerifyReport> {
        let mut issues = card_issues(self);
        issues.extend(structural_issues(self));
        self.run_verify(issues, option)
    }

    /// Card-level checks only. Used before writing, where the structural
    /// cards are regenerated from the data.
    pub(crate) fn verify_cards(&mut self, option: VerifyOption) -> Result<VerifyReport> {
        let issues = card_issues(self);
        self.run_verify(issues, option)
    }

    fn run_verify(&mut self, issues: Vec<Issue>, option: VerifyOption) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        if option == VerifyOption::Ignore || issues.is_empty() {
            return Ok(report);
        }

        let (fixable, unfixable): (Vec<Issue>, Vec<Issue>) =
            issues.into_iter().partition(Issue::is_fixable);
        report.unfixed = unfixable.iter().map(|issue| issue.describe(self)).collect();

        match option {
            VerifyOption::Exception => {
                report
                    .unfixed
                    .extend(fixable.iter().map(|issue| issue.describe(self)));
                Err(DatasetError::codec(format!("verification failed: {}", report)))
            }
            VerifyOption::Warn => {
                for message in fixable.iter().map(|issue| issue.describe(self)) {
                    tracing::warn!("FITS verification: {}", message);
                    report.unfixed.push(message);
                }
                Ok(report)
            }
            VerifyOption::Fix | VerifyOption::SilentFix => {
                if !report.unfixed.is_empty() {
                    return Err(DatasetError::codec(format!(
                        "unfixable verification errors: {}",
                        report.unfixed.join("; ")
                    )));
                }
                // Descriptions use card positions, so describe before any
                // fix can insert a card.
                let messages: Vec<String> = fixable.iter().map(|issue| issue.describe(self)).collect();
                for (issue, message) in fixable.into_iter().zip(messages) {
                    if option == VerifyOption::Fix {
                        tracing::warn!("FITS verification fixed: {}", message);
                    } else {
                        tracing::debug!("FITS verification fixed: {}", message);
                    }
                    issue.apply(self);
                    report.fixed.push(message);
                }
                Ok(report)
            }
            VerifyOption::Ignore => Ok(report),
        }
    }
}
