use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use crate::models::Term;

/// The term being shown and the one it is compared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermSelection {
    pub current: Term,
    pub previous: Option<Term>,
}

/// Terms available to the student after exclusion, ascending by term code.
/// Backend ordering is never trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermTimeline {
    terms: Vec<Term>,
}

impl TermTimeline {
    pub fn new(raw: Vec<Term>, excluded_term_codes: &[String]) -> Self {
        let excluded: HashSet<&str> = excluded_term_codes.iter().map(|c| c.trim()).collect();
        let mut seen = HashSet::new();
        let mut terms: Vec<Term> = raw
            .into_iter()
            .map(|mut t| {
                t.term_code = t.term_code.trim().to_string();
                t
            })
            .filter(|t| !t.term_code.is_empty())
            .filter(|t| !excluded.contains(t.term_code.as_str()))
            .filter(|t| seen.insert(t.term_code.clone()))
            .collect();

        terms.sort_by(|a, b| compare_term_codes(&a.term_code, &b.term_code));
        Self { terms }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn latest(&self) -> Option<TermSelection> {
        let last = self.terms.len().checked_sub(1)?;
        Some(self.selection_at(last))
    }

    /// Selects a term by code; `previous` is its neighbour in this timeline.
    pub fn select(&self, term_code: &str) -> Option<TermSelection> {
        let index = self
            .terms
            .iter()
            .position(|t| t.term_code == term_code.trim())?;
        Some(self.selection_at(index))
    }

    fn selection_at(&self, index: usize) -> TermSelection {
        TermSelection {
            current: self.terms[index].clone(),
            previous: index.checked_sub(1).map(|i| self.terms[i].clone()),
        }
    }
}

pub fn resolve(raw: Vec<Term>, excluded_term_codes: &[String]) -> Option<TermSelection> {
    TermTimeline::new(raw, excluded_term_codes).latest()
}

/// All-digit codes order numerically and sort before any other code, which
/// compares as a plain string. Leading zeros do not change the numeric value.
pub fn compare_term_codes(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.trim(), b.trim());
    match (is_digits(a), is_digits(b)) {
        (true, true) => {
            let (x, y) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
            x.len()
                .cmp(&y.len())
                .then_with(|| x.cmp(y))
                .then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
