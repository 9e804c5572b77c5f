//! Routing of log lines into named categories.
//!
//! Categories are declared in order as `(label, regex)` pairs. A line goes
//! to the first category whose pattern is found anywhere in it; later
//! categories never see a line an earlier one claimed. With no categories
//! declared every line lands in the single implicit [`ALL_LINES`] category.
//!
//! Declaration order is also the order categories are reported and charted
//! in, which keeps line colors stable between runs.

use regex::Regex;

use crate::error::ClassifyError;

/// Label of the implicit category used when no patterns are declared.
pub const ALL_LINES: &str = "values";

/// Ordered first-match classifier.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    categories: Vec<(String, Regex)>,
}

impl LineClassifier {
    /// A classifier that puts every line into [`ALL_LINES`].
    pub fn all_lines() -> Self {
        Self {
            categories: Vec::new(),
        }
    }

    /// Compiles `patterns` into categories labelled by the pattern text.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidPattern`] for a pattern that does not
    /// compile. A repeated pattern is declared once.
    pub fn new<I, S>(patterns: I) -> Result<Self, ClassifyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::labelled(patterns.into_iter().map(|p| {
            let p = p.as_ref().to_string();
            (p.clone(), p)
        }))
    }

    /// Compiles `(label, pattern)` pairs into categories.
    ///
    /// A pair that repeats an earlier one exactly is ignored; it could never
    /// match a line the first one did not claim.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidPattern`] for a pattern that does not
    /// compile, or [`ClassifyError::DuplicateLabel`] if a label is reused for
    /// a different pattern.
    pub fn labelled<I, L, P>(pairs: I) -> Result<Self, ClassifyError>
    where
        I: IntoIterator<Item = (L, P)>,
        L: Into<String>,
        P: AsRef<str>,
    {
        let mut categories: Vec<(String, Regex)> = Vec::new();
        for (label, pattern) in pairs {
            let label = label.into();
            let pattern = pattern.as_ref();
            if let Some((_, existing)) = categories.iter().find(|(existing, _)| *existing == label) {
                if existing.as_str() == pattern {
                    tracing::debug!(category = %label, "ignoring repeated category");
                    continue;
                }
                return Err(ClassifyError::DuplicateLabel { label });
            }
            let regex = Regex::new(pattern).map_err(|source| ClassifyError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
            categories.push((label, regex));
        }
        Ok(Self { categories })
    }

    /// Returns true if no patterns were declared.
    pub fn is_all_lines(&self) -> bool {
        self.categories.is_empty()
    }

    /// Category labels in declaration order.
    pub fn labels(&self) -> Vec<&str> {
        if self.is_all_lines() {
            return vec![ALL_LINES];
        }
        self.categories.iter().map(|(label, _)| label.as_str()).collect()
    }

    /// Returns the label of the first category matching `line`.
    pub fn classify(&self, line: &str) -> Option<&str> {
        if self.is_all_lines() {
            return Some(ALL_LINES);
        }
        self.categories
            .iter()
            .find(|(_, regex)| regex.is_match(line))
            .map(|(label, _)| label.as_str())
    }

    /// Returns the declaration index of the first category matching `line`.
    pub fn classify_index(&self, line: &str) -> Option<usize> {
        if self.is_all_lines() {
            return Some(0);
        }
        self.categories.iter().position(|(_, regex)| regex.is_match(line))
    }
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::all_lines()
    }
}
