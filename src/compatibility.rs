//! Schema compatibility checking
//!
//! Decides whether a candidate definition may follow a topic's history under a
//! [`CompatibilityStrategy`]. The checker is pure: it never touches registry
//! state and the same inputs always produce the same violations.
//!
//! ## Rule table
//!
//! | Change                                   | BACKWARD       | FORWARD        |
//! |------------------------------------------|----------------|----------------|
//! | optional field added                     | ok             | ok             |
//! | required field added                     | rejected       | rejected       |
//! | optional field removed                   | ok             | ok             |
//! | required field removed                   | rejected       | rejected       |
//! | int→long / float→double (old→new)        | ok             | rejected       |
//! | long→int / double→float (old→new)        | rejected       | ok             |
//! | nullable → non-nullable                  | rejected       | ok             |
//! | non-nullable → nullable                  | ok             | rejected       |
//! | enum symbol removed                      | rejected       | ok             |
//! | enum symbol added                        | ok             | rejected       |
//!
//! A field is *optional* when it is nullable or has a default. FULL applies
//! both columns; the transitive strategies apply them against every prior
//! version instead of only the latest.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::schema::{Field, FieldType, SchemaDefinition};

/// Policy governing which schema changes a topic accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityStrategy {
    /// Every candidate is accepted
    None,
    /// New schema can read data written with the latest version
    Backward,
    /// Latest version can read data written with the new schema
    Forward,
    /// Both backward and forward against the latest version
    Full,
    /// Backward against every prior version
    BackwardTransitive,
    /// Forward against every prior version
    ForwardTransitive,
    /// Full against every prior version
    FullTransitive,
}

impl CompatibilityStrategy {
    pub const ALL: [CompatibilityStrategy; 7] = [
        CompatibilityStrategy::None,
        CompatibilityStrategy::Backward,
        CompatibilityStrategy::Forward,
        CompatibilityStrategy::Full,
        CompatibilityStrategy::BackwardTransitive,
        CompatibilityStrategy::ForwardTransitive,
        CompatibilityStrategy::FullTransitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompatibilityStrategy::None => "NONE",
            CompatibilityStrategy::Backward => "BACKWARD",
            CompatibilityStrategy::Forward => "FORWARD",
            CompatibilityStrategy::Full => "FULL",
            CompatibilityStrategy::BackwardTransitive => "BACKWARD_TRANSITIVE",
            CompatibilityStrategy::ForwardTransitive => "FORWARD_TRANSITIVE",
            CompatibilityStrategy::FullTransitive => "FULL_TRANSITIVE",
        }
    }

    /// Whether every prior version is a reference, not only the latest
    pub fn is_transitive(&self) -> bool {
        matches!(
            self,
            CompatibilityStrategy::BackwardTransitive
                | CompatibilityStrategy::ForwardTransitive
                | CompatibilityStrategy::FullTransitive
        )
    }

    /// Whether the backward rules apply
    pub fn checks_backward(&self) -> bool {
        matches!(
            self,
            CompatibilityStrategy::Backward
                | CompatibilityStrategy::Full
                | CompatibilityStrategy::BackwardTransitive
                | CompatibilityStrategy::FullTransitive
        )
    }

    /// Whether the forward rules apply
    pub fn checks_forward(&self) -> bool {
        matches!(
            self,
            CompatibilityStrategy::Forward
                | CompatibilityStrategy::Full
                | CompatibilityStrategy::ForwardTransitive
                | CompatibilityStrategy::FullTransitive
        )
    }
}

impl Default for CompatibilityStrategy {
    fn default() -> Self {
        CompatibilityStrategy::Full
    }
}

impl fmt::Display for CompatibilityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompatibilityStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| format!("unknown compatibility strategy '{}'", s))
    }
}

/// Which reading direction a violation breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Candidate reading data written with the reference
    Backward,
    /// Reference reading data written with the candidate
    Forward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Backward => f.write_str("backward"),
            Direction::Forward => f.write_str("forward"),
        }
    }
}

/// Nature of a rule violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ViolationKind {
    /// A reference field without default is missing from the candidate
    RemovedRequiredField,
    /// A candidate field absent from the reference has neither default nor nullability
    AddedRequiredField,
    /// An existing field changed type (or nullability) in a way readers cannot follow
    TypeMismatch { reference: String, candidate: String },
}

impl ViolationKind {
    /// Stable short code
    pub fn code(&self) -> &'static str {
        match self {
            ViolationKind::RemovedRequiredField => "removed-required-field",
            ViolationKind::AddedRequiredField => "added-required-field-without-default",
            ViolationKind::TypeMismatch { .. } => "type-mismatch",
        }
    }
}

/// A single rule violation found against one reference version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Dotted path of the offending field (e.g. "address.zip", "tags[]")
    pub field: String,
    /// What went wrong
    #[serde(flatten)]
    pub kind: ViolationKind,
    /// Reading direction that breaks
    pub direction: Direction,
    /// History version the candidate was compared against
    pub against_version: u64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' against v{} ({})",
            self.kind.code(),
            self.field,
            self.against_version,
            self.direction
        )?;
        if let ViolationKind::TypeMismatch { reference, candidate } = &self.kind {
            write!(f, ": {} -> {}", reference, candidate)?;
        }
        Ok(())
    }
}

/// Result of a compatibility check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// Strategy the candidate was checked under
    pub strategy: CompatibilityStrategy,
    /// Versions the candidate was compared against, newest first
    pub checked_against: Vec<u64>,
    /// Every violation found
    pub violations: Vec<Violation>,
}

impl CompatibilityResult {
    /// Whether no rule was violated
    pub fn is_compatible(&self) -> bool {
        self.violations.is_empty()
    }

    /// Names of the offending fields, deduplicated, in discovery order
    pub fn offending_fields(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.violations
            .iter()
            .map(|v| v.field.as_str())
            .filter(|f| seen.insert(*f))
            .collect()
    }
}

/// Compatibility checker for schema definitions
#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibilityChecker;

impl CompatibilityChecker {
    /// Create a new compatibility checker
    pub fn new() -> Self {
        Self
    }

    /// Check `candidate` against `history` (oldest first, index == version)
    pub fn check<S: AsRef<SchemaDefinition>>(
        &self,
        candidate: &SchemaDefinition,
        history: &[S],
        strategy: CompatibilityStrategy,
    ) -> CompatibilityResult {
        let mut result = CompatibilityResult {
            strategy,
            checked_against: Vec::new(),
            violations: Vec::new(),
        };

        if strategy == CompatibilityStrategy::None || history.is_empty() {
            return result;
        }

        let references: Vec<(u64, &SchemaDefinition)> = if strategy.is_transitive() {
            history
                .iter()
                .enumerate()
                .rev()
                .map(|(i, s)| (i as u64, s.as_ref()))
                .collect()
        } else {
            let last = history.len() - 1;
            vec![(last as u64, history[last].as_ref())]
        };

        let violations = &mut result.violations;
        for (version, reference) in references {
            result.checked_against.push(version);
            if strategy.checks_backward() {
                self.check_pair(candidate, reference, Direction::Backward, version, violations);
            }
            if strategy.checks_forward() {
                self.check_pair(candidate, reference, Direction::Forward, version, violations);
            }
        }

        result
    }

    /// Compare a candidate with one reference in one direction
    pub fn check_pair(
        &self,
        candidate: &SchemaDefinition,
        reference: &SchemaDefinition,
        direction: Direction,
        against_version: u64,
        violations: &mut Vec<Violation>,
    ) {
        let mut pair = PairCheck {
            direction,
            against_version,
            violations,
        };
        pair.compare_fields(&candidate.fields, &reference.fields, "");
    }
}

/// Decide whether `candidate` is acceptable after `history` under `strategy`
pub fn is_compatible<S: AsRef<SchemaDefinition>>(
    candidate: &SchemaDefinition,
    history: &[S],
    strategy: CompatibilityStrategy,
) -> bool {
    CompatibilityChecker::new()
        .check(candidate, history, strategy)
        .is_compatible()
}

struct PairCheck<'a> {
    direction: Direction,
    against_version: u64,
    violations: &'a mut Vec<Violation>,
}

impl PairCheck<'_> {
    fn push(&mut self, field: String, kind: ViolationKind) {
        self.violations.push(Violation {
            field,
            kind,
            direction: self.direction,
            against_version: self.against_version,
        });
    }

    fn compare_fields(&mut self, candidate: &[Field], reference: &[Field], prefix: &str) {
        // Removed fields
        for old in reference {
            let path = join(prefix, &old.name);
            match candidate.iter().find(|f| f.name == old.name) {
                Some(new) => self.compare_field(new, old, &path),
                None if !old.is_optional() => {
                    self.push(path, ViolationKind::RemovedRequiredField);
                }
                None => {}
            }
        }

        // Added fields
        for new in candidate {
            if !new.is_optional() && !reference.iter().any(|f| f.name == new.name) {
                self.push(join(prefix, &new.name), ViolationKind::AddedRequiredField);
            }
        }
    }

    fn compare_field(&mut self, candidate: &Field, reference: &Field, path: &str) {
        let narrowed = match self.direction {
            Direction::Backward => reference.nullable && !candidate.nullable,
            Direction::Forward => candidate.nullable && !reference.nullable,
        };
        if narrowed {
            self.push(
                path.to_string(),
                ViolationKind::TypeMismatch {
                    reference: reference.type_label(),
                    candidate: candidate.type_label(),
                },
            );
        }
        self.compare_type(&candidate.field_type, &reference.field_type, path);
    }

    fn compare_type(&mut self, candidate: &FieldType, reference: &FieldType, path: &str) {
        match (candidate, reference) {
            (FieldType::Record { fields: c }, FieldType::Record { fields: r }) => {
                self.compare_fields(c, r, path);
            }
            (FieldType::Array { items: c }, FieldType::Array { items: r }) => {
                self.compare_type(c, r, &format!("{}[]", path));
            }
            (FieldType::Map { values: c }, FieldType::Map { values: r }) => {
                self.compare_type(c, r, &format!("{}{{}}", path));
            }
            (FieldType::Enum { symbols: c }, FieldType::Enum { symbols: r }) => {
                // Every symbol the writer may produce must be known to the reader
                let (written, readable) = match self.direction {
                    Direction::Backward => (r, c),
                    Direction::Forward => (c, r),
                };
                if written.iter().any(|s| !readable.contains(s)) {
                    self.mismatch(candidate, reference, path);
                }
            }
            (c, r) if c.is_primitive() && r.is_primitive() => {
                let promotes = match self.direction {
                    Direction::Backward => r.tag().promotes_to(c.tag()),
                    Direction::Forward => c.tag().promotes_to(r.tag()),
                };
                if !promotes {
                    self.mismatch(candidate, reference, path);
                }
            }
            _ => self.mismatch(candidate, reference, path),
        }
    }

    fn mismatch(&mut self, candidate: &FieldType, reference: &FieldType, path: &str) {
        self.push(
            path.to_string(),
            ViolationKind::TypeMismatch {
                reference: reference.to_string(),
                candidate: candidate.to_string(),
            },
        );
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
