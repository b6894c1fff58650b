//! Non-fatal diagnostics.
//!
//! Warnings never change generated output. Each one is recorded for the caller
//! and forwarded to `tracing` at the moment it is raised.

use std::fmt;

use crate::{color, lexer::Position};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// An extension attribute name the entity kind's schema does not know.
    UnknownAttribute { entity: &'static str, name: String },
    /// A simple type that is neither a known scalar nor a project type.
    UnknownType { name: String },
    /// Definitions left over after batch extraction, emitted alphabetically.
    CycleDetected { names: Vec<String> },
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::UnknownAttribute { entity, name } => {
                write!(f, "unknown {entity} attribute '{name}'")
            }
            WarningKind::UnknownType { name } => write!(f, "unknown type: {name}"),
            WarningKind::CycleDetected { names } => {
                write!(f, "dependency cycle between {}", names.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub position: Option<Position>,
    pub kind: WarningKind,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}warning{}: {}", color::YELLOW, color::END, self.kind)?;
        if let Some(position) = &self.position {
            write!(f, " at position {position}")?;
        }
        Ok(())
    }
}

/// Accumulates warnings raised during one compilation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning. Identical warnings raised again, for instance by a
    /// second backend resolving the same attributes, are dropped.
    pub fn warn(&mut self, position: Option<Position>, kind: WarningKind) {
        let warning = Warning { position, kind };
        if self.warnings.contains(&warning) {
            return;
        }
        let Warning { position, kind } = &warning;
        match position {
            Some(position) => tracing::warn!(%position, "{kind}"),
            None => tracing::warn!("{kind}"),
        }
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Appends the warnings of another run, keeping their order.
    pub fn extend(&mut self, other: Diagnostics) {
        for warning in other.warnings {
            if !self.warnings.contains(&warning) {
                self.warnings.push(warning);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_accumulate_in_order() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warn(
            Some(Position::new(2, 4)),
            WarningKind::UnknownAttribute {
                entity: "interface",
                name: "frobnicate".to_string(),
            },
        );
        diagnostics.warn(
            None,
            WarningKind::CycleDetected {
                names: vec!["A".to_string(), "B".to_string()],
            },
        );

        assert_eq!(diagnostics.warnings().len(), 2);
        let first = diagnostics.warnings()[0].to_string();
        assert!(first.contains("unknown interface attribute 'frobnicate'"));
        assert!(first.ends_with("at position 3:5"));
        assert_eq!(
            diagnostics.warnings()[1].kind.to_string(),
            "dependency cycle between A, B"
        );
    }

    #[test]
    fn test_identical_warnings_are_recorded_once() {
        let mut diagnostics = Diagnostics::new();
        let kind = WarningKind::UnknownType {
            name: "mystery".to_string(),
        };
        diagnostics.warn(Some(Position::new(0, 0)), kind.clone());
        diagnostics.warn(Some(Position::new(0, 0)), kind.clone());
        diagnostics.warn(Some(Position::new(1, 0)), kind);
        assert_eq!(diagnostics.warnings().len(), 2);
    }
}
