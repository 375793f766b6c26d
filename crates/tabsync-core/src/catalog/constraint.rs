//! Live constraint metadata.

use serde::{Deserialize, Serialize};

/// A constraint as reported by the catalog: its name and definition fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveConstraint {
    /// Constraint name.
    pub name: String,
    /// Definition text, e.g. `FOREIGN KEY (invoice) REFERENCES sales.invoice(id)`.
    pub fragment: String,
}

impl LiveConstraint {
    /// Create a live constraint.
    pub fn new(name: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fragment: fragment.into(),
        }
    }

    /// The table this constraint references, when the fragment names one.
    pub fn referenced_table(&self) -> Option<String> {
        let lowered = self.fragment.to_lowercase();
        let mut tokens = lowered.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "references" {
                let target = tokens.next()?;
                let end = target.find('(').unwrap_or(target.len());
                return Some(target[..end].to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_table() {
        let fk = LiveConstraint::new(
            "fk_line_invoice",
            "FOREIGN KEY (invoice) REFERENCES sales.invoice(id) ON DELETE CASCADE",
        );
        assert_eq!(fk.referenced_table().as_deref(), Some("sales.invoice"));

        let spaced = LiveConstraint::new("fk", "FOREIGN KEY (a) REFERENCES Core.Party (id)");
        assert_eq!(spaced.referenced_table().as_deref(), Some("core.party"));

        let check = LiveConstraint::new("ck", "CHECK (amount > 0)");
        assert!(check.referenced_table().is_none());
    }
}
