// SPDX-License-Identifier: BSD-3-Clause
//! Typed relation records produced by heap traversal. Each fact is one row of
//! a relation destined for the downstream analysis's fact database; facts are
//! immutable, structurally comparable, and safe to deduplicate in a set.

use std::fmt::Display;

/// Abstraction identifier standing in for a null or absent heap value.
pub const NULL_PSEUDO_HEAP: &str = "<<null-pseudo-heap>>";

/// Identifier for the single, global calling-context row written once per run.
pub const IMMUTABLE_CONTEXT: &str = "<<immutable-context>>";

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum DynamicFact {
    InstanceFieldPointsTo {
        base: String,
        field: String,
        class: String,
        target: String,
    },
    ArrayIndexPointsTo {
        base: String,
        target: String,
    },
    StaticFieldPointsTo {
        field: String,
        class: String,
        target: String,
    },
    CallingContext {
        context: String,
    },
}

impl DynamicFact {
    /// The relation this fact belongs to, which is also the basename of the
    /// file it is written to.
    pub fn relation(&self) -> &'static str {
        match self {
            DynamicFact::InstanceFieldPointsTo { .. } => "DynamicInstanceFieldPointsTo",
            DynamicFact::ArrayIndexPointsTo { .. } => "DynamicArrayIndexPointsTo",
            DynamicFact::StaticFieldPointsTo { .. } => "DynamicStaticFieldPointsTo",
            DynamicFact::CallingContext { .. } => "DynamicCallingContext",
        }
    }

    pub fn columns(&self) -> Vec<&str> {
        match self {
            DynamicFact::InstanceFieldPointsTo {
                base,
                field,
                class,
                target,
            } => vec![base, field, class, target],
            DynamicFact::ArrayIndexPointsTo { base, target } => vec![base, target],
            DynamicFact::StaticFieldPointsTo {
                field,
                class,
                target,
            } => vec![field, class, target],
            DynamicFact::CallingContext { context } => vec![context],
        }
    }
}

/// Renders the tab-separated row exactly as it appears in the fact file.
impl Display for DynamicFact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.columns().join("\t"))
    }
}

#[cfg(test)]
mod tests {
    use super::DynamicFact;

    #[test]
    fn structural_equality() {
        let a = DynamicFact::ArrayIndexPointsTo {
            base: "X".to_string(),
            target: "Y".to_string(),
        };
        let b = DynamicFact::ArrayIndexPointsTo {
            base: "X".to_string(),
            target: "Y".to_string(),
        };
        assert_eq!(a, b);
        let set = std::collections::HashSet::from([a, b]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn row_rendering() {
        let f = DynamicFact::InstanceFieldPointsTo {
            base: "A".to_string(),
            field: "f".to_string(),
            class: "Foo".to_string(),
            target: "B".to_string(),
        };
        assert_eq!(f.relation(), "DynamicInstanceFieldPointsTo");
        assert_eq!(format!("{}", f), "A\tf\tFoo\tB");
    }
}
