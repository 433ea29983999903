use std::sync::Arc;

use crate::catalog::{PredicateDescriptor, PropertyDescriptor};

/// Comparison semantics of a predicate leaf. The word operators mean
/// "contains a whole word equal to / starting with the value"; the rest are
/// plain scalar comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    WordEqual,
    WordStartsWith,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::NotEqual => "!=",
            Comparison::LessThan => "<",
            Comparison::LessThanOrEqual => "<=",
            Comparison::GreaterThan => ">",
            Comparison::GreaterThanOrEqual => ">=",
            Comparison::WordEqual => ":",
            Comparison::WordStartsWith => ":*",
        }
    }

    pub fn is_word(self) -> bool {
        matches!(self, Comparison::WordEqual | Comparison::WordStartsWith)
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            Comparison::LessThan
                | Comparison::LessThanOrEqual
                | Comparison::GreaterThan
                | Comparison::GreaterThanOrEqual
        )
    }
}

/// A parsed query. Every leaf name has already been resolved through the
/// token catalog; parentheses, raw operator tokens, and the `resourcetype`
/// token never survive into this tree.
#[derive(Debug, Clone)]
pub enum AstNode {
    And(Box<AstNode>, Box<AstNode>),
    Or(Box<AstNode>, Box<AstNode>),
    Not(Box<AstNode>),
    /// Scalar-property comparison on the resource itself.
    Predicate {
        property: Arc<PropertyDescriptor>,
        operator: Comparison,
        value: String,
    },
    /// Relationship traversal: resources reaching the nested subtree's
    /// matches through a named predicate.
    Traversal {
        predicate: Arc<PredicateDescriptor>,
        nested: Box<AstNode>,
    },
    /// Wildcard over every resource of the effective type.
    AllResources,
}

impl AstNode {
    /// True when the tree contains no predicate or traversal leaves, i.e.
    /// the query matched nothing but structural tokens.
    pub fn is_all(&self) -> bool {
        matches!(self, AstNode::AllResources)
    }
}
