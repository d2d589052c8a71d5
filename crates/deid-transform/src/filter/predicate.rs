//! Typed row predicates and their translation to polars expressions.

use std::collections::BTreeSet;
use std::fmt;

use polars::prelude::{Expr, col, lit};

use crate::error::FilterError;

use super::parser;

/// A literal value in a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Literal {
    fn to_expr(&self) -> Expr {
        match self {
            Self::Int(value) => lit(*value),
            Self::Float(value) => lit(*value),
            Self::Str(value) => lit(value.clone()),
            Self::Bool(value) => lit(*value),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "'{value}'"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(String),
    Literal(Literal),
}

impl Operand {
    fn to_expr(&self) -> Expr {
        match self {
            Self::Column(name) => col(name.as_str()),
            Self::Literal(value) => value.to_expr(),
        }
    }

    fn collect_column<'a>(&'a self, columns: &mut BTreeSet<&'a str>) {
        if let Self::Column(name) = self {
            columns.insert(name.as_str());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// A parsed filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    IsNull {
        operand: Operand,
        negated: bool,
    },
    InList {
        operand: Operand,
        values: Vec<Literal>,
        negated: bool,
    },
}

impl Predicate {
    /// Parse a condition such as `age > 30 and department in ['A', 'B']`.
    pub fn parse(condition: &str) -> Result<Self, FilterError> {
        parser::parse(condition)
    }

    /// Column names the predicate reads.
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut columns = BTreeSet::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns<'a>(&'a self, columns: &mut BTreeSet<&'a str>) {
        match self {
            Self::And(left, right) | Self::Or(left, right) => {
                left.collect_columns(columns);
                right.collect_columns(columns);
            }
            Self::Not(inner) => inner.collect_columns(columns),
            Self::Compare { left, right, .. } => {
                left.collect_column(columns);
                right.collect_column(columns);
            }
            Self::IsNull { operand, .. } | Self::InList { operand, .. } => {
                operand.collect_column(columns);
            }
        }
    }

    /// Translate into a polars boolean expression.
    pub fn to_expr(&self) -> Expr {
        match self {
            Self::And(left, right) => left.to_expr().and(right.to_expr()),
            Self::Or(left, right) => left.to_expr().or(right.to_expr()),
            Self::Not(inner) => inner.to_expr().not(),
            Self::Compare { left, op, right } => {
                let (left, right) = (left.to_expr(), right.to_expr());
                match op {
                    CompareOp::Eq => left.eq(right),
                    CompareOp::NotEq => left.neq(right),
                    CompareOp::Lt => left.lt(right),
                    CompareOp::LtEq => left.lt_eq(right),
                    CompareOp::Gt => left.gt(right),
                    CompareOp::GtEq => left.gt_eq(right),
                }
            }
            Self::IsNull { operand, negated } => {
                let expr = operand.to_expr();
                if *negated {
                    expr.is_not_null()
                } else {
                    expr.is_null()
                }
            }
            Self::InList {
                operand,
                values,
                negated,
            } => {
                let target = operand.to_expr();
                let any = values
                    .iter()
                    .map(|value| target.clone().eq(value.to_expr()))
                    .reduce(|acc, next| acc.or(next))
                    .unwrap_or_else(|| lit(false));
                if *negated { any.not() } else { any }
            }
        }
    }
}
