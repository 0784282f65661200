//! Fatal precondition errors.
//!
//! Everything in this module describes a programming or setup mistake: a missing or wrongly
//! sized input field, an inverted element, a solve without cached coefficients. These are
//! reported through [`eyre::Report`], so callers can add context with `wrap_err` and still
//! recover the typed error with `downcast_ref::<InputError>()`.
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum InputError {
    /// A required physical input field was not supplied.
    MissingField(&'static str),
    /// A field does not have one value per grid node.
    SizeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The element with lower-left node `(i, j)` has a non-positive or non-finite Jacobian
    /// determinant.
    DegenerateElement { i: usize, j: usize },
    /// `solve` was called without valid cached coefficients.
    NotPrepared,
    InvalidConfig(String),
    InvalidGrid(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "required input field `{}` is missing", field),
            Self::SizeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "input field `{}` has {} values, expected one per node ({})",
                field, actual, expected
            ),
            Self::DegenerateElement { i, j } => {
                write!(f, "element ({}, {}) has degenerate or inverted geometry", i, j)
            }
            Self::NotPrepared => write!(f, "coefficients are not cached, call prepare() before solve()"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::InvalidGrid(msg) => write!(f, "invalid grid: {}", msg),
        }
    }
}

impl Error for InputError {}
