//! Symbolic cost models and the evolutionary search that fits them.
//!
//! An [`Expression`] predicts the duration of one call (milliseconds) from
//! the size vector that produced its input. [`ComplexityModel`] keeps the
//! observed `(duration, sizes)` samples of one benchmark together with a
//! population of candidate expressions and advances the search by one
//! generation per sample.

mod evolve;

pub use evolve::{
    crossover, fitness, generation, init, mutate, objective, ComplexityModel, EvolutionSettings,
    Fit, Sample,
};

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Depth bound for freshly generated subtrees.
pub const MAX_RANDOM_DEPTH: u32 = 3;

/// Immutable expression tree. `a` and `b` are the affine coefficients applied
/// after the node's own operation (`a·f(..) + b`); constants carry only their
/// value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Expression {
    Constant {
        #[serde(with = "crate::json_float")]
        value: f64,
    },
    Variable {
        index: usize,
        #[serde(with = "crate::json_float")]
        a: f64,
        #[serde(with = "crate::json_float")]
        b: f64,
    },
    Exp {
        child: Box<Expression>,
        #[serde(with = "crate::json_float")]
        a: f64,
        #[serde(with = "crate::json_float")]
        b: f64,
    },
    Log {
        child: Box<Expression>,
        #[serde(with = "crate::json_float")]
        a: f64,
        #[serde(with = "crate::json_float")]
        b: f64,
    },
    Add {
        #[serde(with = "crate::json_float")]
        a: f64,
        #[serde(with = "crate::json_float")]
        b: f64,
        children: Vec<Expression>,
    },
}

impl Expression {
    pub fn constant(value: f64) -> Self {
        Self::Constant { value }
    }

    pub fn variable(index: usize) -> Self {
        Self::Variable {
            index,
            a: 1.0,
            b: 0.0,
        }
    }

    pub fn exp(child: Expression) -> Self {
        Self::Exp {
            child: Box::new(child),
            a: 1.0,
            b: 0.0,
        }
    }

    pub fn log(child: Expression) -> Self {
        Self::Log {
            child: Box::new(child),
            a: 1.0,
            b: 0.0,
        }
    }

    pub fn add(children: Vec<Expression>) -> Self {
        Self::Add {
            a: 1.0,
            b: 0.0,
            children,
        }
    }

    pub fn eval(&self, sizes: &[u64]) -> f64 {
        match self {
            Self::Constant { value } => *value,
            Self::Variable { index, a, b } => {
                let x = sizes.get(*index).copied().unwrap_or(0) as f64;
                a * x + b
            }
            Self::Exp { child, a, b } => a * child.eval(sizes).exp() + b,
            Self::Log { child, a, b } => a * child.eval(sizes).ln() + b,
            Self::Add { a, b, children } => {
                a * children.iter().map(|c| c.eval(sizes)).sum::<f64>() + b
            }
        }
    }

    /// Structural regularizer: variables and sums weigh 2, other nodes 1.
    pub fn cost(&self) -> f64 {
        match self {
            Self::Constant { .. } => 1.0,
            Self::Variable { .. } => 2.0,
            Self::Exp { child, .. } | Self::Log { child, .. } => 1.0 + child.cost(),
            Self::Add { children, .. } => 2.0 + children.iter().map(Self::cost).sum::<f64>(),
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            Self::Constant { .. } | Self::Variable { .. } => 1,
            Self::Exp { child, .. } | Self::Log { child, .. } => 1 + child.node_count(),
            Self::Add { children, .. } => 1 + children.iter().map(Self::node_count).sum::<usize>(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Constant { .. } | Self::Variable { .. })
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant { .. })
    }

    /// `(a, b)`; a constant reports `(value, 0)`.
    pub fn coefficients(&self) -> (f64, f64) {
        match self {
            Self::Constant { value } => (*value, 0.0),
            Self::Variable { a, b, .. }
            | Self::Exp { a, b, .. }
            | Self::Log { a, b, .. }
            | Self::Add { a, b, .. } => (*a, *b),
        }
    }

    /// Copy with new coefficients; a constant takes `a` as its value.
    pub fn with_coefficients(&self, a: f64, b: f64) -> Self {
        match self {
            Self::Constant { .. } => Self::Constant { value: a },
            Self::Variable { index, .. } => Self::Variable { index: *index, a, b },
            Self::Exp { child, .. } => Self::Exp {
                child: child.clone(),
                a,
                b,
            },
            Self::Log { child, .. } => Self::Log {
                child: child.clone(),
                a,
                b,
            },
            Self::Add { children, .. } => Self::Add {
                a,
                b,
                children: children.clone(),
            },
        }
    }
}

/// Random tree over `size_count` dimensions, at most `max_depth` levels of
/// composite nodes deep.
pub fn random<R: Rng + ?Sized>(rng: &mut R, size_count: usize, max_depth: u32) -> Expression {
    if max_depth == 0 || rng.gen_bool(0.4) {
        return random_leaf(rng, size_count);
    }
    match rng.gen_range(0..3) {
        0 => Expression::Exp {
            child: Box::new(random(rng, size_count, max_depth - 1)),
            a: rng.gen(),
            b: rng.gen(),
        },
        1 => Expression::Log {
            child: Box::new(random(rng, size_count, max_depth - 1)),
            a: rng.gen(),
            b: rng.gen(),
        },
        _ => {
            let len = rng.gen_range(2..=3);
            Expression::Add {
                a: rng.gen(),
                b: rng.gen(),
                children: (0..len)
                    .map(|_| random(rng, size_count, max_depth - 1))
                    .collect(),
            }
        }
    }
}

fn random_leaf<R: Rng + ?Sized>(rng: &mut R, size_count: usize) -> Expression {
    if size_count == 0 || rng.gen_bool(0.3) {
        Expression::constant(rng.gen())
    } else {
        Expression::Variable {
            index: rng.gen_range(0..size_count),
            a: rng.gen(),
            b: rng.gen(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { value } => write!(f, "{value:.3}"),
            Self::Variable { index, a, b } => write!(f, "{a:.3}*x{index}{b:+.3}"),
            Self::Exp { child, a, b } => write!(f, "{a:.3}*exp({child}){b:+.3}"),
            Self::Log { child, a, b } => write!(f, "{a:.3}*log({child}){b:+.3}"),
            Self::Add { a, b, children } => {
                write!(f, "{a:.3}*(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, "){b:+.3}")
            }
        }
    }
}
