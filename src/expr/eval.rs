//! Expression evaluator.
//!
//! A pure function of `(expression, environment)`. Arithmetic faults come
//! back as [`EvalError::NumericDomain`]; there is no other way to fail.

use super::ast::{BinaryOp, Expr, UnaryOp, Variable};
use super::error::EvalError;

/// Values bound to the expression variables for one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Env {
    pub x: f64,
    pub time: f64,
    pub frame: f64,
}

impl Env {
    pub fn new(x: f64, time: f64, frame: f64) -> Self {
        Self { x, time, frame }
    }

    fn get(&self, var: Variable) -> f64 {
        match var {
            Variable::X => self.x,
            Variable::Time => self.time,
            Variable::Frame => self.frame,
        }
    }
}

/// Evaluate an expression tree.
pub fn eval(expr: &Expr, env: &Env) -> Result<f64, EvalError> {
    let value = match expr {
        Expr::Const(c) => *c,
        Expr::Var(v) => env.get(*v),
        Expr::Unary(op, operand) => unary(*op, eval(operand, env)?)?,
        Expr::Binary(op, lhs, rhs) => binary(*op, eval(lhs, env)?, eval(rhs, env)?)?,
    };
    finite(value)
}

fn unary(op: UnaryOp, a: f64) -> Result<f64, EvalError> {
    Ok(match op {
        UnaryOp::Neg => -a,
        UnaryOp::Sin => a.sin(),
        UnaryOp::Cos => a.cos(),
        UnaryOp::Tan => a.tan(),
        UnaryOp::Abs => a.abs(),
        UnaryOp::Round => a.round_ties_even(),
        UnaryOp::Sqrt => {
            if a < 0.0 {
                return Err(EvalError::NumericDomain("square root of a negative number"));
            }
            a.sqrt()
        }
    })
}

fn binary(op: BinaryOp, a: f64, b: f64) -> Result<f64, EvalError> {
    Ok(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::NumericDomain("division by zero"));
            }
            a / b
        }
        BinaryOp::Pow => power(a, b)?,
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
    })
}

fn power(base: f64, exponent: f64) -> Result<f64, EvalError> {
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(EvalError::NumericDomain(
            "negative base raised to a fractional power",
        ));
    }
    if base == 0.0 && exponent < 0.0 {
        return Err(EvalError::NumericDomain("zero raised to a negative power"));
    }
    Ok(base.powf(exponent))
}

fn finite(value: f64) -> Result<f64, EvalError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NumericDomain("result is not a finite number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Compiler;
    use assert_approx_eq::assert_approx_eq;

    fn run(src: &str, x: f64) -> Result<f64, EvalError> {
        let compiled = Compiler::compile(src).unwrap();
        eval(compiled.root(), &Env::new(x, 2.0, 48.0))
    }

    #[test]
    fn eval_identity() {
        assert_approx_eq!(run("x", 0.25).unwrap(), 0.25);
    }

    #[test]
    fn eval_precedence() {
        assert_approx_eq!(run("1 + 2 * 3", 0.0).unwrap(), 7.0);
        assert_approx_eq!(run("-2 ** 2", 0.0).unwrap(), -4.0);
        assert_approx_eq!(run("2 ** -1", 0.0).unwrap(), 0.5);
        assert_approx_eq!(run("2 ** 3 ** 2", 0.0).unwrap(), 512.0);
        assert_approx_eq!(run("8 / 4 / 2", 0.0).unwrap(), 1.0);
    }

    #[test]
    fn eval_clock_variables() {
        assert_approx_eq!(run("time", 0.0).unwrap(), 2.0);
        assert_approx_eq!(run("frame / 24", 0.0).unwrap(), 2.0);
    }

    #[test]
    fn eval_functions() {
        assert_approx_eq!(run("sin(pi / 2)", 0.0).unwrap(), 1.0);
        assert_approx_eq!(run("cos(0)", 0.0).unwrap(), 1.0);
        assert_approx_eq!(run("tan(0)", 0.0).unwrap(), 0.0);
        assert_approx_eq!(run("abs(-3)", 0.0).unwrap(), 3.0);
        assert_approx_eq!(run("sqrt(16)", 0.0).unwrap(), 4.0);
        assert_approx_eq!(run("min(x, 0.5)", 0.9).unwrap(), 0.5);
        assert_approx_eq!(run("max(x, 0.5)", 0.9).unwrap(), 0.9);
    }

    #[test]
    fn eval_round_half_to_even() {
        assert_approx_eq!(run("round(2.5)", 0.0).unwrap(), 2.0);
        assert_approx_eq!(run("round(3.5)", 0.0).unwrap(), 4.0);
        assert_approx_eq!(run("round(-0.5)", 0.0).unwrap(), 0.0);
        assert_approx_eq!(run("round(2.4)", 0.0).unwrap(), 2.0);
    }

    #[test]
    fn eval_quantize_example() {
        assert_approx_eq!(run("round(x*4)/4", 0.6).unwrap(), 0.5);
    }

    #[test]
    fn pow_and_operator_agree() {
        for x in [0.0, 0.3, 1.0, 2.5] {
            assert_approx_eq!(run("x ** 1.5", x).unwrap(), run("pow(x, 1.5)", x).unwrap());
        }
    }

    #[test]
    fn eval_division_by_zero() {
        assert_eq!(
            run("1 / (x - 1)", 1.0),
            Err(EvalError::NumericDomain("division by zero"))
        );
    }

    #[test]
    fn eval_literal_division_by_zero_compiles_but_fails() {
        assert!(run("x / 0", 0.5).is_err());
    }

    #[test]
    fn eval_pow_domain_errors() {
        assert!(run("(-8) ** (1/3)", 0.0).is_err());
        assert!(run("pow(-2, 0.5)", 0.0).is_err());
        assert!(run("0 ** -1", 0.0).is_err());
        assert_approx_eq!(run("(-2) ** 3", 0.0).unwrap(), -8.0);
    }

    #[test]
    fn eval_sqrt_negative() {
        assert!(run("sqrt(x - 1)", 0.0).is_err());
    }

    #[test]
    fn eval_overflow_is_domain_error() {
        assert!(run("10 ** 400", 0.0).is_err());
    }

    #[test]
    fn eval_is_deterministic() {
        let compiled = Compiler::compile("sin(time * x) + frame / 10").unwrap();
        let env = Env::new(0.7, 1.25, 30.0);
        let first = eval(compiled.root(), &env).unwrap();
        for _ in 0..100 {
            assert_eq!(eval(compiled.root(), &env).unwrap().to_bits(), first.to_bits());
        }
    }
}
