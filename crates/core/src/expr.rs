//! Expression trees and their host-side f64 semantics.
//!
//! The operator set follows the rewriting language of the external
//! optimizer. Host evaluation is used for reference outputs embedded in
//! benchmark drivers and for the fallback sampler's finiteness filter;
//! booleans are represented as 0.0 / 1.0.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Pow,
    Sqrt,
    Cbrt,
    Fabs,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Atan,
    Fma,
    Fmax,
    Fmin,
    Floor,
    Ceil,
    Round,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Not,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Neg => "neg",
            Op::Pow => "pow",
            Op::Sqrt => "sqrt",
            Op::Cbrt => "cbrt",
            Op::Fabs => "fabs",
            Op::Exp => "exp",
            Op::Log => "log",
            Op::Sin => "sin",
            Op::Cos => "cos",
            Op::Tan => "tan",
            Op::Atan => "atan",
            Op::Fma => "fma",
            Op::Fmax => "fmax",
            Op::Fmin => "fmin",
            Op::Floor => "floor",
            Op::Ceil => "ceil",
            Op::Round => "round",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::And => "and",
            Op::Or => "or",
            Op::Not => "not",
        }
    }

    pub fn from_name(name: &str) -> Option<Op> {
        let op = match name {
            "+" => Op::Add,
            "-" => Op::Sub,
            "*" => Op::Mul,
            "/" => Op::Div,
            "neg" => Op::Neg,
            "pow" => Op::Pow,
            "sqrt" => Op::Sqrt,
            "cbrt" => Op::Cbrt,
            "fabs" => Op::Fabs,
            "exp" => Op::Exp,
            "log" => Op::Log,
            "sin" => Op::Sin,
            "cos" => Op::Cos,
            "tan" => Op::Tan,
            "atan" => Op::Atan,
            "fma" => Op::Fma,
            "fmax" => Op::Fmax,
            "fmin" => Op::Fmin,
            "floor" => Op::Floor,
            "ceil" => Op::Ceil,
            "round" => Op::Round,
            "<" => Op::Lt,
            "<=" => Op::Le,
            ">" => Op::Gt,
            ">=" => Op::Ge,
            "==" => Op::Eq,
            "!=" => Op::Ne,
            "and" => Op::And,
            "or" => Op::Or,
            "not" => Op::Not,
            _ => return None,
        };
        Some(op)
    }

    /// Identifier-safe name, usable in file paths and generated code.
    pub fn slug(&self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Lt => "lt",
            Op::Le => "le",
            Op::Gt => "gt",
            Op::Ge => "ge",
            Op::Eq => "eq",
            Op::Ne => "ne",
            other => other.name(),
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Op::Neg
            | Op::Sqrt
            | Op::Cbrt
            | Op::Fabs
            | Op::Exp
            | Op::Log
            | Op::Sin
            | Op::Cos
            | Op::Tan
            | Op::Atan
            | Op::Floor
            | Op::Ceil
            | Op::Round
            | Op::Not => 1,
            Op::Fma => 3,
            _ => 2,
        }
    }

    /// Operations that produce a boolean (0.0 / 1.0) result.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Eq | Op::Ne | Op::And | Op::Or | Op::Not
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Op(Op, Vec<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `let` binds in parallel; `let*` (sequential = true) binds in order.
    Let {
        sequential: bool,
        bindings: Vec<(String, Expr)>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn eval(&self, env: &HashMap<String, f64>) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::Var(name) => env.get(name).copied().unwrap_or(f64::NAN),
            Expr::Op(op, args) => {
                let a: Vec<f64> = args.iter().map(|e| e.eval(env)).collect();
                apply(*op, &a)
            }
            Expr::If(cond, then, alt) => {
                if cond.eval(env) != 0.0 {
                    then.eval(env)
                } else {
                    alt.eval(env)
                }
            }
            Expr::Let {
                sequential,
                bindings,
                body,
            } => {
                let mut inner = env.clone();
                if *sequential {
                    for (name, expr) in bindings {
                        let v = expr.eval(&inner);
                        inner.insert(name.clone(), v);
                    }
                } else {
                    let values: Vec<f64> = bindings.iter().map(|(_, e)| e.eval(env)).collect();
                    for ((name, _), v) in bindings.iter().zip(values) {
                        inner.insert(name.clone(), v);
                    }
                }
                body.eval(&inner)
            }
        }
    }

    /// All operators appearing anywhere in the expression.
    pub fn operators(&self) -> Vec<Op> {
        let mut ops = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Op(op, _) = e {
                ops.push(*op);
            }
        });
        ops.dedup();
        ops
    }

    /// Whether the expression contains any conditional.
    pub fn has_branches(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expr::If(..)) {
                found = true;
            }
        });
        found
    }

    fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Op(_, args) => args.iter().for_each(|a| a.walk(f)),
            Expr::If(c, t, e) => {
                c.walk(f);
                t.walk(f);
                e.walk(f);
            }
            Expr::Let { bindings, body, .. } => {
                bindings.iter().for_each(|(_, b)| b.walk(f));
                body.walk(f);
            }
            _ => {}
        }
    }
}

fn apply(op: Op, a: &[f64]) -> f64 {
    let b = |v: bool| if v { 1.0 } else { 0.0 };
    match op {
        Op::Add => a[0] + a[1],
        Op::Sub => a[0] - a[1],
        Op::Mul => a[0] * a[1],
        Op::Div => a[0] / a[1],
        Op::Neg => -a[0],
        Op::Pow => a[0].powf(a[1]),
        Op::Sqrt => a[0].sqrt(),
        Op::Cbrt => a[0].cbrt(),
        Op::Fabs => a[0].abs(),
        Op::Exp => a[0].exp(),
        Op::Log => a[0].ln(),
        Op::Sin => a[0].sin(),
        Op::Cos => a[0].cos(),
        Op::Tan => a[0].tan(),
        Op::Atan => a[0].atan(),
        Op::Fma => a[0].mul_add(a[1], a[2]),
        Op::Fmax => a[0].max(a[1]),
        Op::Fmin => a[0].min(a[1]),
        Op::Floor => a[0].floor(),
        Op::Ceil => a[0].ceil(),
        Op::Round => a[0].round(),
        Op::Lt => b(a[0] < a[1]),
        Op::Le => b(a[0] <= a[1]),
        Op::Gt => b(a[0] > a[1]),
        Op::Ge => b(a[0] >= a[1]),
        Op::Eq => b(a[0] == a[1]),
        Op::Ne => b(a[0] != a[1]),
        Op::And => b(a[0] != 0.0 && a[1] != 0.0),
        Op::Or => b(a[0] != 0.0 || a[1] != 0.0),
        Op::Not => b(a[0] == 0.0),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(v) => {
                if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
                    write!(f, "{}", *v as i64)
                } else {
                    write!(f, "{}", v)
                }
            }
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Op(op, args) => {
                write!(f, "({}", op.name())?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            Expr::If(c, t, e) => write!(f, "(if {} {} {})", c, t, e),
            Expr::Let {
                sequential,
                bindings,
                body,
            } => {
                write!(f, "({} (", if *sequential { "let*" } else { "let" })?;
                for (i, (name, expr)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "[{} {}]", name, expr)?;
                }
                write!(f, ") {})", body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_eval_arithmetic() {
        let e = Expr::Op(
            Op::Add,
            vec![
                Expr::Var("x".into()),
                Expr::Op(Op::Mul, vec![Expr::Num(2.0), Expr::Var("y".into())]),
            ],
        );
        assert_eq!(e.eval(&env(&[("x", 1.0), ("y", 3.0)])), 7.0);
    }

    #[test]
    fn test_eval_branch_guards_domain() {
        // (if (< x 0) 0 (sqrt x)) stays finite on negative inputs
        let e = Expr::If(
            Box::new(Expr::Op(Op::Lt, vec![Expr::Var("x".into()), Expr::Num(0.0)])),
            Box::new(Expr::Num(0.0)),
            Box::new(Expr::Op(Op::Sqrt, vec![Expr::Var("x".into())])),
        );
        assert_eq!(e.eval(&env(&[("x", -4.0)])), 0.0);
        assert_eq!(e.eval(&env(&[("x", 4.0)])), 2.0);
    }

    #[test]
    fn test_eval_let_parallel_vs_sequential() {
        // let binds in parallel: inner x refers to the outer x
        let bindings = vec![
            ("x".to_string(), Expr::Num(10.0)),
            (
                "y".to_string(),
                Expr::Op(Op::Add, vec![Expr::Var("x".into()), Expr::Num(1.0)]),
            ),
        ];
        let body = Box::new(Expr::Var("y".into()));
        let parallel = Expr::Let {
            sequential: false,
            bindings: bindings.clone(),
            body: body.clone(),
        };
        let sequential = Expr::Let {
            sequential: true,
            bindings,
            body,
        };
        let outer = env(&[("x", 1.0)]);
        assert_eq!(parallel.eval(&outer), 2.0);
        assert_eq!(sequential.eval(&outer), 11.0);
    }

    #[test]
    fn test_display_round_trips_shape() {
        let e = Expr::Op(
            Op::Div,
            vec![Expr::Num(1.0), Expr::Op(Op::Sqrt, vec![Expr::Var("x".into())])],
        );
        assert_eq!(e.to_string(), "(/ 1 (sqrt x))");
    }
}
