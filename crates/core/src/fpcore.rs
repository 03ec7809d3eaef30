//! The kernel entity flowing through every pipeline stage.

use crate::expr::Expr;
use serde::{Deserialize, Serialize};

/// Where a kernel came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Read from the benchmark input set.
    Input,
    /// Produced by the optimizer under the default configuration.
    Improved,
    /// Produced by the optimizer under a named ablation configuration.
    Ablation(String),
    /// Synthesized locally, with no external dependency.
    Synthetic,
}

impl Provenance {
    /// Short label used to namespace working directories.
    pub fn label(&self) -> &str {
        match self {
            Provenance::Input => "input",
            Provenance::Improved => "default",
            Provenance::Ablation(name) => name,
            Provenance::Synthetic => "synth",
        }
    }
}

/// A floating-point kernel: a fixed-arity expression subject to
/// accuracy-improving rewriting.
///
/// `cost` and `error` stay `None` until timing and error analysis have
/// completed for this kernel; `origin` links a rewrite back to the kernel
/// it was derived from.
#[derive(Debug, Clone)]
pub struct FPCore {
    pub key: String,
    pub name: Option<String>,
    pub args: Vec<String>,
    pub expr: Expr,
    pub pre: Option<Expr>,
    pub provenance: Provenance,
    pub cost: Option<f64>,
    pub error: Option<f64>,
    pub origin: Option<String>,
}

impl FPCore {
    pub fn new(key: impl Into<String>, args: Vec<String>, expr: Expr) -> Self {
        FPCore {
            key: key.into(),
            name: None,
            args,
            expr,
            pre: None,
            provenance: Provenance::Input,
            cost: None,
            error: None,
            origin: None,
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// FPCore surface syntax, as consumed by the external optimizer.
    pub fn to_text(&self) -> String {
        let mut out = String::from("(FPCore (");
        out.push_str(&self.args.join(" "));
        out.push(')');
        if let Some(name) = &self.name {
            out.push_str(&format!(" :name \"{}\"", name));
        }
        if let Some(pre) = &self.pre {
            out.push_str(&format!(" :pre {}", pre));
        }
        out.push_str(&format!(" {})", self.expr));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, Op};

    #[test]
    fn test_to_text() {
        let mut core = FPCore::new(
            "k0",
            vec!["x".into(), "y".into()],
            Expr::Op(Op::Add, vec![Expr::Var("x".into()), Expr::Var("y".into())]),
        );
        core.name = Some("sum".into());
        assert_eq!(core.to_text(), "(FPCore (x y) :name \"sum\" (+ x y))");
        assert_eq!(core.arity(), 2);
    }
}
