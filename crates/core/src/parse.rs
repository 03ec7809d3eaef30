//! FPCore reader: s-expression tokenizer plus kernel parsing.
//!
//! Input is a single `.fpcore` file or a directory of them; kernel order
//! is preserved (directory entries are visited in sorted order) because
//! later stages zip by position.

use crate::error::{Error, Result};
use crate::expr::{Expr, Op};
use crate::fpcore::FPCore;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
enum Sexp {
    Atom(String),
    Str(String),
    List(Vec<Sexp>),
}

struct Tokenizer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Tokenizer {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn skip_trivia(&mut self) {
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b';' => {
                    while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                c if c.is_ascii_whitespace() => self.pos += 1,
                _ => break,
            }
        }
    }

    fn next(&mut self) -> Option<std::result::Result<Token, String>> {
        self.skip_trivia();
        let c = *self.src.get(self.pos)?;
        match c {
            b'(' | b'[' => {
                self.pos += 1;
                Some(Ok(Token::Open))
            }
            b')' | b']' => {
                self.pos += 1;
                Some(Ok(Token::Close))
            }
            b'"' => {
                let start = self.pos + 1;
                let mut end = start;
                while end < self.src.len() && self.src[end] != b'"' {
                    end += 1;
                }
                if end == self.src.len() {
                    return Some(Err("unterminated string literal".into()));
                }
                self.pos = end + 1;
                Some(Ok(Token::Str(
                    String::from_utf8_lossy(&self.src[start..end]).into_owned(),
                )))
            }
            _ => {
                let start = self.pos;
                while self.pos < self.src.len()
                    && !self.src[self.pos].is_ascii_whitespace()
                    && !matches!(self.src[self.pos], b'(' | b')' | b'[' | b']' | b';' | b'"')
                {
                    self.pos += 1;
                }
                Some(Ok(Token::Atom(
                    String::from_utf8_lossy(&self.src[start..self.pos]).into_owned(),
                )))
            }
        }
    }
}

enum Token {
    Open,
    Close,
    Atom(String),
    Str(String),
}

fn parse_sexps(src: &str) -> std::result::Result<Vec<Sexp>, String> {
    let mut tok = Tokenizer::new(src);
    let mut stack: Vec<Vec<Sexp>> = vec![Vec::new()];
    while let Some(t) = tok.next() {
        match t? {
            Token::Open => stack.push(Vec::new()),
            Token::Close => {
                let list = stack.pop().ok_or("unbalanced parentheses")?;
                if stack.is_empty() {
                    return Err("unbalanced parentheses".into());
                }
                stack.last_mut().unwrap().push(Sexp::List(list));
            }
            Token::Atom(a) => stack.last_mut().unwrap().push(Sexp::Atom(a)),
            Token::Str(s) => stack.last_mut().unwrap().push(Sexp::Str(s)),
        }
    }
    if stack.len() != 1 {
        return Err("unbalanced parentheses at end of input".into());
    }
    Ok(stack.pop().unwrap())
}

fn parse_expr(sexp: &Sexp) -> std::result::Result<Expr, String> {
    match sexp {
        Sexp::Str(s) => Err(format!("unexpected string literal \"{}\"", s)),
        Sexp::Atom(a) => parse_atom(a),
        Sexp::List(items) => {
            let (head, rest) = items
                .split_first()
                .ok_or_else(|| "empty application".to_string())?;
            let head = match head {
                Sexp::Atom(a) => a.as_str(),
                _ => return Err("operator position must be a symbol".into()),
            };
            match head {
                "if" => {
                    if rest.len() != 3 {
                        return Err(format!("if expects 3 arguments, got {}", rest.len()));
                    }
                    Ok(Expr::If(
                        Box::new(parse_expr(&rest[0])?),
                        Box::new(parse_expr(&rest[1])?),
                        Box::new(parse_expr(&rest[2])?),
                    ))
                }
                "let" | "let*" => {
                    if rest.len() != 2 {
                        return Err(format!("{} expects bindings and a body", head));
                    }
                    let raw = match &rest[0] {
                        Sexp::List(bs) => bs,
                        _ => return Err(format!("{} bindings must be a list", head)),
                    };
                    let mut bindings = Vec::with_capacity(raw.len());
                    for b in raw {
                        match b {
                            Sexp::List(pair) if pair.len() == 2 => {
                                let name = match &pair[0] {
                                    Sexp::Atom(a) => a.clone(),
                                    _ => return Err("binding name must be a symbol".into()),
                                };
                                bindings.push((name, parse_expr(&pair[1])?));
                            }
                            _ => return Err(format!("malformed {} binding", head)),
                        }
                    }
                    Ok(Expr::Let {
                        sequential: head == "let*",
                        bindings,
                        body: Box::new(parse_expr(&rest[1])?),
                    })
                }
                _ => {
                    let op = Op::from_name(head)
                        .ok_or_else(|| format!("unknown operator `{}`", head))?;
                    let args: std::result::Result<Vec<Expr>, String> =
                        rest.iter().map(parse_expr).collect();
                    let args = args?;
                    // `-` is subtraction or negation depending on arity
                    let (op, args) = match (op, args.len()) {
                        (Op::Sub, 1) => (Op::Neg, args),
                        _ => (op, args),
                    };
                    if args.len() != op.arity() {
                        return Err(format!(
                            "`{}` expects {} arguments, got {}",
                            op.name(),
                            op.arity(),
                            args.len()
                        ));
                    }
                    Ok(Expr::Op(op, args))
                }
            }
        }
    }
}

fn parse_atom(atom: &str) -> std::result::Result<Expr, String> {
    match atom {
        "PI" => return Ok(Expr::Num(std::f64::consts::PI)),
        "E" => return Ok(Expr::Num(std::f64::consts::E)),
        "INFINITY" => return Ok(Expr::Num(f64::INFINITY)),
        "NAN" => return Ok(Expr::Num(f64::NAN)),
        "TRUE" => return Ok(Expr::Num(1.0)),
        "FALSE" => return Ok(Expr::Num(0.0)),
        _ => {}
    }
    if let Ok(v) = atom.parse::<f64>() {
        return Ok(Expr::Num(v));
    }
    // FPCore rational literals, e.g. 1/3
    if let Some((p, q)) = atom.split_once('/') {
        if let (Ok(p), Ok(q)) = (p.parse::<f64>(), q.parse::<f64>()) {
            return Ok(Expr::Num(p / q));
        }
    }
    if atom
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(Expr::Var(atom.to_string()))
    } else {
        Err(format!("unrecognized atom `{}`", atom))
    }
}

/// Parse every FPCore form in `text`. Keys are derived from the `:name`
/// property when present, made unique with a positional suffix.
pub fn parse_cores(text: &str, source: &Path) -> Result<Vec<FPCore>> {
    let sexps =
        parse_sexps(text).map_err(|reason| Error::parse(source, reason))?;
    let mut cores = Vec::with_capacity(sexps.len());
    for (idx, sexp) in sexps.iter().enumerate() {
        let core = parse_core(sexp, idx).map_err(|reason| Error::parse(source, reason))?;
        cores.push(core);
    }
    Ok(cores)
}

fn parse_core(sexp: &Sexp, idx: usize) -> std::result::Result<FPCore, String> {
    let items = match sexp {
        Sexp::List(items) => items,
        _ => return Err("expected an (FPCore ...) form".into()),
    };
    let mut it = items.iter();
    match it.next() {
        Some(Sexp::Atom(a)) if a == "FPCore" => {}
        _ => return Err("expected an (FPCore ...) form".into()),
    }
    // optional identifier between FPCore and the argument list
    let mut next = it.next().ok_or("FPCore form is missing arguments")?;
    let mut ident = None;
    if let Sexp::Atom(a) = next {
        ident = Some(a.clone());
        next = it.next().ok_or("FPCore form is missing arguments")?;
    }
    let args = match next {
        Sexp::List(raw) => raw
            .iter()
            .map(|a| match a {
                Sexp::Atom(name) => Ok(name.clone()),
                _ => Err("argument names must be symbols".to_string()),
            })
            .collect::<std::result::Result<Vec<String>, String>>()?,
        _ => return Err("FPCore arguments must be a list".into()),
    };

    let rest: Vec<&Sexp> = it.collect();
    if rest.is_empty() {
        return Err("FPCore form has no body".into());
    }
    let mut name = ident;
    let mut pre = None;
    let mut i = 0;
    // properties come in `:key value` pairs before the body
    while i + 1 < rest.len() {
        match rest[i] {
            Sexp::Atom(a) if a.starts_with(':') => {
                match (a.as_str(), rest[i + 1]) {
                    (":name", Sexp::Str(s)) => name = Some(s.clone()),
                    (":pre", v) => pre = Some(parse_expr(v)?),
                    _ => {} // unknown properties are tolerated
                }
                i += 2;
            }
            _ => break,
        }
    }
    if i + 1 != rest.len() {
        return Err("FPCore form has trailing items after its body".into());
    }
    let expr = parse_expr(rest[i])?;

    let key = match &name {
        Some(n) => format!("{}_{}", slugify(n), idx),
        None => format!("core_{}", idx),
    };
    let mut core = FPCore::new(key, args, expr);
    core.name = name;
    core.pre = pre;
    Ok(core)
}

fn slugify(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

/// Read kernels from a `.fpcore` file or a directory of them.
pub fn read_path(path: &Path) -> Result<Vec<FPCore>> {
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "fpcore"))
            .collect();
        entries.sort();
        let mut cores = Vec::new();
        for entry in entries {
            cores.extend(read_file(&entry)?);
        }
        Ok(cores)
    } else {
        read_file(path)
    }
}

fn read_file(path: &Path) -> Result<Vec<FPCore>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::parse(path, format!("cannot read: {}", e)))?;
    let mut cores = parse_cores(&text, path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "core".into());
    for core in &mut cores {
        core.key = format!("{}_{}", slugify(&stem), core.key);
    }
    Ok(cores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Op;
    use std::path::Path;

    fn src() -> &'static Path {
        Path::new("<test>")
    }

    #[test]
    fn test_parse_single_core() {
        let cores = parse_cores("(FPCore (x) :name \"sqrt of x\" (sqrt x))", src()).unwrap();
        assert_eq!(cores.len(), 1);
        assert_eq!(cores[0].args, vec!["x"]);
        assert_eq!(cores[0].name.as_deref(), Some("sqrt of x"));
        assert_eq!(cores[0].key, "sqrt_of_x_0");
        assert_eq!(cores[0].expr, Expr::Op(Op::Sqrt, vec![Expr::Var("x".into())]));
    }

    #[test]
    fn test_parse_preserves_order() {
        let text = "(FPCore (x) x)\n(FPCore (a b) (+ a b))\n(FPCore (y) (neg y))";
        let cores = parse_cores(text, src()).unwrap();
        assert_eq!(cores.len(), 3);
        assert_eq!(cores[0].arity(), 1);
        assert_eq!(cores[1].arity(), 2);
        assert_eq!(cores[2].expr, Expr::Op(Op::Neg, vec![Expr::Var("y".into())]));
    }

    #[test]
    fn test_parse_properties_and_pre() {
        let text = "(FPCore (x) :pre (> x 0) :cite (foo) (log x))";
        let cores = parse_cores(text, src()).unwrap();
        assert!(cores[0].pre.is_some());
    }

    #[test]
    fn test_parse_unary_minus() {
        let cores = parse_cores("(FPCore (x) (- x))", src()).unwrap();
        assert_eq!(cores[0].expr, Expr::Op(Op::Neg, vec![Expr::Var("x".into())]));
    }

    #[test]
    fn test_parse_rational_literal() {
        let cores = parse_cores("(FPCore (x) (* 1/2 x))", src()).unwrap();
        match &cores[0].expr {
            Expr::Op(Op::Mul, args) => assert_eq!(args[0], Expr::Num(0.5)),
            other => panic!("unexpected expr {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed_is_error() {
        assert!(parse_cores("(FPCore (x) (sqrt x)", src()).is_err());
        assert!(parse_cores("(FPCore (x) (frobnicate x))", src()).is_err());
        assert!(parse_cores("(NotACore (x) x)", src()).is_err());
    }

    #[test]
    fn test_parse_let_and_if() {
        let text = "(FPCore (x) (let ([t (* x x)]) (if (< t 1) t (/ 1 t))))";
        let cores = parse_cores(text, src()).unwrap();
        let env: std::collections::HashMap<String, f64> =
            [("x".to_string(), 2.0)].into_iter().collect();
        assert_eq!(cores[0].expr.eval(&env), 0.25);
    }
}
