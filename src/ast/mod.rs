//! Abstract syntax tree for IMGQL programs.
//!
//! Every [`Expression`] must be losslessly renderable back to valid IMGQL
//! source via [`Expression::to_syntax`], because closure bodies keep their
//! canonical AST form as a node attribute and error messages quote the
//! original surface syntax.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An IMGQL expression.
///
/// Binary and unary operators (including user-defined symbolic ones such as
/// `.<=.` or `+?`) are not distinct variants: the parser desugars them into
/// `Call` nodes whose `callee` is the operator's identifier, exactly like a
/// function application. This keeps the reducer's dispatch uniform (see
/// `reducer::reduce_expression`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Number(OrderedF64),
    Bool(bool),
    String(String),
    /// `callee(args...)`, or a desugared operator application.
    Call { callee: String, args: Vec<Expression> },
    /// `let var = value in body`.
    Let {
        var: String,
        value: Box<Expression>,
        body: Box<Expression>,
    },
    /// `for var in iterable do body`.
    For {
        var: String,
        iterable: Box<Expression>,
        body: Box<Expression>,
    },
}

/// `f64` wrapper with a total order and content-hashable canonical form.
///
/// IMGQL numeric literals are hashed as part of `NodeId` computation, which
/// requires a deterministic byte representation; plain `f64` has no `Eq`/`Hash`
/// because of `NaN`, so literals are stored via their canonical string form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderedF64(pub f64);

impl OrderedF64 {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// Canonical decimal rendering used both for `to_syntax()` and for the
    /// content hash, so two literals that parse to the same `f64` always
    /// serialize identically.
    pub fn canonical(self) -> String {
        if self.0.fract() == 0.0 && self.0.is_finite() && self.0.abs() < 1e15 {
            format!("{}", self.0 as i64)
        } else {
            format!("{}", self.0)
        }
    }
}

impl fmt::Display for OrderedF64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

impl Expression {
    /// Render the expression back into valid IMGQL source.
    pub fn to_syntax(&self) -> String {
        match self {
            Expression::Number(n) => n.canonical(),
            Expression::Bool(b) => b.to_string(),
            Expression::String(s) => format!("\"{}\"", escape_string(s)),
            Expression::Call { callee, args } => {
                if args.is_empty() {
                    callee.clone()
                } else {
                    let rendered: Vec<String> = args.iter().map(Expression::to_syntax).collect();
                    format!("{}({})", callee, rendered.join(","))
                }
            }
            Expression::Let { var, value, body } => {
                format!("let {} = {} in {}", var, value.to_syntax(), body.to_syntax())
            }
            Expression::For { var, iterable, body } => {
                format!("for {} in {} do {}", var, iterable.to_syntax(), body.to_syntax())
            }
        }
    }

    /// Free identifiers referenced by this expression, excluding names bound
    /// by enclosing `let`/`for`/function parameters (those are removed by the
    /// caller before recursing, see `reducer::free_variables`).
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expression::Number(_) | Expression::Bool(_) | Expression::String(_) => {}
            Expression::Call { callee, args } => {
                out.push(callee.as_str());
                for a in args {
                    a.collect_names(out);
                }
            }
            Expression::Let { value, body, .. } => {
                value.collect_names(out);
                body.collect_names(out);
            }
            Expression::For { iterable, body, .. } => {
                iterable.collect_names(out);
                body.collect_names(out);
            }
        }
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A top-level command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// `let name(params...) = body`; `params` is empty for a plain value
    /// declaration.
    Declaration {
        name: String,
        params: Vec<String>,
        body: Expression,
    },
    Save { label: String, expr: Expression },
    Print { label: String, expr: Expression },
    /// `import "name-or-path"`.
    Import(String),
}

impl Command {
    pub fn to_syntax(&self) -> String {
        match self {
            Command::Declaration { name, params, body } => {
                if params.is_empty() {
                    format!("let {} = {}", name, body.to_syntax())
                } else {
                    format!("let {}({}) = {}", name, params.join(","), body.to_syntax())
                }
            }
            Command::Save { label, expr } => format!("save \"{}\" {}", escape_string(label), expr.to_syntax()),
            Command::Print { label, expr } => format!("print \"{}\" {}", escape_string(label), expr.to_syntax()),
            Command::Import(name) => format!("import \"{}\"", escape_string(name)),
        }
    }
}

/// A full IMGQL program: an ordered list of commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub commands: Vec<Command>,
}

impl Program {
    pub fn to_syntax(&self) -> String {
        self.commands
            .iter()
            .map(Command::to_syntax)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_canonical_form_drops_trailing_zero() {
        assert_eq!(OrderedF64::new(5.0).canonical(), "5");
        assert_eq!(OrderedF64::new(5.5).canonical(), "5.5");
    }

    #[test]
    fn call_round_trips_through_to_syntax() {
        let expr = Expression::Call {
            callee: "+".to_string(),
            args: vec![Expression::Number(OrderedF64::new(1.0)), Expression::Number(OrderedF64::new(2.0))],
        };
        assert_eq!(expr.to_syntax(), "+(1,2)");
    }

    #[test]
    fn let_and_for_round_trip() {
        let expr = Expression::Let {
            var: "x".into(),
            value: Box::new(Expression::Number(OrderedF64::new(1.0))),
            body: Box::new(Expression::Call {
                callee: "x".into(),
                args: vec![],
            }),
        };
        assert_eq!(expr.to_syntax(), "let x = 1 in x");
    }

    #[test]
    fn referenced_names_collects_callee_and_nested() {
        let expr = Expression::Call {
            callee: "f".into(),
            args: vec![Expression::Call {
                callee: "g".into(),
                args: vec![],
            }],
        };
        let names = expr.referenced_names();
        assert_eq!(names, vec!["f", "g"]);
    }
}
