//! IMGQL parser.
//!
//! Built on a `pest` grammar (`imgql.pest`) rather than the ambiguous,
//! Earley-resolved single `OPERATOR` production of the reference grammar:
//! this grammar fixes conventional precedence tiers (`or > and > cmp > add >
//! mul > unary`) for the built-in dotted/symbolic spellings (`+.`, `.-`,
//! `.<=.`, `+?`, ...). A `let` may bind an arbitrary symbolic spelling as a
//! new operator name (`decl_name` accepts `symbolic_op`), and that name is
//! then usable as an infix operator (the loosest-binding `infix_expr` tier),
//! as a prefix operator (`unary_expr`), or as an ordinary call (`call`
//! accepts `symbolic_op` alongside `qualified_ident`) — matching the source
//! language's "operators are first-class" rule. The grammar doesn't carry a
//! symbol table, so it can't recover a user-declared operator's intended
//! precedence; it accepts the symbol wherever the fixed operator tiers
//! don't already claim it and leaves identifying it as a bound operation or
//! an unknown callable to the reducer's environment lookup, the same
//! deferral the reference grammar's single ambiguous `OPERATOR` production
//! makes at a different layer.

use crate::ast::{Command, Expression, OrderedF64, Program};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use thiserror::Error;

#[derive(PestParser)]
#[grammar = "parser/imgql.pest"]
struct ImgqlParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),
    #[error("invalid numeric literal '{0}'")]
    InvalidNumber(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse a full IMGQL program from source text.
pub fn parse_program_content(text: &str) -> ParseResult<Program> {
    let mut pairs = ImgqlParser::parse(Rule::program, text).map_err(Box::new)?;
    let program_pair = pairs.next().expect("program rule always produces one pair");
    let mut commands = Vec::new();
    for pair in program_pair.into_inner() {
        match pair.as_rule() {
            Rule::command => commands.push(build_command(pair.into_inner().next().unwrap())?),
            Rule::EOI => {}
            _ => unreachable!("unexpected top-level rule {:?}", pair.as_rule()),
        }
    }
    Ok(Program { commands })
}

/// Parse a single standalone expression (used by the REPL and by runtime
/// closure-body re-evaluation in legacy-compatible tooling).
pub fn parse_expression_content(text: &str) -> ParseResult<Expression> {
    let mut pairs = ImgqlParser::parse(Rule::expr, text).map_err(Box::new)?;
    build_expr(pairs.next().expect("expr rule always produces one pair"))
}

fn build_command(pair: Pair<Rule>) -> ParseResult<Command> {
    match pair.as_rule() {
        Rule::declaration => {
            let mut inner = pair.into_inner();
            let name = inner.next().unwrap().as_str().to_string();
            let mut next = inner.next().unwrap();
            let mut params = Vec::new();
            if next.as_rule() == Rule::param_list {
                params = next.into_inner().map(|p| p.as_str().to_string()).collect();
                next = inner.next().unwrap();
            }
            let body = build_expr(next)?;
            Ok(Command::Declaration { name, params, body })
        }
        Rule::save_cmd => {
            let mut inner = pair.into_inner();
            let label = unescape_string(inner.next().unwrap().as_str());
            let expr = build_expr(inner.next().unwrap())?;
            Ok(Command::Save { label, expr })
        }
        Rule::print_cmd => {
            let mut inner = pair.into_inner();
            let label = unescape_string(inner.next().unwrap().as_str());
            let expr = build_expr(inner.next().unwrap())?;
            Ok(Command::Print { label, expr })
        }
        Rule::import_cmd => {
            let mut inner = pair.into_inner();
            let name = unescape_string(inner.next().unwrap().as_str());
            Ok(Command::Import(name))
        }
        other => unreachable!("unexpected command rule {:?}", other),
    }
}

fn build_expr(pair: Pair<Rule>) -> ParseResult<Expression> {
    match pair.as_rule() {
        Rule::expr => build_expr(pair.into_inner().next().unwrap()),
        Rule::let_expr => {
            let mut inner = pair.into_inner();
            let var = inner.next().unwrap().as_str().to_string();
            let value = build_expr(inner.next().unwrap())?;
            let body = build_expr(inner.next().unwrap())?;
            Ok(Expression::Let {
                var,
                value: Box::new(value),
                body: Box::new(body),
            })
        }
        Rule::for_expr => {
            let mut inner = pair.into_inner();
            let var = inner.next().unwrap().as_str().to_string();
            let iterable = build_expr(inner.next().unwrap())?;
            let body = build_expr(inner.next().unwrap())?;
            Ok(Expression::For {
                var,
                iterable: Box::new(iterable),
                body: Box::new(body),
            })
        }
        Rule::infix_expr | Rule::or_expr | Rule::and_expr | Rule::cmp_expr | Rule::add_expr | Rule::mul_expr => {
            build_left_assoc_chain(pair)
        }
        Rule::unary_expr => build_unary(pair),
        Rule::primary => build_expr(pair.into_inner().next().unwrap()),
        Rule::paren_expr => build_expr(pair.into_inner().next().unwrap()),
        Rule::call => build_call(pair),
        Rule::number => {
            let text = pair.as_str();
            let value: f64 = text
                .parse()
                .map_err(|_| ParseError::InvalidNumber(text.to_string()))?;
            Ok(Expression::Number(OrderedF64::new(value)))
        }
        Rule::bool_lit => Ok(Expression::Bool(pair.as_str() == "true")),
        Rule::string => Ok(Expression::String(unescape_string(pair.as_str()))),
        other => unreachable!("unexpected expression rule {:?}", other),
    }
}

fn build_left_assoc_chain(pair: Pair<Rule>) -> ParseResult<Expression> {
    let mut inner = pair.into_inner();
    let mut acc = build_expr(inner.next().unwrap())?;
    while let Some(op_pair) = inner.next() {
        let operator = op_pair.as_str().to_string();
        let rhs = build_expr(inner.next().expect("binary operator must have a right operand"))?;
        acc = Expression::Call {
            callee: operator,
            args: vec![acc, rhs],
        };
    }
    Ok(acc)
}

fn build_unary(pair: Pair<Rule>) -> ParseResult<Expression> {
    let mut inner = pair.into_inner();
    let first = inner.next().unwrap();
    if first.as_rule() == Rule::neg_op || first.as_rule() == Rule::symbolic_op {
        let operator = first.as_str().to_string();
        let operand = build_expr(inner.next().expect("unary operator must have an operand"))?;
        Ok(Expression::Call {
            callee: operator,
            args: vec![operand],
        })
    } else {
        build_expr(first)
    }
}

fn build_call(pair: Pair<Rule>) -> ParseResult<Expression> {
    let mut inner = pair.into_inner();
    let callee = inner.next().unwrap().as_str().to_string();
    let mut args = Vec::new();
    if let Some(arg_list) = inner.next() {
        for arg in arg_list.into_inner() {
            args.push(build_expr(arg)?);
        }
    }
    Ok(Expression::Call { callee, args })
}

fn unescape_string(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_declaration_and_print() {
        let program = parse_program_content("let a = 1\nlet b = 1\nlet c = a + b\nprint \"sum\" c").unwrap();
        assert_eq!(program.commands.len(), 4);
        match &program.commands[2] {
            Command::Declaration { name, body, .. } => {
                assert_eq!(name, "c");
                match body {
                    Expression::Call { callee, args } => {
                        assert_eq!(callee, "+");
                        assert_eq!(args.len(), 2);
                    }
                    other => panic!("expected call, got {other:?}"),
                }
            }
            other => panic!("expected declaration, got {other:?}"),
        }
    }

    #[test]
    fn parses_for_loop_with_range_and_star() {
        let expr = parse_expression_content("for i in range(5) do i * 2").unwrap();
        match expr {
            Expression::For { var, iterable, body } => {
                assert_eq!(var, "i");
                assert!(matches!(*iterable, Expression::Call { ref callee, .. } if callee == "range"));
                assert!(matches!(*body, Expression::Call { ref callee, .. } if callee == "*"));
            }
            other => panic!("expected for-expression, got {other:?}"),
        }
    }

    #[test]
    fn parses_nested_let_with_shadowing() {
        let expr = parse_expression_content("let x = 1 in let x = x + 10 in x + 5").unwrap();
        assert!(matches!(expr, Expression::Let { .. }));
    }

    #[test]
    fn parses_function_declaration_and_map() {
        let program = parse_program_content("let f(x) = x + x\nprint \"m\" map(f, range(0,4))").unwrap();
        match &program.commands[0] {
            Command::Declaration { params, .. } => assert_eq!(params, &vec!["x".to_string()]),
            other => panic!("expected declaration, got {other:?}"),
        }
    }

    #[test]
    fn parses_dotted_operators() {
        let expr = parse_expression_content("a +. 2").unwrap();
        assert!(matches!(expr, Expression::Call { ref callee, .. } if callee == "+."));
        let expr = parse_expression_content("2 .- a").unwrap();
        assert!(matches!(expr, Expression::Call { ref callee, .. } if callee == ".-"));
        let expr = parse_expression_content("a .<=. b").unwrap();
        assert!(matches!(expr, Expression::Call { ref callee, .. } if callee == ".<=."));
    }

    #[test]
    fn parses_user_declared_symbolic_operator_infix_and_prefix() {
        let program = parse_program_content("let .<>. (a, b) = a + b\nprint \"x\" (1 .<>. 2)").unwrap();
        match &program.commands[0] {
            Command::Declaration { name, .. } => assert_eq!(name, ".<>."),
            other => panic!("expected declaration, got {other:?}"),
        }
        let expr = parse_expression_content("1 .<>. 2").unwrap();
        assert!(matches!(expr, Expression::Call { ref callee, ref args } if callee == ".<>." && args.len() == 2));

        let prefix = parse_expression_content(".<>. 2").unwrap();
        assert!(matches!(prefix, Expression::Call { ref callee, ref args } if callee == ".<>." && args.len() == 1));

        let call_form = parse_expression_content(".<>.(1, 2)").unwrap();
        assert!(matches!(call_form, Expression::Call { ref callee, ref args } if callee == ".<>." && args.len() == 2));
    }

    #[test]
    fn parses_qualified_identifier_call() {
        let expr = parse_expression_content("simpleitk.ReadImage(\"x.nii\")").unwrap();
        assert!(matches!(expr, Expression::Call { ref callee, .. } if callee == "simpleitk.ReadImage"));
    }

    #[test]
    fn round_trips_through_to_syntax_and_back() {
        let program = parse_program_content("let a = 1\nlet c = a + 2\nprint \"x\" c").unwrap();
        let rendered = program.to_syntax();
        let reparsed = parse_program_content(&rendered).unwrap();
        assert_eq!(program, reparsed);
    }
}
