//! `--save-syntax` export (spec §0.D): render a parsed `Program` back to
//! canonical IMGQL source text via `Program::to_syntax`.

use crate::ast::Program;

pub fn to_syntax(program: &Program) -> String {
    program.to_syntax()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program_content;

    #[test]
    fn round_trips_a_simple_program() {
        let program = parse_program_content("let f(x) = x + 1\nprint \"r\" f(2)").unwrap();
        let rendered = to_syntax(&program);
        assert!(rendered.contains("let f(x)"));
        assert!(rendered.contains("print \"r\""));
    }
}
