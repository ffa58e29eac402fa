//! SIMPL+ front end
//!
//! Turns module source text into a [`Program`] in three passes:
//! line preprocessing, tokenizing and recursive-descent parsing.
//!
//! ```rust,ignore
//! use splusc::parse_program;
//!
//! let parsed = parse_program(source, &["DEBUG".to_string()]);
//! for err in &parsed.errors {
//!     eprintln!("{}", err);
//! }
//! ```
//!
//! Parsing never fails outright: the returned program is best-effort and
//! `errors` lists everything that was skipped.

pub mod ast;
pub mod keywords;
pub mod lexer;
pub mod parser;
pub mod preprocessor;

pub use ast::Program;
pub use lexer::{Token, TokenKind, tokenize};
pub use parser::{ParseError, Parser};
pub use preprocessor::{Notice, preprocess};

use std::collections::BTreeSet;

/// Result of running the whole front end over one source file
#[derive(Debug, Clone)]
pub struct Parsed {
    pub program: Program,
    pub errors: Vec<ParseError>,
    /// Informational directives the preprocessor noted
    pub notices: Vec<Notice>,
    /// Define set the conditional blocks were evaluated against
    pub defines: BTreeSet<String>,
}

impl Parsed {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Preprocess, tokenize and parse `source`
///
/// `defines` are added to the platform defines before conditional blocks
/// are evaluated.
pub fn parse_program(source: &str, defines: &[String]) -> Parsed {
    let pre = preprocess(source, defines);
    let output = Parser::new(&pre.source).parse();
    let mut program = output.program;
    program.help_text = pre.help_text;

    Parsed {
        program,
        errors: output.errors,
        notices: pre.notices,
        defines: pre.defines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_respects_defines() {
        let source = r#"
#IF_DEFINED VERBOSE
INTEGER chatter;
#ENDIF
INTEGER quiet;
"#;
        let plain = parse_program(source, &[]);
        assert!(plain.is_clean());
        assert_eq!(plain.program.globals.len(), 1);

        let verbose = parse_program(source, &["verbose".to_string()]);
        assert_eq!(verbose.program.globals.len(), 2);
        assert!(verbose.defines.contains("VERBOSE"));
    }

    #[test]
    fn test_pipeline_keeps_line_numbers_after_excluded_blocks() {
        let source = "#IF_DEFINED NOPE\nINTEGER a;\n#ENDIF\nINTEGER = 3;\n";
        let parsed = parse_program(source, &[]);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 4);
    }

    #[test]
    fn test_pipeline_attaches_help_text() {
        let source = "#HELP_BEGIN\nUse the buttons.\n#HELP_END\nDIGITAL_INPUT go;\n";
        let parsed = parse_program(source, &[]);
        assert_eq!(parsed.program.help_text, "Use the buttons.");
        assert_eq!(parsed.program.io.len(), 1);
    }
}
