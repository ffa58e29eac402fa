//! Line-oriented preprocessor
//!
//! Runs on raw source lines before lexing. Handles help blocks and
//! conditional compilation, and records informational directives.
//!
//! Excluded lines are replaced with empty lines so that every later
//! diagnostic still points at the original line number.
//!
//! ```text
//! #DEFINE_CONSTANT DEBUG_MODE 1
//! #IF_DEFINED DEBUG_MODE
//!     Print("debug build\n");
//! #ENDIF
//! ```

use std::collections::BTreeSet;

/// Defines that are always present
pub const PLATFORM_DEFINES: &[&str] = &["SERIES3", "SERIES4", "SIMULATION"];

/// Directives that only carry information for the host; they stay in the
/// stream so the parser also records them.
const INFORMATIONAL: &[&str] = &[
    "#PRINT_TO_TRACE",
    "#DIGITAL_EXPAND",
    "#ANALOG_SERIAL_EXPAND",
    "#OUTPUT_SHIFT",
    "#INPUT_SHIFT",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// 1-indexed source line
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Preprocessed {
    /// Rewritten source with the same number of lines as the input
    pub source: String,
    /// Lines captured between `#HELP_BEGIN` and `#HELP_END`
    pub help_text: String,
    /// Resolved define set (uppercase)
    pub defines: BTreeSet<String>,
    pub notices: Vec<Notice>,
}

/// Split a directive line into its uppercase keyword and first argument
fn directive_parts(line: &str) -> Option<(String, Option<&str>)> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let mut words = trimmed.split_whitespace();
    let keyword = words.next()?.to_ascii_uppercase();
    Some((keyword, words.next()))
}

pub fn preprocess(source: &str, external_defines: &[String]) -> Preprocessed {
    let mut defines: BTreeSet<String> = PLATFORM_DEFINES.iter().map(|d| d.to_string()).collect();
    defines.extend(external_defines.iter().map(|d| d.to_ascii_uppercase()));

    // Pre-pass: constants count as defined even before their definition line
    for line in source.lines() {
        if let Some((keyword, Some(name))) = directive_parts(line)
            && keyword == "#DEFINE_CONSTANT"
        {
            defines.insert(name.to_ascii_uppercase());
        }
    }

    let mut output: Vec<String> = Vec::new();
    let mut help: Vec<&str> = Vec::new();
    let mut notices = Vec::new();
    let mut in_help = false;
    // One flag per open conditional block; a line is kept only if all are true
    let mut conditions: Vec<bool> = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let parts = directive_parts(line);
        let keyword = parts.as_ref().map(|(k, _)| k.as_str());

        if in_help {
            if keyword == Some("#HELP_END") {
                in_help = false;
            } else {
                help.push(line);
            }
            output.push(String::new());
            continue;
        }

        let active = conditions.iter().all(|c| *c);

        match keyword {
            Some("#HELP_BEGIN") if active => {
                in_help = true;
                output.push(String::new());
            }
            Some("#IF_DEFINED") | Some("#IF_NOT_DEFINED") => {
                let name = parts
                    .as_ref()
                    .and_then(|(_, arg)| *arg)
                    .map(|a| a.to_ascii_uppercase())
                    .unwrap_or_default();
                let defined = defines.contains(&name);
                let wanted = keyword == Some("#IF_DEFINED");
                conditions.push(defined == wanted);
                output.push(String::new());
            }
            Some("#ENDIF") => {
                // Unbalanced #ENDIF pops nothing
                conditions.pop();
                output.push(String::new());
            }
            _ if !active => output.push(String::new()),
            Some(k) if INFORMATIONAL.contains(&k) => {
                notices.push(Notice {
                    line: line_no,
                    message: format!("{} noted (no effect in simulation)", k),
                });
                output.push(line.to_string());
            }
            _ => output.push(line.to_string()),
        }
    }

    let mut rewritten = output.join("\n");
    if source.ends_with('\n') {
        rewritten.push('\n');
    }

    Preprocessed {
        source: rewritten,
        help_text: help.join("\n"),
        defines,
        notices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_line_count() {
        let source = "a\n#IF_DEFINED NOPE\nb\n#ENDIF\nc\n";
        let out = preprocess(source, &[]);
        assert_eq!(out.source, "a\n\n\n\nc\n");
        assert_eq!(out.source.lines().count(), source.lines().count());
    }

    #[test]
    fn test_forward_defined_constant() {
        let source = "#IF_DEFINED LATER\nkept\n#ENDIF\n#DEFINE_CONSTANT LATER 5\n";
        let out = preprocess(source, &[]);
        assert!(out.source.contains("kept"));
        assert!(out.source.contains("#DEFINE_CONSTANT LATER 5"));
        assert!(out.defines.contains("LATER"));
    }

    #[test]
    fn test_if_not_defined_and_nesting() {
        let source = "\
#IF_NOT_DEFINED SIMULATION
hardware
#ELSE_IGNORED
#ENDIF
#IF_DEFINED SERIES3
#IF_DEFINED MISSING
inner
#ENDIF
outer
#ENDIF";
        let out = preprocess(source, &[]);
        assert!(!out.source.contains("hardware"));
        assert!(!out.source.contains("inner"));
        assert!(out.source.contains("outer"));
    }

    #[test]
    fn test_external_defines_are_case_folded() {
        let out = preprocess("#IF_DEFINED debug\nx\n#ENDIF", &["Debug".to_string()]);
        assert!(out.source.contains('x'));
    }

    #[test]
    fn test_help_block_is_captured_and_blanked() {
        let source = "#HELP_BEGIN\nPress the button.\nThen wait.\n#HELP_END\nPUSH b {}";
        let out = preprocess(source, &[]);
        assert_eq!(out.help_text, "Press the button.\nThen wait.");
        assert_eq!(out.source, "\n\n\n\nPUSH b {}");
    }

    #[test]
    fn test_unbalanced_endif_is_tolerated() {
        let out = preprocess("#ENDIF\n#ENDIF\nkept", &[]);
        assert!(out.source.ends_with("kept"));
    }

    #[test]
    fn test_informational_directive_kept_and_noted() {
        let out = preprocess("#PRINT_TO_TRACE\nx", &[]);
        assert!(out.source.starts_with("#PRINT_TO_TRACE"));
        assert_eq!(out.notices.len(), 1);
        assert_eq!(out.notices[0].line, 1);
    }
}
