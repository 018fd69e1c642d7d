//! Magic directive detection
//!
//! A document may name the program it should be compiled with in a comment
//! near its top:
//!
//! ```text
//! % !TEX program = xelatex
//! %!TeX TS-program=lualatex
//! ```
//!
//! The first matching line wins. Documents without a directive compile with
//! [`DEFAULT_PROGRAM`].

use std::sync::OnceLock;

use regex::Regex;

use crate::config::defaults::DEFAULT_PROGRAM;

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*%[ \t]*![ \t]*(?i:tex)[ \t]+(?:TS-)?program[ \t]*=[ \t]*(\S+)")
            .expect("magic directive pattern is valid")
    })
}

/// Find the program named by a magic directive, if any
pub fn detect_program(text: &str) -> Option<&str> {
    directive_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Resolve the program a document should be compiled with
///
/// Returns the directive's token, or [`DEFAULT_PROGRAM`] when the document
/// has none. Only a found directive is logged.
pub fn resolve_program(text: &str) -> String {
    match detect_program(text) {
        Some(program) => {
            tracing::info!("Found TeX program by magic comment: {program}");
            program.to_string()
        }
        None => DEFAULT_PROGRAM.to_string(),
    }
}

/// Check whether a program name is the default one
pub fn is_default_program(program: &str) -> bool {
    program == DEFAULT_PROGRAM
}
