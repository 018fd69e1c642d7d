//! Toolchain resolution
//!
//! Turns the configured step templates into concrete commands for one
//! document: validates the template shape, expands the path macros in every
//! argument, and applies the program override from the document's magic
//! directive.
//!
//! # Macros
//!
//! - `%DOC%` - document path without its extension
//! - `%DOCFILE%` - document file name without its extension
//! - `%DIR%` - directory containing the document
//!
//! Substituted paths always use forward slashes.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::defaults::{DEFAULT_LATEXMK_ARGS, LATEXMK};
use crate::core::magic;
use crate::error::ToolchainError;

/// A configured toolchain step, as read from settings
///
/// Both fields are kept loose so that shape errors surface as
/// [`ToolchainError`]s at resolution time instead of parse failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    /// Executable to run; an empty string stands for the detected program
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Argument list; must be an array of strings when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<toml::Value>,
}

impl StepTemplate {
    /// Create a template from a command and string arguments
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: Some(command.into()),
            args: Some(toml::Value::Array(
                args.into_iter()
                    .map(|a| toml::Value::String(a.into()))
                    .collect(),
            )),
        }
    }
}

/// The toolchain used when settings configure none
pub fn default_toolchain() -> Vec<StepTemplate> {
    vec![StepTemplate::new(LATEXMK, DEFAULT_LATEXMK_ARGS.iter().copied())]
}

/// A concrete, argument-substituted command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainStep {
    /// Executable to run
    pub command: String,
    /// Arguments, passed without shell interpretation
    pub args: Vec<String>,
}

impl fmt::Display for ToolchainStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// The ordered steps of one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedToolchain {
    /// Program selected by the magic directive (or the default)
    pub program: String,
    /// Steps in execution order
    pub steps: Vec<ToolchainStep>,
}

impl ResolvedToolchain {
    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the toolchain has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step at the given index
    pub fn get(&self, index: usize) -> Option<&ToolchainStep> {
        self.steps.get(index)
    }
}

/// Path values substituted for the toolchain macros
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMacros {
    /// `%DOC%`
    pub doc: String,
    /// `%DOCFILE%`
    pub docfile: String,
    /// `%DIR%`
    pub dir: String,
}

impl DocumentMacros {
    /// Compute macro values for a document path
    pub fn for_document(root_file: &Path) -> Self {
        let doc = normalize_separators(&root_file.with_extension(""));
        let docfile = root_file
            .file_stem()
            .map(|s| s.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let dir = normalize_separators(&document_dir(root_file));
        Self { doc, docfile, dir }
    }
}

/// Directory a document's steps run in
///
/// A bare file name runs in the current directory.
pub fn document_dir(root_file: &Path) -> PathBuf {
    match root_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn normalize_separators(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Expand every macro occurrence in an argument
pub fn substitute_macros(arg: &str, macros: &DocumentMacros) -> String {
    arg.replace("%DOCFILE%", &macros.docfile)
        .replace("%DOC%", &macros.doc)
        .replace("%DIR%", &macros.dir)
}

/// Check the shape of every template
///
/// Stops at the first invalid step.
pub fn validate_templates(templates: &[StepTemplate]) -> Result<(), ToolchainError> {
    for (index, template) in templates.iter().enumerate() {
        if template.command.is_none() {
            return Err(ToolchainError::MissingCommand { index });
        }
        if let Some(args) = &template.args {
            string_args(index, args)?;
        }
    }
    Ok(())
}

fn string_args(index: usize, args: &toml::Value) -> Result<Vec<String>, ToolchainError> {
    let toml::Value::Array(items) = args else {
        return Err(ToolchainError::InvalidArgs {
            index,
            found: args.type_str().to_string(),
        });
    };
    items
        .iter()
        .map(|item| match item {
            toml::Value::String(s) => Ok(s.clone()),
            other => Err(ToolchainError::InvalidArgs {
                index,
                found: format!("array containing {}", other.type_str()),
            }),
        })
        .collect()
}

/// Resolve the toolchain for a document on disk
///
/// Reads the document to look for a magic directive, then delegates to
/// [`resolve_with_text`].
pub fn resolve_toolchain(
    root_file: &Path,
    templates: &[StepTemplate],
) -> Result<ResolvedToolchain, ToolchainError> {
    validate_templates(templates)?;
    let text = std::fs::read_to_string(root_file).map_err(|e| ToolchainError::ReadDocument {
        path: root_file.to_path_buf(),
        error: e.to_string(),
    })?;
    resolve_with_text(root_file, templates, &text)
}

/// Resolve the toolchain given the document's content
///
/// Works on a copy of the templates; the configured list is never modified.
pub fn resolve_with_text(
    root_file: &Path,
    templates: &[StepTemplate],
    text: &str,
) -> Result<ResolvedToolchain, ToolchainError> {
    validate_templates(templates)?;

    let macros = DocumentMacros::for_document(root_file);
    let program = magic::resolve_program(text);
    let override_program = !magic::is_default_program(&program);

    let mut steps = Vec::with_capacity(templates.len());
    for (index, template) in templates.iter().enumerate() {
        let mut command = template.command.clone().unwrap_or_default();
        let mut args = match &template.args {
            Some(value) => string_args(index, value)?,
            None => Vec::new(),
        }
        .into_iter()
        .map(|arg| substitute_macros(&arg, &macros))
        .collect::<Vec<_>>();

        if override_program {
            if command.is_empty() {
                command.clone_from(&program);
            } else if command == LATEXMK {
                args.push(format!("-pdflatex={program}"));
            }
        }

        steps.push(ToolchainStep { command, args });
    }

    Ok(ResolvedToolchain { program, steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators::{macro_free_text, path_segment};
    use proptest::prelude::*;

    fn doc_path() -> PathBuf {
        PathBuf::from("/home/user/thesis/main.tex")
    }

    fn templates() -> Vec<StepTemplate> {
        vec![
            StepTemplate::new("", ["-interaction=nonstopmode", "%DOC%"]),
            StepTemplate::new("bibtex", ["%DOCFILE%"]),
            StepTemplate::new(LATEXMK, ["-pdf", "-outdir=%DIR%/out", "%DOC%"]),
        ]
    }

    #[test]
    fn test_document_macros() {
        let macros = DocumentMacros::for_document(&doc_path());
        assert_eq!(macros.doc, "/home/user/thesis/main");
        assert_eq!(macros.docfile, "main");
        assert_eq!(macros.dir, "/home/user/thesis");
    }

    #[test]
    fn test_document_macros_normalize_backslashes() {
        let macros = DocumentMacros::for_document(Path::new(r"C:\papers\draft.tex"));
        assert!(!macros.doc.contains('\\'));
        assert!(!macros.dir.contains('\\'));
        assert!(macros.doc.ends_with("draft"));
    }

    #[test]
    fn test_document_dir() {
        assert_eq!(document_dir(&doc_path()), PathBuf::from("/home/user/thesis"));
        assert_eq!(document_dir(Path::new("main.tex")), PathBuf::from("."));
    }

    #[test]
    fn test_dir_macro_matches_working_directory_for_bare_name() {
        let macros = DocumentMacros::for_document(Path::new("main.tex"));
        assert_eq!(macros.dir, ".");
        assert_eq!(macros.doc, "main");
        assert_eq!(
            substitute_macros("-outdir=%DIR%/out", &macros),
            "-outdir=./out"
        );
    }

    #[test]
    fn test_substitute_all_occurrences() {
        let macros = DocumentMacros::for_document(&doc_path());
        assert_eq!(
            substitute_macros("%DOCFILE%.aux:%DOCFILE%.log", &macros),
            "main.aux:main.log"
        );
    }

    #[test]
    fn test_default_program_leaves_commands_untouched() {
        let resolved = resolve_with_text(&doc_path(), &templates(), "\\documentclass{x}").unwrap();
        assert_eq!(resolved.program, "pdflatex");
        assert_eq!(resolved.steps[0].command, "");
        assert_eq!(
            resolved.steps[0].args,
            vec!["-interaction=nonstopmode", "/home/user/thesis/main"]
        );
        assert_eq!(resolved.steps[1].args, vec!["main"]);
        assert_eq!(
            resolved.steps[2].args,
            vec!["-pdf", "-outdir=/home/user/thesis/out", "/home/user/thesis/main"]
        );
    }

    #[test]
    fn test_magic_program_overrides_empty_and_latexmk_commands() {
        let resolved =
            resolve_with_text(&doc_path(), &templates(), "% !TEX program = xelatex\n").unwrap();
        assert_eq!(resolved.program, "xelatex");
        assert_eq!(resolved.steps[0].command, "xelatex");
        assert_eq!(resolved.steps[1].command, "bibtex");
        assert_eq!(resolved.steps[1].args, vec!["main"]);
        assert_eq!(resolved.steps[2].command, LATEXMK);
        assert_eq!(
            resolved.steps[2].args.last().map(String::as_str),
            Some("-pdflatex=xelatex")
        );
        assert_eq!(resolved.steps[2].args.len(), 4);
    }

    #[test]
    fn test_resolution_does_not_mutate_templates() {
        let configured = templates();
        let before = configured.clone();
        resolve_with_text(&doc_path(), &configured, "% !TEX program = lualatex\n").unwrap();
        assert_eq!(configured, before);
    }

    #[test]
    fn test_missing_command_is_rejected() {
        let mut configured = templates();
        configured.push(StepTemplate {
            command: None,
            args: None,
        });
        let err = resolve_with_text(&doc_path(), &configured, "").unwrap_err();
        assert_eq!(err, ToolchainError::MissingCommand { index: 3 });
    }

    #[test]
    fn test_non_array_args_are_rejected() {
        let configured = vec![StepTemplate {
            command: Some("pdflatex".to_string()),
            args: Some(toml::Value::String("%DOC%".to_string())),
        }];
        let err = resolve_with_text(&doc_path(), &configured, "").unwrap_err();
        assert!(matches!(err, ToolchainError::InvalidArgs { index: 0, ref found } if found == "string"));
    }

    #[test]
    fn test_array_with_non_string_args_is_rejected() {
        let configured = vec![StepTemplate {
            command: Some("pdflatex".to_string()),
            args: Some(toml::Value::Array(vec![toml::Value::Integer(1)])),
        }];
        assert!(matches!(
            validate_templates(&configured),
            Err(ToolchainError::InvalidArgs { index: 0, .. })
        ));
    }

    #[test]
    fn test_missing_args_resolve_to_empty_list() {
        let configured = vec![StepTemplate {
            command: Some("make".to_string()),
            args: None,
        }];
        let resolved = resolve_with_text(&doc_path(), &configured, "").unwrap();
        assert!(resolved.steps[0].args.is_empty());
    }

    #[test]
    fn test_unreadable_document_is_reported() {
        let err = resolve_toolchain(Path::new("/nonexistent/doc.tex"), &templates()).unwrap_err();
        assert!(matches!(err, ToolchainError::ReadDocument { .. }));
    }

    #[test]
    fn test_step_display() {
        let step = ToolchainStep {
            command: "latexmk".to_string(),
            args: vec!["-pdf".to_string(), "main".to_string()],
        };
        assert_eq!(step.to_string(), "latexmk -pdf main");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_substitution_is_idempotent(
            dir in path_segment(),
            stem in path_segment(),
            prefix in macro_free_text(),
        ) {
            let root = PathBuf::from(format!("/{dir}/{stem}.tex"));
            let macros = DocumentMacros::for_document(&root);
            let arg = format!("{prefix}%DOC%|%DOCFILE%|%DIR%");
            let once = substitute_macros(&arg, &macros);
            prop_assert_eq!(substitute_macros(&once, &macros), once.clone());
            prop_assert_eq!(once, format!("{prefix}/{dir}/{stem}|{stem}|/{dir}"));
        }

        #[test]
        fn prop_substituted_paths_use_forward_slashes(
            parts in proptest::collection::vec(path_segment(), 1..4),
            stem in path_segment(),
        ) {
            let root = PathBuf::from(format!(r"C:\{}\{stem}.tex", parts.join("\\")));
            let macros = DocumentMacros::for_document(&root);
            prop_assert!(!macros.doc.contains('\\'));
            prop_assert!(!macros.dir.contains('\\'));
            prop_assert!(!macros.docfile.contains('\\'));
        }

        #[test]
        fn prop_default_program_matches_plain_substitution(
            args in proptest::collection::vec(macro_free_text(), 0..4),
        ) {
            let configured = vec![StepTemplate::new(LATEXMK, args.iter().cloned())];
            let resolved = resolve_with_text(&doc_path(), &configured, "").unwrap();
            prop_assert_eq!(&resolved.steps[0].command, LATEXMK);
            prop_assert_eq!(&resolved.steps[0].args, &args);
        }
    }
}
