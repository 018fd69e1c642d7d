//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a single path component (no separators, dots, or macros)
    pub fn path_segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_-]{1,12}"
    }

    /// Generate argument text that contains no macro markers
    pub fn macro_free_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 =_./-]{0,16}"
    }

    /// Generate a program name for a magic directive
    pub fn program_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,15}"
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::core::magic::detect_program;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_path_segment_generator(segment in path_segment()) {
            prop_assert!(!segment.is_empty());
            prop_assert!(!segment.contains(['/', '\\', '.', '%']));
        }

        #[test]
        fn test_macro_free_text_generator(text in macro_free_text()) {
            prop_assert!(!text.contains('%'));
        }

        #[test]
        fn test_directive_token_round_trips(program in program_name(), body in macro_free_text()) {
            let text = format!("% !TEX program = {program}\n{body}\n");
            prop_assert_eq!(detect_program(&text), Some(program.as_str()));
        }

        #[test]
        fn test_text_without_directive_has_no_program(body in macro_free_text()) {
            prop_assert_eq!(detect_program(&body), None);
        }
    }
}
