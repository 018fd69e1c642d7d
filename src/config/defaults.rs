//! Default configuration values

/// Program used when a document carries no magic directive
pub const DEFAULT_PROGRAM: &str = "pdflatex";

/// The make-like driver that accepts an engine override
pub const LATEXMK: &str = "latexmk";

/// Project settings file name, looked up next to the root document
pub const SETTINGS_FILE_NAME: &str = "texpipe.toml";

/// Global settings file name inside the config directory
pub const GLOBAL_SETTINGS_FILE_NAME: &str = "config.toml";

/// Application directory name under the platform config directory
pub const APP_DIR_NAME: &str = "texpipe";

/// Arguments of the default latexmk step
pub const DEFAULT_LATEXMK_ARGS: &[&str] = &[
    "-synctex=1",
    "-interaction=nonstopmode",
    "-file-line-error",
    "-pdf",
    "%DOC%",
];

/// Arguments of the default clean command
pub const DEFAULT_CLEAN_ARGS: &[&str] = &["-c", "%DOC%"];

/// Whether clean-and-retry is enabled when unset
pub const DEFAULT_CLEAN_AND_RETRY: bool = true;

/// Whether cleaning is enabled when unset
pub const DEFAULT_CLEAN_ENABLED: bool = false;

/// Read buffer size for child process pipes
pub const OUTPUT_CHUNK_SIZE: usize = 8192;

/// How long to keep reading pipes after the process exited (milliseconds)
///
/// Background children may hold the pipes open indefinitely.
pub const OUTPUT_DRAIN_TIMEOUT_MS: u64 = 250;

/// Debounce window for file watching (milliseconds)
pub const WATCH_DEBOUNCE_MS: u64 = 200;

/// Source file extensions that trigger a rebuild in watch mode
pub const WATCH_EXTENSIONS: &[&str] = &["tex", "bib", "sty", "cls", "bst", "bbx", "cbx"];
