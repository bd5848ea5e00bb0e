//! Command-line parsing
//!
//! Legacy flag spellings are rewritten to their clap long forms before
//! parsing, so `-nc` and `/nc` behave like `--nocores`.

mod args;

pub use args::{Args, ModeArg, UsageError};

/// Map a legacy spelling to its long flag
fn legacy_flag(arg: &str) -> Option<&'static str> {
    match arg {
        "-nc" | "/nc" => Some("--nocores"),
        "-ns" | "/ns" => Some("--nosockets"),
        "-nsys" | "/nsys" => Some("--nosystem"),
        "-csv" | "/csv" => Some("--csv"),
        "/h" => Some("--help"),
        _ => None,
    }
}

/// Rewrite legacy flags; the program name (first item) is left alone
pub fn normalize_legacy_flags<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    args.next()
        .into_iter()
        .chain(args.map(|arg| legacy_flag(&arg).map_or(arg, str::to_string)))
        .collect()
}
