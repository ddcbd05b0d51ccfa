//! CLI command definitions and argument parsing.
//!
//! Uses clap derive macros for ergonomic argument definitions.

pub mod args;

/// One-line description with ANSI styling for clap help output.
pub const ABOUT: &str =
    "\x1b[1mdensa\x1b[0m \x1b[2m· Turns commits and pull requests into LLM-written contribution reports.\x1b[0m";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn about_names_the_tool() {
        assert!(ABOUT.contains("densa"));
    }
}
