//! Solver command templates.
//!
//! A template is a plain command line such as
//! `bin/lingeling BENCHNAME` or `bin/satUZK_wrapper satUZK -budget 900 BENCHNAME`.
//! Placeholders are replaced by literal substring substitution and the result
//! is split on whitespace. There is no quoting and no shell expansion, so an
//! argument can never contain whitespace.

use crate::error::{Error, Result};

/// A program path plus its arguments, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

/// Replace every occurrence of `keyword` in `template` with `value`.
///
/// Replaced text is never rescanned, so a value containing the keyword does
/// not recurse.
pub fn replace_keyword(template: &str, keyword: &str, value: &str) -> String {
    if keyword.is_empty() {
        return template.to_string();
    }
    template.replace(keyword, value)
}

/// Split a command line on whitespace into owned words.
pub fn split_command_line(command: &str) -> Vec<String> {
    command.split_whitespace().map(String::from).collect()
}

/// Placeholder names and the values substituted for them.
#[derive(Debug, Clone)]
pub struct Substitutions<'a> {
    pub benchmark_placeholder: &'a str,
    pub benchmark: &'a str,
    pub scratch_placeholder: &'a str,
    pub scratch_dir: &'a str,
}

/// Expand a solver template into an executable command line.
pub fn expand(solver: &str, template: &str, subs: &Substitutions<'_>) -> Result<CommandLine> {
    let command = replace_keyword(template, subs.benchmark_placeholder, subs.benchmark);
    let command = replace_keyword(&command, subs.scratch_placeholder, subs.scratch_dir);

    let mut words = split_command_line(&command).into_iter();
    let program = words
        .next()
        .ok_or_else(|| Error::EmptyCommand(solver.to_string()))?;

    Ok(CommandLine {
        program,
        args: words.collect(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn subs<'a>(benchmark: &'a str, scratch: &'a str) -> Substitutions<'a> {
        Substitutions {
            benchmark_placeholder: "BENCHNAME",
            benchmark,
            scratch_placeholder: "TMPDIR",
            scratch_dir: scratch,
        }
    }

    #[test]
    fn replaces_every_occurrence() {
        assert_eq!(
            replace_keyword("a BENCHNAME b BENCHNAME", "BENCHNAME", "x.cnf"),
            "a x.cnf b x.cnf"
        );
    }

    #[test]
    fn replacement_is_not_rescanned() {
        assert_eq!(replace_keyword("K", "K", "KK"), "KK");
    }

    #[test]
    fn empty_keyword_is_noop() {
        assert_eq!(replace_keyword("abc", "", "x"), "abc");
    }

    #[test]
    fn split_collapses_whitespace() {
        assert_eq!(
            split_command_line("  bin/solver\t-a   1 \n"),
            vec!["bin/solver", "-a", "1"]
        );
        assert!(split_command_line("   ").is_empty());
    }

    #[test]
    fn expand_substitutes_both_placeholders() {
        let cmd = expand(
            "plingeling",
            "bin/plingeling -t 4 -tmp TMPDIR BENCHNAME",
            &subs("/data/f.cnf", "/tmp"),
        )
        .unwrap();
        assert_eq!(cmd.program, "bin/plingeling");
        assert_eq!(cmd.args, vec!["-t", "4", "-tmp", "/tmp", "/data/f.cnf"]);
    }

    #[test]
    fn expand_rejects_empty_template() {
        let err = expand("ghost", "  ", &subs("f.cnf", "/tmp")).unwrap_err();
        assert!(matches!(err, Error::EmptyCommand(name) if name == "ghost"));
    }
}
