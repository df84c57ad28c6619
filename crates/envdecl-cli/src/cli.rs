//! envdecl CLI - load declaration files into a shell or a child process
//!
//! Usage:
//!   envdecl plan --format json
//!   eval "$(envdecl export --file dev.env)"
//!   envdecl run --confirm -- cargo test

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use envdecl_core::interpolation::DEFAULT_MAX_ROUNDS;
use envdecl_core::{
    load_file, preview_file, ApplyAll, Assignment, FileSpec, Gate, LoadReport, LoaderOptions,
    ProcessEnv, Separator,
};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::{Command, ExitCode};
use tracing_subscriber::EnvFilter;

/// envdecl - Load environment declarations with ${VAR} interpolation
#[derive(Parser)]
#[command(name = "envdecl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Declaration file to load
    #[arg(short, long, global = true, default_value = envdecl_core::source::DEFAULT_FILE_NAME)]
    file: PathBuf,

    /// Fail if the file does not exist instead of loading nothing
    #[arg(long, global = true)]
    require: bool,

    /// Separator placed between prefix/suffix values and the existing value
    #[arg(long, global = true, default_value = ";")]
    separator: String,

    /// Use the host path-list separator (':' on Unix, ';' on Windows)
    #[arg(long, global = true, conflicts_with = "separator")]
    platform_separator: bool,

    /// Maximum nesting depth of substitutions before reporting a circular reference
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ROUNDS)]
    max_rounds: usize,

    /// Stop at the first failing line
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

impl GlobalArgs {
    fn file_spec(&self) -> FileSpec {
        if self.require {
            FileSpec::required(&self.file)
        } else {
            FileSpec::optional(&self.file)
        }
    }

    fn loader_options(&self) -> LoaderOptions {
        let separator = if self.platform_separator {
            Separator::platform()
        } else {
            Separator::new(self.separator.as_str())
        };
        LoaderOptions::default()
            .with_separator(separator)
            .with_max_rounds(self.max_rounds)
            .with_fail_fast(self.fail_fast)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show what would be set, without changing anything
    Plan {
        /// Output format: text, json, yaml
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Apply the file and print shell statements that reproduce the result
    Export {
        /// Shell syntax: posix, powershell
        #[arg(short, long, default_value = "posix")]
        shell: String,

        /// Ask before each assignment
        #[arg(short, long)]
        confirm: bool,
    },

    /// Apply the file, then run a command with the resulting environment
    Run {
        /// Ask before each assignment
        #[arg(short, long)]
        confirm: bool,

        /// Command and arguments to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

/// Run the CLI with the given arguments
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose, cli.global.quiet);

    let spec = cli.global.file_spec();
    let options = cli.global.loader_options();

    match cli.command {
        Commands::Plan { format } => cmd_plan(&spec, options, &format),
        Commands::Export { shell, confirm } => cmd_export(&spec, options, &shell, confirm),
        Commands::Run { confirm, command } => cmd_run(&spec, options, confirm, &command),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Also installs the `log` bridge, so the core's records come through
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    file: String,
    file_missing: bool,
    assignments: &'a [Assignment],
    ignored: &'a [usize],
    failures: Vec<FailureOutput>,
}

#[derive(Serialize)]
struct FailureOutput {
    line: usize,
    key: Option<String>,
    message: String,
}

fn cmd_plan(spec: &FileSpec, options: LoaderOptions, format: &str) -> ExitCode {
    let report = match preview_file(spec, &ProcessEnv, options) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            return ExitCode::from(2);
        }
    };

    let output = PlanOutput {
        file: spec.path().display().to_string(),
        file_missing: report.file_missing,
        assignments: &report.applied,
        ignored: &report.ignored,
        failures: report
            .failures
            .iter()
            .map(|f| FailureOutput {
                line: f.line,
                key: f.error.key.clone(),
                message: f.error.to_string(),
            })
            .collect(),
    };

    match format {
        "json" => match serde_json::to_string_pretty(&output) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                return ExitCode::from(2);
            }
        },
        "yaml" | "yml" => match serde_yaml::to_string(&output) {
            Ok(s) => print!("{}", s),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                return ExitCode::from(2);
            }
        },
        "text" => print_plan_text(&report),
        _ => {
            eprintln!("Unsupported format: {}. Use text, json, or yaml.", format);
            return ExitCode::from(1);
        }
    }

    exit_for(&report)
}

fn print_plan_text(report: &LoadReport) {
    // The core already warned about the missing file
    if report.file_missing {
        return;
    }

    for a in &report.applied {
        println!(
            "{:>4}  {} {} {}",
            a.line,
            a.key.bold(),
            a.operator.token().dimmed(),
            a.value
        );
    }
    for line in &report.ignored {
        eprintln!("{:>4}  {}", line, "ignored (no operator)".dimmed());
    }
    report_failures(report);
}

fn cmd_export(spec: &FileSpec, options: LoaderOptions, shell: &str, confirm: bool) -> ExitCode {
    let syntax = match ShellSyntax::parse(shell) {
        Some(s) => s,
        None => {
            eprintln!("Unsupported shell: {}. Use posix or powershell.", shell);
            return ExitCode::from(1);
        }
    };

    let report = match apply(spec, options, confirm) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let mut skipped = 0;
    for (key, value) in final_values(&report.applied) {
        match syntax.statement(key, value) {
            Some(statement) => println!("{}", statement),
            None => {
                eprintln!(
                    "{} {:?}: not a valid {} variable name, not exported",
                    "✗".red(),
                    key,
                    syntax
                );
                skipped += 1;
            }
        }
    }
    report_failures(&report);

    if skipped > 0 {
        return ExitCode::from(1);
    }
    exit_for(&report)
}

fn cmd_run(spec: &FileSpec, options: LoaderOptions, confirm: bool, command: &[String]) -> ExitCode {
    let Some((program, args)) = command.split_first() else {
        eprintln!("{}: no command given", "Error".red());
        return ExitCode::from(2);
    };

    let report = match apply(spec, options, confirm) {
        Ok(r) => r,
        Err(code) => return code,
    };
    report_failures(&report);

    log::info!("running {}", program);
    match Command::new(program).args(args).status() {
        Ok(status) => match status.code() {
            Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
            // Terminated by a signal
            None => ExitCode::from(1),
        },
        Err(e) => {
            eprintln!("{} {}: {}", "✗".red(), program, e);
            ExitCode::from(127)
        }
    }
}

/// Load into this process's environment, prompting if asked
fn apply(
    spec: &FileSpec,
    options: LoaderOptions,
    confirm: bool,
) -> std::result::Result<LoadReport, ExitCode> {
    let mut env = ProcessEnv;
    let result = if confirm {
        let stdin = io::stdin();
        let mut gate = PromptGate::new(stdin.lock(), io::stderr());
        load_file(spec, &mut env, options, &mut gate)
    } else {
        load_file(spec, &mut env, options, &mut ApplyAll)
    };

    match result {
        Ok(report) => {
            log::info!(
                "{} applied, {} declined, {} ignored, {} failed",
                report.applied.len(),
                report.declined.len(),
                report.ignored.len(),
                report.failures.len()
            );
            Ok(report)
        }
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            Err(ExitCode::from(2))
        }
    }
}

fn report_failures(report: &LoadReport) {
    for failure in &report.failures {
        eprintln!("{} line {}: {}", "✗".red(), failure.line, failure.error);
    }
}

fn exit_for(report: &LoadReport) -> ExitCode {
    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

/// Last value written per key, in first-write order
fn final_values(applied: &[Assignment]) -> Vec<(&str, &str)> {
    let mut values: Vec<(&str, &str)> = Vec::new();
    for a in applied {
        match values.iter_mut().find(|(k, _)| *k == a.key) {
            Some(entry) => entry.1 = a.value.as_str(),
            None => values.push((a.key.as_str(), a.value.as_str())),
        }
    }
    values
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShellSyntax {
    Posix,
    PowerShell,
}

impl ShellSyntax {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "posix" | "sh" | "bash" | "zsh" => Some(ShellSyntax::Posix),
            "powershell" | "pwsh" => Some(ShellSyntax::PowerShell),
            _ => None,
        }
    }

    /// Statement setting `key` to `value`, or `None` if the shell cannot name `key`
    fn statement(self, key: &str, value: &str) -> Option<String> {
        match self {
            ShellSyntax::Posix => {
                if !is_posix_name(key) {
                    return None;
                }
                Some(format!("export {}='{}'", key, value.replace('\'', r"'\''")))
            }
            ShellSyntax::PowerShell => {
                if key.is_empty() {
                    return None;
                }
                Some(format!(
                    "${{env:{}}} = '{}'",
                    escape_braced_name(key),
                    value.replace('\'', "''")
                ))
            }
        }
    }
}

impl std::fmt::Display for ShellSyntax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShellSyntax::Posix => write!(f, "posix"),
            ShellSyntax::PowerShell => write!(f, "powershell"),
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_posix_name(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Backtick-escape the characters that end or escape a `${...}` name
fn escape_braced_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        if matches!(c, '`' | '{' | '}') {
            out.push('`');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    All,
    Quit,
}

impl Answer {
    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Some(Answer::Yes),
            "n" | "no" => Some(Answer::No),
            "a" | "all" => Some(Answer::All),
            "q" | "quit" => Some(Answer::Quit),
            _ => None,
        }
    }
}

/// Asks on `output` and reads the answer from `input` for every assignment
///
/// End of input declines everything that is left.
struct PromptGate<R, W> {
    input: R,
    output: W,
    remaining: Option<bool>,
}

impl<R: BufRead, W: Write> PromptGate<R, W> {
    fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            remaining: None,
        }
    }
}

impl<R: BufRead, W: Write> Gate for PromptGate<R, W> {
    fn should_apply(&mut self, assignment: &Assignment) -> bool {
        if let Some(decision) = self.remaining {
            return decision;
        }

        loop {
            let _ = write!(
                self.output,
                "{} {} {} {} [y/n/a/q] ",
                assignment.operator,
                assignment.key.bold(),
                "->".dimmed(),
                assignment.value
            );
            let _ = self.output.flush();

            let mut answer = String::new();
            match self.input.read_line(&mut answer) {
                Ok(0) | Err(_) => {
                    self.remaining = Some(false);
                    return false;
                }
                Ok(_) => {}
            }

            match Answer::parse(&answer) {
                Some(Answer::Yes) => return true,
                Some(Answer::No) => return false,
                Some(Answer::All) => {
                    self.remaining = Some(true);
                    return true;
                }
                Some(Answer::Quit) => {
                    self.remaining = Some(false);
                    return false;
                }
                None => {
                    let _ = writeln!(self.output, "Please answer y, n, a or q.");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envdecl_core::{Loader, MemoryStore, Operator};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn assignment(key: &str, value: &str) -> Assignment {
        Assignment {
            line: 1,
            key: key.into(),
            operator: Operator::Assign,
            value: value.into(),
        }
    }

    #[test]
    fn test_posix_statement_quotes() {
        let s = ShellSyntax::Posix.statement("GREETING", "it's ${not} expanded");
        assert_eq!(
            s.as_deref(),
            Some(r"export GREETING='it'\''s ${not} expanded'")
        );
    }

    #[test]
    fn test_powershell_statement_quotes() {
        let s = ShellSyntax::PowerShell.statement("GREETING", "it's");
        assert_eq!(s.as_deref(), Some("${env:GREETING} = 'it''s'"));
    }

    #[test]
    fn test_posix_statement_rejects_command_substitution_key() {
        let mut store = MemoryStore::new();
        let report = Loader::default()
            .apply(["$(touch /tmp/owned)=x"], &mut store, &mut ApplyAll)
            .unwrap();
        let values = final_values(&report.applied);
        assert_eq!(values, vec![("$(touch /tmp/owned)", "x")]);

        let (key, value) = values[0];
        assert_eq!(ShellSyntax::Posix.statement(key, value), None);
    }

    #[test]
    fn test_posix_name_rules() {
        assert!(is_posix_name("PATH"));
        assert!(is_posix_name("_private9"));
        assert!(!is_posix_name("9LIVES"));
        assert!(!is_posix_name("my.var"));
        assert!(!is_posix_name("A B"));
        assert!(!is_posix_name("`id`"));
        assert!(!is_posix_name(""));
        assert!(!is_posix_name("ÉTÉ"));
    }

    #[test]
    fn test_powershell_statement_braces_hostile_key() {
        let s = ShellSyntax::PowerShell.statement("$(Remove-Item x)", "v");
        assert_eq!(s.as_deref(), Some("${env:$(Remove-Item x)} = 'v'"));

        let s = ShellSyntax::PowerShell.statement("a}; Remove-Item x; ${b", "v");
        assert_eq!(
            s.as_deref(),
            Some("${env:a`}; Remove-Item x; $`{b} = 'v'")
        );

        let s = ShellSyntax::PowerShell.statement("tick`", "v");
        assert_eq!(s.as_deref(), Some("${env:tick``} = 'v'"));
    }

    #[test]
    fn test_powershell_statement_rejects_empty_key() {
        assert_eq!(ShellSyntax::PowerShell.statement("", "v"), None);
    }

    #[test]
    fn test_shell_syntax_parse() {
        assert_eq!(ShellSyntax::parse("bash"), Some(ShellSyntax::Posix));
        assert_eq!(ShellSyntax::parse("pwsh"), Some(ShellSyntax::PowerShell));
        assert_eq!(ShellSyntax::parse("fish"), None);
    }

    #[test]
    fn test_final_values_keeps_last_write() {
        let applied = vec![
            assignment("PATH", "a"),
            assignment("HOME", "/h"),
            assignment("PATH", "b;a"),
        ];
        assert_eq!(
            final_values(&applied),
            vec![("PATH", "b;a"), ("HOME", "/h")]
        );
    }

    #[test]
    fn test_prompt_gate_answers() {
        let input = Cursor::new("y\nn\nmaybe\nyes\n");
        let mut gate = PromptGate::new(input, Vec::new());

        assert!(gate.should_apply(&assignment("A", "1")));
        assert!(!gate.should_apply(&assignment("B", "2")));
        // "maybe" is re-asked, then "yes"
        assert!(gate.should_apply(&assignment("C", "3")));

        let prompts = String::from_utf8(gate.output).unwrap();
        assert!(prompts.contains("Please answer y, n, a or q."));
    }

    #[test]
    fn test_prompt_gate_all_and_quit() {
        let mut gate = PromptGate::new(Cursor::new("a\n"), Vec::new());
        assert!(gate.should_apply(&assignment("A", "1")));
        assert!(gate.should_apply(&assignment("B", "2")));

        let mut gate = PromptGate::new(Cursor::new("q\ny\n"), Vec::new());
        assert!(!gate.should_apply(&assignment("A", "1")));
        assert!(!gate.should_apply(&assignment("B", "2")));
    }

    #[test]
    fn test_prompt_gate_eof_declines() {
        let mut gate = PromptGate::new(Cursor::new(""), Vec::new());
        assert!(!gate.should_apply(&assignment("A", "1")));
    }

    #[test]
    fn test_cli_parses_global_options() {
        let cli = Cli::try_parse_from([
            "envdecl",
            "plan",
            "--file",
            "dev.env",
            "--require",
            "--separator",
            ":",
            "--max-rounds",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.global.file_spec(), FileSpec::required("dev.env"));
        let options = cli.global.loader_options();
        assert_eq!(options.separator.as_str(), ":");
        assert_eq!(options.max_rounds, 5);
        assert!(!options.fail_fast);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["envdecl", "export"]).unwrap();
        assert_eq!(cli.global.file_spec(), FileSpec::optional(".env"));
        assert_eq!(cli.global.loader_options(), LoaderOptions::default());
    }

    #[test]
    fn test_cli_run_takes_trailing_command() {
        let cli = Cli::try_parse_from(["envdecl", "run", "--", "cargo", "test", "--release"])
            .unwrap();
        match cli.command {
            Commands::Run { command, confirm } => {
                assert!(!confirm);
                assert_eq!(command, vec!["cargo", "test", "--release"]);
            }
            _ => panic!("Expected Run"),
        }
    }
}
