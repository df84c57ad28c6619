use std::process::ExitCode;

fn main() -> ExitCode {
    envdecl_cli::run()
}
