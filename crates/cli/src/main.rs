use std::process::ExitCode;

fn main() -> ExitCode {
    tradelane_cli::run()
}
