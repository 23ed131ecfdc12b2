use std::process::ExitCode;

fn main() -> ExitCode {
    recarga_cli::run()
}
