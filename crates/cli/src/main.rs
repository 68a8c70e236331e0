use std::process::ExitCode;

fn main() -> ExitCode {
    debrief_cli::run()
}
