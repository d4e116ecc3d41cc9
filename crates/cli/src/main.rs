use std::process::ExitCode;

fn main() -> ExitCode {
    axonbot_cli::run()
}
