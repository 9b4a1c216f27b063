use std::process::ExitCode;

fn main() -> ExitCode {
    roofline_cli::run()
}
