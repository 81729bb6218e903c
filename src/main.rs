use std::process::ExitCode;

fn main() -> ExitCode {
    soundmetrics_lib::run()
}
