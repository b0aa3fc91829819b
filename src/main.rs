use std::process::ExitCode;

fn main() -> ExitCode {
    ExitCode::from(mergedb::cli::run() as u8)
}
