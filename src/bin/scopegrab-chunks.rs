use std::process::ExitCode;

fn main() -> ExitCode {
    scopegrab_lib::run_chunk_reader()
}
