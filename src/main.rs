// Purpose: Provide the cypack binary entry point.
// Inputs/Outputs: Reads process args and exits with the code returned by the CLI dispatcher.
// Invariants: Main must not bypass centralized CLI argument/diagnostic handling.

fn main() {
    let code = cypack::cli::run_cli(std::env::args().skip(1));
    std::process::exit(code);
}
