use std::process::ExitCode;

mod app;

fn main() -> ExitCode {
    match app::build_app() {
        Ok(wiring) => app::run(wiring),
        Err(code) => code,
    }
}
