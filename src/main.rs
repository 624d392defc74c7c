use std::env;
use std::process::exit;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    match args.as_slice() {
        [_, path] => match lox::run_file(path) {
            Ok(outcome) if outcome.had_runtime_error => exit(70),
            Ok(outcome) if outcome.had_error => exit(65),
            Ok(_) => {}
            Err(err) => {
                eprintln!("{err}");
                exit(74);
            }
        },
        [_] => {
            if let Err(err) = lox::run_prompt() {
                eprintln!("{err}");
                exit(74);
            }
        }
        _ => {
            eprintln!("Usage: lox [script]");
            exit(64);
        }
    }
}
