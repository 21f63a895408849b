use std::env;
use std::process;

use lox_interpreter::runner::{run_file, run_prompt};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let result = match args.len() {
        1 => run_prompt(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: lox-interpreter [script]");
            process::exit(64);
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(70);
    }
}
