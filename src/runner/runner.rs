use std::fs::File;
use std::io::{self, Read, Write};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

use encoding_rs::UTF_8;
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::evaluator::Interpreter;
use crate::{run_source, RunError};

// a single pass over a file or a single REPL line can report more than
// one error, so `run` itself never decides the process exit code, it
// just records what went wrong and lets the caller check these after
pub static HAD_ERROR: AtomicBool = AtomicBool::new(false);
pub static HAD_RUNTIME_ERROR: AtomicBool = AtomicBool::new(false);

// runs a whole file through a fresh interpreter and exits with the
// error-tier code appropriate to whatever failed: 65 for a lex/parse/
// resolve error, 70 for a runtime error, 0 otherwise
pub fn run_file(path: &str) -> io::Result<()> {
    let file = File::open(path)?;
    let mut decoder = DecodeReaderBytesBuilder::new().encoding(Some(UTF_8)).build(file);
    let mut source = String::new();
    decoder.read_to_string(&mut source)?;

    let mut interpreter = Interpreter::new();
    run(&mut interpreter, &source, path, false);

    if HAD_ERROR.load(Ordering::Relaxed) {
        process::exit(65);
    }
    if HAD_RUNTIME_ERROR.load(Ordering::Relaxed) {
        process::exit(70);
    }
    Ok(())
}

// line-at-a-time REPL. one interpreter persists for the whole session
// so a variable or function declared on an earlier line is visible to
// later ones. only the error flag resets between lines, so a mistake on
// one line doesn't poison the exit code of an otherwise-successful session
pub fn run_prompt() -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut interpreter = Interpreter::new();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!();
            break;
        }

        run(&mut interpreter, &line, "<stdin>", true);
        HAD_ERROR.store(false, Ordering::Relaxed);
    }
    Ok(())
}

fn run(interpreter: &mut Interpreter, source: &str, file: &str, repl: bool) {
    match run_source(interpreter, source, file) {
        Ok(value) => {
            if repl {
                if let Some(value) = value {
                    println!("{value}");
                }
            }
        }
        Err(err @ RunError::Lex(_)) | Err(err @ RunError::Parse(_)) | Err(err @ RunError::Resolve(_)) => {
            if repl {
                // The session keeps going past this line, so this is a
                // recoverable condition, not a fatal one.
                log::warn!("{err}");
            } else {
                log::error!("{err}");
            }
            eprintln!("{err}");
            HAD_ERROR.store(true, Ordering::Relaxed);
        }
        Err(err @ RunError::Runtime(_)) => {
            log::error!("{err}");
            eprintln!("{err}");
            HAD_RUNTIME_ERROR.store(true, Ordering::Relaxed);
        }
    }
}
