use std::{
    env, fs,
    io::{self, BufRead, Write},
    process::ExitCode,
    rc::Rc,
};

use rush::{FsResolver, ReplSession, Runner, StdPrint};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    match args.get(1) {
        Some(path) => run_file(path),
        None => repl(),
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: could not read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let base = std::path::Path::new(path).parent().unwrap_or_else(|| std::path::Path::new("."));
    let runner = match Runner::new(&source) {
        Ok(runner) => runner.with_resolver(Rc::new(FsResolver::new(base))),
        Err(errors) => {
            for err in errors {
                eprintln!("{err}");
            }
            return ExitCode::FAILURE;
        }
    };

    match runner.run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {}", err.message);
            if !err.stack_trace.is_empty() {
                eprintln!("{}", err.stack_trace);
            }
            ExitCode::FAILURE
        }
    }
}

fn repl() -> ExitCode {
    let mut session = ReplSession::with_parts(Box::new(StdPrint), Rc::new(FsResolver::new(".")), None);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("rush repl — ctrl-d to exit");
    loop {
        print!(">> ");
        let _ = stdout.flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                println!("{}", session.eval(trimmed));
            }
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
}
