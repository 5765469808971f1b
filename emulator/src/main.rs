mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use session::Session;

const USAGE: &str = "usage: meter-emulator [--transcript <path>]";

fn main() -> ExitCode {
    let transcript = match transcript_arg(env::args().skip(1)) {
        Ok(path) => path,
        Err(message) => {
            eprintln!("{message}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let result = Session::new(transcript.as_deref())
        .and_then(|mut session| drive(io::stdin().lock(), io::stdout().lock(), &mut session));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("meter-emulator: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Feeds lines from `input` to the session until end of input or `exit`.
fn drive<R, W>(mut input: R, mut output: W, session: &mut Session) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    writeln!(output, "meter bench emulator; `help` lists commands, `exit` leaves")?;

    let mut line = String::new();
    loop {
        write!(output, "meter> ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return writeln!(output);
        }

        match line.trim() {
            "" => {}
            command if is_exit(command) => return writeln!(output, "bye"),
            command => {
                for reply in session.handle_command(command)? {
                    writeln!(output, "{reply}")?;
                }
            }
        }
    }
}

fn is_exit(command: &str) -> bool {
    ["exit", "quit"]
        .iter()
        .any(|word| command.eq_ignore_ascii_case(word))
}

fn transcript_arg(mut args: impl Iterator<Item = String>) -> Result<Option<PathBuf>, String> {
    let Some(arg) = args.next() else {
        return Ok(None);
    };

    let path = match arg.strip_prefix("--transcript=") {
        Some(value) => value.to_string(),
        None if arg == "--transcript" => args
            .next()
            .ok_or_else(|| "--transcript needs a path".to_string())?,
        None => return Err(format!("unrecognised argument `{arg}`")),
    };
    match args.next() {
        Some(extra) => Err(format!("unrecognised argument `{extra}`")),
        None => Ok(Some(PathBuf::from(path))),
    }
}
