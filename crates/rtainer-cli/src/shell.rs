//! The interactive shell: one command per line, parsed by clap.

use std::io::{BufRead, Write};

use clap::Parser;

use crate::commands::{self, ShellLine};
use crate::context::AppContext;

/// Runs the read-eval loop until `exit` or end of input.
///
/// # Errors
///
/// Returns an error only if stdin or stdout fails.
pub fn run(ctx: &AppContext) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut lines = stdin.lock().lines();

    loop {
        write!(stdout, "rtn> ")?;
        stdout.flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if matches!(tokens[0], "exit" | "quit") {
            break;
        }

        match ShellLine::try_parse_from(std::iter::once("rtn").chain(tokens)) {
            Ok(parsed) => {
                if let Err(e) = commands::execute(ctx, parsed.command) {
                    eprintln!("error: {e:#}");
                }
            }
            Err(e) => {
                // clap renders its own usage/help text.
                eprintln!("{e}");
            }
        }
    }
    Ok(())
}
