use std::io::{self, BufRead, Write};

use harvest_engine::Confirm;

/// Asks on stdout and reads the answer from stdin. Anything but `y`/`yes`
/// (or a closed stdin) counts as no.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, message: &str) -> bool {
        let mut stdout = io::stdout().lock();
        if write!(stdout, "{message} [y/N] ").is_err() || stdout.flush().is_err() {
            return false;
        }
        drop(stdout);

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_yes(&answer),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
