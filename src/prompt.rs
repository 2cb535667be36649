use std::io::{BufRead, Write};

pub const PROMPT: &str = "Number of players to invite: ";

/// A strictly positive whole number, surrounding whitespace allowed.
pub fn parse_target(input: &str) -> Option<u32> {
    let text = input.trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse::<u32>().ok().filter(|&n| n > 0)
}

/// Ask until a valid target is entered. `Ok(None)` means the input was closed.
pub fn read_target<R: BufRead, W: Write>(mut input: R, mut output: W) -> std::io::Result<Option<u32>> {
    let mut line = String::new();
    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match parse_target(&line) {
            Some(target) => return Ok(Some(target)),
            None => writeln!(output, "Please enter a valid positive number!")?,
        }
    }
}
