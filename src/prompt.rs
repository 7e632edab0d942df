// prompt.rs - Operator prompts with default fallback

use std::io::{self, BufRead, Write};

/// Ask for a path, falling back to `default` when the answer is blank.
/// End of input counts as a blank answer. The answer is trimmed and otherwise
/// used verbatim; nothing checks that it names a real file.
pub fn prompt_path<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    default: &str,
) -> io::Result<String> {
    write!(output, "Enter the full path for {} [default: {}]: ", label, default)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    Ok(resolve_answer(&line, default))
}

fn resolve_answer(line: &str, default: &str) -> String {
    let answer = line.trim();
    if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    }
}
