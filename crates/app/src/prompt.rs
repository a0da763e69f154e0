use std::io::{self, BufRead, Write};

use fj_core::{DecisionOutcome, DecisionRequest};

/// Asks on the terminal until a valid answer arrives. End of input or an
/// empty line dismisses the prompt.
pub fn ask<R: BufRead, W: Write>(
    request: &DecisionRequest,
    input: &mut R,
    output: &mut W,
) -> io::Result<Option<DecisionOutcome>> {
    writeln!(output, "{}: {}", request.title, request.message)?;
    for (index, outcome) in request.outcomes.iter().enumerate() {
        writeln!(output, "  {}) {outcome}", index + 1)?;
    }

    loop {
        write!(output, "> ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        match parse_answer(request, line) {
            Some(outcome) => return Ok(Some(outcome)),
            None => writeln!(output, "unknown answer '{line}'")?,
        }
    }
}

/// Accepts a 1-based choice number or an outcome label on offer.
fn parse_answer(request: &DecisionRequest, line: &str) -> Option<DecisionOutcome> {
    if let Ok(choice) = line.parse::<usize>() {
        return choice
            .checked_sub(1)
            .and_then(|index| request.outcomes.get(index))
            .copied();
    }
    DecisionOutcome::parse(line).filter(|outcome| request.offers(*outcome))
}
