use anyhow::Result;
use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::path::Path;

/// Decides whether a directory that does not exist should be created or whether
/// the invocation should be aborted.
pub trait DirectoryPrompt {
    fn confirm_create(&mut self, directory: &Path) -> Result<bool>;
}

impl<F> DirectoryPrompt for F
where
    F: FnMut(&Path) -> bool,
{
    fn confirm_create(&mut self, directory: &Path) -> Result<bool> {
        Ok(self(directory))
    }
}

/// Asks the user on `output` and reads the answer from `input`.
pub struct InteractivePrompt<R, W> {
    input: R,
    output: W,
}

impl InteractivePrompt<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> InteractivePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> DirectoryPrompt for InteractivePrompt<R, W> {
    fn confirm_create(&mut self, directory: &Path) -> Result<bool> {
        writeln!(self.output, "Directory {} not found.", directory.display())?;
        write!(self.output, "Would you like to create it? (y/n): ")?;
        self.output.flush()?;

        let mut response = String::new();
        self.input.read_line(&mut response)?;

        Ok(is_affirmative(&response))
    }
}

/// Only a single `y` (any case) counts as a yes, everything else (EOF included) is a no.
pub fn is_affirmative(response: &str) -> bool {
    response.trim().eq_ignore_ascii_case("y")
}
