//! Interactive backend setup

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use libchorus::backends::{all_backends, SetupPrompt};
use libchorus::clock::Clock;
use libchorus::{ChorusError, Config};

/// Prompts on the controlling terminal
pub struct TerminalPrompt<R> {
    input: R,
}

impl TerminalPrompt<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self {
            input: io::stdin().lock(),
        }
    }
}

impl<R: BufRead> TerminalPrompt<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Ask a yes/no question, defaulting to no
    pub fn confirm(&mut self, question: &str) -> libchorus::Result<bool> {
        let answer = self.ask(&format!("{} [y/N]", question))?;
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }
}

fn input_error(e: io::Error) -> ChorusError {
    ChorusError::InvalidInput(format!("Failed to read answer: {}", e))
}

impl<R: BufRead> SetupPrompt for TerminalPrompt<R> {
    fn ask(&mut self, question: &str) -> libchorus::Result<String> {
        print!("{}: ", question);
        io::stdout().flush().map_err(input_error)?;

        let mut answer = String::new();
        self.input.read_line(&mut answer).map_err(input_error)?;
        Ok(answer.trim().to_string())
    }

    fn ask_secret(&mut self, question: &str) -> libchorus::Result<String> {
        rpassword::prompt_password(format!("{}: ", question)).map_err(input_error)
    }
}

/// Offer setup for every backend without a config section, then save
///
/// Returns the names of the backends that were configured.
pub fn run_setup<R: BufRead>(
    prompt: &mut TerminalPrompt<R>,
    config: &mut Config,
    config_path: &Path,
    clock: Arc<dyn Clock>,
) -> Result<Vec<String>> {
    let already = config.configured_backends();
    let mut added = Vec::new();

    for backend in all_backends(clock)? {
        if already.iter().any(|name| *name == backend.name()) {
            continue;
        }
        if !prompt.confirm(&format!("Set up {}?", backend.name()))? {
            continue;
        }
        if backend.setup(prompt, config)? {
            added.push(backend.name().to_string());
        }
    }

    if !added.is_empty() {
        config.save(config_path)?;
        println!("Configuration saved to {}", config_path.display());
    }

    Ok(added)
}
