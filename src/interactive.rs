use crate::extractor::HiddenParams;
use crate::validation::validate_param;
use anyhow::{anyhow, bail, Result};
use colored::*;
use std::io::{BufRead, Write};

/// Line-based terminal prompts over any reader/writer pair
pub struct Prompter<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl Prompter<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Read one line without its line ending; a closed input is an error
    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if read == 0 {
            bail!("Input closed before an answer was given");
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }

    fn ask(&mut self, label: &str) -> Result<String> {
        write!(self.output, "{} ", format!("{}:", label).bold())?;
        self.output.flush()?;
        self.read_line()
    }

    fn complain(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{} {}", "✗".red(), message.red())?;
        Ok(())
    }

    /// Numbered menu; returns the index of the chosen item
    pub fn select(&mut self, label: &str, items: &[&str]) -> Result<usize> {
        if items.is_empty() {
            return Err(anyhow!("Nothing to select for '{}'", label));
        }

        writeln!(self.output, "{}", label.bold())?;
        for (i, item) in items.iter().enumerate() {
            writeln!(self.output, "  {}. {}", (i + 1).to_string().cyan(), item)?;
        }

        loop {
            let answer = self.ask(&format!("Choose 1-{}", items.len()))?;
            match answer.trim().parse::<usize>() {
                Ok(n) if (1..=items.len()).contains(&n) => return Ok(n - 1),
                _ => self.complain(&format!("Enter a number between 1 and {}", items.len()))?,
            }
        }
    }

    /// Ask until `validate` accepts the answer
    pub fn input<F>(&mut self, label: &str, validate: F) -> Result<String>
    where
        F: Fn(&str) -> Result<()>,
    {
        loop {
            let answer = self.ask(label)?;
            match validate(&answer) {
                Ok(()) => return Ok(answer),
                Err(e) => self.complain(&e.to_string())?,
            }
        }
    }

    pub fn confirm(&mut self, label: &str) -> Result<bool> {
        loop {
            let answer = self.ask(&format!("{} (y/n)", label))?;
            match answer.trim().to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.complain("Please answer y or n")?,
            }
        }
    }

    /// Show `default` and let the user replace it; an empty answer keeps it
    pub fn edit(&mut self, label: &str, default: &str) -> Result<String> {
        writeln!(self.output, "{}", label.bold())?;
        writeln!(self.output, "  {}", default.dimmed())?;
        let answer = self.ask("New value (Enter keeps it)")?;
        if answer.trim().is_empty() {
            Ok(default.to_string())
        } else {
            Ok(answer)
        }
    }
}

/// Ask for every placeholder in order and return the completed script
pub fn fill_parameters<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    params: &mut HiddenParams,
) -> Result<String> {
    for placeholder in params.placeholders.iter_mut() {
        let kind = placeholder.kind;
        let label = format!("{} ({})", placeholder.label, kind);
        let value = prompter.input(&label, |input| validate_param(input, kind))?;
        placeholder.value = Some(value);
    }
    params.render_script()
}

/// Let the user rewrite the script; `None` when they decline to run it
pub fn adjust_script<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    script: &str,
) -> Result<Option<String>> {
    let adjusted = prompter.edit("Script", script)?;
    if adjusted.trim().is_empty() {
        bail!("Script cannot be empty");
    }
    if prompter.confirm("Run this script?")? {
        Ok(Some(adjusted))
    } else {
        Ok(None)
    }
}

/// What the user may do with an extracted answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAction {
    FillAndRun,
    AdjustAndRun,
    RunNow,
    Exit,
}

impl ScriptAction {
    pub fn label(&self) -> &'static str {
        match self {
            ScriptAction::FillAndRun => "Fill in parameters and run",
            ScriptAction::AdjustAndRun => "Adjust the script and run",
            ScriptAction::RunNow => "Run now",
            ScriptAction::Exit => "Exit",
        }
    }
}

/// Menu entries offered for an extracted result
pub fn available_actions(params: &HiddenParams) -> Vec<ScriptAction> {
    if params.has_parameters() {
        vec![ScriptAction::FillAndRun, ScriptAction::AdjustAndRun, ScriptAction::Exit]
    } else if params.has_script() {
        vec![ScriptAction::RunNow, ScriptAction::AdjustAndRun, ScriptAction::Exit]
    } else {
        vec![ScriptAction::Exit]
    }
}

/// Offer the actions for `params` and turn the choice into a script to run
pub fn resolve_script<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    params: &mut HiddenParams,
) -> Result<Option<String>> {
    let actions = available_actions(params);
    if actions == [ScriptAction::Exit] {
        return Ok(None);
    }

    let labels: Vec<&str> = actions.iter().map(|a| a.label()).collect();
    let choice = actions[prompter.select("Select an operation", &labels)?];

    match choice {
        ScriptAction::FillAndRun => {
            let script = fill_parameters(prompter, params)?;
            writeln!(prompter.output, "{}", script.green())?;
            if prompter.confirm("Run this script?")? {
                Ok(Some(script))
            } else {
                Ok(None)
            }
        }
        ScriptAction::AdjustAndRun => adjust_script(prompter, &params.script),
        ScriptAction::RunNow => Ok(Some(params.script.clone())),
        ScriptAction::Exit => Ok(None),
    }
}
