use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

use crate::error::Result;

/// Source of answers for values the pipeline could not preselect.
pub trait Prompter {
    /// Whether questions may be asked at all.
    fn is_interactive(&self) -> bool;
    fn input(&self, message: &str, default: &str) -> Result<String>;
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
    /// Returns the index of the chosen option.
    fn select(&self, message: &str, options: &[String], default: usize) -> Result<usize>;
}

/// Asks on the attached terminal.
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        true
    }

    fn input(&self, message: &str, default: &str) -> Result<String> {
        let mut input = Input::<String>::with_theme(&self.theme).with_prompt(message);
        if !default.is_empty() {
            input = input.default(default.to_string());
        }
        Ok(input.allow_empty(true).interact_text()?)
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(message)
            .default(default)
            .interact()?)
    }

    fn select(&self, message: &str, options: &[String], default: usize) -> Result<usize> {
        Ok(Select::with_theme(&self.theme)
            .with_prompt(message)
            .items(options)
            .default(default)
            .interact()?)
    }
}

/// Never asks; every question resolves to its default.
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn is_interactive(&self) -> bool {
        false
    }

    fn input(&self, _message: &str, default: &str) -> Result<String> {
        Ok(default.to_string())
    }

    fn confirm(&self, _message: &str, default: bool) -> Result<bool> {
        Ok(default)
    }

    fn select(&self, _message: &str, _options: &[String], default: usize) -> Result<usize> {
        Ok(default)
    }
}

/// Pick the terminal prompter when a terminal is attached and prompting is
/// not disabled.
pub fn for_session(non_interactive: bool) -> Box<dyn Prompter> {
    if !non_interactive && crate::platform::stdio_is_terminal() {
        Box::new(TerminalPrompter::new())
    } else {
        Box::new(NoPrompt)
    }
}


#[cfg(test)]
mod tests {
    use super::scripted::ScriptedPrompter;
    use super::*;

    #[test]
    fn no_prompt_returns_defaults() {
        let p = NoPrompt;
        assert!(!p.is_interactive());
        assert_eq!(p.input("title", "x").unwrap(), "x");
        assert!(p.confirm("ok?", true).unwrap());
        assert_eq!(p.select("pick", &["a".into(), "b".into()], 1).unwrap(), 1);
    }

    #[test]
    fn scripted_answers_in_order() {
        let p = ScriptedPrompter::new(&["hello", "no", "b"]);
        assert_eq!(p.input("title", "x").unwrap(), "hello");
        assert!(!p.confirm("ok?", true).unwrap());
        assert_eq!(p.select("pick", &["a".into(), "b".into()], 0).unwrap(), 1);
        assert_eq!(p.remaining(), 0);
        assert_eq!(p.asked.borrow().len(), 3);
    }
}
