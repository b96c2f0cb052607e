//! Prompt-aware output buffering for interactive device shells.
//!
//! Device CLIs have no framing: a command is finished when the prompt comes
//! back. Output is accumulated in a [`PromptBuffer`] and only the tail is
//! searched for the prompt, so long outputs do not make each check slower.

use std::sync::OnceLock;

use regex::Regex;

/// How many trailing bytes are inspected for a prompt.
const SEARCH_DEPTH: usize = 1000;

fn ansi_escape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid regex"))
}

/// Accumulates shell output until a prompt appears.
#[derive(Debug, Default)]
pub struct PromptBuffer {
    buf: String,
}

impl PromptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the channel, dropping ANSI escapes and carriage returns.
    pub fn push(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        let text = ansi_escape().replace_all(&text, "");
        self.buf.extend(text.chars().filter(|c| *c != '\r'));
    }

    /// True when the last non-blank line of the buffer matches `prompt`.
    pub fn ends_with_prompt(&self, prompt: &Regex) -> bool {
        let mut start = self.buf.len().saturating_sub(SEARCH_DEPTH);
        while !self.buf.is_char_boundary(start) {
            start += 1;
        }
        let tail = self.buf[start..].trim_end();
        match tail.rsplit('\n').next() {
            Some(line) if !line.is_empty() => prompt.is_match(line),
            _ => false,
        }
    }

    /// Drain the buffer, returning everything received so far.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Strip the echoed command line and the trailing prompt from raw output.
pub fn clean_output(raw: &str, command: &str, prompt: &Regex) -> String {
    let mut lines: Vec<&str> = raw.trim_end().lines().collect();

    if let Some(last) = lines.last() {
        if prompt.is_match(last) {
            lines.pop();
        }
    }

    let command = command.trim();
    if !command.is_empty() {
        if let Some(pos) = lines.iter().position(|l| l.trim_end().ends_with(command)) {
            lines.drain(..=pos);
        }
    }

    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }

    lines.join("\n").trim_end().to_string()
}
