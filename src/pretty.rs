//! # Terminal rendering of answers
//!
//! Completion endpoints tend to answer in light markdown. [`print_pretty`]
//! renders the common subset to the terminal with `crossterm` colors:
//!
//! | Markdown | Terminal |
//! |----------|----------|
//! | `# Header` (up to `###`) | bold cyan |
//! | `**bold**` | bold |
//! | `*italic*` | italic |
//! | `` `code` `` | yellow |
//! | fenced code block | dark grey label, yellow body |
//!
//! Anything else passes through untouched. Rendering is written against any
//! [`Write`] so the same path serves stdout and tests.

use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor},
};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::error::Error;
use std::io::{Write, stdout};

static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(\w+)?\n([\s\S]*?)```").expect("valid code block regex"));
static INLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"`([^`]+)`|\*\*([^*]+)\*\*|\*([^*]+)\*").expect("valid inline regex")
});

/// Render markdown-ish `text` to stdout.
pub fn print_pretty(text: &str) -> Result<(), Box<dyn Error>> {
    let mut out = stdout();
    render_pretty(text, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Render markdown-ish `text` into `out`.
pub fn render_pretty<W: Write>(text: &str, out: &mut W) -> Result<(), Box<dyn Error>> {
    let mut last_end = 0;

    for cap in CODE_BLOCK_RE.captures_iter(text) {
        let Some(whole) = cap.get(0) else { continue };

        if whole.start() > last_end {
            render_markdown(&text[last_end..whole.start()], out)?;
        }

        let language = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let code = cap.get(2).map(|m| m.as_str()).unwrap_or("");
        render_code_block(code, language, out)?;

        last_end = whole.end();
    }

    if last_end < text.len() {
        render_markdown(&text[last_end..], out)?;
    }
    Ok(())
}

fn render_markdown<W: Write>(text: &str, out: &mut W) -> Result<(), Box<dyn Error>> {
    for line in text.lines() {
        let header = ["### ", "## ", "# "]
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix));

        if let Some(header) = header {
            out.execute(SetForegroundColor(Color::Cyan))?;
            out.execute(SetAttribute(Attribute::Bold))?;
            writeln!(out, "{}", header)?;
            out.execute(SetAttribute(Attribute::Reset))?;
            out.execute(SetForegroundColor(Color::Reset))?;
        } else {
            writeln!(out, "{}", render_inline(line))?;
        }
    }
    Ok(())
}

/// Replace inline code, bold and italic spans with ANSI-styled text.
fn render_inline(line: &str) -> String {
    INLINE_RE
        .replace_all(line, |cap: &Captures| {
            if let Some(code) = cap.get(1) {
                format!("\x1b[33m{}\x1b[0m", code.as_str())
            } else if let Some(bold) = cap.get(2) {
                format!("\x1b[1m{}\x1b[0m", bold.as_str())
            } else if let Some(italic) = cap.get(3) {
                format!("\x1b[3m{}\x1b[0m", italic.as_str())
            } else {
                cap[0].to_string()
            }
        })
        .into_owned()
}

fn render_code_block<W: Write>(code: &str, language: &str, out: &mut W) -> Result<(), Box<dyn Error>> {
    if !language.is_empty() {
        out.execute(SetForegroundColor(Color::DarkGrey))?;
        out.execute(SetAttribute(Attribute::Italic))?;
        writeln!(out, "[{}]", language)?;
        out.execute(SetAttribute(Attribute::Reset))?;
        out.execute(SetForegroundColor(Color::Reset))?;
    }

    out.execute(SetForegroundColor(Color::Yellow))?;
    write!(out, "{}", code)?;
    if !code.ends_with('\n') {
        writeln!(out)?;
    }
    out.execute(SetForegroundColor(Color::Reset))?;
    Ok(())
}
