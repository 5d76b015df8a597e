//! Terminal output helpers.
//!
//! Styled messages go through `console` and degrade to plain text when the
//! terminal does not support colors. Data meant for piping (secret JSON,
//! HTML, YAML) is printed unstyled by the caller.

use std::io::{BufRead, Write};
use std::time::Duration;

use console::{Emoji, style};
use indicatif::{ProgressBar, ProgressStyle};
use vaultbox_core::identity::UserListing;
use vaultbox_core::reconcile::{Prompt, ReconcileOutcome};

pub static CHECK: Emoji<'_, '_> = Emoji("✔ ", "ok ");
pub static CROSS: Emoji<'_, '_> = Emoji("✖ ", "!! ");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠ ", "!! ");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static PAPER: Emoji<'_, '_> = Emoji("📄 ", "");

// ---------------------------------------------------------------------------
// Message helpers
// ---------------------------------------------------------------------------

/// Print a green success message.
pub fn success(msg: &str) {
    println!("{} {}", style(CHECK).green(), style(msg).green().bold());
}

/// Print a red error message to stderr.
pub fn error(msg: &str) {
    eprintln!("{} {}", style(CROSS).red(), style(msg).red().bold());
}

/// Print a yellow warning message to stderr.
pub fn warn(msg: &str) {
    eprintln!("{} {}", style(WARN_ICON).yellow(), style(msg).yellow());
}

/// Print a section header.
pub fn header(title: &str) {
    println!("\n{}", style(title).bold().underlined());
}

/// Print a key-value pair with styled key.
pub fn kv(key: &str, value: &str) {
    println!("  {:<16} {}", style(format!("{key}:")).dim(), value);
}

/// Print a list of names under a header, or a dim placeholder when empty.
pub fn name_list(title: &str, names: &[String]) {
    header(title);
    if names.is_empty() {
        println!("  {}", style("(none)").dim());
    }
    for name in names {
        println!("  {name}");
    }
}

/// Print one tree entry, indented by depth.
pub fn tree_entry(path: &str, depth: usize) {
    let icon = if path.ends_with('/') { FOLDER } else { PAPER };
    let indent = "  ".repeat(depth.saturating_sub(1));
    println!("{indent}{icon}{path}");
}

/// Pretty-print a JSON value unstyled so it can be piped.
pub fn print_json(value: &serde_json::Value) {
    let formatted = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    println!("{formatted}");
}

// ---------------------------------------------------------------------------
// Spinner
// ---------------------------------------------------------------------------

/// Create and start a spinner on stderr with the given message.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ---------------------------------------------------------------------------
// Command results
// ---------------------------------------------------------------------------

pub fn user_listing(listing: &UserListing) {
    name_list("Userpass users", &listing.userpass_logins);
    let names: Vec<String> = listing.entities.iter().map(|e| e.name.clone()).collect();
    name_list("Entities", &names);
    header("Entity aliases");
    for entity in &listing.entities {
        kv(&entity.name, &entity.aliases.join(", "));
    }
}

/// Summarize a reconcile run.
pub fn reconcile_outcome(kind: &str, outcome: &ReconcileOutcome) {
    if !outcome.upserted.is_empty() {
        success(&format!("{} {kind}(s) written", outcome.upserted.len()));
    }
    for name in &outcome.deleted {
        kv("deleted", name);
    }
    if !outcome.declined.is_empty() {
        warn("Aborting deletion");
    }
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

/// Reads confirmation answers from standard input.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> std::io::Result<String> {
        let mut err = std::io::stderr();
        write!(err, "{}", style(question).yellow())?;
        err.flush()?;
        read_answer(&mut std::io::stdin().lock())
    }
}

/// One line without its line terminator. Other whitespace is kept, so
/// `" yes"` is not `"yes"`.
fn read_answer(input: &mut impl BufRead) -> std::io::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(line)
}
