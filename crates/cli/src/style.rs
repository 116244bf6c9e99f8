//! Terminal styling shared by the subcommands.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use timeline_studio_core::notify::{Level, Notification};

pub fn success(msg: &str) -> String {
    format!("{} {}", Style::new().green().apply_to("✓"), msg)
}

pub fn error(msg: &str) -> String {
    format!("{} {}", Style::new().red().apply_to("✗"), msg)
}

pub fn warn(msg: &str) -> String {
    format!("{} {}", Style::new().yellow().apply_to("⚠"), msg)
}

pub fn info(msg: &str) -> String {
    format!("{} {}", Style::new().blue().apply_to("•"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// USD amount. Sub-cent values keep enough digits to stay non-zero.
pub fn money(amount: f64) -> String {
    if amount != 0.0 && amount.abs() < 0.01 {
        format!("${:.4}", amount)
    } else {
        format!("${:.2}", amount)
    }
}

pub fn notification(n: &Notification) -> String {
    match n.level {
        Level::Info => info(&n.message),
        Level::Success => success(&n.message),
        Level::Warning => warn(&n.message),
        Level::Error => error(&n.message),
    }
}

/// A steady-ticking spinner. Call `finish_and_clear` when done.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.set_message(msg.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
