//! Terminal rendering shared by the commands.

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

use crate::automation::ChromiumSession;
use crate::config::Settings;
use crate::error::SetupError;
use crate::models::{ConnectionStatus, Outcome};
use crate::session::{self, LoginProgress};

pub fn print_banner(title: &str, dry_run: bool) {
    println!("\n{}", style(title).bold());
    println!("{}", "=".repeat(50));
    if dry_run {
        println!(
            "{} {}",
            style("DRY RUN").yellow().bold(),
            style("no changes will be made").dim()
        );
    }
}

pub fn outcome_mark(outcome: Outcome) -> StyledObject<&'static str> {
    match outcome {
        Outcome::Success => style("✓").green(),
        Outcome::Failed => style("✗").red(),
        Outcome::Skipped => style("-").yellow(),
    }
}

pub fn status_style(status: ConnectionStatus) -> StyledObject<&'static str> {
    let name = status.as_str();
    match status {
        ConnectionStatus::Success => style(name).green(),
        ConnectionStatus::Failed | ConnectionStatus::Unknown => style(name).red(),
        ConnectionStatus::Pending => style(name).cyan(),
        _ => style(name).yellow(),
    }
}

pub fn progress_bar(len: u64) -> ProgressBar {
    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    progress
}

pub fn spinner() -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.enable_steady_tick(std::time::Duration::from_millis(120));
    progress
}

fn print_login_progress(progress: LoginProgress) {
    match progress {
        LoginProgress::Required { timeout } => {
            println!(
                "{} Not logged in. Please log in in the browser window (waiting up to {}s)",
                style("!").yellow(),
                timeout.as_secs()
            );
        }
        LoginProgress::Waiting { elapsed, timeout } => {
            println!(
                "  {} Still waiting for login... ({}/{}s)",
                style("→").dim(),
                elapsed.as_secs(),
                timeout.as_secs()
            );
        }
        LoginProgress::Succeeded { .. } => {
            println!("{} Login successful", style("✓").green());
        }
    }
}

pub fn print_setup_error(error: &SetupError) {
    println!("{} {}", style("✗ Setup failed:").red().bold(), error);
    if matches!(error, SetupError::LoginTimeout(_)) {
        println!(
            "  {} Run again without --headless and complete the login in the browser",
            style("→").dim()
        );
    }
}

/// Start an authenticated session, printing any setup failure.
pub async fn open_session(settings: &Settings) -> Option<ChromiumSession> {
    println!("{} Starting browser...", style("→").cyan());
    match session::start(settings, &print_login_progress).await {
        Ok(session) => Some(session),
        Err(e) => {
            print_setup_error(&e);
            None
        }
    }
}

pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
