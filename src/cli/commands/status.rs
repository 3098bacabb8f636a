//! Store status report.

use console::style;

use crate::config::Settings;
use crate::models::ConnectionStatus;
use crate::repository::EntityRepository;

use crate::cli::helpers::status_style;

pub fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let db_path = settings.database_path();
    if !db_path.exists() {
        println!("{} No database at {}", style("!").yellow(), db_path.display());
        return Ok(());
    }

    let repo = EntityRepository::new(&db_path)?;
    let counts = repo.count_by_status()?;
    let total: u64 = counts.values().sum();

    println!("\n{}", style("Connection status").bold());
    println!("{}", "-".repeat(40));
    for status in ConnectionStatus::ALL {
        let count = counts.get(status.as_str()).copied().unwrap_or(0);
        println!("{:<20} {}", status_style(status), count);
    }
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "total", total);

    let retry_eligible: u64 = ConnectionStatus::ALL
        .iter()
        .filter(|s| s.is_retry_eligible())
        .filter_map(|s| counts.get(s.as_str()))
        .sum();
    if retry_eligible > 0 {
        println!(
            "\n{} {} profiles will be processed by the next 'netprune remove'",
            style("→").dim(),
            retry_eligible
        );
    }
    Ok(())
}
