//! Queue import command.

use std::path::PathBuf;

use console::style;

use crate::config::Settings;
use crate::crawl::normalize_profile_url;
use crate::export::read_url_column;
use crate::repository::EntityRepository;

/// Insert every URL of a CSV file as a pending entity.
pub fn cmd_load(settings: &Settings, input_csv: Option<PathBuf>) -> anyhow::Result<()> {
    let path = input_csv.unwrap_or_else(|| settings.urls_csv_path());
    if !path.exists() {
        println!("{} File not found: {}", style("✗").red(), path.display());
        return Ok(());
    }

    let urls = read_url_column(&path)?;
    let repo = EntityRepository::new(&settings.database_path())?;

    let mut added = 0;
    let mut existing = 0;
    for url in &urls {
        let id = normalize_profile_url(url).unwrap_or_else(|| url.clone());
        if repo.insert_if_absent(&id)? {
            added += 1;
        } else {
            existing += 1;
        }
    }

    println!(
        "{} Loaded {} URLs from {}",
        style("✓").green(),
        urls.len(),
        path.display()
    );
    println!("{:<20} {}", "New (pending):", added);
    println!("{:<20} {}", "Already tracked:", existing);
    Ok(())
}
