//! `dlm status` – show every known download.

use anyhow::Result;
use dlm_core::{DownloadInfo, Engine};

pub fn run_status(engine: &Engine, json: bool) -> Result<()> {
    let records = engine.all_info();
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No downloads.");
        return Ok(());
    }
    println!("{:<12} {:<9} {:>7} {:>12} {}", "KEY", "STATE", "DONE", "SIZE", "URL");
    for info in &records {
        println!("{}", format_row(info));
    }
    Ok(())
}

fn format_row(info: &DownloadInfo) -> String {
    let size = if info.content_length > 0 {
        info.content_length.to_string()
    } else {
        "-".to_string()
    };
    format!(
        "{:<12} {:<9} {:>6.1}% {:>12} {}",
        info.key,
        info.state.as_str(),
        info.fraction() * 100.0,
        size,
        info.url
    )
}
