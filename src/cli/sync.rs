//! Sync command implementation

use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::config::Config;
use crate::remote::{CookieFile, HttpClient, Transport};
use crate::store::ArchiveStore;
use crate::sync::{run_cycle, CycleReport, SyncOptions};

pub async fn run(config: &Config, options: SyncOptions, watch: bool, interval: Option<u64>) -> Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(HttpClient::new(
        config.sync.http_timeout(),
        config.sync.http_retries,
    )?);
    let credentials = CookieFile::new(config.cookie_file());

    if !watch {
        let report = run_cycle(config, &options, transport, &credentials).await?;
        print_report(&report);
        let store = ArchiveStore::open_read_only(&config.database_path())?;
        println!("Total: {}", store.counts()?);
        return Ok(());
    }

    let interval = Duration::from_secs(interval.unwrap_or(config.sync.interval_secs));
    println!("Daemon mode (interval: {}s)", interval.as_secs());
    loop {
        match run_cycle(config, &options, transport.clone(), &credentials).await {
            Ok(report) => {
                print!("[{}] ", Local::now().format("%Y-%m-%d %H:%M:%S"));
                print_report(&report);
            }
            // Another writer holds the database; try again next round
            Err(e) if e.is_fatal() => error!("{}", e),
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(interval).await;
    }
}

fn print_report(report: &CycleReport) {
    for job in &report.completed {
        println!(
            "Updated {} ({} new, {} updated convs; {} processed) in {:.2}s",
            job.label,
            job.merged.new_conversations,
            job.merged.updated_conversations,
            job.merged.counts,
            job.elapsed.as_secs_f64()
        );
    }
    for (label, e) in &report.failures {
        println!("{} sync failed: {}", label, e);
    }
    println!(
        "Updated {} new, {} updated convs; {}",
        report.merged.new_conversations, report.merged.updated_conversations, report.merged.counts
    );
}
