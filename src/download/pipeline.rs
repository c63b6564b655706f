use std::fs;
use std::path::Path;

use colored::Colorize;
use error_stack::{IntoReport, ResultExt};
use indicatif::{ProgressBar, ProgressStyle};

use crate::download::fetcher::{safe_filename, AudioFetcher};
use crate::download::history::DownloadLog;
use crate::download::{DownloadError, DownloadResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded,
    Skipped,
    /// Not fetched because of `--dry-run`.
    Pending,
    Failed(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub pending: usize,
    pub failed: usize,
}

impl DownloadSummary {
    fn count(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded => self.downloaded += 1,
            DownloadOutcome::Skipped => self.skipped += 1,
            DownloadOutcome::Pending => self.pending += 1,
            DownloadOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Downloads one song unless the log already has it. A failed fetch is an
/// outcome, not an error: the song stays out of the log and the caller moves on.
/// Errors are reserved for the local filesystem. The songs directory is
/// created up front on real runs, even when the song is skipped; a dry run
/// touches nothing.
pub async fn download_song(
    search_query: &str,
    songs_dir: &Path,
    fetcher: &dyn AudioFetcher,
    downloaded_songs: &mut DownloadLog,
    dry_run: bool,
) -> DownloadResult<DownloadOutcome> {
    if !dry_run {
        fs::create_dir_all(songs_dir)
            .into_report()
            .attach_printable(format!("Failed to create directory at {}", songs_dir.display()))
            .change_context(DownloadError)?;
    }
    if downloaded_songs.contains(search_query) {
        return Ok(DownloadOutcome::Skipped);
    }
    if dry_run {
        return Ok(DownloadOutcome::Pending);
    }

    let output_stem = songs_dir.join(safe_filename(search_query));
    if let Err(report) = fetcher.fetch(search_query, &output_stem).await {
        log::debug!("fetch failed for {}: {:?}", search_query, report);
        return Ok(DownloadOutcome::Failed(failure_reason(&report)));
    }
    downloaded_songs.record(search_query)?;
    Ok(DownloadOutcome::Downloaded)
}

fn failure_reason(report: &error_stack::Report<DownloadError>) -> String {
    report
        .frames()
        .find_map(|frame| frame.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| report.to_string())
}

/// Downloads the songs one after another and prints a line per song.
pub async fn download_all(
    search_queries: &[String],
    songs_dir: &Path,
    fetcher: &dyn AudioFetcher,
    downloaded_songs: &mut DownloadLog,
    dry_run: bool,
) -> DownloadResult<DownloadSummary> {
    let pb = ProgressBar::new(search_queries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.white/blue}] {pos}/{len} {msg}")
            .into_report()
            .change_context(DownloadError)?
            .progress_chars("█  "),
    );

    let mut summary = DownloadSummary::default();
    for search_query in search_queries {
        pb.set_message(search_query.clone());
        let outcome =
            download_song(search_query, songs_dir, fetcher, downloaded_songs, dry_run).await?;
        match &outcome {
            DownloadOutcome::Downloaded => {
                pb.println(format!("✅ Downloaded: {}", search_query.clone().green()))
            }
            DownloadOutcome::Skipped => pb.println(format!(
                "⚠️ Skipped (already logged): {}",
                search_query.clone().yellow()
            )),
            DownloadOutcome::Pending => {
                pb.println(format!("Would download: {}", search_query.clone().cyan()))
            }
            DownloadOutcome::Failed(reason) => pb.println(format!(
                "❌ Failed to download: {} - {}",
                search_query.clone().red(),
                reason
            )),
        }
        summary.count(&outcome);
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(summary)
}
