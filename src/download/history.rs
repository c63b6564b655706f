use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use error_stack::{IntoReport, ResultExt};

use crate::config::AppConfig;
use crate::download::{DownloadError, DownloadResult};

/// Plain-text record of finished downloads, one search term per line.
#[derive(Debug)]
pub struct DownloadLog {
    path: PathBuf,
    downloaded_songs: HashSet<String>,
}

impl DownloadLog {
    pub fn get_log_path(songs_dir: &Path) -> PathBuf {
        songs_dir.join(AppConfig::LOG_FILE_NAME)
    }

    /// Reads the log under `songs_dir`. A missing file is an empty log.
    pub fn load(songs_dir: &Path) -> DownloadResult<Self> {
        let path = Self::get_log_path(songs_dir);
        let downloaded_songs = if path.is_file() {
            fs::read_to_string(&path)
                .into_report()
                .attach_printable(format!("Failed to read the log at {}", path.display()))
                .change_context(DownloadError)?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            HashSet::new()
        };
        Ok(Self {
            path,
            downloaded_songs,
        })
    }

    pub fn contains(&self, song: &str) -> bool {
        self.downloaded_songs.contains(song)
    }

    pub fn len(&self) -> usize {
        self.downloaded_songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downloaded_songs.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `song` to the log file, creating the songs directory if needed.
    pub fn record(&mut self, song: &str) -> DownloadResult<()> {
        if let Some(folder) = self.path.parent() {
            fs::create_dir_all(folder)
                .into_report()
                .attach_printable(format!("Failed to create directory at {}", folder.display()))
                .change_context(DownloadError)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .into_report()
            .attach_printable(format!("Failed to open the log at {}", self.path.display()))
            .change_context(DownloadError)?;
        writeln!(file, "{}", song)
            .into_report()
            .attach_printable(format!("Failed to write the log at {}", self.path.display()))
            .change_context(DownloadError)?;
        self.downloaded_songs.insert(song.to_string());
        Ok(())
    }

    pub fn entries(&self) -> Vec<String> {
        let mut entries = self.downloaded_songs.iter().cloned().collect::<Vec<_>>();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = DownloadLog::load(&dir.path().join("songs")).unwrap();
        assert!(log.is_empty());
        assert!(!log.contains("Pendulum - Tarantula"));
    }

    #[test]
    fn test_load_trims_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("downloaded_songs.txt"),
            "Pendulum - Tarantula\n\n  New Order - Blue Monday  \r\nPendulum - Tarantula\n",
        )
        .unwrap();
        let log = DownloadLog::load(dir.path()).unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.contains("New Order - Blue Monday"));
        assert_eq!(
            log.entries(),
            vec!["New Order - Blue Monday", "Pendulum - Tarantula"]
        );
    }

    #[test]
    fn test_record_creates_directory_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let songs_dir = dir.path().join("songs");
        let mut log = DownloadLog::load(&songs_dir).unwrap();
        log.record("Pendulum - Tarantula").unwrap();
        log.record("Pendulum - Watercolour").unwrap();
        assert!(log.contains("Pendulum - Watercolour"));

        let content = fs::read_to_string(songs_dir.join("downloaded_songs.txt")).unwrap();
        assert_eq!(content, "Pendulum - Tarantula\nPendulum - Watercolour\n");

        let reloaded = DownloadLog::load(&songs_dir).unwrap();
        assert_eq!(reloaded.len(), 2);
    }
}
