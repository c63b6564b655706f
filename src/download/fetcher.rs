use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use error_stack::{IntoReport, Report, ResultExt};
use tokio::process::Command;

use crate::config::AppConfig;
use crate::download::{DownloadError, DownloadResult};
use crate::Suggestion;

/// Removes the characters that are not allowed in Windows file names.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Looks up a song and stores its audio under `output_stem` (a path without extension).
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, query: &str, output_stem: &Path) -> DownloadResult<()>;
}

/// Searches YouTube and extracts the audio of the first hit with the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    pub binary: String,
    pub ffmpeg_location: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(binary: String, ffmpeg_location: Option<PathBuf>) -> Self {
        Self {
            binary,
            ffmpeg_location,
        }
    }

    pub fn search_term(query: &str) -> String {
        format!("ytsearch:{} {}", query, AppConfig::SEARCH_SUFFIX)
    }

    pub fn args(&self, query: &str, output_stem: &Path) -> Vec<OsString> {
        let mut template = output_stem.as_os_str().to_os_string();
        template.push(".%(ext)s");

        let mut args: Vec<OsString> = vec![
            "--format".into(),
            "bestaudio/best".into(),
            "--no-playlist".into(),
            "--quiet".into(),
            "--no-warnings".into(),
            "--output".into(),
            template,
        ];
        if let Some(ffmpeg_location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg_location.as_os_str().to_os_string());
        }
        args.extend([
            "--extract-audio".into(),
            "--audio-format".into(),
            AppConfig::AUDIO_FORMAT.into(),
            "--audio-quality".into(),
            AppConfig::AUDIO_QUALITY.into(),
            Self::search_term(query).into(),
        ]);
        args
    }
}

#[async_trait]
impl AudioFetcher for YtDlp {
    async fn fetch(&self, query: &str, output_stem: &Path) -> DownloadResult<()> {
        let args = self.args(query, output_stem);
        log::debug!("running {} {:?}", self.binary, args);
        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .into_report()
            .attach_printable(format!("Failed to run {}", self.binary))
            .change_context(DownloadError)
            .attach(Suggestion(
                "install yt-dlp or point YT_DLP_BIN to the executable".to_string(),
            ))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Report::new(DownloadError).attach_printable(format!(
                "{} exited with {}: {}",
                self.binary, output.status, stderr
            )));
        }
        Ok(())
    }
}
