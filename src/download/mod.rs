use std::fmt;

pub mod fetcher;
pub mod history;
pub mod pipeline;

#[derive(Debug)]
pub struct DownloadError;

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Download error")
    }
}

impl std::error::Error for DownloadError {}

pub type DownloadResult<T> = error_stack::Result<T, DownloadError>;
