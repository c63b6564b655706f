use std::fmt;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use error_stack::fmt::{Charset, ColorMode};
use error_stack::{IntoReport, Report, ResultExt};

use crate::config::{Settings, SettingsOverrides};
use crate::download::fetcher::YtDlp;
use crate::download::history::DownloadLog;
use crate::download::pipeline::download_all;
use crate::spotify::embed::next_data_from_html;
use crate::spotify::playlist::{extract_playlist_id, SpotifyPlaylist, TrackListSource};
use crate::spotify::session::{fetch_public_embed, SpotifySession};

mod config;
mod download;
mod spotify;

#[derive(Debug)]
pub struct RipperError;
impl fmt::Display for RipperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Playlist ripper error")
    }
}
impl std::error::Error for RipperError {}

pub type RipperResult<T> = error_stack::Result<T, RipperError>;

/// Downloads the songs of a private Spotify playlist from YouTube
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<RipperCommands>,

    #[command(flatten)]
    options: GlobalOptions,
}

#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Env file to load instead of ./.env
    #[clap(long, global = true)]
    env_file: Option<PathBuf>,
    /// Playlist url or id, overrides PLAYLIST_URL
    #[clap(long, short, global = true)]
    playlist: Option<String>,
    /// Output folder, overrides SONGS_DIR
    #[clap(long, global = true)]
    songs_dir: Option<PathBuf>,
    /// Folder holding the ffmpeg binaries, overrides FFMPEG_LOCATION
    #[clap(long, global = true)]
    ffmpeg_location: Option<PathBuf>,
    /// yt-dlp executable, overrides YT_DLP_BIN
    #[clap(long, global = true)]
    yt_dlp_bin: Option<String>,
    /// Run the browser without a window
    #[clap(long, global = true, action)]
    headless: bool,
    /// Read the embed page without logging in (public playlists only)
    #[clap(long, global = true, action)]
    no_login: bool,
    /// Fail instead of guessing when the page holds several track lists
    #[clap(long, global = true, action)]
    strict: bool,
    /// Print debug logs
    #[clap(long, short, global = true, action)]
    verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Clone)]
enum RipperCommands {
    /// Scrape the playlist and download every song not downloaded yet (default)
    Run {
        /// Only list what would be downloaded
        #[clap(long, action)]
        dry_run: bool,
    },
    /// Scrape the playlist and print its tracks
    Scrape {
        /// Print the playlist as JSON
        #[clap(long, action)]
        json: bool,
    },
    /// Print the songs already downloaded
    History,
}

impl RipperCommands {
    pub async fn execute(&self, options: &GlobalOptions) -> RipperResult<()> {
        let settings = Settings::load(
            options.env_file.as_deref(),
            SettingsOverrides {
                playlist: options.playlist.clone(),
                songs_dir: options.songs_dir.clone(),
                ffmpeg_location: options.ffmpeg_location.clone(),
                yt_dlp_bin: options.yt_dlp_bin.clone(),
                headless: options.headless,
            },
        )
        .change_context(RipperError)?;

        match self {
            RipperCommands::Run { dry_run } => {
                settings
                    .require(!options.no_login)
                    .change_context(RipperError)?;
                let playlist = scrape_playlist(&settings, options).await?;
                let mut downloaded_songs =
                    DownloadLog::load(&settings.songs_dir).change_context(RipperError)?;

                let search_queries = playlist
                    .tracks
                    .iter()
                    .map(|track| track.get_track_search_term())
                    .collect::<Vec<_>>();
                println!("🎵 Found {} songs", search_queries.len().to_string().cyan());
                for search_query in &search_queries {
                    println!("• {}", search_query);
                }

                let fetcher =
                    YtDlp::new(settings.yt_dlp_bin.clone(), settings.ffmpeg_location.clone());
                let summary = download_all(
                    &search_queries,
                    &settings.songs_dir,
                    &fetcher,
                    &mut downloaded_songs,
                    *dry_run,
                )
                .await
                .change_context(RipperError)?;
                println!(
                    "{} downloaded, {} already logged, {} failed{}",
                    summary.downloaded.to_string().green(),
                    summary.skipped.to_string().yellow(),
                    summary.failed.to_string().red(),
                    if *dry_run {
                        format!(", {} to download", summary.pending.to_string().cyan())
                    } else {
                        "".to_string()
                    }
                );
                Ok(())
            }
            RipperCommands::Scrape { json } => {
                settings
                    .require(!options.no_login)
                    .change_context(RipperError)?;
                let playlist = scrape_playlist(&settings, options).await?;
                if *json {
                    println!("{}", playlist_json(&playlist)?);
                    return Ok(());
                }
                let downloaded_songs =
                    DownloadLog::load(&settings.songs_dir).change_context(RipperError)?;
                print_playlist(&playlist, &downloaded_songs);
                Ok(())
            }
            RipperCommands::History => {
                let downloaded_songs =
                    DownloadLog::load(&settings.songs_dir).change_context(RipperError)?;
                if downloaded_songs.is_empty() {
                    println!(
                        "No songs logged yet at {}",
                        downloaded_songs.path().display().to_string().yellow()
                    );
                    return Ok(());
                }
                println!(
                    "{} songs logged at {}",
                    downloaded_songs.len().to_string().cyan(),
                    downloaded_songs.path().display()
                );
                for entry in downloaded_songs.entries() {
                    println!("• {}", entry);
                }
                Ok(())
            }
        }
    }
}

/// Logs in (unless `--no-login`), opens the embed page and reads the track list from it.
/// The browser is closed before this returns.
async fn scrape_playlist(
    settings: &Settings,
    options: &GlobalOptions,
) -> RipperResult<SpotifyPlaylist> {
    let playlist_id = extract_playlist_id(settings.playlist().change_context(RipperError)?)
        .change_context(RipperError)?;
    let html = if options.no_login {
        fetch_public_embed(&playlist_id)
            .await
            .change_context(RipperError)?
    } else {
        let credentials = settings.credentials().change_context(RipperError)?;
        let session =
            SpotifySession::login(&credentials, settings.headless).change_context(RipperError)?;
        session
            .open_embed(&playlist_id)
            .change_context(RipperError)?
    };
    let next_data = next_data_from_html(&html).change_context(RipperError)?;
    let playlist = SpotifyPlaylist::from_next_data(playlist_id, &next_data, options.strict)
        .change_context(RipperError)?;
    if let TrackListSource::StructuralMatch { pointer, candidates } = &playlist.source {
        log::info!(
            "track list read from {} ({} candidate(s))",
            pointer,
            candidates
        );
    }
    // Status lines go to stderr so `scrape --json` leaves stdout to the JSON.
    if let Some(name) = &playlist.name {
        eprintln!("The playlist name is {}", name.clone().green());
    }
    Ok(playlist)
}

fn playlist_json(playlist: &SpotifyPlaylist) -> RipperResult<String> {
    serde_json::to_string_pretty(playlist)
        .into_report()
        .change_context(RipperError)
}

fn print_playlist(playlist: &SpotifyPlaylist, downloaded_songs: &DownloadLog) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Artist", "Title", "Length", "Downloaded"]);
    for (index, track) in playlist.tracks.iter().enumerate() {
        let downloaded = downloaded_songs.contains(&track.get_track_search_term());
        table.add_row(vec![
            (index + 1).to_string(),
            track.subtitle.clone(),
            track.title.clone(),
            track.get_duration_string(),
            if downloaded { "yes" } else { "no" }.to_string(),
        ]);
    }
    println!("{table}");
    println!("🎵 Found {} songs", playlist.tracks.len().to_string().cyan());
}

pub struct Suggestion(String);

impl Suggestion {
    pub fn set_report() {
        Report::set_charset(Charset::Utf8);
        Report::set_color_mode(ColorMode::Color);
        Report::install_debug_hook::<Self>(|Self(value), context| {
            context.push_body(format!("{}: {value}", "suggestion".yellow()))
        });
    }
}

fn init_logger(verbose: bool) {
    let mut clog = colog::default_builder();
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    clog.filter(None, level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        clog.parse_filters(&filters);
    }
    clog.init();
}

async fn run() -> RipperResult<()> {
    let cli = Cli::parse();

    init_logger(cli.options.verbose);
    Suggestion::set_report();

    let command = cli
        .command
        .clone()
        .unwrap_or(RipperCommands::Run { dry_run: false });
    command.execute(&cli.options).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> RipperResult<()> {
    run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["playlist-ripper", "--headless"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.options.headless);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "playlist-ripper",
            "run",
            "--dry-run",
            "--playlist",
            "https://open.spotify.com/playlist/abc",
            "--strict",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(RipperCommands::Run { dry_run: true }));
        assert_eq!(
            cli.options.playlist.as_deref(),
            Some("https://open.spotify.com/playlist/abc")
        );
        assert!(cli.options.strict);
    }

    #[test]
    fn test_playlist_json_is_the_whole_output() {
        let next_data = serde_json::json!({
            "props": {"pageProps": {"state": {"data": {"entity": {
                "name": "Friday DnB",
                "trackList": [{"title": "Tarantula", "subtitle": "Pendulum", "duration": 330000}]
            }}}}}
        });
        let playlist = SpotifyPlaylist::from_next_data("abc".to_string(), &next_data, true).unwrap();
        let rendered = playlist_json(&playlist).unwrap();
        assert!(rendered.trim_start().starts_with('{'));
        assert!(!rendered.contains("The playlist name is"));

        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["name"], "Friday DnB");
        assert_eq!(parsed["tracks"][0]["subtitle"], "Pendulum");
    }

    #[test]
    fn test_cli_scrape_json() {
        let cli = Cli::try_parse_from(["playlist-ripper", "scrape", "--json", "--no-login"]).unwrap();
        assert_eq!(cli.command, Some(RipperCommands::Scrape { json: true }));
        assert!(cli.options.no_login);
    }
}
