use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use error_stack::{IntoReport, Report, ResultExt};

/// `AppConfig` holds static configuration values for the application,
/// such as the Spotify endpoints and the element ids of the login form.
pub struct AppConfig;

impl AppConfig {
    pub const LOGIN_URL: &'static str = "https://accounts.spotify.com/en/login";
    /// The embed page is used because it ships the whole track list in `__NEXT_DATA__`.
    pub const EMBED_PLAYLIST_URL: &'static str = "https://open.spotify.com/embed/playlist";

    pub const USERNAME_INPUT: &'static str = "#login-username";
    pub const PASSWORD_INPUT: &'static str = "#login-password";
    pub const LOGIN_BUTTON: &'static str = "#login-button";
    pub const PASSWORD_TOGGLE_XPATH: &'static str =
        "//button[contains(., 'Log in with a password')]";
    pub const NEXT_DATA_SELECTOR: &'static str = "script#_next, script#__NEXT_DATA__";

    pub const ELEMENT_TIMEOUT: Duration = Duration::from_secs(20);
    pub const PASSWORD_TOGGLE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const AFTER_LOGIN_WAIT: Duration = Duration::from_secs(5);
    pub const EMBED_LOAD_WAIT: Duration = Duration::from_secs(7);
    pub const NEXT_DATA_SETTLE_WAIT: Duration = Duration::from_secs(1);

    pub const WINDOW_SIZE: (u32, u32) = (1280, 900);

    pub const SEARCH_SUFFIX: &'static str = "official audio";
    pub const AUDIO_FORMAT: &'static str = "mp3";
    pub const AUDIO_QUALITY: &'static str = "192K";

    pub const DEFAULT_SONGS_DIR: &'static str = "songs";
    pub const DEFAULT_YT_DLP_BIN: &'static str = "yt-dlp";
    pub const LOG_FILE_NAME: &'static str = "downloaded_songs.txt";
}

#[derive(Debug)]
pub struct ConfigError;
impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Config error")
    }
}
impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = error_stack::Result<T, ConfigError>;

pub const EMAIL_VAR: &str = "SPOTIFY_EMAIL";
pub const PASSWORD_VAR: &str = "SPOTIFY_PASSWORD";
pub const PLAYLIST_VAR: &str = "PLAYLIST_URL";
pub const SONGS_DIR_VAR: &str = "SONGS_DIR";
pub const FFMPEG_VAR: &str = "FFMPEG_LOCATION";
pub const YT_DLP_VAR: &str = "YT_DLP_BIN";
pub const HEADLESS_VAR: &str = "HEADLESS";

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// Values given on the command line. They win over the environment.
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    pub playlist: Option<String>,
    pub songs_dir: Option<PathBuf>,
    pub ffmpeg_location: Option<PathBuf>,
    pub yt_dlp_bin: Option<String>,
    pub headless: bool,
}

#[derive(Clone)]
pub struct Settings {
    pub email: Option<String>,
    pub password: Option<String>,
    pub playlist: Option<String>,
    pub songs_dir: PathBuf,
    pub ffmpeg_location: Option<PathBuf>,
    pub yt_dlp_bin: String,
    pub headless: bool,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("playlist", &self.playlist)
            .field("songs_dir", &self.songs_dir)
            .field("ffmpeg_location", &self.ffmpeg_location)
            .field("yt_dlp_bin", &self.yt_dlp_bin)
            .field("headless", &self.headless)
            .finish()
    }
}

impl Settings {
    /// Loads the `.env` file into the process environment and resolves the settings from it.
    pub fn load(env_file: Option<&Path>, overrides: SettingsOverrides) -> ConfigResult<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .into_report()
                    .attach_printable(format!("Failed to load env file at {}", path.display()))
                    .change_context(ConfigError)?;
            }
            None => {
                if let Err(err) = dotenvy::dotenv() {
                    log::debug!("no .env file loaded: {}", err);
                }
            }
        }
        Ok(Self::resolve(overrides, |key| std::env::var(key).ok()))
    }

    pub fn resolve<F>(overrides: SettingsOverrides, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let headless_env = non_empty(HEADLESS_VAR)
            .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            email: non_empty(EMAIL_VAR),
            password: non_empty(PASSWORD_VAR),
            playlist: overrides.playlist.or_else(|| non_empty(PLAYLIST_VAR)),
            songs_dir: overrides
                .songs_dir
                .or_else(|| non_empty(SONGS_DIR_VAR).map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(AppConfig::DEFAULT_SONGS_DIR)),
            ffmpeg_location: overrides
                .ffmpeg_location
                .or_else(|| non_empty(FFMPEG_VAR).map(PathBuf::from)),
            yt_dlp_bin: overrides
                .yt_dlp_bin
                .or_else(|| non_empty(YT_DLP_VAR))
                .unwrap_or_else(|| AppConfig::DEFAULT_YT_DLP_BIN.to_string()),
            headless: overrides.headless || headless_env,
        }
    }

    /// Fails with every missing variable named at once.
    pub fn require(&self, login: bool) -> ConfigResult<()> {
        let mut missing = vec![];
        if login && self.email.is_none() {
            missing.push(EMAIL_VAR);
        }
        if login && self.password.is_none() {
            missing.push(PASSWORD_VAR);
        }
        if self.playlist.is_none() {
            missing.push(PLAYLIST_VAR);
        }
        if missing.is_empty() {
            return Ok(());
        }
        Err(Report::new(ConfigError).attach_printable(format!(
            "Please set {} in your .env",
            missing.join(", ")
        )))
    }

    pub fn credentials(&self) -> ConfigResult<Credentials> {
        self.require(true)?;
        match (&self.email, &self.password) {
            (Some(email), Some(password)) => Ok(Credentials {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => Err(Report::new(ConfigError)),
        }
    }

    pub fn playlist(&self) -> ConfigResult<&str> {
        self.playlist
            .as_deref()
            .ok_or_else(|| {
                Report::new(ConfigError)
                    .attach_printable(format!("Please set {} in your .env", PLAYLIST_VAR))
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let settings = Settings::resolve(SettingsOverrides::default(), lookup(&[]));
        assert_eq!(settings.songs_dir, PathBuf::from("songs"));
        assert_eq!(settings.yt_dlp_bin, "yt-dlp");
        assert!(settings.ffmpeg_location.is_none());
        assert!(!settings.headless);
    }

    #[test]
    fn test_overrides_win_over_environment() {
        let overrides = SettingsOverrides {
            playlist: Some("cli-playlist".to_string()),
            songs_dir: Some(PathBuf::from("/tmp/music")),
            ..Default::default()
        };
        let settings = Settings::resolve(
            overrides,
            lookup(&[(PLAYLIST_VAR, "env-playlist"), (SONGS_DIR_VAR, "env-songs"), (HEADLESS_VAR, "TRUE")]),
        );
        assert_eq!(settings.playlist.as_deref(), Some("cli-playlist"));
        assert_eq!(settings.songs_dir, PathBuf::from("/tmp/music"));
        assert!(settings.headless);
    }

    #[test]
    fn test_require_lists_all_missing_variables() {
        let settings = Settings::resolve(
            SettingsOverrides::default(),
            lookup(&[(EMAIL_VAR, "  "), (PASSWORD_VAR, "secret")]),
        );
        let report = settings.require(true).unwrap_err();
        let rendered = format!("{report:?}");
        assert!(rendered.contains("Please set SPOTIFY_EMAIL, PLAYLIST_URL in your .env"));
        assert!(settings.require(false).is_err());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let settings = Settings::resolve(
            SettingsOverrides::default(),
            lookup(&[(EMAIL_VAR, "dj@example.com"), (PASSWORD_VAR, "hunter2"), (PLAYLIST_VAR, "abc")]),
        );
        let credentials = settings.credentials().unwrap();
        assert_eq!(credentials.password, "hunter2");
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }

    #[test]
    fn test_settings_debug_hides_password() {
        let settings = Settings::resolve(
            SettingsOverrides::default(),
            lookup(&[(EMAIL_VAR, "dj@example.com"), (PASSWORD_VAR, "hunter2")]),
        );
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("dj@example.com"));
        assert!(rendered.contains("********"));

        let no_password = Settings::resolve(SettingsOverrides::default(), lookup(&[]));
        assert!(format!("{no_password:?}").contains("password: None"));
    }
}
