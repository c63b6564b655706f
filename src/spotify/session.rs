use std::ffi::OsStr;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use error_stack::{IntoReport, Report, ResultExt};
use headless_chrome::{Browser, Element, LaunchOptions, Tab};

use crate::config::{AppConfig, Credentials};
use crate::spotify::playlist::embed_url;
use crate::spotify::{SpotifyError, SpotifyResult};
use crate::Suggestion;

fn browser_error<E: Display>(message: &'static str) -> impl FnOnce(E) -> Report<SpotifyError> {
    move |err| Report::new(SpotifyError).attach_printable(format!("{}: {}", message, err))
}

/// A logged-in browser session. The browser process is killed when the
/// session is dropped.
pub struct SpotifySession {
    // Keeps the browser process alive for as long as the tab is used.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl SpotifySession {
    pub fn login(credentials: &Credentials, headless: bool) -> SpotifyResult<Self> {
        let launch_options = LaunchOptions {
            headless,
            window_size: Some(AppConfig::WINDOW_SIZE),
            args: vec![OsStr::new("--disable-gpu")],
            idle_browser_timeout: Duration::from_secs(300),
            ..Default::default()
        };
        let browser = Browser::new(launch_options)
            .map_err(browser_error("Failed to initialize the browser"))
            .attach(Suggestion("make sure Chrome or Chromium is installed".to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(browser_error("Failed to create a new browser tab"))?;
        let session = Self {
            _browser: browser,
            tab,
        };

        eprintln!("Logging in to Spotify as {}", credentials.email.clone().cyan());
        session.submit_login_form(credentials)?;
        std::thread::sleep(AppConfig::AFTER_LOGIN_WAIT);
        Ok(session)
    }

    /// The login page has shipped several flows (username first, one-time code
    /// first, password toggle). Every step except the password field is optional.
    fn submit_login_form(&self, credentials: &Credentials) -> SpotifyResult<()> {
        self.tab
            .navigate_to(AppConfig::LOGIN_URL)
            .map_err(browser_error("Failed to navigate to the login page"))?;

        self.optional_step("fill username", || {
            self.fill(AppConfig::USERNAME_INPUT, &credentials.email, AppConfig::ELEMENT_TIMEOUT)
        });
        self.optional_step("continue", || {
            self.click(AppConfig::LOGIN_BUTTON, AppConfig::ELEMENT_TIMEOUT)
        });
        self.optional_step("password toggle", || {
            let toggle = self
                .tab
                .wait_for_xpath_with_custom_timeout(
                    AppConfig::PASSWORD_TOGGLE_XPATH,
                    AppConfig::PASSWORD_TOGGLE_TIMEOUT,
                )
                .map_err(browser_error("Password toggle not found"))?;
            toggle
                .click()
                .map_err(browser_error("Failed to click the password toggle"))?;
            Ok(())
        });
        self.optional_step("fill username again", || {
            self.fill(AppConfig::USERNAME_INPUT, &credentials.email, AppConfig::ELEMENT_TIMEOUT)
        });

        self.fill(AppConfig::PASSWORD_INPUT, &credentials.password, AppConfig::ELEMENT_TIMEOUT)
            .attach_printable("The password field never appeared")
            .attach(Suggestion(
                "the login page may have changed, try running without --headless".to_string(),
            ))?;

        if let Err(report) = self.click(AppConfig::LOGIN_BUTTON, AppConfig::ELEMENT_TIMEOUT) {
            log::debug!("login button not clickable, submitting with Enter: {:?}", report);
            self.tab
                .press_key("Enter")
                .map_err(browser_error("Failed to submit the login form"))?;
        }
        Ok(())
    }

    fn optional_step<F>(&self, step: &str, action: F)
    where
        F: FnOnce() -> SpotifyResult<()>,
    {
        match action() {
            Ok(()) => log::debug!("login step '{}' done", step),
            Err(report) => log::debug!("login step '{}' skipped: {:?}", step, report),
        }
    }

    fn wait_for(&self, selector: &str, timeout: Duration) -> SpotifyResult<Element<'_>> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(browser_error("Element not found"))
            .attach_printable(selector.to_string())
    }

    fn fill(&self, selector: &str, value: &str, timeout: Duration) -> SpotifyResult<()> {
        let element = self.wait_for(selector, timeout)?;
        element
            .call_js_fn("function() { this.value = ''; }", vec![], false)
            .map_err(browser_error("Failed to clear the input"))?;
        element
            .click()
            .map_err(browser_error("Failed to focus the input"))?;
        element
            .type_into(value)
            .map_err(browser_error("Failed to type into the input"))?;
        Ok(())
    }

    fn click(&self, selector: &str, timeout: Duration) -> SpotifyResult<()> {
        let element = self.wait_for(selector, timeout)?;
        element
            .click()
            .map_err(browser_error("Failed to click the element"))?;
        Ok(())
    }

    /// Opens the playlist embed page with the logged-in session and returns its html.
    pub fn open_embed(&self, playlist_id: &str) -> SpotifyResult<String> {
        let url = embed_url(playlist_id);
        log::info!("opening {}", url);
        self.tab
            .navigate_to(&url)
            .map_err(browser_error("Failed to navigate to the embed page"))?;
        std::thread::sleep(AppConfig::EMBED_LOAD_WAIT);

        self.wait_for(AppConfig::NEXT_DATA_SELECTOR, AppConfig::ELEMENT_TIMEOUT)
            .attach_printable("Could not locate __NEXT_DATA__ on embed page (are you logged in / is the playlist accessible?).")?;
        std::thread::sleep(AppConfig::NEXT_DATA_SETTLE_WAIT);

        self.tab
            .get_content()
            .map_err(browser_error("Failed to read the embed page"))
    }
}

/// Fetches the embed page without logging in. Only works for public playlists.
pub async fn fetch_public_embed(playlist_id: &str) -> SpotifyResult<String> {
    let url = embed_url(playlist_id);
    log::info!("fetching {} without a session", url);
    let response = reqwest::Client::new()
        .get(&url)
        .header("accept-language", "en-US,en;q=0.9")
        .send()
        .await
        .into_report()
        .attach_printable(format!("Failed to fetch {}", url))
        .change_context(SpotifyError)?;
    if !response.status().is_success() {
        return Err(Report::new(SpotifyError)
            .attach_printable(format!("Embed page returned {}", response.status()))
            .attach(Suggestion("private playlists need a login, drop --no-login".to_string())));
    }
    response
        .text()
        .await
        .into_report()
        .change_context(SpotifyError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::embed::next_data_from_html;

    #[test]
    #[ignore] // Requires Chrome, network access and SPOTIFY_* credentials in .env
    fn test_login_and_open_embed() {
        dotenvy::dotenv().ok();
        let credentials = Credentials {
            email: std::env::var("SPOTIFY_EMAIL").unwrap(),
            password: std::env::var("SPOTIFY_PASSWORD").unwrap(),
        };
        let session = SpotifySession::login(&credentials, true).unwrap();
        let html = session.open_embed("6YYCPN91F4xI1Z17Hzn7ir").unwrap();
        assert!(next_data_from_html(&html).is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_fetch_public_embed() {
        let html = fetch_public_embed("37i9dQZF1DXcBWIGoYBM5M").await.unwrap();
        assert!(next_data_from_html(&html).is_ok());
    }
}
