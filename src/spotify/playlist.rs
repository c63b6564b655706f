use colored::Colorize;
use error_stack::Report;
use lazy_regex::regex_is_match;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::AppConfig;
use crate::spotify::embed::{find_track_lists, TrackListCandidate};
use crate::spotify::track::SpotifyTrack;
use crate::spotify::{SpotifyError, SpotifyResult};
use crate::Suggestion;

const KNOWN_ENTITY_POINTER: &str = "/props/pageProps/state/data/entity";

/// Where the track list was found in the embed payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TrackListSource {
    KnownPath,
    StructuralMatch { pointer: String, candidates: usize },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SpotifyPlaylist {
    pub name: Option<String>,
    pub spotify_playlist_id: String,
    pub tracks: Vec<SpotifyTrack>,
    pub source: TrackListSource,
}

/// Accepts a full playlist url or a raw id and returns the playlist id.
pub fn extract_playlist_id(url_or_id: &str) -> SpotifyResult<String> {
    let url_or_id = url_or_id.trim();
    if regex_is_match!(r"^[A-Za-z0-9]+$", url_or_id) {
        return Ok(url_or_id.to_string());
    }
    let id = match Url::parse(url_or_id) {
        Ok(playlist_url) => playlist_id_from_path(playlist_url.path()),
        // "/playlist/<id>" or "playlist/<id>?si=..." without scheme and host
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let path = url_or_id.split(['?', '#']).next().unwrap_or_default();
            playlist_id_from_path(path)
        }
        Err(err) => {
            return Err(Report::new(err)
                .change_context(SpotifyError)
                .attach_printable("Could not extract playlist id from PLAYLIST_URL"))
        }
    };
    id.ok_or_else(invalid_playlist_url)
}

fn playlist_id_from_path(path: &str) -> Option<String> {
    let mut sections = path.split('/').filter(|section| !section.is_empty());
    match (sections.next(), sections.next()) {
        (Some("playlist"), Some(id)) => Some(id.to_string()),
        _ => None,
    }
}

fn invalid_playlist_url() -> Report<SpotifyError> {
    Report::new(SpotifyError)
        .attach_printable("Could not extract playlist id from PLAYLIST_URL")
        .attach(Suggestion(
            "use an url like https://open.spotify.com/playlist/<id> or the raw id".to_string(),
        ))
}

pub fn embed_url(playlist_id: &str) -> String {
    format!("{}/{}", AppConfig::EMBED_PLAYLIST_URL, playlist_id)
}

impl SpotifyPlaylist {
    /// Reads the playlist from the embed page payload.
    ///
    /// The track list is taken from `props.pageProps.state.data.entity.trackList`.
    /// When that path is missing, the payload is searched with
    /// [`find_track_lists`]. Several matches mean the wrong list might be picked:
    /// with `strict` that is an error, otherwise the first match in document
    /// order is used and every candidate is reported.
    pub fn from_next_data(
        spotify_playlist_id: String,
        next_data: &Value,
        strict: bool,
    ) -> SpotifyResult<Self> {
        let entity = next_data.pointer(KNOWN_ENTITY_POINTER);
        let known_list = entity.and_then(|entity| entity.get("trackList"));

        // Only a missing key falls back to the search. A present but null or
        // malformed list means the page has no tracks for us.
        let (entries, source) = match known_list {
            Some(Value::Array(list)) => (list.as_slice(), TrackListSource::KnownPath),
            Some(other) => {
                log::debug!("trackList at {} is not an array: {}", KNOWN_ENTITY_POINTER, other);
                return Err(track_list_not_found());
            }
            None => {
                log::debug!(
                    "trackList not found at {}, searching the payload",
                    KNOWN_ENTITY_POINTER
                );
                let candidates = find_track_lists(next_data);
                let chosen = Self::choose_candidate(&candidates, strict)?;
                (
                    chosen.entries,
                    TrackListSource::StructuralMatch {
                        pointer: chosen.pointer.clone(),
                        candidates: candidates.len(),
                    },
                )
            }
        };

        let tracks = entries
            .iter()
            .filter_map(SpotifyTrack::from_entry)
            .collect::<Vec<_>>();
        if tracks.is_empty() {
            return Err(track_list_not_found());
        }

        let name = entity
            .and_then(|entity| entity.get("name").or_else(|| entity.get("title")))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            name,
            spotify_playlist_id,
            tracks,
            source,
        })
    }

    fn choose_candidate<'a, 'b>(
        candidates: &'b [TrackListCandidate<'a>],
        strict: bool,
    ) -> SpotifyResult<&'b TrackListCandidate<'a>> {
        let first = candidates.first().ok_or_else(track_list_not_found)?;
        if candidates.len() > 1 {
            let pointers = candidates
                .iter()
                .map(|candidate| candidate.pointer.clone())
                .collect::<Vec<_>>()
                .join(", ");
            if strict {
                return Err(Report::new(SpotifyError)
                    .attach_printable(format!(
                        "Found {} track lists in embed JSON: {}",
                        candidates.len(),
                        pointers
                    ))
                    .attach(Suggestion(
                        "run without --strict to use the first one".to_string(),
                    )));
            }
            log::warn!(
                "found {} track lists in embed JSON ({}), using {}",
                candidates.len(),
                pointers,
                first.pointer
            );
            eprintln!(
                "{}",
                format!(
                    "Several track lists found on the embed page, using the one at {}. The result may be the wrong list.",
                    first.pointer
                )
                .yellow()
            );
        }
        Ok(first)
    }
}

fn track_list_not_found() -> Report<SpotifyError> {
    Report::new(SpotifyError)
        .attach_printable("Track list not found in embed JSON (structure may have changed).")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_extract_playlist_id() {
        assert_eq!(
            extract_playlist_id("37i9dQZF1DXcBWIGoYBM5M").unwrap(),
            "37i9dQZF1DXcBWIGoYBM5M"
        );
        assert_eq!(
            extract_playlist_id("https://open.spotify.com/playlist/6YYCPN91F4xI1Z17Hzn7ir?si=abc")
                .unwrap(),
            "6YYCPN91F4xI1Z17Hzn7ir"
        );
        assert_eq!(
            extract_playlist_id("https://open.spotify.com/playlist/6YYCPN91F4xI1Z17Hzn7ir/").unwrap(),
            "6YYCPN91F4xI1Z17Hzn7ir"
        );
    }

    #[test]
    fn test_extract_playlist_id_without_scheme() {
        assert_eq!(extract_playlist_id("/playlist/abc").unwrap(), "abc");
        assert_eq!(extract_playlist_id("playlist/abc?si=1").unwrap(), "abc");
        assert!(extract_playlist_id("open.spotify.com/playlist/abc").is_err());
        assert!(extract_playlist_id("/album/abc").is_err());
    }

    #[test]
    fn test_extract_playlist_id_rejects_other_urls() {
        assert!(extract_playlist_id("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3").is_err());
        assert!(extract_playlist_id("https://open.spotify.com/playlist").is_err());
        assert!(extract_playlist_id("not a url").is_err());
        assert!(extract_playlist_id("").is_err());
    }

    fn known_path_payload() -> Value {
        json!({
            "props": {"pageProps": {"state": {"data": {"entity": {
                "name": "Friday DnB",
                "trackList": [
                    {"uri": "spotify:track:1", "title": "Tarantula", "subtitle": "Pendulum", "duration": 330000},
                    {"uri": "spotify:track:2", "title": "", "subtitle": "Nobody"},
                    {"uri": "spotify:track:3", "title": "Watercolour", "subtitle": "Pendulum"}
                ]
            }}}}}
        })
    }

    #[test]
    fn test_from_next_data_known_path() {
        let playlist =
            SpotifyPlaylist::from_next_data("abc".to_string(), &known_path_payload(), true).unwrap();
        assert_eq!(playlist.name.as_deref(), Some("Friday DnB"));
        assert_eq!(playlist.source, TrackListSource::KnownPath);
        let queries = playlist
            .tracks
            .iter()
            .map(SpotifyTrack::get_track_search_term)
            .collect::<Vec<_>>();
        assert_eq!(queries, vec!["Pendulum - Tarantula", "Pendulum - Watercolour"]);
    }

    #[test]
    fn test_from_next_data_falls_back_to_structural_query() {
        let payload = json!({
            "props": {"pageProps": {"layout": {"rows": [
                {"kind": "header", "title": "x"},
                {"items": [
                    {"title": "Blue Monday", "subtitle": "New Order"},
                    {"title": "Age of Consent", "subtitle": "New Order"}
                ]}
            ]}}}
        });
        let playlist = SpotifyPlaylist::from_next_data("abc".to_string(), &payload, true).unwrap();
        assert_eq!(playlist.tracks.len(), 2);
        assert_eq!(
            playlist.source,
            TrackListSource::StructuralMatch {
                pointer: "/props/pageProps/layout/rows/1/items".to_string(),
                candidates: 1
            }
        );
        assert!(playlist.name.is_none());
    }

    #[test]
    fn test_ambiguous_track_lists() {
        let payload = json!({
            "first": [{"title": "One", "subtitle": "A"}],
            "second": [{"title": "Two", "subtitle": "B"}]
        });
        assert!(SpotifyPlaylist::from_next_data("abc".to_string(), &payload, true).is_err());

        let playlist = SpotifyPlaylist::from_next_data("abc".to_string(), &payload, false).unwrap();
        assert_eq!(playlist.tracks[0].title, "One");
        assert_eq!(
            playlist.source,
            TrackListSource::StructuralMatch {
                pointer: "/first".to_string(),
                candidates: 2
            }
        );
    }

    #[test]
    fn test_null_known_list_does_not_fall_back() {
        let payload = json!({
            "props": {"pageProps": {
                "state": {"data": {"entity": {"name": "Mine", "trackList": null}}},
                "recommended": [{"title": "Wrong", "subtitle": "List"}]
            }}
        });
        let report = SpotifyPlaylist::from_next_data("abc".to_string(), &payload, true).unwrap_err();
        assert!(format!("{report:?}").contains("Track list not found"));

        let malformed = json!({
            "props": {"pageProps": {
                "state": {"data": {"entity": {"trackList": {"items": []}}}},
                "recommended": [{"title": "Wrong", "subtitle": "List"}]
            }}
        });
        assert!(SpotifyPlaylist::from_next_data("abc".to_string(), &malformed, false).is_err());
    }

    #[test]
    fn test_non_strict_pick_follows_document_order() {
        let payload: Value = serde_json::from_str(
            r#"{
                "zeta": [{"title": "First", "subtitle": "On Page"}],
                "alpha": [{"title": "Second", "subtitle": "On Page"}]
            }"#,
        )
        .unwrap();
        let playlist = SpotifyPlaylist::from_next_data("abc".to_string(), &payload, false).unwrap();
        assert_eq!(playlist.tracks[0].title, "First");
        assert_eq!(
            playlist.source,
            TrackListSource::StructuralMatch {
                pointer: "/zeta".to_string(),
                candidates: 2
            }
        );
    }

    #[test]
    fn test_track_list_not_found() {
        let payload = json!({"props": {"pageProps": {"title": "Oops", "subtitle": "Error"}}});
        let report = SpotifyPlaylist::from_next_data("abc".to_string(), &payload, false).unwrap_err();
        assert!(format!("{report:?}").contains("Track list not found"));

        let empty = json!({"props": {"pageProps": {"state": {"data": {"entity": {"trackList": []}}}}}});
        assert!(SpotifyPlaylist::from_next_data("abc".to_string(), &empty, false).is_err());
    }

    #[test]
    fn test_embed_url() {
        assert_eq!(embed_url("abc"), "https://open.spotify.com/embed/playlist/abc");
    }
}
