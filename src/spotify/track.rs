use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the embed page's track list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SpotifyTrack {
    pub title: String,
    /// The artists, as the embed page displays them under the title.
    pub subtitle: String,
    pub uri: Option<String>,
    pub duration_ms: Option<u64>,
}

impl SpotifyTrack {
    /// Builds a track from a track-list entry. Entries without a non-empty
    /// `title` and `subtitle` are not tracks we can search for.
    pub fn from_entry(entry: &Value) -> Option<Self> {
        let title = entry.get("title")?.as_str()?.trim();
        let subtitle = entry.get("subtitle")?.as_str()?.trim();
        if title.is_empty() || subtitle.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            uri: entry.get("uri").and_then(Value::as_str).map(str::to_string),
            duration_ms: entry.get("duration").and_then(Value::as_u64),
        })
    }

    /// The search term and the key under which the track is logged once downloaded.
    pub fn get_track_search_term(&self) -> String {
        format!("{} - {}", self.subtitle, self.title)
    }

    pub fn get_duration_string(&self) -> String {
        match self.duration_ms {
            Some(ms) => {
                let seconds = ms / 1000;
                format!("{}:{:02}", seconds / 60, seconds % 60)
            }
            None => "-".to_string(),
        }
    }
}
