//! Reading the JSON payload bundled in the playlist embed page.
//!
//! The embed page is a Next.js app, so the whole page state ships as JSON in
//! `script#__NEXT_DATA__`. The layout of that state is undocumented and
//! changes without notice, which is why the track list is located with a
//! structural query when the known path is missing.

use error_stack::{IntoReport, Report, ResultExt};
use scraper::{Html, Selector};
use serde_json::Value;

use crate::spotify::{SpotifyError, SpotifyResult};
use crate::Suggestion;

pub fn next_data_from_html(html: &str) -> SpotifyResult<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__")
        .map_err(|err| Report::new(SpotifyError).attach_printable(format!("{err:?}")))?;
    let script = document.select(&selector).next().ok_or_else(|| {
        Report::new(SpotifyError)
            .attach_printable(
                "Could not locate __NEXT_DATA__ on embed page (are you logged in / is the playlist accessible?).",
            )
            .attach(Suggestion(
                "check the credentials and that the account can open the playlist".to_string(),
            ))
    })?;
    let text = script.text().collect::<String>();
    serde_json::from_str(&text)
        .into_report()
        .attach_printable("Failed to parse __NEXT_DATA__ as JSON")
        .change_context(SpotifyError)
}

/// A node matched by [`find_track_lists`], with its location in the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackListCandidate<'a> {
    /// JSON pointer (RFC 6901) of the array.
    pub pointer: String,
    pub entries: &'a [Value],
}

/// Structural query for a track list: every non-empty array whose elements
/// are all objects carrying string `title` and `subtitle` fields.
///
/// Matches are returned in document order (pre-order walk, object keys in
/// source order). A matching array is not searched further.
pub fn find_track_lists(root: &Value) -> Vec<TrackListCandidate<'_>> {
    let mut found = vec![];
    collect_track_lists(root, String::new(), &mut found);
    found
}

fn collect_track_lists<'a>(
    node: &'a Value,
    pointer: String,
    found: &mut Vec<TrackListCandidate<'a>>,
) {
    match node {
        Value::Array(items) => {
            if is_track_list(items) {
                found.push(TrackListCandidate {
                    pointer,
                    entries: items.as_slice(),
                });
                return;
            }
            for (index, item) in items.iter().enumerate() {
                collect_track_lists(item, format!("{}/{}", pointer, index), found);
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                collect_track_lists(value, format!("{}/{}", pointer, escape_pointer_token(key)), found);
            }
        }
        _ => {}
    }
}

fn is_track_list(items: &[Value]) -> bool {
    !items.is_empty()
        && items.iter().all(|item| {
            item.get("title").map_or(false, Value::is_string)
                && item.get("subtitle").map_or(false, Value::is_string)
        })
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
