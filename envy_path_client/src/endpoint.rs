// Channel endpoints.
//
// The menu channel lives at `<server>/menu/`; a room channel at
// `<server>/room/<room>/<player>/`. Tokens go in as single path segments, so
// anything unusual in them is percent-encoded rather than changing the path.

use envy_path_protocol::{PlayerToken, RoomToken};
use url::Url;

use crate::error::ClientError;

fn with_segments(base: &str, segments: &[&str]) -> Result<String, ClientError> {
    let mut url = Url::parse(base)?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| ClientError::Config(format!("`{base}` cannot be a base URL")))?;
        path.pop_if_empty();
        path.extend(segments);
        // Trailing slash.
        path.push("");
    }
    Ok(url.into())
}

pub fn menu_endpoint(base: &str) -> Result<String, ClientError> {
    with_segments(base, &["menu"])
}

pub fn room_endpoint(base: &str, room: &RoomToken, player: &PlayerToken) -> Result<String, ClientError> {
    with_segments(base, &["room", room.as_str(), player.as_str()])
}
