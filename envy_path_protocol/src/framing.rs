// Text-frame encoding for the WebSocket channels.
//
// Each WebSocket text message carries exactly one JSON record, so there is
// no length prefix to read; what survives from length-delimited framing is
// the size cap. `MAX_FRAME_SIZE` bounds both directions, protecting the
// client from a runaway payload and the server from a runaway selection.
//
// `encode_frame` accepts any `Serialize` record because the menu channel's
// announcement is a bare record without an envelope. `decode_frame` always
// yields an `InboundFrame`; resolving its action is left to the dispatcher
// so an unknown action is a per-message failure, not a parse failure.

use serde::Serialize;
use thiserror::Error;

use crate::message::InboundFrame;

/// Maximum size of a single text frame (1 MiB). The largest expected frame
/// is a `load_instance` carrying an N×N matrix, which is tiny for any
/// playable N.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Failures turning records into frames and back.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {len} bytes exceeds the 1 MiB limit")]
    TooLarge { len: usize },
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
}

/// Serialize a record to a JSON text frame.
pub fn encode_frame<T: Serialize + ?Sized>(message: &T) -> Result<String, FrameError> {
    let text = serde_json::to_string(message)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge { len: text.len() });
    }
    Ok(text)
}

/// Parse a JSON text frame into its envelope.
pub fn decode_frame(text: &str) -> Result<InboundFrame, FrameError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge { len: text.len() });
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Action, Empty, OutboundFrame};

    #[test]
    fn decode_with_payload() {
        let frame = decode_frame(r#"{"action": "load_instance", "client_data": {"x": 1}}"#).unwrap();
        assert_eq!(frame.kind().unwrap(), Action::LoadInstance);
        assert_eq!(frame.client_data["x"], 1);
    }

    #[test]
    fn decode_without_payload_gives_null() {
        let frame = decode_frame(r#"{"action": "notify_disconnect"}"#).unwrap();
        assert_eq!(frame.kind().unwrap(), Action::NotifyDisconnect);
        assert!(frame.client_data.is_null());
    }

    #[test]
    fn unknown_action_still_decodes() {
        let frame = decode_frame(r#"{"action": "launch_rockets", "client_data": {}}"#).unwrap();
        assert!(matches!(frame.kind(), Err(FrameError::UnknownAction(name)) if name == "launch_rockets"));
    }

    #[test]
    fn missing_action_is_malformed() {
        assert!(matches!(
            decode_frame(r#"{"client_data": {}}"#),
            Err(FrameError::Json(_))
        ));
        assert!(matches!(decode_frame("not json"), Err(FrameError::Json(_))));
    }

    #[test]
    fn rejects_oversized_frames() {
        let big = "x".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(
            decode_frame(&big),
            Err(FrameError::TooLarge { .. })
        ));
        assert!(matches!(
            encode_frame(&big),
            Err(FrameError::TooLarge { .. })
        ));
    }

    #[test]
    fn encode_room_request() {
        let text = encode_frame(&OutboundFrame::new(Action::LoadContext, Empty {})).unwrap();
        assert_eq!(text, r#"{"action":"load_context","csmr_data":{}}"#);
    }
}
