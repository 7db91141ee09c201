// envy_path_protocol: wire protocol for the Envy Path menu and room channels.
//
// This crate defines the messages exchanged between the game client
// (`envy_path_client`) and the room server over WebSocket text frames. It is
// shared by the client and by the mock server in `multiplayer_tests`, and has
// no networking or game logic of its own.
//
// Module overview:
// - `types.rs`:     Tokens (`PlayerToken`, `RoomToken`), actor/slot index
//                   aliases and the `Selection` map.
// - `instance.rs`:  The `Instance` puzzle record and its shape validation.
// - `message.rs`:   The `Action` vocabulary, inbound/outbound envelopes and
//                   the payload record for each action.
// - `framing.rs`:   JSON text-frame encode/decode with a size cap.
//
// Design decisions:
// - **JSON text frames.** The server is a JSON WebSocket consumer; one frame
//   is one record.
// - **Opaque inbound payloads.** `InboundFrame::client_data` stays a
//   `serde_json::Value` until a handler for the action decodes it into its
//   own payload type, so a bad payload only fails that handler.

pub mod framing;
pub mod instance;
pub mod message;
pub mod types;

pub use framing::{FrameError, MAX_FRAME_SIZE, decode_frame, encode_frame};
pub use instance::{Instance, InstanceError};
pub use message::{
    Action, Empty, IdentityAnnouncement, InboundFrame, InstanceLoad, MenuContext, OutboundFrame,
    Player, ReadyRequest, RoomContext, RoomSummary, SolutionSubmission, SolutionVerdict,
};
pub use types::{ActorIndex, ObjectValue, PlayerToken, RoomToken, Selection, SlotIndex};

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn encoded<T: serde::Serialize>(msg: &T) -> serde_json::Value {
        serde_json::from_str(&encode_frame(msg).unwrap()).unwrap()
    }

    #[test]
    fn action_names_roundtrip_through_from_str() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
            assert_eq!(
                serde_json::to_value(action).unwrap(),
                json!(action.as_str())
            );
        }
    }

    #[test]
    fn announcement_omits_missing_token() {
        assert_eq!(encoded(&IdentityAnnouncement::default()), json!({}));
        let known = IdentityAnnouncement {
            player_token: Some("p-1".into()),
        };
        assert_eq!(encoded(&known), json!({"player_token": "p-1"}));
    }

    #[test]
    fn submission_keys_actors_as_strings() {
        let mut solution = Selection::new();
        solution.insert(0, 1);
        solution.insert(1, 0);
        solution.insert(2, 1);
        let frame = OutboundFrame::new(
            Action::CheckSolution,
            SolutionSubmission {
                solution,
                player_token: "me".into(),
            },
        );
        assert_eq!(
            encoded(&frame),
            json!({
                "action": "check_solution",
                "csmr_data": {
                    "solution": {"0": 1, "1": 0, "2": 1},
                    "player_token": "me"
                }
            })
        );
    }

    #[test]
    fn set_ready_payload_shape() {
        let frame = OutboundFrame::new(
            Action::SetReady,
            ReadyRequest {
                player_token: "me".into(),
            },
        );
        assert_eq!(
            encoded(&frame),
            json!({"action": "set_ready", "csmr_data": {"player_token": "me"}})
        );
    }

    #[test]
    fn menu_context_decodes_server_payload() {
        let frame = decode_frame(
            r#"{"action": "load_context", "client_data": {
                "player_token": "p-9",
                "next_room_token": "r-new",
                "rooms": [{"token": "r-1", "connected_count": 1}]
            }}"#,
        )
        .unwrap();
        let ctx: MenuContext = serde_json::from_value(frame.client_data).unwrap();
        assert_eq!(ctx.player_token, PlayerToken("p-9".into()));
        assert_eq!(ctx.next_room_token, RoomToken("r-new".into()));
        assert_eq!(
            ctx.rooms,
            vec![RoomSummary {
                token: "r-1".into(),
                connected_count: 1
            }]
        );
    }

    #[test]
    fn room_context_tolerates_missing_optional_fields() {
        let ctx: RoomContext = serde_json::from_value(json!({
            "players": [
                {"username": "", "token": "a", "connected_to": "r", "is_ready": true},
                {"token": "b"}
            ]
        }))
        .unwrap();
        assert_eq!(ctx.players.len(), 2);
        assert!(ctx.players[0].is_ready);
        assert_eq!(ctx.players[0].connected_to, Some(RoomToken("r".into())));
        assert!(!ctx.players[1].is_ready);
        assert_eq!(ctx.players[1].username, "");
    }

    #[test]
    fn verdict_null_is_solved_reads_as_false() {
        let v: SolutionVerdict = serde_json::from_value(json!({"is_solved": null})).unwrap();
        assert!(!v.is_solved);
        let v: SolutionVerdict = serde_json::from_value(json!({})).unwrap();
        assert!(!v.is_solved);
        let v: SolutionVerdict = serde_json::from_value(json!({"is_solved": true})).unwrap();
        assert!(v.is_solved);
        assert!(serde_json::from_value::<SolutionVerdict>(json!({"is_solved": "maybe"})).is_err());
    }

    #[test]
    fn verdict_without_instance() {
        let v: SolutionVerdict = serde_json::from_value(json!({"is_solved": false})).unwrap();
        assert!(!v.is_solved);
        assert!(v.instance.is_none());
    }
}
