//! In-band command interpreter
//!
//! Turns a `command` event's text into a single reply addressed to the
//! issuing session. Reads the room directory only.

use tracing::warn;

use crate::message::Event;
use crate::room::RoomDirectory;

/// Reply text for anything that is not a known command
pub const UNKNOWN_COMMAND: &str = "Unknown command";

/// Interpret `/users`, `/rooms` or `/stats` for a session in `room`
pub fn interpret(command: &str, room: &str, directory: &RoomDirectory) -> Event {
    match command.trim() {
        "/users" => {
            let usernames = directory
                .get(room)
                .map(|r| r.usernames())
                .unwrap_or_default();
            Event::user_list(room, &usernames)
        }
        "/rooms" => {
            let mut text = String::from("Rooms:\n");
            for name in directory.room_names() {
                text.push_str("- ");
                text.push_str(&name);
                text.push('\n');
            }
            Event::system(room, text)
        }
        "/stats" => match Event::stats(room, &directory.stats()) {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to encode stats: {}", e);
                Event::system(room, "Stats unavailable")
            }
        },
        _ => Event::system(room, UNKNOWN_COMMAND),
    }
}
