//! Clock-in bot: turns `上班` / `下班` chat messages into store records.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::event::{self, Event, Message};
use crate::store::{Action, FileStore};

#[derive(Debug)]
pub struct Bot {
    store: FileStore,
    /// Last OneBot heartbeat meta event seen from the gateway
    last_heartbeat: Mutex<Instant>,
}

impl Bot {
    #[must_use]
    pub fn new(store: FileStore) -> Self {
        Self {
            store,
            last_heartbeat: Mutex::new(Instant::now()),
        }
    }

    /// Process one inbound frame. Undecodable frames and unrelated messages
    /// are ignored; store failures are logged.
    pub fn handle(&self, raw: &[u8]) {
        for event in event::decode_frame(raw) {
            match event {
                Event::Meta(meta) => {
                    if meta.is_heartbeat() {
                        self.touch_heartbeat();
                    }
                }
                Event::Message(message) => self.on_message(&message),
            }
        }
    }

    /// Time since the gateway's last heartbeat meta event (or since startup).
    #[must_use]
    pub fn heartbeat_age(&self) -> Duration {
        self.last_heartbeat
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }

    fn touch_heartbeat(&self) {
        if let Ok(mut last) = self.last_heartbeat.lock() {
            *last = Instant::now();
        }
    }

    fn on_message(&self, message: &Message) {
        if message.from_self {
            return;
        }

        let Some(action) = Action::from_text(&message.text) else {
            return;
        };

        match self.store.append(&message.user_id, action, message.timestamp) {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    user_id = %message.user_id,
                    action = %action,
                    time = %message.timestamp.to_rfc3339(),
                    "Recorded event"
                );
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, user_id = %message.user_id, "Failed to record event");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::store::read_records;

    use super::*;

    fn bot_in(dir: &tempfile::TempDir) -> Bot {
        Bot::new(FileStore::open(dir.path().join("events.jsonl")).unwrap())
    }

    #[test]
    fn records_clock_in_and_out() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot_in(&dir);

        bot.handle(r#"{"post_type":"message","user_id":10001,"message":" 上班 ","time":1700000000}"#.as_bytes());
        bot.handle(r#"{"user_id":"10002","text":"下班","timestamp":"2024-03-01T18:00:00+09:00"}"#.as_bytes());

        let records = read_records(dir.path().join("events.jsonl")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id, "10001");
        assert_eq!(records[0].action, Action::ClockIn);
        assert_eq!(records[0].time.timestamp(), 1_700_000_000);
        assert_eq!(records[1].user_id, "10002");
        assert_eq!(records[1].action, Action::ClockOut);
    }

    #[test]
    fn ignores_other_text_and_own_messages() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot_in(&dir);

        bot.handle(br#"{"post_type":"message","user_id":1,"message":"hello"}"#);
        bot.handle(r#"{"post_type":"message","self_id":7,"user_id":7,"message":"上班"}"#.as_bytes());
        bot.handle(b"garbage");

        let records = read_records(dir.path().join("events.jsonl")).unwrap();
        assert!(records.is_empty(), "nothing should be recorded: {records:?}");
    }

    #[test]
    fn array_frames_record_every_command() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot_in(&dir);

        bot.handle(r#"[{"user_id":"a","text":"上班"},{"user_id":"b","text":"下班"}]"#.as_bytes());

        let records = read_records(dir.path().join("events.jsonl")).unwrap();
        let users: Vec<_> = records.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(users, ["a", "b"]);
    }

    #[test]
    fn heartbeat_meta_event_resets_age() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot_in(&dir);

        thread::sleep(Duration::from_millis(30));
        let before = bot.heartbeat_age();
        assert!(before >= Duration::from_millis(30), "age grows: {before:?}");

        bot.handle(br#"{"post_type":"meta_event","meta_event_type":"heartbeat","interval":5000}"#);

        assert!(bot.heartbeat_age() < before, "heartbeat resets age");
    }

    #[test]
    fn lifecycle_meta_event_does_not_reset_age() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot_in(&dir);

        thread::sleep(Duration::from_millis(30));
        bot.handle(br#"{"post_type":"meta_event","meta_event_type":"lifecycle","sub_type":"connect"}"#);

        assert!(bot.heartbeat_age() >= Duration::from_millis(30), "lifecycle is not a heartbeat");
    }
}
