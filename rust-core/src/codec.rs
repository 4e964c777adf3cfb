//! JSON wire format for [`SyncMessage`].
//!
//! ```text
//! { "videoID": 7, "play": true, "videoTimestamp": 42.5, "timestamp": 1700000000100 }
//! ```
//!
//! `timestamp` is the epoch-millisecond target instant and only carries
//! meaning for `play: true`. Pause messages encode it as `0`.

use crate::messages::{Intent, Position, SyncMessage, VideoId};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

const VIDEO_ID: &str = "videoID";
const PLAY: &str = "play";
const POSITION: &str = "videoTimestamp";
const TIMESTAMP: &str = "timestamp";

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("frame is not a JSON object: {0}")]
    Malformed(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Serialize)]
struct WireMessage {
    #[serde(rename = "videoID")]
    video_id: u64,
    play: bool,
    #[serde(rename = "videoTimestamp")]
    video_timestamp: f64,
    timestamp: u64,
}

impl From<&SyncMessage> for WireMessage {
    fn from(msg: &SyncMessage) -> Self {
        let (play, timestamp) = match msg.intent {
            Intent::Play { target } => (true, target),
            Intent::Pause => (false, 0),
        };
        Self {
            video_id: msg.video_id.0,
            play,
            video_timestamp: msg.position.as_secs(),
            timestamp,
        }
    }
}

pub fn encode(msg: &SyncMessage) -> String {
    // Position is always finite, so serialization cannot fail.
    serde_json::to_string(&WireMessage::from(msg)).unwrap_or_default()
}

pub fn decode(text: &str) -> Result<SyncMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    from_value(value)
}

/// Binary frames carry the same JSON document as UTF-8 bytes.
pub fn decode_bytes(bytes: &[u8]) -> Result<SyncMessage, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    from_value(value)
}

fn from_value(value: Value) -> Result<SyncMessage, DecodeError> {
    let Value::Object(obj) = value else {
        return Err(DecodeError::Malformed("expected an object".into()));
    };

    let video_id = required(&obj, VIDEO_ID)?
        .as_u64()
        .ok_or(DecodeError::InvalidField {
            field: VIDEO_ID,
            reason: "expected a non-negative integer",
        })?;

    let play = required(&obj, PLAY)?
        .as_bool()
        .ok_or(DecodeError::InvalidField {
            field: PLAY,
            reason: "expected a boolean",
        })?;

    let position = required(&obj, POSITION)?
        .as_f64()
        .and_then(Position::from_secs)
        .ok_or(DecodeError::InvalidField {
            field: POSITION,
            reason: "expected a non-negative number of seconds",
        })?;

    let timestamp = match obj.get(TIMESTAMP) {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_u64()
                .filter(|ms| i64::try_from(*ms).is_ok())
                .ok_or(DecodeError::InvalidField {
                    field: TIMESTAMP,
                    reason: "expected epoch milliseconds",
                })?,
        ),
    };

    let intent = if play {
        Intent::Play {
            target: timestamp.ok_or(DecodeError::MissingField(TIMESTAMP))?,
        }
    } else {
        Intent::Pause
    };

    Ok(SyncMessage {
        video_id: VideoId(video_id),
        intent,
        position,
    })
}

fn required<'a>(obj: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(v) => Ok(v),
    }
}
