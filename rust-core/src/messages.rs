use crate::clock::EpochMillis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Catalog identifier of a video.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct VideoId(pub u64);

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Media offset in seconds. Always finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Position(f64);

impl Position {
    pub const ZERO: Position = Position(0.0);

    pub fn from_secs(secs: f64) -> Option<Self> {
        (secs.is_finite() && secs >= 0.0).then_some(Self(secs))
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }

    pub fn advanced_by(self, elapsed: Duration) -> Self {
        Self(self.0 + elapsed.as_secs_f64())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Start rolling at `target` on every peer (sender's clock).
    Play { target: EpochMillis },
    /// Pause right away.
    Pause,
}

/// One self-contained playback instruction exchanged between peers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncMessage {
    pub video_id: VideoId,
    pub intent: Intent,
    pub position: Position,
}

impl SyncMessage {
    pub fn play(video_id: VideoId, position: Position, target: EpochMillis) -> Self {
        Self {
            video_id,
            intent: Intent::Play { target },
            position,
        }
    }

    pub fn pause(video_id: VideoId, position: Position) -> Self {
        Self {
            video_id,
            intent: Intent::Pause,
            position,
        }
    }

    pub fn is_play(&self) -> bool {
        matches!(self.intent, Intent::Play { .. })
    }
}
