use lockstep_core::{PlaybackSurface, Position};
use std::time::Instant;

/// Stand-in for a real player: tracks where playback would be and prints
/// every command it receives.
#[derive(Debug)]
pub struct SimulatedPlayer {
    base: Position,
    playing_since: Option<Instant>,
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self {
            base: Position::ZERO,
            playing_since: None,
        }
    }
}

impl PlaybackSurface for SimulatedPlayer {
    fn play(&mut self) {
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
        }
        println!("▶ playing from {}", self.base);
    }

    fn pause(&mut self) {
        self.base = self.current_position();
        self.playing_since = None;
        println!("⏸ paused at {}", self.base);
    }

    fn seek(&mut self, position: Position) {
        self.base = position;
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
        println!("⇥ seek to {}", position);
    }

    fn load(&mut self) {
        self.base = Position::ZERO;
        self.playing_since = None;
        println!("⏏ loaded");
    }

    fn current_position(&self) -> Position {
        match self.playing_since {
            Some(since) => self.base.advanced_by(since.elapsed()),
            None => self.base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_position_advances_only_while_playing() {
        let mut player = SimulatedPlayer::default();
        player.seek(Position::from_secs(5.0).unwrap());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(player.current_position().as_secs(), 5.0);

        player.play();
        std::thread::sleep(Duration::from_millis(20));
        assert!(player.current_position().as_secs() > 5.0);

        player.pause();
        let paused_at = player.current_position();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(player.current_position(), paused_at);
        assert!(player.playing_since.is_none());
    }

    #[test]
    fn test_load_resets() {
        let mut player = SimulatedPlayer::default();
        player.seek(Position::from_secs(30.0).unwrap());
        player.play();
        player.load();
        assert_eq!(player.current_position(), Position::ZERO);
        assert!(player.playing_since.is_none());
    }
}
