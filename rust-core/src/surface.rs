use crate::messages::Position;

/// The local media player a [`Synchronizer`](crate::synchronizer::Synchronizer)
/// drives.
///
/// Calls are expected to return promptly; the synchronizer invokes them from
/// its event loop.
pub trait PlaybackSurface {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: Position);
    /// Reset to the start of a newly selected video.
    fn load(&mut self);
    fn current_position(&self) -> Position;
}
