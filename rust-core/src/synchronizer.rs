//! Playback synchronizer.
//!
//! Turns local intents into outgoing [`SyncMessage`]s and incoming messages
//! into commands on the local [`PlaybackSurface`]. A `Play` carries an
//! absolute target instant; every receiver seeks right away and defers only
//! the start of playback until that instant, so peers with different
//! delivery latencies still start together. A message that arrives after
//! its target instant plays immediately.
//!
//! Everything runs on one task. The only suspension is the deferred play,
//! held as a deadline that the event loop waits on alongside inbound frames
//! and local commands. Any later message for the active video, any local
//! intent, and any video switch clears that deadline.

use crate::clock::{delay_until, Clock, SystemClock};
use crate::codec;
use crate::messages::{Intent, Position, SyncMessage, VideoId};
use crate::surface::PlaybackSurface;
use crate::transport::Frame;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

/// Lead time added to outgoing `Play` messages.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub grace: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            grace: DEFAULT_GRACE,
        }
    }
}

/// What the player should be doing for the active video.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackState {
    pub position: Position,
    pub is_playing: bool,
}

/// User intent coming from the local view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalCommand {
    Play,
    Pause,
    Seek(Position),
    Select(VideoId),
}

#[derive(Debug)]
struct ActiveVideo {
    id: VideoId,
    state: PlaybackState,
}

pub struct Synchronizer<S, C = SystemClock> {
    surface: S,
    clock: C,
    config: SyncConfig,
    outbound: mpsc::UnboundedSender<SyncMessage>,
    active: Option<ActiveVideo>,
    deferred_play: Option<Instant>,
}

impl<S: PlaybackSurface> Synchronizer<S, SystemClock> {
    pub fn new(
        surface: S,
        outbound: mpsc::UnboundedSender<SyncMessage>,
        config: SyncConfig,
    ) -> Self {
        Self::with_clock(surface, SystemClock, outbound, config)
    }
}

impl<S: PlaybackSurface, C: Clock> Synchronizer<S, C> {
    pub fn with_clock(
        surface: S,
        clock: C,
        outbound: mpsc::UnboundedSender<SyncMessage>,
        config: SyncConfig,
    ) -> Self {
        Self {
            surface,
            clock,
            config,
            outbound,
            active: None,
            deferred_play: None,
        }
    }

    pub fn active_video(&self) -> Option<VideoId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.active.as_ref().map(|a| a.state)
    }

    /// When the pending deferred play is due, if there is one.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.deferred_play
    }

    /// Make `id` the active video. Drops all state of the previous one,
    /// including a pending deferred play.
    pub fn select_video(&mut self, id: VideoId) {
        info!(video_id = %id, "selecting video");
        self.cancel_deferred();
        self.active = Some(ActiveVideo {
            id,
            state: PlaybackState::default(),
        });
        trace!("surface: load");
        self.surface.load();
    }

    /// Tell peers the local player started at `position`.
    ///
    /// Records the intent in the local [`PlaybackState`] but issues no
    /// surface commands.
    pub fn signal_play(&mut self, position: Position) {
        let target = self.clock.now_millis() + self.config.grace.as_millis() as u64;
        if let Some(id) = self.record_local(position, true) {
            self.send(SyncMessage::play(id, position, target));
        }
    }

    /// Tell peers the local player paused at `position`. Applies now on
    /// every peer. Like [`signal_play`](Self::signal_play), updates the
    /// local [`PlaybackState`].
    pub fn signal_pause(&mut self, position: Position) {
        if let Some(id) = self.record_local(position, false) {
            self.send(SyncMessage::pause(id, position));
        }
    }

    /// A local seek re-broadcasts the current play/pause state from the new
    /// position.
    pub fn signal_seek(&mut self, position: Position) {
        let playing = self
            .active
            .as_ref()
            .map(|a| a.state.is_playing)
            .unwrap_or(false);
        if playing {
            self.signal_play(position);
        } else {
            self.signal_pause(position);
        }
    }

    /// Apply a message from a peer.
    pub fn on_message(&mut self, msg: SyncMessage) {
        let Some(active) = self.active.as_mut() else {
            debug!(video_id = %msg.video_id, "no active video; ignoring message");
            return;
        };
        if msg.video_id != active.id {
            debug!(video_id = %msg.video_id, active = %active.id, "message for another video; ignoring");
            return;
        }

        // Whatever was pending is superseded by this instruction.
        self.deferred_play = None;

        match msg.intent {
            Intent::Pause => {
                trace!(position = %msg.position, "surface: pause + seek");
                self.surface.pause();
                self.surface.seek(msg.position);
                active.state = PlaybackState {
                    position: msg.position,
                    is_playing: false,
                };
            }
            Intent::Play { target } => {
                let delay = delay_until(target, self.clock.now_millis());
                trace!(position = %msg.position, delay_ms = delay, "surface: seek");
                self.surface.seek(msg.position);
                if delay > 0 {
                    let deadline = Instant::now().checked_add(Duration::from_millis(delay as u64));
                    if deadline.is_none() {
                        warn!(target_ms = target, "play target is unreachably far ahead; not scheduling");
                    }
                    self.deferred_play = deadline;
                } else {
                    if delay < 0 {
                        debug!(late_ms = -delay, "play arrived after its target instant");
                    }
                    trace!("surface: play");
                    self.surface.play();
                }
                active.state = PlaybackState {
                    position: msg.position,
                    is_playing: true,
                };
            }
        }
    }

    /// Decode an inbound frame and apply it. Undecodable frames are dropped.
    pub fn on_frame(&mut self, frame: &Frame) {
        let decoded = match frame {
            Frame::Text(text) => codec::decode(text),
            Frame::Binary(bytes) => codec::decode_bytes(bytes),
        };
        match decoded {
            Ok(msg) => self.on_message(msg),
            Err(e) => warn!(error = %e, "dropping undecodable frame"),
        }
    }

    /// Run the pending deferred play, if any. Returns whether it ran.
    pub fn fire_deferred(&mut self) -> bool {
        if self.deferred_play.take().is_none() {
            return false;
        }
        trace!("surface: play (deferred)");
        self.surface.play();
        true
    }

    /// Apply a local user intent to the surface and tell peers about it.
    pub fn apply(&mut self, cmd: LocalCommand) {
        if let LocalCommand::Select(id) = cmd {
            self.select_video(id);
            return;
        }
        if self.active.is_none() {
            debug!(?cmd, "no active video; ignoring command");
            return;
        }
        match cmd {
            LocalCommand::Play => {
                self.surface.play();
                let position = self.surface.current_position();
                self.signal_play(position);
            }
            LocalCommand::Pause => {
                self.surface.pause();
                let position = self.surface.current_position();
                self.signal_pause(position);
            }
            LocalCommand::Seek(position) => {
                self.surface.seek(position);
                self.signal_seek(position);
            }
            LocalCommand::Select(_) => {}
        }
    }

    /// Event loop. Returns once the command channel closes.
    pub async fn run(
        mut self,
        mut frames: mpsc::UnboundedReceiver<Frame>,
        mut commands: mpsc::UnboundedReceiver<LocalCommand>,
    ) -> Self {
        let mut frames_open = true;
        loop {
            let deadline = self.deferred_play;
            tokio::select! {
                biased;

                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => break,
                },
                frame = frames.recv(), if frames_open => match frame {
                    Some(frame) => self.on_frame(&frame),
                    None => {
                        warn!("inbound frames closed; continuing without peers");
                        frames_open = false;
                    }
                },
                _ = wait_for(deadline) => {
                    self.fire_deferred();
                }
            }
        }
        debug!("synchronizer stopped");
        self
    }

    fn record_local(&mut self, position: Position, is_playing: bool) -> Option<VideoId> {
        self.cancel_deferred();
        let Some(active) = self.active.as_mut() else {
            debug!("no active video; not signalling");
            return None;
        };
        active.state = PlaybackState {
            position,
            is_playing,
        };
        Some(active.id)
    }

    fn cancel_deferred(&mut self) {
        if self.deferred_play.take().is_some() {
            debug!("cancelled pending deferred play");
        }
    }

    fn send(&self, msg: SyncMessage) {
        debug!(video_id = %msg.video_id, play = msg.is_play(), position = %msg.position, "sending");
        if self.outbound.send(msg).is_err() {
            warn!("transport is gone; message dropped");
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::TimerClock;
    use crate::surface::testing::{Call, RecordingSurface};
    use tokio::time::sleep;

    const T0: u64 = 1_700_000_000_000;

    fn pos(secs: f64) -> Position {
        Position::from_secs(secs).unwrap()
    }

    struct Fixture {
        sync: Synchronizer<RecordingSurface, TimerClock>,
        surface: RecordingSurface,
        sent: mpsc::UnboundedReceiver<SyncMessage>,
    }

    fn fixture(active: u64) -> Fixture {
        let surface = RecordingSurface::default();
        let (tx, sent) = mpsc::unbounded_channel();
        let mut sync = Synchronizer::with_clock(
            surface.clone(),
            TimerClock::starting_at(T0),
            tx,
            SyncConfig::default(),
        );
        sync.select_video(VideoId(active));
        surface.clear();
        Fixture {
            sync,
            surface,
            sent,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_other_video() {
        let mut f = fixture(1);
        f.sync.on_message(SyncMessage::play(VideoId(2), pos(5.0), T0 + 500));
        f.sync.on_message(SyncMessage::pause(VideoId(2), pos(5.0)));
        assert!(f.surface.calls().is_empty());
        assert!(f.sync.pending_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_everything_without_active_video() {
        let surface = RecordingSurface::default();
        let (tx, mut sent) = mpsc::unbounded_channel();
        let mut sync = Synchronizer::with_clock(
            surface.clone(),
            TimerClock::starting_at(T0),
            tx,
            SyncConfig::default(),
        );
        sync.on_message(SyncMessage::pause(VideoId(1), pos(1.0)));
        sync.signal_play(pos(1.0));
        sync.apply(LocalCommand::Play);
        assert!(surface.calls().is_empty());
        assert!(sent.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_play_seeks_now_and_defers_play() {
        let mut f = fixture(1);
        let start = Instant::now();
        f.sync.on_message(SyncMessage::play(VideoId(1), pos(12.0), T0 + 500));

        assert_eq!(f.surface.calls(), vec![Call::Seek(pos(12.0))]);
        assert_eq!(f.sync.pending_deadline(), Some(start + Duration::from_millis(500)));
        assert_eq!(
            f.sync.playback_state(),
            Some(PlaybackState {
                position: pos(12.0),
                is_playing: true
            })
        );

        assert!(f.sync.fire_deferred());
        assert_eq!(f.surface.calls(), vec![Call::Seek(pos(12.0)), Call::Play]);
        assert!(!f.sync.fire_deferred());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_play_runs_immediately() {
        let mut f = fixture(1);
        tokio::time::advance(Duration::from_millis(1_000)).await;
        f.sync.on_message(SyncMessage::play(VideoId(1), pos(3.0), T0 + 800));

        assert_eq!(f.surface.calls(), vec![Call::Seek(pos(3.0)), Call::Play]);
        assert!(f.sync.pending_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_applies_now_and_cancels_pending_play() {
        let mut f = fixture(1);
        f.sync.on_message(SyncMessage::play(VideoId(1), pos(12.0), T0 + 500));
        f.sync.on_message(SyncMessage::pause(VideoId(1), pos(12.2)));

        assert_eq!(
            f.surface.calls(),
            vec![Call::Seek(pos(12.0)), Call::Pause, Call::Seek(pos(12.2))]
        );
        assert!(f.sync.pending_deadline().is_none());
        assert!(!f.sync.fire_deferred());
        assert_eq!(f.sync.playback_state().map(|s| s.is_playing), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_play_replaces_pending_deadline() {
        let mut f = fixture(1);
        let start = Instant::now();
        f.sync.on_message(SyncMessage::play(VideoId(1), pos(1.0), T0 + 500));
        f.sync.on_message(SyncMessage::play(VideoId(1), pos(2.0), T0 + 900));
        assert_eq!(f.sync.pending_deadline(), Some(start + Duration::from_millis(900)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_play_sends_one_message_with_grace() {
        let mut f = fixture(4);
        f.sync.signal_play(pos(42.0));

        let msg = f.sent.try_recv().unwrap();
        assert_eq!(msg, SyncMessage::play(VideoId(4), pos(42.0), T0 + 100));
        assert!(f.sent.try_recv().is_err());
        assert!(f.surface.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_pause_has_no_grace() {
        let mut f = fixture(4);
        f.sync.signal_pause(pos(7.5));
        assert_eq!(f.sent.try_recv().unwrap(), SyncMessage::pause(VideoId(4), pos(7.5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_seek_follows_play_state() {
        let mut f = fixture(4);
        f.sync.signal_seek(pos(10.0));
        assert_eq!(f.sent.try_recv().unwrap().intent, Intent::Pause);

        f.sync.signal_play(pos(10.0));
        f.sent.try_recv().unwrap();
        f.sync.signal_seek(pos(30.0));
        assert_eq!(
            f.sent.try_recv().unwrap(),
            SyncMessage::play(VideoId(4), pos(30.0), T0 + 100)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_intent_cancels_pending_play() {
        let mut f = fixture(1);
        f.sync.on_message(SyncMessage::play(VideoId(1), pos(12.0), T0 + 500));
        f.sync.apply(LocalCommand::Pause);
        assert!(f.sync.pending_deadline().is_none());
        assert_eq!(
            f.sent.try_recv().unwrap(),
            SyncMessage::pause(VideoId(1), pos(12.0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_play_uses_surface_position() {
        let mut f = fixture(1);
        f.surface.set_position(pos(8.25));
        f.sync.apply(LocalCommand::Play);
        assert_eq!(f.surface.calls(), vec![Call::Play]);
        assert_eq!(
            f.sent.try_recv().unwrap(),
            SyncMessage::play(VideoId(1), pos(8.25), T0 + 100)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_video_resets_state() {
        let mut f = fixture(1);
        f.sync.on_message(SyncMessage::play(VideoId(1), pos(12.0), T0 + 500));
        f.sync.select_video(VideoId(2));

        assert_eq!(f.sync.active_video(), Some(VideoId(2)));
        assert_eq!(f.sync.playback_state(), Some(PlaybackState::default()));
        assert!(f.sync.pending_deadline().is_none());
        assert_eq!(f.surface.calls(), vec![Call::Seek(pos(12.0)), Call::Load]);

        f.sync.on_message(SyncMessage::pause(VideoId(1), pos(1.0)));
        assert_eq!(f.surface.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_frame_never_reaches_surface() {
        let mut f = fixture(1);
        f.sync.on_frame(&Frame::Text(r#"{"play":true,"videoTimestamp":1}"#.into()));
        f.sync.on_frame(&Frame::Text("garbage".into()));
        f.sync.on_frame(&Frame::Binary(vec![0xde, 0xad]));
        assert!(f.surface.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_target_is_dropped() {
        let mut f = fixture(1);
        f.sync.on_frame(&Frame::Text(
            r#"{"videoID":1,"play":true,"videoTimestamp":1,"timestamp":9223372036854775808}"#.into(),
        ));
        assert!(f.surface.calls().is_empty());
        assert!(f.sync.pending_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_far_future_target_does_not_panic() {
        let mut f = fixture(1);
        f.sync.on_message(SyncMessage::play(VideoId(1), pos(1.0), i64::MAX as u64));
        assert_eq!(f.surface.calls(), vec![Call::Seek(pos(1.0))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_binary_frame_is_applied() {
        let mut f = fixture(1);
        let text = codec::encode(&SyncMessage::pause(VideoId(1), pos(2.0)));
        f.sync.on_frame(&Frame::Binary(text.into_bytes()));
        assert_eq!(f.surface.calls(), vec![Call::Pause, Call::Seek(pos(2.0))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_plays_no_earlier_than_target() {
        let f = fixture(1);
        let surface = f.surface.clone();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(f.sync.run(frame_rx, cmd_rx));

        let msg = SyncMessage::play(VideoId(1), pos(20.0), T0 + 500);
        frame_tx.send(Frame::Text(codec::encode(&msg))).unwrap();

        sleep(Duration::from_millis(499)).await;
        assert_eq!(surface.calls(), vec![Call::Seek(pos(20.0))]);

        sleep(Duration::from_millis(2)).await;
        assert_eq!(surface.calls(), vec![Call::Seek(pos(20.0)), Call::Play]);

        drop(cmd_tx);
        let sync = handle.await.unwrap();
        assert!(sync.pending_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_pause_supersedes_pending_play() {
        let f = fixture(1);
        let surface = f.surface.clone();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(f.sync.run(frame_rx, cmd_rx));

        let play = SyncMessage::play(VideoId(1), pos(20.0), T0 + 500);
        frame_tx.send(Frame::Text(codec::encode(&play))).unwrap();
        sleep(Duration::from_millis(100)).await;
        let pause = SyncMessage::pause(VideoId(1), pos(20.0));
        frame_tx.send(Frame::Text(codec::encode(&pause))).unwrap();

        sleep(Duration::from_secs(2)).await;
        assert_eq!(
            surface.calls(),
            vec![Call::Seek(pos(20.0)), Call::Pause, Call::Seek(pos(20.0))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_video_switch_prevents_pending_play() {
        let f = fixture(1);
        let surface = f.surface.clone();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(f.sync.run(frame_rx, cmd_rx));

        let play = SyncMessage::play(VideoId(1), pos(20.0), T0 + 500);
        frame_tx.send(Frame::Text(codec::encode(&play))).unwrap();
        sleep(Duration::from_millis(100)).await;
        cmd_tx.send(LocalCommand::Select(VideoId(2))).unwrap();

        sleep(Duration::from_secs(2)).await;
        assert!(!surface.calls().contains(&Call::Play));

        drop(cmd_tx);
        let sync = handle.await.unwrap();
        assert_eq!(sync.active_video(), Some(VideoId(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_survives_closed_frames() {
        let f = fixture(1);
        let surface = f.surface.clone();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Frame>();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(f.sync.run(frame_rx, cmd_rx));

        drop(frame_tx);
        cmd_tx.send(LocalCommand::Seek(pos(4.0))).unwrap();
        drop(cmd_tx);

        let mut sync = handle.await.unwrap();
        assert_eq!(surface.calls(), vec![Call::Seek(pos(4.0))]);
        assert!(!sync.fire_deferred());
    }
}
