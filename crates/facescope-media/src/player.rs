//! Paced playback: a decoder thread publishing frames at the media's rate.

use crate::media::{MediaError, MediaHandle, MediaInfo};
use facescope_core::Frame;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};

/// Longest the player thread sleeps before checking for commands while playing.
const COMMAND_POLL: Duration = Duration::from_millis(5);

/// Read-only view of the most recently decoded frame.
///
/// Cloning is cheap; every clone sees the same latest frame.
#[derive(Clone)]
pub struct FrameTap {
    rx: watch::Receiver<Option<Arc<Frame>>>,
}

impl FrameTap {
    /// Create a publishing side and its tap. Playback engines keep the sender.
    pub fn channel() -> (watch::Sender<Option<Arc<Frame>>>, FrameTap) {
        let (tx, rx) = watch::channel(None);
        (tx, FrameTap { rx })
    }

    /// The latest frame, or `None` before the first decode.
    pub fn current(&self) -> Option<Arc<Frame>> {
        self.rx.borrow().clone()
    }
}

/// Playback engine driven by the frame source.
///
/// `play`/`pause`/`seek_to_start` are commands; `is_paused` reports the
/// engine's actual state, which may change on its own (end of stream).
pub trait PlaybackEngine: Send + 'static {
    fn load(&mut self, media: &MediaHandle) -> impl Future<Output = Result<MediaInfo, MediaError>> + Send;
    fn seek_to_start(&mut self) -> Result<(), MediaError>;
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self) -> Result<(), MediaError>;
    fn is_paused(&self) -> bool;
    fn frames(&self) -> FrameTap;
}

/// Sequential frame decoder for one piece of media at a time.
pub trait FrameDecoder: Send + 'static {
    fn open(&mut self, media: &MediaHandle) -> Result<MediaInfo, MediaError>;
    /// Next frame in presentation order; `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, MediaError>;
    fn rewind(&mut self) -> Result<(), MediaError>;
}

/// Messages sent from the frame source to the player thread.
enum PlayerCommand {
    Load {
        media: MediaHandle,
        reply: oneshot::Sender<Result<MediaInfo, MediaError>>,
    },
    Play,
    Pause,
    SeekToStart,
}

/// [`PlaybackEngine`] backed by a [`FrameDecoder`] on a dedicated thread.
///
/// Frames are published at the media frame rate while playing. Reaching the
/// end of the stream pauses the player; a later `play` restarts from the
/// beginning.
pub struct PacedPlayer {
    tx: mpsc::UnboundedSender<PlayerCommand>,
    paused: Arc<AtomicBool>,
    frames: FrameTap,
}

impl PacedPlayer {
    /// Start the player thread. It exits when the player is dropped.
    pub fn spawn<D: FrameDecoder>(decoder: D) -> Result<Self, MediaError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (frame_tx, frames) = FrameTap::channel();
        let paused = Arc::new(AtomicBool::new(true));

        let thread_paused = paused.clone();
        std::thread::Builder::new()
            .name("facescope-player".into())
            .spawn(move || {
                tracing::debug!("player thread started");
                PlayerLoop::new(decoder, frame_tx, thread_paused).run(rx);
                tracing::debug!("player thread exiting");
            })?;

        Ok(Self { tx, paused, frames })
    }

    fn send(&self, command: PlayerCommand) -> Result<(), MediaError> {
        self.tx.send(command).map_err(|_| MediaError::PlayerClosed)
    }
}

impl PlaybackEngine for PacedPlayer {
    fn load(&mut self, media: &MediaHandle) -> impl Future<Output = Result<MediaInfo, MediaError>> + Send {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.paused.store(true, Ordering::SeqCst);
        let sent = self.send(PlayerCommand::Load {
            media: media.clone(),
            reply: reply_tx,
        });
        async move {
            sent?;
            reply_rx.await.map_err(|_| MediaError::PlayerClosed)?
        }
    }

    fn seek_to_start(&mut self) -> Result<(), MediaError> {
        self.send(PlayerCommand::SeekToStart)
    }

    fn play(&mut self) -> Result<(), MediaError> {
        self.paused.store(false, Ordering::SeqCst);
        self.send(PlayerCommand::Play)
    }

    fn pause(&mut self) -> Result<(), MediaError> {
        self.paused.store(true, Ordering::SeqCst);
        self.send(PlayerCommand::Pause)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn frames(&self) -> FrameTap {
        self.frames.clone()
    }
}

/// State owned by the player thread.
struct PlayerLoop<D> {
    decoder: D,
    frame_tx: watch::Sender<Option<Arc<Frame>>>,
    paused: Arc<AtomicBool>,
    loaded: bool,
    playing: bool,
    at_end: bool,
    interval: Duration,
    next_due: Instant,
}

impl<D: FrameDecoder> PlayerLoop<D> {
    fn new(decoder: D, frame_tx: watch::Sender<Option<Arc<Frame>>>, paused: Arc<AtomicBool>) -> Self {
        Self {
            decoder,
            frame_tx,
            paused,
            loaded: false,
            playing: false,
            at_end: false,
            interval: Duration::from_secs_f64(1.0 / 30.0),
            next_due: Instant::now(),
        }
    }

    fn run(mut self, mut rx: mpsc::UnboundedReceiver<PlayerCommand>) {
        loop {
            // Idle players block on the next command; playing ones poll between frames.
            let command = if self.playing {
                match rx.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match rx.blocking_recv() {
                    Some(command) => Some(command),
                    None => break,
                }
            };

            if let Some(command) = command {
                self.handle(command);
                continue;
            }

            let now = Instant::now();
            if now < self.next_due {
                std::thread::sleep((self.next_due - now).min(COMMAND_POLL));
                continue;
            }
            self.advance(now);
        }
    }

    fn handle(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Load { media, reply } => {
                self.stop(false);
                self.frame_tx.send_replace(None);
                let result = self.decoder.open(&media);
                match &result {
                    Ok(info) => {
                        self.loaded = true;
                        self.at_end = false;
                        self.interval = info.frame_interval();
                        tracing::info!(
                            media = %media,
                            width = info.width,
                            height = info.height,
                            fps = info.fps,
                            codec = %info.codec,
                            "media loaded"
                        );
                    }
                    Err(e) => {
                        self.loaded = false;
                        tracing::warn!(media = %media, error = %e, "media load failed");
                    }
                }
                let _ = reply.send(result);
            }
            PlayerCommand::Play => {
                if !self.loaded {
                    tracing::debug!("play ignored: nothing loaded");
                    self.paused.store(true, Ordering::SeqCst);
                    return;
                }
                if self.at_end {
                    self.rewind();
                }
                self.playing = true;
                self.paused.store(false, Ordering::SeqCst);
                self.next_due = Instant::now();
            }
            PlayerCommand::Pause => self.stop(false),
            PlayerCommand::SeekToStart => {
                if self.loaded {
                    self.rewind();
                    self.next_due = Instant::now();
                }
            }
        }
    }

    /// Decode and publish the next frame, or pause at end of stream.
    fn advance(&mut self, now: Instant) {
        match self.decoder.next_frame() {
            Ok(Some(frame)) => {
                self.frame_tx.send_replace(Some(Arc::new(frame)));
                self.next_due += self.interval;
                // Decoding fell behind; resync instead of bursting to catch up.
                if self.next_due < now {
                    self.next_due = now + self.interval;
                }
            }
            Ok(None) => {
                tracing::info!("end of stream; pausing");
                self.stop(true);
            }
            Err(e) => {
                tracing::warn!(error = %e, "decode failed; pausing");
                self.stop(true);
            }
        }
    }

    fn rewind(&mut self) {
        if let Err(e) = self.decoder.rewind() {
            tracing::warn!(error = %e, "rewind failed");
        }
        self.at_end = false;
    }

    fn stop(&mut self, at_end: bool) {
        self.playing = false;
        self.at_end = at_end;
        self.paused.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decoder producing `total` solid frames at 200 fps.
    struct ScriptedDecoder {
        total: u64,
        next: u64,
        fail_open: bool,
    }

    impl ScriptedDecoder {
        fn new(total: u64) -> Self {
            Self { total, next: 0, fail_open: false }
        }
    }

    impl FrameDecoder for ScriptedDecoder {
        fn open(&mut self, media: &MediaHandle) -> Result<MediaInfo, MediaError> {
            if self.fail_open {
                return Err(MediaError::OpenFailed {
                    handle: media.to_string(),
                    reason: "scripted failure".into(),
                });
            }
            self.next = 0;
            Ok(MediaInfo { width: 4, height: 2, fps: 200.0, frame_count: Some(self.total), codec: "raw".into() })
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
            if self.next >= self.total {
                return Ok(None);
            }
            let seq = self.next;
            self.next += 1;
            let frame = Frame::from_rgb(vec![seq as u8; 4 * 2 * 3], 4, 2, seq, Duration::ZERO)
                .map_err(|e| MediaError::DecodeFailed(e.to_string()))?;
            Ok(Some(frame))
        }

        fn rewind(&mut self) -> Result<(), MediaError> {
            self.next = 0;
            Ok(())
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..400 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    #[tokio::test]
    async fn test_frame_tap_empty_before_decode() {
        let player = PacedPlayer::spawn(ScriptedDecoder::new(3)).unwrap();
        assert!(player.frames().current().is_none());
        assert!(player.is_paused());
    }

    #[tokio::test]
    async fn test_load_reports_info() {
        let mut player = PacedPlayer::spawn(ScriptedDecoder::new(3)).unwrap();
        let info = player.load(&MediaHandle::new("clip.mp4")).await.unwrap();
        assert_eq!((info.width, info.height), (4, 2));
        assert_eq!(info.frame_count, Some(3));
    }

    #[tokio::test]
    async fn test_load_failure_is_reported() {
        let mut decoder = ScriptedDecoder::new(3);
        decoder.fail_open = true;
        let mut player = PacedPlayer::spawn(decoder).unwrap();
        let result = player.load(&MediaHandle::new("clip.mp4")).await;
        assert!(matches!(result, Err(MediaError::OpenFailed { .. })));
    }

    #[tokio::test]
    async fn test_plays_to_end_then_pauses_itself() {
        let mut player = PacedPlayer::spawn(ScriptedDecoder::new(5)).unwrap();
        player.load(&MediaHandle::new("clip.mp4")).await.unwrap();
        player.play().unwrap();
        assert!(!player.is_paused());

        assert!(wait_until(|| player.is_paused()).await, "player should pause at end of stream");
        let last = player.frames().current().expect("frames were published");
        assert_eq!(last.sequence, 4);
    }

    #[tokio::test]
    async fn test_play_after_end_restarts_from_beginning() {
        let mut player = PacedPlayer::spawn(ScriptedDecoder::new(3)).unwrap();
        player.load(&MediaHandle::new("clip.mp4")).await.unwrap();
        player.play().unwrap();
        assert!(wait_until(|| player.is_paused()).await);

        player.play().unwrap();
        let tap = player.frames();
        // A restarted stream publishes sequence 0 again before reaching the end.
        assert!(wait_until(|| player.is_paused()).await);
        assert_eq!(tap.current().map(|f| f.sequence), Some(2));
    }

    #[tokio::test]
    async fn test_pause_stops_publishing() {
        let mut player = PacedPlayer::spawn(ScriptedDecoder::new(100_000)).unwrap();
        player.load(&MediaHandle::new("clip.mp4")).await.unwrap();
        player.play().unwrap();
        let tap = player.frames();
        assert!(wait_until(|| tap.current().is_some()).await);

        player.pause().unwrap();
        assert!(player.is_paused());
        tokio::time::sleep(Duration::from_millis(30)).await;
        let held = tap.current().map(|f| f.sequence);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tap.current().map(|f| f.sequence), held);
    }

    #[tokio::test]
    async fn test_play_without_media_stays_paused() {
        let mut player = PacedPlayer::spawn(ScriptedDecoder::new(3)).unwrap();
        player.play().unwrap();
        assert!(wait_until(|| player.is_paused()).await);
        assert!(player.frames().current().is_none());
    }
}
