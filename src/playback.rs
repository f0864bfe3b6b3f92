//! Looping playback of a frame-sequence clip.

use std::time::{Duration, Instant};

use crate::events::PlaybackCommand;

/// The operations the keyboard can request outside of geometry.
pub trait Playback {
    fn toggle_play(&mut self);
    fn seek_start(&mut self);
    fn toggle_fullscreen(&mut self);
    fn exit_fullscreen(&mut self);
}

/// Route a command to the matching [`Playback`] operation.
pub fn dispatch<P: Playback + ?Sized>(target: &mut P, cmd: PlaybackCommand) {
    match cmd {
        PlaybackCommand::TogglePlay => target.toggle_play(),
        PlaybackCommand::SeekStart => target.seek_start(),
        PlaybackCommand::ToggleFullscreen => target.toggle_fullscreen(),
        PlaybackCommand::ExitFullscreen => target.exit_fullscreen(),
    }
}

/// Clock for a clip of `frame_count` frames that loops forever.
#[derive(Debug, Clone)]
pub struct ClipPlayer {
    frame_count: usize,
    frame_interval: Duration,
    playing: bool,
    position: Duration,
    last_tick: Option<Instant>,
}

impl ClipPlayer {
    pub fn new(frame_count: usize, frame_rate: f32) -> Self {
        let fps = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            1.0
        };
        Self {
            frame_count: frame_count.max(1),
            frame_interval: Duration::from_secs_f64(1.0 / f64::from(fps)),
            playing: true,
            position: Duration::ZERO,
            last_tick: None,
        }
    }

    /// Advance the clock to `now` and return the frame that should be shown.
    pub fn tick(&mut self, now: Instant) -> usize {
        if let Some(last) = self.last_tick
            && self.playing
        {
            self.position += now.saturating_duration_since(last);
            let length = self.duration();
            if self.position >= length {
                let wrapped = self.position.as_nanos() % length.as_nanos().max(1);
                self.position = Duration::from_nanos(wrapped as u64);
            }
        }
        self.last_tick = Some(now);
        self.current_frame()
    }

    pub fn current_frame(&self) -> usize {
        let step = self.frame_interval.as_nanos().max(1);
        ((self.position.as_nanos() / step) as usize).min(self.frame_count - 1)
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn duration(&self) -> Duration {
        self.frame_interval * u32::try_from(self.frame_count).unwrap_or(u32::MAX)
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn rewind(&mut self) {
        self.position = Duration::ZERO;
    }
}

/// `m:ss`, or `h:mm:ss` once the clock passes an hour.
pub fn format_clock(t: Duration) -> String {
    let secs = t.as_secs();
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loops_back_to_first_frame() {
        let t0 = Instant::now();
        let mut player = ClipPlayer::new(4, 10.0);
        assert_eq!(player.tick(t0), 0);
        assert_eq!(player.tick(t0 + Duration::from_millis(150)), 1);
        assert_eq!(player.tick(t0 + Duration::from_millis(350)), 3);
        // 450ms into a 400ms clip
        assert_eq!(player.tick(t0 + Duration::from_millis(450)), 0);
    }

    #[test]
    fn pause_freezes_and_rewind_resets() {
        let t0 = Instant::now();
        let mut player = ClipPlayer::new(10, 10.0);
        player.tick(t0);
        assert_eq!(player.tick(t0 + Duration::from_millis(250)), 2);
        player.set_playing(false);
        assert_eq!(player.tick(t0 + Duration::from_secs(5)), 2);
        player.rewind();
        assert_eq!(player.current_frame(), 0);
        player.set_playing(true);
        // time spent paused is not counted
        assert_eq!(player.tick(t0 + Duration::from_millis(5_120)), 1);
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(Duration::from_secs(0)), "0:00");
        assert_eq!(format_clock(Duration::from_secs(75)), "1:15");
        assert_eq!(format_clock(Duration::from_secs(3_725)), "1:02:05");
    }

    #[derive(Default)]
    struct Recorder(Vec<&'static str>);

    impl Playback for Recorder {
        fn toggle_play(&mut self) {
            self.0.push("play");
        }
        fn seek_start(&mut self) {
            self.0.push("home");
        }
        fn toggle_fullscreen(&mut self) {
            self.0.push("fullscreen");
        }
        fn exit_fullscreen(&mut self) {
            self.0.push("windowed");
        }
    }

    #[test]
    fn dispatch_routes_each_command() {
        let mut rec = Recorder::default();
        for cmd in [
            PlaybackCommand::TogglePlay,
            PlaybackCommand::SeekStart,
            PlaybackCommand::ToggleFullscreen,
            PlaybackCommand::ExitFullscreen,
        ] {
            dispatch(&mut rec, cmd);
        }
        assert_eq!(rec.0, vec!["play", "home", "fullscreen", "windowed"]);
    }
}
