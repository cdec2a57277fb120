//! Audio engine seam
//!
//! The reconciler drives playback through this trait rather than a concrete
//! backend, so each platform (web audio, native pipeline, cast target) plugs
//! in its own implementation.

/// Control surface of the local audio engine
pub trait AudioEngine {
    /// Load a song and position it without changing the play/pause state
    fn load(&mut self, song_id: &str, position_secs: f64);

    /// Resume playback of the loaded song
    fn play(&mut self);

    /// Pause playback, keeping the position
    fn pause(&mut self);

    /// Halt playback entirely (used when this device loses active status)
    fn stop(&mut self);

    /// Set output volume (0-100)
    fn set_volume(&mut self, volume: u8);

    /// Seek within the loaded song
    fn seek(&mut self, position_secs: f64);
}

/// Events the audio engine reports back to the reconciler
///
/// Engines emit these for every observable transition, including ones the
/// reconciler itself caused; the reconciler's settle window filters the
/// echoes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Playback started (user action or engine callback)
    Played,

    /// Playback paused
    Paused,

    /// The current song played to completion
    TrackEnded,
}
