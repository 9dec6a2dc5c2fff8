use bevy::prelude::*;

/// Normalized loudness consumed by the expansion stage once per frame.
///
/// Written by whatever analyser the app wires in; values are clamped to
/// `[0, 1]` on write and non-finite values read as silence.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioLevel(f32);

impl AudioLevel {
    pub fn new(level: f32) -> Self {
        let mut audio = Self::default();
        audio.set(level);
        audio
    }

    pub fn level(&self) -> f32 {
        self.0
    }

    pub fn set(&mut self, level: f32) {
        self.0 = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}

/// Source of audio levels. Implementors are polled by [`update_audio_level`].
pub trait AudioLevelTracker: Send + Sync + 'static {
    /// Current normalized level given the app's elapsed seconds.
    fn normalized_level(&mut self, elapsed_seconds: f32) -> f32;
}

/// Boxed tracker driving the [`AudioLevel`] resource.
#[derive(Resource)]
pub struct ActiveAudioTracker(pub Box<dyn AudioLevelTracker>);

/// Samples the active tracker into [`AudioLevel`], if one is installed.
pub fn update_audio_level(
    time: Res<Time>,
    tracker: Option<ResMut<ActiveAudioTracker>>,
    mut audio: ResMut<AudioLevel>,
) {
    if let Some(mut tracker) = tracker {
        let level = tracker.0.normalized_level(time.elapsed_secs());
        audio.set(level);
    }
}

/// Synthetic tracker: a rectified sine with a slower swell, for demos without capture.
#[derive(Debug, Clone, Copy)]
pub struct OscillatingLevel {
    pub frequency_hz: f32,
}

impl Default for OscillatingLevel {
    fn default() -> Self {
        Self { frequency_hz: 0.5 }
    }
}

impl AudioLevelTracker for OscillatingLevel {
    fn normalized_level(&mut self, elapsed_seconds: f32) -> f32 {
        let beat = (elapsed_seconds * self.frequency_hz * std::f32::consts::TAU).sin().abs();
        let swell = 0.5 + 0.5 * (elapsed_seconds * 0.1 * std::f32::consts::TAU).sin();
        beat * swell
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_clamped_on_write() {
        assert_eq!(AudioLevel::new(1.7).level(), 1.0);
        assert_eq!(AudioLevel::new(-0.2).level(), 0.0);
        assert_eq!(AudioLevel::new(f32::NAN).level(), 0.0);
        assert_eq!(AudioLevel::new(0.25).level(), 0.25);
    }

    #[test]
    fn oscillating_level_stays_normalized() {
        let mut tracker = OscillatingLevel::default();
        for step in 0..500 {
            let level = tracker.normalized_level(step as f32 * 0.033);
            assert!((0.0..=1.0).contains(&level));
        }
    }
}
