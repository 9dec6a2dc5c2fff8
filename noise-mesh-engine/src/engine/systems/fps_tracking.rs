use crate::engine::audio::AudioLevel;
use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;

/// Overlay text showing frame rate and the audio level driving the mesh.
#[derive(Component)]
pub struct FpsText;

pub fn overlay_text(fps: Option<f64>, audio_level: f32) -> String {
    match fps {
        Some(fps) => format!("FPS: {fps:.1}  audio: {audio_level:.2}"),
        None => format!("FPS: --  audio: {audio_level:.2}"),
    }
}

pub fn fps_text_update_system(
    diagnostics: Res<DiagnosticsStore>,
    audio: Res<AudioLevel>,
    mut query: Query<&mut Text, With<FpsText>>,
) {
    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|fps| fps.smoothed());
    for mut text in &mut query {
        text.0 = overlay_text(fps, audio.level());
    }
}
