use bevy::prelude::*;
use bevy::window::PresentMode;

/// Canvas-bound window on the web, a plain vsynced window on native.
pub fn create_window_config() -> Window {
    #[cfg(target_arch = "wasm32")]
    {
        Window {
            title: "Noise Mesh".into(),
            canvas: Some("#bevy".into()),
            fit_canvas_to_parent: true,
            prevent_default_event_handling: false,
            present_mode: PresentMode::AutoVsync,
            ..default()
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        Window {
            title: "Noise Mesh".into(),
            present_mode: PresentMode::AutoVsync,
            ..default()
        }
    }
}
