/// Native FPS overlay text.
pub mod fps_tracking;
