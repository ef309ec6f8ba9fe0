//! Frame orchestration for the Ember engine.
//!
//! Builds the GPU resource chain once at startup, then drives
//! acquire → record → submit → present with a fixed number of frames in
//! flight.

pub mod frame;
pub mod pass;
pub mod system;

pub use frame::{FlightTracker, MAX_FRAMES_IN_FLIGHT};
pub use pass::{ClearPass, FramePass, RecordContext, TrianglePass};
pub use system::{FrameError, FrameStatus, RenderConfig, RenderSystem};
