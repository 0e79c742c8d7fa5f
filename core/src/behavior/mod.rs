//! Behavioral evidence: accelerometer readings around touch events

pub mod capture;
pub mod ring_buffer;

pub use capture::{BehaviorCapture, MotionSink, MotionSource, NoMotionSource, TouchPoint};
pub use ring_buffer::{MotionSample, RingBuffer};
