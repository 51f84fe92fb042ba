//! Realtime mirror of file status and the live connections it feeds.

pub mod file_progress;
pub mod mirror;
pub mod registry;

pub use file_progress::FileProgressTracker;
pub use mirror::{file_path, BroadcastMirror, MirrorEvent, MirrorOp, NoopMirror, RealtimeMirror};
pub use registry::{ConnectionHandle, ConnectionRegistry};
