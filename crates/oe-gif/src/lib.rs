//! GIF (Graphics Interface) emulation for oxidized-emotion
//!
//! The GIF sits between the rest of the Emotion Engine and the GS. It
//! decodes a streaming tag format (GIFtags) and routes payload quadwords
//! to GS registers named by a per-tag routing table. Three paths feed it:
//! VU1 `xgkick` (PATH1), VIF1 `DIRECT` (PATH2) and the GIF DMA channel
//! (PATH3).

pub mod path;
pub mod sink;
pub mod tag;

pub use path::{GifPath, PathStatus};
pub use sink::{GsRegisterSink, NullGsSink, RecordingGsSink};
pub use tag::{GifFormat, GifTag};
