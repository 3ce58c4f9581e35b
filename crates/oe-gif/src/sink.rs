//! GS register sink
//!
//! The rasterizer proper lives outside this subsystem, so the GIF routes
//! decoded register traffic through a trait. This mirrors how the rest
//! of the emulator decouples producers from the graphics backend.

/// Receiver for GS register traffic produced by the GIF
pub trait GsRegisterSink {
    /// Inline PRIM value applied at tag fetch (PRE bit set)
    fn prim(&mut self, prim: u16);

    /// Routed register write. For A+D descriptors the register number
    /// comes from the payload and `data` holds the low 64 bits widened;
    /// for all other descriptors the full quadword is forwarded.
    fn write_register(&mut self, reg: u8, data: u128);

    /// Raw image-mode payload quadword
    fn write_image(&mut self, data: u128);
}

/// Sink that drops everything (headless operation)
#[derive(Debug, Default)]
pub struct NullGsSink;

impl GsRegisterSink for NullGsSink {
    fn prim(&mut self, _prim: u16) {}
    fn write_register(&mut self, _reg: u8, _data: u128) {}
    fn write_image(&mut self, _data: u128) {}
}

/// Sink that records all traffic, used by tests and debug tooling
#[derive(Debug, Default)]
pub struct RecordingGsSink {
    /// PRIM values seen, in order
    pub prims: Vec<u16>,
    /// (register, data) writes, in order
    pub writes: Vec<(u8, u128)>,
    /// Image payload quadwords, in order
    pub image: Vec<u128>,
}

impl RecordingGsSink {
    /// Create an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all recorded traffic
    pub fn clear(&mut self) {
        self.prims.clear();
        self.writes.clear();
        self.image.clear();
    }
}

impl GsRegisterSink for RecordingGsSink {
    fn prim(&mut self, prim: u16) {
        self.prims.push(prim);
    }

    fn write_register(&mut self, reg: u8, data: u128) {
        self.writes.push((reg, data));
    }

    fn write_image(&mut self, data: u128) {
        self.image.push(data);
    }
}
