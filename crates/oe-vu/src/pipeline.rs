//! Pipeline shadow state
//!
//! Three small structures model the timing side of the VU pipelines:
//! ring-buffer histories of destination/flag state, the delayed-result
//! scalar pipes (Q and P), and the one-slot integer write shadow that
//! branches read through. All of it is fixed-size and allocation-free.

/// Depth of the FMAC pipeline histories
pub const SHADOW_DEPTH: usize = 4;

/// Result latencies in bundles
pub const LAT_DIV: u8 = 7;
pub const LAT_SQRT: u8 = 7;
pub const LAT_RSQRT: u8 = 13;

/// A scalar result pipe (Q or P): the newly scheduled value becomes
/// visible only after the producing op's latency has elapsed. Reads in
/// the window return the previous value.
#[derive(Debug, Clone, Copy)]
pub struct DelayedScalar {
    current: f32,
    previous: f32,
    countdown: u8,
}

impl DelayedScalar {
    /// Power-on state: both values zero, nothing in flight
    pub fn new() -> Self {
        Self {
            current: 0.0,
            previous: 0.0,
            countdown: 0,
        }
    }

    /// Value visible to instructions right now
    #[inline]
    pub fn read(&self) -> f32 {
        if self.countdown > 0 {
            self.previous
        } else {
            self.current
        }
    }

    /// Schedule a new result with the given latency. The value visible
    /// at schedule time keeps being returned until the latency elapses.
    pub fn schedule(&mut self, value: f32, latency: u8) {
        self.previous = self.read();
        self.current = value;
        self.countdown = latency;
    }

    /// Advance one bundle
    #[inline]
    pub fn tick(&mut self) {
        self.countdown = self.countdown.saturating_sub(1);
    }

    /// `waitq`/`waitp`: collapse the remaining latency to zero
    pub fn force(&mut self) {
        self.countdown = 0;
    }

    /// True while a result is still in flight
    pub fn busy(&self) -> bool {
        self.countdown > 0
    }
}

impl Default for DelayedScalar {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-bundle histories of the two sub-pipes' destinations and of the
/// MAC/clip flag values. Advances exactly once per executed bundle,
/// even for pure no-ops, so the depth always means "bundles ago".
#[derive(Debug, Clone, Copy)]
pub struct PipeShadow {
    idx: usize,
    upper_dest: [(u8, u8); SHADOW_DEPTH],
    lower_dest: [(u8, u8); SHADOW_DEPTH],
    mac: [u16; SHADOW_DEPTH],
    clip: [u32; SHADOW_DEPTH],
}

impl PipeShadow {
    /// Empty histories
    pub fn new() -> Self {
        Self {
            idx: 0,
            upper_dest: [(0, 0); SHADOW_DEPTH],
            lower_dest: [(0, 0); SHADOW_DEPTH],
            mac: [0; SHADOW_DEPTH],
            clip: [0; SHADOW_DEPTH],
        }
    }

    /// Push one bundle's results. `upper`/`lower` are (register,
    /// lane-mask) pairs, zero when the half wrote nothing.
    pub fn advance(&mut self, upper: (u8, u8), lower: (u8, u8), mac: u16, clip: u32) {
        self.upper_dest[self.idx] = upper;
        self.lower_dest[self.idx] = lower;
        self.mac[self.idx] = mac;
        self.clip[self.idx] = clip;
        self.idx = (self.idx + 1) % SHADOW_DEPTH;
    }

    /// MAC flags as lower flag ops observe them: the value from the top
    /// of the FMAC pipe, `SHADOW_DEPTH` bundles ago.
    pub fn mac_visible(&self) -> u16 {
        self.mac[self.idx]
    }

    /// Clip flags with the same delayed visibility
    pub fn clip_visible(&self) -> u32 {
        self.clip[self.idx]
    }

    /// Most recent upper destination, for debug tooling
    pub fn last_upper_dest(&self) -> (u8, u8) {
        self.upper_dest[(self.idx + SHADOW_DEPTH - 1) % SHADOW_DEPTH]
    }
}

impl Default for PipeShadow {
    fn default() -> Self {
        Self::new()
    }
}

/// One-slot backup of the last integer-register write. Branch condition
/// reads issued while the write is still in flight (2 bundles) observe
/// the pre-write value, matching the hardware's VI branch hazard.
#[derive(Debug, Clone, Copy)]
pub struct IntWriteShadow {
    reg: u8,
    old: u16,
    countdown: u8,
}

impl IntWriteShadow {
    /// Inactive shadow
    pub fn new() -> Self {
        Self {
            reg: 0,
            old: 0,
            countdown: 0,
        }
    }

    /// Record a write about to land on `reg` whose pre-write value was `old`
    pub fn record(&mut self, reg: u8, old: u16) {
        if reg == 0 {
            return;
        }
        self.reg = reg;
        self.old = old;
        self.countdown = 2;
    }

    /// Advance one bundle
    #[inline]
    pub fn tick(&mut self) {
        self.countdown = self.countdown.saturating_sub(1);
    }

    /// Resolve a branch-side read of `reg` given its current value
    pub fn read(&self, reg: u8, current: u16) -> u16 {
        if self.countdown > 0 && self.reg == reg {
            self.old
        } else {
            current
        }
    }
}

impl Default for IntWriteShadow {
    fn default() -> Self {
        Self::new()
    }
}
