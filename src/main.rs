//! Oxidized-Emotion - PS2 Emotion Engine vector subsystem emulator
//!
//! Main entry point. Builds the subsystem from the optional
//! `oxidized-emotion.toml` configuration and runs a short demonstration
//! workload through the DMA/VIF/VU/GIF pipeline.

use anyhow::Result;
use oe_core::Config;
use oe_debug::VuDisassembler;
use oe_integration::EmotionSubsystem;

const VIF1_CHCR: u32 = 0x1000_9000;
const VIF1_MADR: u32 = 0x1000_9010;
const VIF1_QWC: u32 = 0x1000_9020;
const GIF_CHCR: u32 = 0x1000_A000;
const GIF_MADR: u32 = 0x1000_A010;
const GIF_QWC: u32 = 0x1000_A020;

fn main() -> Result<()> {
    oe_core::logging::init();
    tracing::info!("Starting Oxidized-Emotion PS2 vector subsystem emulator");

    let config = load_config()?;
    let mut sys = EmotionSubsystem::with_config(&config);

    run_demo(&mut sys, &config)?;
    Ok(())
}

/// Read `oxidized-emotion.toml` from the working directory, if present
fn load_config() -> Result<Config> {
    let path = std::path::Path::new("oxidized-emotion.toml");
    if path.exists() {
        tracing::info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Ok(Config::from_toml(&text)?)
    } else {
        Ok(Config::default())
    }
}

/// Push a microprogram through VIF1, run it, then stream a GIF packet
fn run_demo(sys: &mut EmotionSubsystem, config: &Config) -> Result<()> {
    // Microprogram: vi01 = 7, then terminate
    let upper_nop: u32 = 0x3C | 0x0B << 6 | 3;
    let lower_nop: u32 = 0x41 << 25;
    let iaddiu = 0x08 << 25 | 1 << 16 | 7;

    // VIF1 packet: MPG of 3 instructions at address 0, then MSCAL 0
    let words: [u32; 8] = [
        0x4A03_0000,
        iaddiu,
        upper_nop,
        lower_nop,
        upper_nop | 1 << 30, // E bit
        lower_nop,
        upper_nop,
        0x1400_0000,
    ];
    for (i, pair) in words.chunks(4).enumerate() {
        let qw = pair
            .iter()
            .enumerate()
            .fold(0u128, |acc, (j, w)| acc | (*w as u128) << (32 * j));
        sys.mem.write128(0x1000 + i as u32 * 16, qw);
    }

    if config.debug.disassemble_uploads {
        for addr in 0..3u16 {
            let raw = (words[1 + addr as usize * 2] as u64)
                | (words[2 + addr as usize * 2] as u64) << 32;
            tracing::info!("{}", VuDisassembler::disassemble(addr, raw));
        }
    }

    sys.write32(VIF1_MADR, 0x1000)?;
    sys.write32(VIF1_QWC, 2)?;
    sys.write32(VIF1_CHCR, 1 | 1 << 8)?;
    sys.step()?;
    tracing::info!("VU1 microprogram finished, vi01 = {}", sys.vu1.regs.vi(1));

    // GIF packet: one A+D write of 0x1234 to GS register 0x42
    let tag: u128 = 1 | 1 << 15 | 1u128 << 60 | 0xEu128 << 64;
    sys.mem.write128(0x2000, tag);
    sys.mem.write128(0x2010, 0x1234 | 0x42u128 << 64);
    sys.write32(GIF_MADR, 0x2000)?;
    sys.write32(GIF_QWC, 2)?;
    sys.write32(GIF_CHCR, 1 | 1 << 8)?;
    sys.step()?;
    tracing::info!(
        "GIF packet streamed, {} GS register write(s) captured",
        sys.gs.writes.len()
    );

    Ok(())
}
