//! End-to-end tests driving the subsystem through its bus interface

use oe_core::{DmacError, EmotionError};
use oe_integration::EmotionSubsystem;

// DMA channel register banks
const VIF1_CHCR: u32 = 0x1000_9000;
const VIF1_MADR: u32 = 0x1000_9010;
const VIF1_QWC: u32 = 0x1000_9020;
const GIF_CHCR: u32 = 0x1000_A000;
const GIF_MADR: u32 = 0x1000_A010;
const GIF_QWC: u32 = 0x1000_A020;
const GIF_TADR: u32 = 0x1000_A030;
const SIF0_CHCR: u32 = 0x1000_C000;
const D_STAT: u32 = 0x1000_E010;

const CHCR_DIR: u32 = 1 << 0;
const CHCR_CHAIN: u32 = 1 << 2;
const CHCR_TIE: u32 = 1 << 7;
const CHCR_STR: u32 = 1 << 8;

/// Upper half that decodes as a no-op
const UPPER_NOP: u32 = 0x3C | 0x0B << 6 | 3;
/// Lower half that decodes as a no-op
const LOWER_NOP: u32 = 0x41 << 25;
/// E bit in the upper word
const E_BIT: u32 = 1 << 30;

fn pack_qword(words: [u32; 4]) -> u128 {
    words
        .iter()
        .enumerate()
        .fold(0u128, |acc, (i, w)| acc | (*w as u128) << (32 * i))
}

#[test]
fn test_mpg_mscal_program_via_dma() {
    let mut sys = EmotionSubsystem::new();

    // VIF1 packet: MPG 3 instructions at address 0, then MSCAL 0.
    // The microprogram sets vi01 = 7 and terminates.
    let iaddiu = 0x08 << 25 | 1 << 16 | 7; // iaddiu vi01, vi00, 7
    let words: [u32; 8] = [
        0x4A03_0000, // MPG num=3 imm=0
        iaddiu,
        UPPER_NOP,
        LOWER_NOP,
        UPPER_NOP | E_BIT,
        LOWER_NOP,
        UPPER_NOP,
        0x1400_0000, // MSCAL 0
    ];
    sys.mem.write128(0x1000, pack_qword(words[0..4].try_into().unwrap()));
    sys.mem.write128(0x1010, pack_qword(words[4..8].try_into().unwrap()));

    sys.write32(VIF1_MADR, 0x1000).unwrap();
    sys.write32(VIF1_QWC, 2).unwrap();
    sys.write32(VIF1_CHCR, CHCR_DIR | CHCR_STR).unwrap();
    sys.step().unwrap();

    assert_eq!(sys.vu1.regs.vi(1), 7);
    assert_eq!(sys.vu1.regs.tpc, 0);
    assert!(!sys.vu1.running);
    // channel completed and raised its flag
    assert_eq!(sys.read32(VIF1_CHCR) & CHCR_STR, 0);
    assert_eq!(sys.read32(D_STAT) & (1 << 1), 1 << 1);
}

#[test]
fn test_sif0_empty_fifo_makes_no_progress() {
    let mut sys = EmotionSubsystem::new();
    sys.write32(SIF0_CHCR, CHCR_CHAIN | CHCR_STR).unwrap();

    sys.step().unwrap();
    sys.step().unwrap();

    // still waiting on the rendezvous FIFO, no completion flag
    assert_eq!(sys.read32(SIF0_CHCR) & CHCR_STR, CHCR_STR);
    assert_eq!(sys.read32(D_STAT) & (1 << 5), 0);

    // tag arrives with its payload: the transfer lands in memory
    sys.dmac.sif0_push(1 | 7 << 28 | 0x4000u128 << 32); // END, 1 qword
    sys.dmac.sif0_push(0xFEED);
    sys.step().unwrap();
    assert_eq!(sys.mem.read128(0x4000), 0xFEED);
    assert_eq!(sys.read32(SIF0_CHCR) & CHCR_STR, 0);
}

#[test]
fn test_gif_packet_returns_to_await_tag() {
    let mut sys = EmotionSubsystem::new();

    // Packed GIFtag: nloop=2, eop, nregs=4, regs 0..3; exactly 8 payload
    // quadwords follow
    let tag: u128 = 2 | 1 << 15 | 4u128 << 60 | 0x3210u128 << 64;
    sys.mem.write128(0x2000, tag);
    for i in 0..8u32 {
        sys.mem.write128(0x2010 + i * 16, 0x100 + i as u128);
    }

    sys.write32(GIF_MADR, 0x2000).unwrap();
    sys.write32(GIF_QWC, 9).unwrap();
    sys.write32(GIF_CHCR, CHCR_DIR | CHCR_STR).unwrap();
    sys.step().unwrap();

    assert!(sys.gif.awaiting_tag());
    assert_eq!(sys.gs.writes.len(), 8);
    let regs: Vec<u8> = sys.gs.writes.iter().map(|(r, _)| *r).collect();
    assert_eq!(regs, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    assert_eq!(sys.read32(GIF_CHCR) & CHCR_STR, 0);
}

#[test]
fn test_chain_interrupt_raised_exactly_once() {
    let mut sys = EmotionSubsystem::new();

    // Single REFE tag with IRQ set, payload is one NLOOP=0 EOP GIFtag
    let tag: u128 = 1 | 1 << 31 | 0x3000u128 << 32;
    sys.mem.write128(0x1000, tag);
    sys.mem.write128(0x3000, 1 << 15);

    sys.write32(GIF_TADR, 0x1000).unwrap();
    sys.write32(GIF_CHCR, CHCR_DIR | CHCR_CHAIN | CHCR_TIE | CHCR_STR)
        .unwrap();
    // unmask the GIF interrupt
    sys.write32(D_STAT, (1 << 2) << 16).unwrap();

    sys.step().unwrap();
    assert_eq!(sys.read32(GIF_CHCR) & CHCR_STR, 0);
    assert_eq!(sys.read32(D_STAT) & (1 << 2), 1 << 2);
    assert!(sys.irq_line());
    assert!(sys.gif.awaiting_tag());

    // acknowledge: the flag clears and stays clear across further steps
    sys.write32(D_STAT, 1 << 2).unwrap();
    assert!(!sys.irq_line());
    sys.step().unwrap();
    assert_eq!(sys.read32(D_STAT) & (1 << 2), 0);
}

#[test]
fn test_busy_channel_start_rejected() {
    let mut sys = EmotionSubsystem::new();
    sys.write32(SIF0_CHCR, CHCR_CHAIN | CHCR_STR).unwrap();
    // the empty FIFO keeps it busy across steps
    sys.step().unwrap();
    let err = sys.write32(SIF0_CHCR, CHCR_CHAIN | CHCR_STR).unwrap_err();
    assert!(matches!(
        err,
        EmotionError::Dmac(DmacError::ChannelBusy { channel: 5 })
    ));
}
