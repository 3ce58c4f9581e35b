//! VIF command word decoding
//!
//! A command word is 32 bits: bits 24..31 the command code, bit 31 an
//! interrupt-request flag, bits 0..24 command-specific immediate fields.

/// Decoded command code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VifCommand {
    Nop,
    /// Write transfer-cycle registers CL/WL
    Stcycl,
    /// Double-buffer offset (VIF1)
    Offset,
    /// Double-buffer base (VIF1)
    Base,
    /// Next ITOP value, latched into the VU on the next program start
    Itop,
    /// Addition-decompression mode
    Stmod,
    /// GIF PATH3 mask (VIF1)
    MskPath3,
    Mark,
    /// Wait for microprogram end (completes immediately here)
    FlushE,
    /// FLUSHE plus GIF path idle (VIF1)
    Flush,
    /// FLUSH plus PATH3 idle (VIF1)
    FlushA,
    /// Start microprogram at the immediate address
    Mscal,
    /// Flush, then start microprogram
    Mscalf,
    /// Resume microprogram at the current PC
    Mscnt,
    /// 1 payload word: write-mask register
    Stmask,
    /// 4 payload words: filling-row register
    Strow,
    /// 4 payload words: filling-column register
    Stcol,
    /// Microcode upload: NUM 64-bit words into micro memory
    Mpg,
    /// Raw quadword pass-through to the GIF (VIF1)
    Direct,
    /// DIRECT variant with different PATH3 priority, same data path
    DirectHl,
    /// Compressed vertex upload family, 0x60..=0x7F
    Unpack(u8),
    Unknown(u8),
}

/// Split a command word into its code and the interrupt-request bit
pub fn decode_command(word: u32) -> (VifCommand, bool) {
    let irq = word & (1 << 31) != 0;
    let code = ((word >> 24) & 0x7F) as u8;
    let cmd = match code {
        0x00 => VifCommand::Nop,
        0x01 => VifCommand::Stcycl,
        0x02 => VifCommand::Offset,
        0x03 => VifCommand::Base,
        0x04 => VifCommand::Itop,
        0x05 => VifCommand::Stmod,
        0x06 => VifCommand::MskPath3,
        0x07 => VifCommand::Mark,
        0x10 => VifCommand::FlushE,
        0x11 => VifCommand::Flush,
        0x13 => VifCommand::FlushA,
        0x14 => VifCommand::Mscal,
        0x15 => VifCommand::Mscalf,
        0x17 => VifCommand::Mscnt,
        0x20 => VifCommand::Stmask,
        0x30 => VifCommand::Strow,
        0x31 => VifCommand::Stcol,
        0x4A => VifCommand::Mpg,
        0x50 => VifCommand::Direct,
        0x51 => VifCommand::DirectHl,
        0x60..=0x7F => VifCommand::Unpack(code),
        other => VifCommand::Unknown(other),
    };
    (cmd, irq)
}

/// Payload length in 32-bit words, fixed at decode time
pub fn payload_words(cmd: VifCommand, word: u32) -> usize {
    match cmd {
        VifCommand::Stmask => 1,
        VifCommand::Strow | VifCommand::Stcol => 4,
        VifCommand::Mpg => {
            // NUM 64-bit instructions, 0 encodes 256
            let num = (word >> 16) & 0xFF;
            let num = if num == 0 { 256 } else { num as usize };
            num * 2
        }
        VifCommand::Direct | VifCommand::DirectHl => {
            // immediate quadword count, 0 encodes 65536
            let size = word & 0xFFFF;
            let size = if size == 0 { 0x1_0000 } else { size as usize };
            size * 4
        }
        VifCommand::Unpack(code) => unpack_words(code, word),
        _ => 0,
    }
}

/// Packed size of an UNPACK payload. The format nibble encodes element
/// width (VL) and element count (VN); NUM is the vector count.
fn unpack_words(code: u8, word: u32) -> usize {
    let vl = (code & 3) as u32;
    let vn = ((code >> 2) & 3) as u32;
    let num = (word >> 16) & 0xFF;
    let num = if num == 0 { 256 } else { num };
    let bits = num * (vn + 1) * (32 >> vl);
    bits.div_ceil(32) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_codes() {
        assert_eq!(decode_command(0x0000_0000).0, VifCommand::Nop);
        assert_eq!(decode_command(0x0100_0102).0, VifCommand::Stcycl);
        assert_eq!(decode_command(0x1400_0000).0, VifCommand::Mscal);
        assert_eq!(decode_command(0x4A00_0000).0, VifCommand::Mpg);
        assert_eq!(decode_command(0x6000_0000).0, VifCommand::Unpack(0x60));
        assert_eq!(decode_command(0x0800_0000).0, VifCommand::Unknown(0x08));
    }

    #[test]
    fn test_irq_flag() {
        let (cmd, irq) = decode_command(0x8000_0000);
        assert_eq!(cmd, VifCommand::Nop);
        assert!(irq);
        assert!(!decode_command(0x0700_0000).1);
    }

    #[test]
    fn test_mpg_payload_count() {
        // NUM = 3 instructions: 6 words
        assert_eq!(payload_words(VifCommand::Mpg, 0x4A03_0000), 6);
        // NUM = 0 encodes 256
        assert_eq!(payload_words(VifCommand::Mpg, 0x4A00_0000), 512);
    }

    #[test]
    fn test_direct_payload_count() {
        assert_eq!(payload_words(VifCommand::Direct, 0x5000_0002), 8);
        assert_eq!(payload_words(VifCommand::Direct, 0x5000_0000), 0x4_0000);
    }

    #[test]
    fn test_unpack_sizes() {
        // V4-32 (code 0x6C): 4 words per vector
        assert_eq!(payload_words(VifCommand::Unpack(0x6C), 0x6C02_0000), 8);
        // V3-16 (code 0x69): 3 halfwords per vector, rounds up
        assert_eq!(payload_words(VifCommand::Unpack(0x69), 0x6903_0000), 5);
        // S-8 (code 0x62): one byte per vector
        assert_eq!(payload_words(VifCommand::Unpack(0x62), 0x6204_0000), 1);
    }

    #[test]
    fn test_config_commands_have_no_payload() {
        for cmd in [
            VifCommand::Nop,
            VifCommand::Stcycl,
            VifCommand::Itop,
            VifCommand::Mark,
            VifCommand::Mscal,
            VifCommand::FlushE,
        ] {
            assert_eq!(payload_words(cmd, 0), 0);
        }
    }
}
