//! VU microcode disassembler
//!
//! Renders both halves of a 64-bit instruction word. Every defined
//! opcode gets its own mnemonic; anything the decoder turns into a
//! no-op prints as `nop`.

use std::fmt;

use oe_vu::decoder::{decode, EfuKind, FmacKind, FmacSrc, LowerOp, LowerSlot, UpperOp};

/// A disassembled instruction word
#[derive(Debug, Clone)]
pub struct DisassembledInstruction {
    /// Address in instruction words
    pub address: u16,
    /// Raw 64-bit word
    pub raw: u64,
    /// Upper (FMAC) half text
    pub upper: String,
    /// Lower half text (or the I-register literal)
    pub lower: String,
}

impl fmt::Display for DisassembledInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}: {:016x}  {:<24} | {}",
            self.address, self.raw, self.upper, self.lower
        )
    }
}

/// VU instruction disassembler
pub struct VuDisassembler;

impl VuDisassembler {
    /// Disassemble one instruction word
    pub fn disassemble(address: u16, raw: u64) -> DisassembledInstruction {
        let bundle = decode(raw);
        let mut upper = Self::upper_text(&bundle.upper);
        if bundle.e_bit {
            upper.push_str(" [E]");
        }
        let lower = match bundle.lower {
            LowerSlot::Op(op) => Self::lower_text(&op),
            LowerSlot::Imm(bits) => {
                format!("loi {} (0x{:08x})", f32::from_bits(bits), bits)
            }
        };
        DisassembledInstruction {
            address,
            raw,
            upper,
            lower,
        }
    }

    /// Render the upper (FMAC) half
    pub fn upper_text(op: &UpperOp) -> String {
        match *op {
            UpperOp::Fmac { kind, src, acc, dest, fd, fs, ft } => {
                let base = match kind {
                    FmacKind::Add => "add",
                    FmacKind::Sub => "sub",
                    FmacKind::Mul => "mul",
                    FmacKind::Madd => "madd",
                    FmacKind::Msub => "msub",
                    FmacKind::Max => "max",
                    FmacKind::Mini => "mini",
                };
                let a = if acc { "a" } else { "" };
                let (suffix, operand) = match src {
                    FmacSrc::Reg => (String::new(), format!("vf{:02}", ft)),
                    FmacSrc::Bc(l) => {
                        (lane_name(l).to_string(), format!("vf{:02}{}", ft, lane_name(l)))
                    }
                    FmacSrc::Q => ("q".to_string(), "Q".to_string()),
                    FmacSrc::I => ("i".to_string(), "I".to_string()),
                };
                let target = if acc {
                    "ACC".to_string()
                } else {
                    format!("vf{:02}", fd)
                };
                format!(
                    "{}{}{}{} {}, vf{:02}, {}",
                    base,
                    a,
                    suffix,
                    mask_suffix(dest),
                    target,
                    fs,
                    operand
                )
            }
            UpperOp::Opmula { fs, ft } => {
                format!("opmula.xyz ACC, vf{:02}, vf{:02}", fs, ft)
            }
            UpperOp::Opmsub { fd, fs, ft } => {
                format!("opmsub.xyz vf{:02}, vf{:02}, vf{:02}", fd, fs, ft)
            }
            UpperOp::Abs { dest, fs, ft } => {
                format!("abs{} vf{:02}, vf{:02}", mask_suffix(dest), ft, fs)
            }
            UpperOp::Clip { fs, ft } => {
                format!("clipw.xyz vf{:02}, vf{:02}w", fs, ft)
            }
            UpperOp::Ftoi { shift, dest, fs, ft } => {
                format!("ftoi{}{} vf{:02}, vf{:02}", shift, mask_suffix(dest), ft, fs)
            }
            UpperOp::Itof { shift, dest, fs, ft } => {
                format!("itof{}{} vf{:02}, vf{:02}", shift, mask_suffix(dest), ft, fs)
            }
            UpperOp::Nop => "nop".to_string(),
        }
    }

    /// Render the lower half
    pub fn lower_text(op: &LowerOp) -> String {
        match *op {
            LowerOp::Lq { dest, ft, is, imm11 } => {
                format!("lq{} vf{:02}, {}(vi{:02})", mask_suffix(dest), ft, imm11, is)
            }
            LowerOp::Sq { dest, fs, it, imm11 } => {
                format!("sq{} vf{:02}, {}(vi{:02})", mask_suffix(dest), fs, imm11, it)
            }
            LowerOp::Lqi { dest, ft, is } => {
                format!("lqi{} vf{:02}, (vi{:02}++)", mask_suffix(dest), ft, is)
            }
            LowerOp::Sqi { dest, fs, it } => {
                format!("sqi{} vf{:02}, (vi{:02}++)", mask_suffix(dest), fs, it)
            }
            LowerOp::Lqd { dest, ft, is } => {
                format!("lqd{} vf{:02}, (--vi{:02})", mask_suffix(dest), ft, is)
            }
            LowerOp::Sqd { dest, fs, it } => {
                format!("sqd{} vf{:02}, (--vi{:02})", mask_suffix(dest), fs, it)
            }
            LowerOp::Ilw { dest, it, is, imm11 } => {
                format!("ilw{} vi{:02}, {}(vi{:02})", mask_suffix(dest), it, imm11, is)
            }
            LowerOp::Isw { dest, it, is, imm11 } => {
                format!("isw{} vi{:02}, {}(vi{:02})", mask_suffix(dest), it, imm11, is)
            }
            LowerOp::Ilwr { dest, it, is } => {
                format!("ilwr{} vi{:02}, (vi{:02})", mask_suffix(dest), it, is)
            }
            LowerOp::Iswr { dest, it, is } => {
                format!("iswr{} vi{:02}, (vi{:02})", mask_suffix(dest), it, is)
            }
            LowerOp::Iadd { id, is, it } => {
                format!("iadd vi{:02}, vi{:02}, vi{:02}", id, is, it)
            }
            LowerOp::Isub { id, is, it } => {
                format!("isub vi{:02}, vi{:02}, vi{:02}", id, is, it)
            }
            LowerOp::Iaddi { it, is, imm5 } => {
                format!("iaddi vi{:02}, vi{:02}, {}", it, is, imm5)
            }
            LowerOp::Iaddiu { it, is, imm15 } => {
                format!("iaddiu vi{:02}, vi{:02}, 0x{:04x}", it, is, imm15)
            }
            LowerOp::Isubiu { it, is, imm15 } => {
                format!("isubiu vi{:02}, vi{:02}, 0x{:04x}", it, is, imm15)
            }
            LowerOp::Iand { id, is, it } => {
                format!("iand vi{:02}, vi{:02}, vi{:02}", id, is, it)
            }
            LowerOp::Ior { id, is, it } => {
                format!("ior vi{:02}, vi{:02}, vi{:02}", id, is, it)
            }
            LowerOp::Move { dest, ft, fs } => {
                format!("move{} vf{:02}, vf{:02}", mask_suffix(dest), ft, fs)
            }
            LowerOp::Mr32 { dest, ft, fs } => {
                format!("mr32{} vf{:02}, vf{:02}", mask_suffix(dest), ft, fs)
            }
            LowerOp::Mfir { dest, ft, is } => {
                format!("mfir{} vf{:02}, vi{:02}", mask_suffix(dest), ft, is)
            }
            LowerOp::Mtir { it, fs, fsf } => {
                format!("mtir vi{:02}, vf{:02}{}", it, fs, lane_name(fsf))
            }
            LowerOp::Mfp { dest, ft } => {
                format!("mfp{} vf{:02}, P", mask_suffix(dest), ft)
            }
            LowerOp::Div { fs, fsf, ft, ftf } => {
                format!("div Q, vf{:02}{}, vf{:02}{}", fs, lane_name(fsf), ft, lane_name(ftf))
            }
            LowerOp::Sqrt { ft, ftf } => {
                format!("sqrt Q, vf{:02}{}", ft, lane_name(ftf))
            }
            LowerOp::Rsqrt { fs, fsf, ft, ftf } => {
                format!("rsqrt Q, vf{:02}{}, vf{:02}{}", fs, lane_name(fsf), ft, lane_name(ftf))
            }
            LowerOp::Waitq => "waitq".to_string(),
            LowerOp::Efu { kind, fs, fsf } => {
                format!("{} P, vf{:02}{}", efu_name(kind), fs, lane_name(fsf))
            }
            LowerOp::Waitp => "waitp".to_string(),
            LowerOp::Rinit { fs, fsf } => {
                format!("rinit R, vf{:02}{}", fs, lane_name(fsf))
            }
            LowerOp::Rget { dest, ft } => {
                format!("rget{} vf{:02}, R", mask_suffix(dest), ft)
            }
            LowerOp::Rnext { dest, ft } => {
                format!("rnext{} vf{:02}, R", mask_suffix(dest), ft)
            }
            LowerOp::Rxor { fs, fsf } => {
                format!("rxor R, vf{:02}{}", fs, lane_name(fsf))
            }
            LowerOp::Xgkick { is } => format!("xgkick vi{:02}", is),
            LowerOp::Xtop { it } => format!("xtop vi{:02}", it),
            LowerOp::Xitop { it } => format!("xitop vi{:02}", it),
            LowerOp::Fsand { it, imm12 } => format!("fsand vi{:02}, 0x{:03x}", it, imm12),
            LowerOp::Fsor { it, imm12 } => format!("fsor vi{:02}, 0x{:03x}", it, imm12),
            LowerOp::Fseq { it, imm12 } => format!("fseq vi{:02}, 0x{:03x}", it, imm12),
            LowerOp::Fsset { imm12 } => format!("fsset 0x{:03x}", imm12),
            LowerOp::Fmand { it, is } => format!("fmand vi{:02}, vi{:02}", it, is),
            LowerOp::Fmor { it, is } => format!("fmor vi{:02}, vi{:02}", it, is),
            LowerOp::Fmeq { it, is } => format!("fmeq vi{:02}, vi{:02}", it, is),
            LowerOp::Fcand { imm24 } => format!("fcand vi01, 0x{:06x}", imm24),
            LowerOp::Fcor { imm24 } => format!("fcor vi01, 0x{:06x}", imm24),
            LowerOp::Fceq { imm24 } => format!("fceq vi01, 0x{:06x}", imm24),
            LowerOp::Fcset { imm24 } => format!("fcset 0x{:06x}", imm24),
            LowerOp::Fcget { it } => format!("fcget vi{:02}", it),
            LowerOp::B { imm11 } => format!("b {:+}", imm11),
            LowerOp::Bal { it, imm11 } => format!("bal vi{:02}, {:+}", it, imm11),
            LowerOp::Jr { is } => format!("jr vi{:02}", is),
            LowerOp::Jalr { it, is } => format!("jalr vi{:02}, vi{:02}", it, is),
            LowerOp::Ibeq { it, is, imm11 } => {
                format!("ibeq vi{:02}, vi{:02}, {:+}", it, is, imm11)
            }
            LowerOp::Ibne { it, is, imm11 } => {
                format!("ibne vi{:02}, vi{:02}, {:+}", it, is, imm11)
            }
            LowerOp::Ibltz { is, imm11 } => format!("ibltz vi{:02}, {:+}", is, imm11),
            LowerOp::Ibgtz { is, imm11 } => format!("ibgtz vi{:02}, {:+}", is, imm11),
            LowerOp::Iblez { is, imm11 } => format!("iblez vi{:02}, {:+}", is, imm11),
            LowerOp::Ibgez { is, imm11 } => format!("ibgez vi{:02}, {:+}", is, imm11),
            LowerOp::Nop => "nop".to_string(),
        }
    }
}

fn lane_name(lane: u8) -> char {
    match lane & 3 {
        0 => 'x',
        1 => 'y',
        2 => 'z',
        _ => 'w',
    }
}

/// xyzw destination-mask suffix (x is bit 3)
fn mask_suffix(mask: u8) -> String {
    let mut s = String::from(".");
    for (lane, name) in ['x', 'y', 'z', 'w'].into_iter().enumerate() {
        if mask & (8 >> lane) != 0 {
            s.push(name);
        }
    }
    s
}

fn efu_name(kind: EfuKind) -> &'static str {
    match kind {
        EfuKind::Esadd => "esadd",
        EfuKind::Ersadd => "ersadd",
        EfuKind::Eleng => "eleng",
        EfuKind::Erleng => "erleng",
        EfuKind::Eatanxy => "eatanxy",
        EfuKind::Eatanxz => "eatanxz",
        EfuKind::Esum => "esum",
        EfuKind::Ercpr => "ercpr",
        EfuKind::Esqrt => "esqrt",
        EfuKind::Ersqrt => "ersqrt",
        EfuKind::Esin => "esin",
        EfuKind::Eatan => "eatan",
        EfuKind::Eexp => "eexp",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oe_vu::decoder::{decode_lower, decode_upper};

    #[test]
    fn test_add_renders_with_mask() {
        let word = 0x28 | 0xF << 21 | 2 << 16 | 1 << 11 | 3 << 6;
        let text = VuDisassembler::upper_text(&decode_upper(word));
        assert_eq!(text, "add.xyzw vf03, vf01, vf02");
    }

    #[test]
    fn test_broadcast_suffix() {
        // MULAx: extended opcode 0x18, bc lane 0
        let word = 0x3C | (0x18 >> 2) << 6 | 0xF << 21 | 2 << 16 | 1 << 11;
        let text = VuDisassembler::upper_text(&decode_upper(word));
        assert_eq!(text, "mulax.xyzw ACC, vf01, vf02x");
    }

    #[test]
    fn test_lower_div() {
        let word = 0x40 << 25 | 0x3C | (0x38 >> 2) << 6 | (0x38 & 3)
            | 1 << 21
            | 3 << 23
            | 2 << 16
            | 1 << 11;
        let text = VuDisassembler::lower_text(&decode_lower(word));
        assert_eq!(text, "div Q, vf01y, vf02w");
    }

    #[test]
    fn test_i_bit_literal() {
        let raw = (1u64 << 63) | 0x3F80_0000;
        let d = VuDisassembler::disassemble(0, raw);
        assert!(d.lower.starts_with("loi 1"));
    }

    #[test]
    fn test_e_bit_annotation() {
        let d = VuDisassembler::disassemble(0, 1u64 << 62);
        assert!(d.upper.ends_with("[E]"));
    }

    #[test]
    fn test_upper_mnemonics_distinct() {
        // One representative word per defined upper opcode family.
        // Distinct decoded descriptors must render distinct text.
        let mut words: Vec<u32> = Vec::new();
        let fields = 0xFu32 << 21 | 2 << 16 | 1 << 11 | 3 << 6;
        for op in [
            0x00, 0x04, 0x08, 0x0C, 0x10, 0x14, 0x18, 0x1C, 0x1D, 0x1E, 0x1F, 0x20, 0x21,
            0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B, 0x2C, 0x2D, 0x2E,
            0x2F,
        ] {
            words.push(op | fields);
        }
        // Extended space: bits 6..11 carry the opcode, so no fd field
        let efields = 0xFu32 << 21 | 2 << 16 | 1 << 11;
        for op11 in [
            0x00u32, 0x04, 0x08, 0x0C, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17,
            0x18, 0x1C, 0x1D, 0x1E, 0x1F, 0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27,
            0x28, 0x29, 0x2A, 0x2C, 0x2D, 0x2E,
        ] {
            words.push(0x3C | (op11 >> 2) << 6 | (op11 & 3) | efields);
        }

        let mut seen = std::collections::HashSet::new();
        for word in words {
            let op = decode_upper(word);
            assert_ne!(op, oe_vu::UpperOp::Nop, "word 0x{:08x} must be defined", word);
            let text = VuDisassembler::upper_text(&op);
            assert!(seen.insert(text.clone()), "duplicate mnemonic: {}", text);
        }
    }

    #[test]
    fn test_lower_mnemonics_distinct() {
        let mut words: Vec<u32> = Vec::new();
        for op7 in [
            0x00u32, 0x01, 0x04, 0x05, 0x08, 0x09, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15,
            0x16, 0x17, 0x18, 0x1A, 0x1B, 0x1C, 0x20, 0x21, 0x24, 0x25, 0x28, 0x29, 0x2C,
            0x2D, 0x2E, 0x2F,
        ] {
            words.push(op7 << 25 | 2 << 16 | 1 << 11);
        }
        for s1 in [0x30u32, 0x31, 0x32, 0x34, 0x35] {
            words.push(0x40 << 25 | s1 | 2 << 16 | 1 << 11 | 3 << 6);
        }
        for s2 in [
            0x30u32, 0x31, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D,
            0x3E, 0x3F, 0x40, 0x41, 0x42, 0x43, 0x64, 0x68, 0x69, 0x6C, 0x70, 0x71, 0x72,
            0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7B, 0x7C, 0x7D, 0x7E,
        ] {
            words.push(0x40 << 25 | 0x3C | (s2 >> 2) << 6 | (s2 & 3) | 2 << 16 | 1 << 11);
        }

        let mut seen = std::collections::HashSet::new();
        for word in words {
            let op = decode_lower(word);
            assert_ne!(op, oe_vu::LowerOp::Nop, "word 0x{:08x} must be defined", word);
            let text = VuDisassembler::lower_text(&op);
            assert!(seen.insert(text.clone()), "duplicate mnemonic: {}", text);
        }
    }
}
