//! VU instruction decoder
//!
//! Each 64-bit instruction word bundles two halves: the upper 32 bits
//! drive the FMAC pipe, the lower 32 bits the integer/branch/EFU pipe.
//! Decoding is a total function: unrecognized bit patterns become
//! explicit no-ops, never errors.

/// A decoded instruction word
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VuBundle {
    /// Raw instruction word
    pub raw: u64,
    /// Upper (FMAC) half
    pub upper: UpperOp,
    /// Lower half, or the I-register literal when the I bit is set
    pub lower: LowerSlot,
    /// E bit: terminate after one more bundle
    pub e_bit: bool,
    /// M bit (MSCALF sync, not modeled)
    pub m_bit: bool,
    /// D/T bits (debug breakpoints, not modeled)
    pub d_bit: bool,
    pub t_bit: bool,
}

/// Lower half: a decoded op, or a literal captured into the I register
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LowerSlot {
    Op(LowerOp),
    /// I bit set: the lower 32 bits are a float literal for I
    Imm(u32),
}

/// FMAC operation families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmacKind {
    Add,
    Sub,
    Mul,
    Madd,
    Msub,
    Max,
    Mini,
}

/// Second-operand source for an FMAC op
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmacSrc {
    /// vf[ft], lane-wise
    Reg,
    /// One lane of vf[ft] broadcast to all lanes (0 = x .. 3 = w)
    Bc(u8),
    /// The Q pipe's visible value
    Q,
    /// The I register
    I,
}

/// Upper-half micro-op descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpperOp {
    /// Multiply/add family. `acc` selects the accumulator-writing
    /// encoding (the broadcast multiply-accumulate space); otherwise the
    /// destination register and lane mask come from the instruction.
    Fmac {
        kind: FmacKind,
        src: FmacSrc,
        acc: bool,
        dest: u8,
        fd: u8,
        fs: u8,
        ft: u8,
    },
    /// Outer-product multiply into ACC (xyz)
    Opmula { fs: u8, ft: u8 },
    /// Outer-product subtract from ACC
    Opmsub { fd: u8, fs: u8, ft: u8 },
    Abs { dest: u8, fs: u8, ft: u8 },
    Clip { fs: u8, ft: u8 },
    /// Float to fixed-point, shift in {0,4,12,15}
    Ftoi { shift: u8, dest: u8, fs: u8, ft: u8 },
    /// Fixed-point to float
    Itof { shift: u8, dest: u8, fs: u8, ft: u8 },
    Nop,
}

/// Lower-half micro-op descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowerOp {
    // Loads/stores (addresses are quadword-granular)
    Lq { dest: u8, ft: u8, is: u8, imm11: i16 },
    Sq { dest: u8, fs: u8, it: u8, imm11: i16 },
    Lqi { dest: u8, ft: u8, is: u8 },
    Sqi { dest: u8, fs: u8, it: u8 },
    Lqd { dest: u8, ft: u8, is: u8 },
    Sqd { dest: u8, fs: u8, it: u8 },
    Ilw { dest: u8, it: u8, is: u8, imm11: i16 },
    Isw { dest: u8, it: u8, is: u8, imm11: i16 },
    Ilwr { dest: u8, it: u8, is: u8 },
    Iswr { dest: u8, it: u8, is: u8 },

    // Integer ALU
    Iadd { id: u8, is: u8, it: u8 },
    Isub { id: u8, is: u8, it: u8 },
    Iaddi { it: u8, is: u8, imm5: i8 },
    Iaddiu { it: u8, is: u8, imm15: u16 },
    Isubiu { it: u8, is: u8, imm15: u16 },
    Iand { id: u8, is: u8, it: u8 },
    Ior { id: u8, is: u8, it: u8 },

    // Register moves
    Move { dest: u8, ft: u8, fs: u8 },
    Mr32 { dest: u8, ft: u8, fs: u8 },
    Mfir { dest: u8, ft: u8, is: u8 },
    Mtir { it: u8, fs: u8, fsf: u8 },
    Mfp { dest: u8, ft: u8 },

    // Q pipe
    Div { fs: u8, fsf: u8, ft: u8, ftf: u8 },
    Sqrt { ft: u8, ftf: u8 },
    Rsqrt { fs: u8, fsf: u8, ft: u8, ftf: u8 },
    Waitq,

    // P pipe (EFU)
    Efu { kind: EfuKind, fs: u8, fsf: u8 },
    Waitp,

    // R register
    Rinit { fs: u8, fsf: u8 },
    Rget { dest: u8, ft: u8 },
    Rnext { dest: u8, ft: u8 },
    Rxor { fs: u8, fsf: u8 },

    // GIF kick and VIF pointers
    Xgkick { is: u8 },
    Xtop { it: u8 },
    Xitop { it: u8 },

    // Status/MAC/clip flag ops
    Fsand { it: u8, imm12: u16 },
    Fsor { it: u8, imm12: u16 },
    Fseq { it: u8, imm12: u16 },
    Fsset { imm12: u16 },
    Fmand { it: u8, is: u8 },
    Fmor { it: u8, is: u8 },
    Fmeq { it: u8, is: u8 },
    Fcand { imm24: u32 },
    Fcor { imm24: u32 },
    Fceq { imm24: u32 },
    Fcset { imm24: u32 },
    Fcget { it: u8 },

    // Branches (one delay slot)
    B { imm11: i16 },
    Bal { it: u8, imm11: i16 },
    Jr { is: u8 },
    Jalr { it: u8, is: u8 },
    Ibeq { it: u8, is: u8, imm11: i16 },
    Ibne { it: u8, is: u8, imm11: i16 },
    Ibltz { is: u8, imm11: i16 },
    Ibgtz { is: u8, imm11: i16 },
    Iblez { is: u8, imm11: i16 },
    Ibgez { is: u8, imm11: i16 },

    Nop,
}

/// EFU (transcendental) operations with their result latencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfuKind {
    Esadd,
    Ersadd,
    Eleng,
    Erleng,
    Eatanxy,
    Eatanxz,
    Esum,
    Ercpr,
    Esqrt,
    Ersqrt,
    Esin,
    Eatan,
    Eexp,
}

impl EfuKind {
    /// Documented P-pipe latency in bundles
    pub fn latency(&self) -> u8 {
        match self {
            Self::Esadd => 11,
            Self::Ersadd => 18,
            Self::Eleng => 18,
            Self::Erleng => 24,
            Self::Eatanxy | Self::Eatanxz | Self::Eatan => 54,
            Self::Esum => 12,
            Self::Ercpr => 12,
            Self::Esqrt => 12,
            Self::Ersqrt => 18,
            Self::Esin => 29,
            Self::Eexp => 44,
        }
    }
}

// Field extractors shared by both halves

#[inline]
fn dest(word: u32) -> u8 {
    ((word >> 21) & 0xF) as u8
}

#[inline]
fn rt(word: u32) -> u8 {
    ((word >> 16) & 0x1F) as u8
}

#[inline]
fn rs(word: u32) -> u8 {
    ((word >> 11) & 0x1F) as u8
}

#[inline]
fn rd(word: u32) -> u8 {
    ((word >> 6) & 0x1F) as u8
}

#[inline]
fn fsf(word: u32) -> u8 {
    ((word >> 21) & 3) as u8
}

#[inline]
fn ftf(word: u32) -> u8 {
    ((word >> 23) & 3) as u8
}

#[inline]
fn imm11(word: u32) -> i16 {
    let raw = (word & 0x7FF) as i16;
    if raw & 0x400 != 0 { raw | !0x7FF } else { raw }
}

#[inline]
fn imm12(word: u32) -> u16 {
    (((word >> 21) & 1) << 11 | (word & 0x7FF)) as u16
}

#[inline]
fn imm15(word: u32) -> u16 {
    (((word >> 21) & 0xF) << 11 | (word & 0x7FF)) as u16
}

#[inline]
fn imm24(word: u32) -> u32 {
    word & 0xFF_FFFF
}

/// Decode a full 64-bit instruction word
pub fn decode(raw: u64) -> VuBundle {
    let upper_word = (raw >> 32) as u32;
    let lower_word = raw as u32;
    let i_bit = upper_word & (1 << 31) != 0;
    let e_bit = upper_word & (1 << 30) != 0;
    let m_bit = upper_word & (1 << 29) != 0;
    let d_bit = upper_word & (1 << 28) != 0;
    let t_bit = upper_word & (1 << 27) != 0;

    let lower = if i_bit {
        LowerSlot::Imm(lower_word)
    } else {
        LowerSlot::Op(decode_lower(lower_word))
    };

    VuBundle {
        raw,
        upper: decode_upper(upper_word),
        lower,
        e_bit,
        m_bit,
        d_bit,
        t_bit,
    }
}

/// Decode the upper (FMAC) half
pub fn decode_upper(word: u32) -> UpperOp {
    let op = word & 0x3F;
    let (dest, ft, fs, fd) = (dest(word), rt(word), rs(word), rd(word));
    let bc = (word & 3) as u8;

    let fmac = |kind, src, acc| UpperOp::Fmac {
        kind,
        src,
        acc,
        dest,
        fd,
        fs,
        ft,
    };

    if op >= 0x3C {
        // Escape space: bits 6..11 plus the low two bits form an 11-bit
        // opcode; everything here writes ACC or a special resource.
        let op11 = ((word >> 6) & 0x1F) << 2 | (word & 3);
        return match op11 {
            0x00..=0x03 => fmac(FmacKind::Add, FmacSrc::Bc(bc), true),
            0x04..=0x07 => fmac(FmacKind::Sub, FmacSrc::Bc(bc), true),
            0x08..=0x0B => fmac(FmacKind::Madd, FmacSrc::Bc(bc), true),
            0x0C..=0x0F => fmac(FmacKind::Msub, FmacSrc::Bc(bc), true),
            0x10 => UpperOp::Itof { shift: 0, dest, fs, ft },
            0x11 => UpperOp::Itof { shift: 4, dest, fs, ft },
            0x12 => UpperOp::Itof { shift: 12, dest, fs, ft },
            0x13 => UpperOp::Itof { shift: 15, dest, fs, ft },
            0x14 => UpperOp::Ftoi { shift: 0, dest, fs, ft },
            0x15 => UpperOp::Ftoi { shift: 4, dest, fs, ft },
            0x16 => UpperOp::Ftoi { shift: 12, dest, fs, ft },
            0x17 => UpperOp::Ftoi { shift: 15, dest, fs, ft },
            0x18..=0x1B => fmac(FmacKind::Mul, FmacSrc::Bc(bc), true),
            0x1C => fmac(FmacKind::Mul, FmacSrc::Q, true),
            0x1D => UpperOp::Abs { dest, fs, ft },
            0x1E => fmac(FmacKind::Mul, FmacSrc::I, true),
            0x1F => UpperOp::Clip { fs, ft },
            0x20 => fmac(FmacKind::Add, FmacSrc::Q, true),
            0x21 => fmac(FmacKind::Madd, FmacSrc::Q, true),
            0x22 => fmac(FmacKind::Add, FmacSrc::I, true),
            0x23 => fmac(FmacKind::Madd, FmacSrc::I, true),
            0x24 => fmac(FmacKind::Sub, FmacSrc::Q, true),
            0x25 => fmac(FmacKind::Msub, FmacSrc::Q, true),
            0x26 => fmac(FmacKind::Sub, FmacSrc::I, true),
            0x27 => fmac(FmacKind::Msub, FmacSrc::I, true),
            0x28 => fmac(FmacKind::Add, FmacSrc::Reg, true),
            0x29 => fmac(FmacKind::Madd, FmacSrc::Reg, true),
            0x2A => fmac(FmacKind::Mul, FmacSrc::Reg, true),
            0x2C => fmac(FmacKind::Sub, FmacSrc::Reg, true),
            0x2D => fmac(FmacKind::Msub, FmacSrc::Reg, true),
            0x2E => UpperOp::Opmula { fs, ft },
            _ => UpperOp::Nop,
        };
    }

    match op {
        0x00..=0x03 => fmac(FmacKind::Add, FmacSrc::Bc(bc), false),
        0x04..=0x07 => fmac(FmacKind::Sub, FmacSrc::Bc(bc), false),
        0x08..=0x0B => fmac(FmacKind::Madd, FmacSrc::Bc(bc), false),
        0x0C..=0x0F => fmac(FmacKind::Msub, FmacSrc::Bc(bc), false),
        0x10..=0x13 => fmac(FmacKind::Max, FmacSrc::Bc(bc), false),
        0x14..=0x17 => fmac(FmacKind::Mini, FmacSrc::Bc(bc), false),
        0x18..=0x1B => fmac(FmacKind::Mul, FmacSrc::Bc(bc), false),
        0x1C => fmac(FmacKind::Mul, FmacSrc::Q, false),
        0x1D => fmac(FmacKind::Max, FmacSrc::I, false),
        0x1E => fmac(FmacKind::Mul, FmacSrc::I, false),
        0x1F => fmac(FmacKind::Mini, FmacSrc::I, false),
        0x20 => fmac(FmacKind::Add, FmacSrc::Q, false),
        0x21 => fmac(FmacKind::Madd, FmacSrc::Q, false),
        0x22 => fmac(FmacKind::Add, FmacSrc::I, false),
        0x23 => fmac(FmacKind::Madd, FmacSrc::I, false),
        0x24 => fmac(FmacKind::Sub, FmacSrc::Q, false),
        0x25 => fmac(FmacKind::Msub, FmacSrc::Q, false),
        0x26 => fmac(FmacKind::Sub, FmacSrc::I, false),
        0x27 => fmac(FmacKind::Msub, FmacSrc::I, false),
        0x28 => fmac(FmacKind::Add, FmacSrc::Reg, false),
        0x29 => fmac(FmacKind::Madd, FmacSrc::Reg, false),
        0x2A => fmac(FmacKind::Mul, FmacSrc::Reg, false),
        0x2B => fmac(FmacKind::Max, FmacSrc::Reg, false),
        0x2C => fmac(FmacKind::Sub, FmacSrc::Reg, false),
        0x2D => fmac(FmacKind::Msub, FmacSrc::Reg, false),
        0x2E => UpperOp::Opmsub { fd, fs, ft },
        0x2F => fmac(FmacKind::Mini, FmacSrc::Reg, false),
        _ => UpperOp::Nop,
    }
}

/// Decode the lower half
pub fn decode_lower(word: u32) -> LowerOp {
    let op7 = word >> 25;
    let (dest, it, is) = (dest(word), rt(word), rs(word));
    let (ft, fs) = (it, is);

    if op7 == 0x40 {
        return decode_lower_special(word);
    }

    match op7 {
        0x00 => LowerOp::Lq { dest, ft, is, imm11: imm11(word) },
        0x01 => LowerOp::Sq { dest, fs, it, imm11: imm11(word) },
        0x04 => LowerOp::Ilw { dest, it, is, imm11: imm11(word) },
        0x05 => LowerOp::Isw { dest, it, is, imm11: imm11(word) },
        0x08 => LowerOp::Iaddiu { it, is, imm15: imm15(word) },
        0x09 => LowerOp::Isubiu { it, is, imm15: imm15(word) },
        0x10 => LowerOp::Fceq { imm24: imm24(word) },
        0x11 => LowerOp::Fcset { imm24: imm24(word) },
        0x12 => LowerOp::Fcand { imm24: imm24(word) },
        0x13 => LowerOp::Fcor { imm24: imm24(word) },
        0x14 => LowerOp::Fseq { it, imm12: imm12(word) },
        0x15 => LowerOp::Fsset { imm12: imm12(word) },
        0x16 => LowerOp::Fsand { it, imm12: imm12(word) },
        0x17 => LowerOp::Fsor { it, imm12: imm12(word) },
        0x18 => LowerOp::Fmeq { it, is },
        0x1A => LowerOp::Fmand { it, is },
        0x1B => LowerOp::Fmor { it, is },
        0x1C => LowerOp::Fcget { it },
        0x20 => LowerOp::B { imm11: imm11(word) },
        0x21 => LowerOp::Bal { it, imm11: imm11(word) },
        0x24 => LowerOp::Jr { is },
        0x25 => LowerOp::Jalr { it, is },
        0x28 => LowerOp::Ibeq { it, is, imm11: imm11(word) },
        0x29 => LowerOp::Ibne { it, is, imm11: imm11(word) },
        0x2C => LowerOp::Ibltz { is, imm11: imm11(word) },
        0x2D => LowerOp::Ibgtz { is, imm11: imm11(word) },
        0x2E => LowerOp::Iblez { is, imm11: imm11(word) },
        0x2F => LowerOp::Ibgez { is, imm11: imm11(word) },
        _ => LowerOp::Nop,
    }
}

/// Decode the 0x40 sub-space of the lower half
fn decode_lower_special(word: u32) -> LowerOp {
    let (dest, it, is, id) = (dest(word), rt(word), rs(word), rd(word));
    let (ft, fs) = (it, is);
    let s1 = word & 0x3F;

    if s1 < 0x3C {
        return match s1 {
            0x30 => LowerOp::Iadd { id, is, it },
            0x31 => LowerOp::Isub { id, is, it },
            0x32 => {
                // 5-bit signed immediate rides in the id field
                let raw = id as i8;
                let imm5 = if raw & 0x10 != 0 { raw | !0x1F } else { raw };
                LowerOp::Iaddi { it, is, imm5 }
            }
            0x34 => LowerOp::Iand { id, is, it },
            0x35 => LowerOp::Ior { id, is, it },
            _ => LowerOp::Nop,
        };
    }

    // Second escape: 11-bit opcode from bits 6..11 and the low two bits
    let s2 = ((word >> 6) & 0x1F) << 2 | (word & 3);
    match s2 {
        0x30 => LowerOp::Move { dest, ft, fs },
        0x31 => LowerOp::Mr32 { dest, ft, fs },
        0x34 => LowerOp::Lqi { dest, ft, is },
        0x35 => LowerOp::Sqi { dest, fs, it },
        0x36 => LowerOp::Lqd { dest, ft, is },
        0x37 => LowerOp::Sqd { dest, fs, it },
        0x38 => LowerOp::Div { fs, fsf: fsf(word), ft, ftf: ftf(word) },
        0x39 => LowerOp::Sqrt { ft, ftf: ftf(word) },
        0x3A => LowerOp::Rsqrt { fs, fsf: fsf(word), ft, ftf: ftf(word) },
        0x3B => LowerOp::Waitq,
        0x3C => LowerOp::Mtir { it, fs, fsf: fsf(word) },
        0x3D => LowerOp::Mfir { dest, ft, is },
        0x3E => LowerOp::Ilwr { dest, it, is },
        0x3F => LowerOp::Iswr { dest, it, is },
        0x40 => LowerOp::Rnext { dest, ft },
        0x41 => LowerOp::Rget { dest, ft },
        0x42 => LowerOp::Rinit { fs, fsf: fsf(word) },
        0x43 => LowerOp::Rxor { fs, fsf: fsf(word) },
        0x64 => LowerOp::Mfp { dest, ft },
        0x68 => LowerOp::Xtop { it },
        0x69 => LowerOp::Xitop { it },
        0x6C => LowerOp::Xgkick { is },
        0x70 => LowerOp::Efu { kind: EfuKind::Esadd, fs, fsf: fsf(word) },
        0x71 => LowerOp::Efu { kind: EfuKind::Ersadd, fs, fsf: fsf(word) },
        0x72 => LowerOp::Efu { kind: EfuKind::Eleng, fs, fsf: fsf(word) },
        0x73 => LowerOp::Efu { kind: EfuKind::Erleng, fs, fsf: fsf(word) },
        0x74 => LowerOp::Efu { kind: EfuKind::Eatanxy, fs, fsf: fsf(word) },
        0x75 => LowerOp::Efu { kind: EfuKind::Eatanxz, fs, fsf: fsf(word) },
        0x76 => LowerOp::Efu { kind: EfuKind::Esum, fs, fsf: fsf(word) },
        0x77 => LowerOp::Efu { kind: EfuKind::Ercpr, fs, fsf: fsf(word) },
        0x78 => LowerOp::Efu { kind: EfuKind::Esqrt, fs, fsf: fsf(word) },
        0x79 => LowerOp::Efu { kind: EfuKind::Ersqrt, fs, fsf: fsf(word) },
        0x7B => LowerOp::Waitp,
        0x7C => LowerOp::Efu { kind: EfuKind::Esin, fs, fsf: fsf(word) },
        0x7D => LowerOp::Efu { kind: EfuKind::Eatan, fs, fsf: fsf(word) },
        0x7E => LowerOp::Efu { kind: EfuKind::Eexp, fs, fsf: fsf(word) },
        _ => LowerOp::Nop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an upper word from opcode/fields
    fn upper(op: u32, dest: u32, ft: u32, fs: u32, fd: u32) -> u32 {
        op | dest << 21 | ft << 16 | fs << 11 | fd << 6
    }

    #[test]
    fn test_decode_add() {
        // ADD.xyzw vf03, vf01, vf02
        let word = upper(0x28, 0xF, 2, 1, 3);
        assert_eq!(
            decode_upper(word),
            UpperOp::Fmac {
                kind: FmacKind::Add,
                src: FmacSrc::Reg,
                acc: false,
                dest: 0xF,
                fd: 3,
                fs: 1,
                ft: 2,
            }
        );
    }

    #[test]
    fn test_decode_broadcast_acc_family() {
        // MULAx writes the accumulator (extended opcode 0x18)
        let word = upper(0x3C, 0xF, 2, 1, 0) | (0x18 >> 2) << 6 | (0x18 & 3);
        match decode_upper(word) {
            UpperOp::Fmac { kind: FmacKind::Mul, src: FmacSrc::Bc(0), acc: true, .. } => {}
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn test_decode_upper_unknown_is_nop() {
        // 0x2B escape slot is unassigned in the extended space
        let word = upper(0x3C, 0, 0, 0, 0) | 0x0A << 6 | 3;
        assert_eq!(decode_upper(word), UpperOp::Nop);
    }

    #[test]
    fn test_decode_lower_div() {
        // DIV Q, vf01.y, vf02.w (escape marker 0x3C plus extended opcode 0x38)
        let word = 0x40 << 25 | 0x3C | (0x38 >> 2) << 6 | (0x38 & 3)
            | 1 << 21   // fsf = y
            | 3 << 23   // ftf = w
            | 2 << 16
            | 1 << 11;
        assert_eq!(
            decode_lower(word),
            LowerOp::Div { fs: 1, fsf: 1, ft: 2, ftf: 3 }
        );
    }

    #[test]
    fn test_decode_lower_iadd() {
        let word = 0x40 << 25 | 0x30 | 3 << 6 | 1 << 11 | 2 << 16;
        assert_eq!(decode_lower(word), LowerOp::Iadd { id: 3, is: 1, it: 2 });
    }

    #[test]
    fn test_decode_branch_imm_sign_extends() {
        let word = 0x20 << 25 | 0x7FF; // B -1
        assert_eq!(decode_lower(word), LowerOp::B { imm11: -1 });
    }

    #[test]
    fn test_decode_i_bit_captures_literal() {
        let raw = (1u64 << 63) | 0x3F80_0000; // I = 1.0f
        let bundle = decode(raw);
        assert_eq!(bundle.lower, LowerSlot::Imm(0x3F80_0000));
    }

    #[test]
    fn test_decode_e_bit() {
        let raw = 1u64 << 62;
        assert!(decode(raw).e_bit);
        assert!(!decode(0).e_bit);
    }

    #[test]
    fn test_decode_xgkick() {
        let word = 0x40 << 25 | 0x3C | (0x6C >> 2) << 6 | (0x6C & 3) | 5 << 11;
        assert_eq!(decode_lower(word), LowerOp::Xgkick { is: 5 });
    }

    #[test]
    fn test_decode_lower_unknown_is_nop() {
        assert_eq!(decode_lower(0x7F << 25 | 0x123), LowerOp::Nop);
    }

    #[test]
    fn test_decode_iaddiu_imm15() {
        let word = 0x08 << 25 | 0xF << 21 | 2 << 16 | 1 << 11 | 0x7FF;
        assert_eq!(
            decode_lower(word),
            LowerOp::Iaddiu { it: 2, is: 1, imm15: 0x7FFF }
        );
    }
}
