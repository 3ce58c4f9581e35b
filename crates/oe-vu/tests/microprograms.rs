//! Whole-microprogram tests driving the interpreter through real
//! encoded bundles: loops with branch hazards, flag visibility delays
//! and the VU0 window onto VU1.

use oe_vu::{VectorUnit, VuId, VuInterpreter};

const E_BIT: u32 = 1 << 30;
// Unassigned encodings decode as explicit no-ops
const UPPER_NOP: u32 = 0x3C | (0x0B << 6) | 3;
const LOWER_NOP: u32 = 0x41 << 25;

fn put(unit: &mut VectorUnit, idx: u32, upper: u32, lower: u32) {
    unit.write_micro32(idx * 8, lower);
    unit.write_micro32(idx * 8 + 4, upper);
}

// Encoding helpers, upper half

fn add_xyzw(fd: u32, fs: u32, ft: u32) -> u32 {
    0x28 | 0xF << 21 | ft << 16 | fs << 11 | fd << 6
}

fn sub_xyzw(fd: u32, fs: u32, ft: u32) -> u32 {
    0x2C | 0xF << 21 | ft << 16 | fs << 11 | fd << 6
}

// Encoding helpers, lower half

fn lqi(ft: u32, is: u32) -> u32 {
    0x40 << 25 | 0x3C | (0x34 >> 2) << 6 | 0xF << 21 | ft << 16 | is << 11
}

fn lq(ft: u32, is: u32, imm: i32) -> u32 {
    0x00 << 25 | 0xF << 21 | ft << 16 | is << 11 | (imm as u32 & 0x7FF)
}

fn sq(fs: u32, it: u32, imm: i32) -> u32 {
    0x01 << 25 | 0xF << 21 | fs << 11 | it << 16 | (imm as u32 & 0x7FF)
}

fn iaddiu(it: u32, is: u32, imm: u32) -> u32 {
    0x08 << 25 | it << 16 | is << 11 | imm & 0x7FF
}

fn isubiu(it: u32, is: u32, imm: u32) -> u32 {
    0x09 << 25 | it << 16 | is << 11 | imm & 0x7FF
}

fn ibne(it: u32, is: u32, imm: i32) -> u32 {
    0x29 << 25 | it << 16 | is << 11 | (imm as u32 & 0x7FF)
}

fn fmand(it: u32, is: u32) -> u32 {
    0x1A << 25 | it << 16 | is << 11
}

#[test]
fn accumulation_loop_over_data_memory() {
    let mut unit = VectorUnit::new(VuId::Vu1);
    for i in 0..4u16 {
        let v = (i + 1) as f32;
        unit.data_write(i, [v, 10.0 * v, 0.0, 0.0], 0xF, None);
    }
    unit.regs.set_vi(1, 0); // cursor
    unit.regs.set_vi(2, 4); // remaining iterations

    // Loop body. The counter decrement sits two bundles before the
    // branch so the branch condition reads the committed value.
    put(&mut unit, 0, UPPER_NOP, lqi(2, 1));
    put(&mut unit, 1, UPPER_NOP, isubiu(2, 2, 1));
    put(&mut unit, 2, add_xyzw(1, 1, 2), LOWER_NOP);
    put(&mut unit, 3, UPPER_NOP, ibne(2, 0, -4));
    put(&mut unit, 4, UPPER_NOP, LOWER_NOP); // delay slot
    put(&mut unit, 5, UPPER_NOP | E_BIT, sq(1, 0, 0x10));
    put(&mut unit, 6, UPPER_NOP, LOWER_NOP);

    let interp = VuInterpreter::new();
    interp.start(&mut unit, 0);
    let executed = interp.run(&mut unit, None, None).unwrap();

    // 4 iterations of 5 bundles, then the epilogue
    assert_eq!(executed, 4 * 5 + 2);
    assert_eq!(unit.data_read(0x10, None), [10.0, 100.0, 0.0, 0.0]);
    assert_eq!(unit.regs.vi(1), 4);
    assert_eq!(unit.regs.vi(2), 0);
}

#[test]
fn mac_flags_visible_four_bundles_later() {
    let mut unit = VectorUnit::new(VuId::Vu1);
    unit.regs.set_vf(1, [1.0, 2.0, 3.0, 4.0], 0xF);
    unit.regs.set_vi(1, 0x000F);

    // bundle 0 produces an all-zero result; an fmand three bundles
    // later still sees nothing, one more bundle later it sees the
    // zero-flag nibble
    put(&mut unit, 0, sub_xyzw(2, 1, 1), LOWER_NOP);
    put(&mut unit, 1, UPPER_NOP, LOWER_NOP);
    put(&mut unit, 2, UPPER_NOP, LOWER_NOP);
    put(&mut unit, 3, UPPER_NOP, fmand(2, 1));
    put(&mut unit, 4, UPPER_NOP, fmand(3, 1));
    put(&mut unit, 5, UPPER_NOP | E_BIT, LOWER_NOP);
    put(&mut unit, 6, UPPER_NOP, LOWER_NOP);

    let interp = VuInterpreter::new();
    interp.start(&mut unit, 0);
    interp.run(&mut unit, None, None).unwrap();

    assert_eq!(unit.regs.vi(2), 0, "flags not yet architecturally visible");
    assert_eq!(unit.regs.vi(3), 0x000F);
}

#[test]
fn vu0_reads_vu1_registers_through_window() {
    let mut vu0 = VectorUnit::new(VuId::Vu0);
    let mut vu1 = VectorUnit::new(VuId::Vu1);
    vu1.regs.set_vf(9, [5.0, 6.0, 7.0, 8.0], 0xF);

    // lq vf01, 0x409(vi00): VU1's vf09 through the window, then store
    // it to local data memory
    put(&mut vu0, 0, UPPER_NOP, lq(1, 0, 0x409));
    put(&mut vu0, 1, UPPER_NOP | E_BIT, sq(1, 0, 0));
    put(&mut vu0, 2, UPPER_NOP, LOWER_NOP);

    let interp = VuInterpreter::new();
    interp.start(&mut vu0, 0);
    interp.run(&mut vu0, Some(&mut vu1), None).unwrap();

    assert_eq!(vu0.data_read(0, None), [5.0, 6.0, 7.0, 8.0]);
}

#[test]
fn vu0_writes_vu1_integer_register() {
    let mut vu0 = VectorUnit::new(VuId::Vu0);
    let mut vu1 = VectorUnit::new(VuId::Vu1);
    vu0.regs.set_vf(1, [f32::from_bits(0xABCD), 0.0, 0.0, 0.0], 0xF);

    // sq vf01, 0x425(vi00): lands in VU1's vi05
    put(&mut vu0, 0, UPPER_NOP | E_BIT, sq(1, 0, 0x425));
    put(&mut vu0, 1, UPPER_NOP, LOWER_NOP);

    let interp = VuInterpreter::new();
    interp.start(&mut vu0, 0);
    interp.run(&mut vu0, Some(&mut vu1), None).unwrap();

    assert_eq!(vu1.regs.vi(5), 0xABCD);
}

#[test]
fn loop_with_branch_shadow_hazard() {
    // A branch reading its counter in the very next bundle observes the
    // pre-write value, so this two-bundle loop runs one extra trip.
    let mut unit = VectorUnit::new(VuId::Vu1);
    unit.regs.set_vi(2, 1);

    put(&mut unit, 0, UPPER_NOP, isubiu(2, 2, 1));
    put(&mut unit, 1, UPPER_NOP, ibne(2, 0, -2));
    put(&mut unit, 2, UPPER_NOP, LOWER_NOP); // delay slot
    put(&mut unit, 3, UPPER_NOP | E_BIT, LOWER_NOP);
    put(&mut unit, 4, UPPER_NOP, LOWER_NOP);

    let interp = VuInterpreter::new();
    interp.start(&mut unit, 0);
    interp.run(&mut unit, None, None).unwrap();

    // vi2 went 1 -> 0 on the first trip; the branch still saw 1 and
    // looped, and only the second trip (0 -> 0xFFFF, branch sees 0)
    // fell through
    assert_eq!(unit.regs.vi(2), 0xFFFF);
}
