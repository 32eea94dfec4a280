use zemu::cpu::Cpu;
use zemu::primitives::DRAM_BASE;

fn step(cpu: &mut Cpu, inst: u32) {
    cpu.pc = cpu.pc.wrapping_add(4);
    cpu.execute(inst).unwrap();
}

#[test]
fn arithmetic_and_shift_scenarios_compose_across_one_hart() {
    let mut cpu = Cpu::new(vec![], vec![]);
    cpu.pc = DRAM_BASE;

    // auipc x1, 4
    step(&mut cpu, 0x0000_4097);
    assert_eq!(cpu.regs.read(1), DRAM_BASE + 0x4000);
    assert_eq!(cpu.pc, DRAM_BASE + 4);

    // Pin x1 to the value the remaining scenarios build on.
    cpu.regs.write(1, DRAM_BASE);

    // addi x1, x1, 42
    step(&mut cpu, 0x02a0_8093);
    assert_eq!(cpu.regs.read(1), DRAM_BASE + 42);

    // slli x1, x1, 4 then srli x1, x1, 4 restores x1.
    step(&mut cpu, 0x0040_9093);
    step(&mut cpu, 0x0040_d093);
    assert_eq!(cpu.regs.read(1), DRAM_BASE + 42);

    // srai x1, x1, 4 on a negative 32-bit value sign-extends.
    cpu.regs.write(1, 0x8000_0020);
    step(&mut cpu, 0x4040_d093);
    assert_eq!(cpu.regs.read(1), 0xFFFF_FFFF_F800_0002);
}

#[test]
fn jal_sets_link_register_and_target() {
    let mut cpu = Cpu::new(vec![], vec![]);
    cpu.pc = DRAM_BASE;

    // jal x1, +8
    step(&mut cpu, 0x0080_00ef);
    assert_eq!(cpu.regs.read(1), DRAM_BASE + 4);
    assert_eq!(cpu.pc, DRAM_BASE + 8);
}

#[test]
fn store_doubleword_then_load_round_trips_through_dram() {
    let mut cpu = Cpu::new(vec![], vec![]);
    cpu.pc = DRAM_BASE;
    cpu.regs.write(3, DRAM_BASE + 0x1000);
    cpu.regs.write(2, 0xDEAD_BEEF_CAFE_BABE);

    // sd x2, 0(x3)
    let sd: u32 = (2 << 20) | (3 << 15) | (3 << 12) | 0x23;
    step(&mut cpu, sd);

    // ld x4, 0(x3)
    let ld: u32 = (3 << 15) | (3 << 12) | (4 << 7) | 0x03;
    step(&mut cpu, ld);

    assert_eq!(cpu.regs.read(4), 0xDEAD_BEEF_CAFE_BABE);
}

#[test]
fn x0_is_never_observably_written() {
    let mut cpu = Cpu::new(vec![], vec![]);
    cpu.pc = DRAM_BASE;
    // addi x0, x0, 5 -- writes to rd=0 must be discarded.
    let addi: u32 = (5 << 20) | (0 << 15) | (0 << 7) | 0x13;
    step(&mut cpu, addi);
    assert_eq!(cpu.regs.read(0), 0);
}
