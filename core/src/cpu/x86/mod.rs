//! The 8086/80186/NEC V20 core: fetch/decode/dispatch loop (C6) plus the
//! submodules each opcode class delegates to.

pub mod addressing;
pub mod alu;
pub mod bcd;
pub mod branch;
pub mod interrupt;
pub mod shift;
pub mod stack;
pub mod string_ops;

use crate::core::component::Component;
use crate::core::host::HostInterface;
use crate::core::mem::{Flag, Mem, Reg16, Width};
use crate::cpu::decode::{DecodeTables, XlatClass};
use crate::cpu::state::{Cpu8086State, CpuStateTrait};
use crate::cpu::Cpu;

use addressing::decode_modrm;
use alu::AluOp;
use interrupt::InterruptBridge;
use shift::ShiftOp;

/// Whether a dispatched instruction wants the normal sequential IP advance,
/// or has already set `IP` (and possibly `CS`) itself.
enum Flow {
    Advance(u16),
    Absolute,
}

fn width_of(low_bit: u8) -> Width {
    if low_bit & 1 == 0 {
        Width::Byte
    } else {
        Width::Word
    }
}

fn read_op(mem: &Mem, width: Width, addr: usize) -> u32 {
    match width {
        Width::Byte => mem.read8(addr) as u32,
        Width::Word => mem.read16(addr) as u32,
    }
}

fn write_op(mem: &mut Mem, width: Width, addr: usize, val: u32) {
    match width {
        Width::Byte => mem.write8(addr, val as u8),
        Width::Word => mem.write16(addr, val as u16),
    }
}

fn apply_arith_flags(mem: &mut Mem, r: alu::ArithFlags, width: Width, parity: &[bool; 256]) {
    let (sf, zf, pf) = alu::szp(r.result, width, parity);
    mem.set_flag(Flag::Sf, sf);
    mem.set_flag(Flag::Zf, zf);
    mem.set_flag(Flag::Pf, pf);
    mem.set_flag(Flag::Cf, r.cf);
    mem.set_flag(Flag::Af, r.af);
    mem.set_flag(Flag::Of, r.of);
}

/// INC/DEC leave CF untouched; every other flag updates as usual.
fn apply_incdec_flags(mem: &mut Mem, r: alu::ArithFlags, width: Width, parity: &[bool; 256]) {
    let (sf, zf, pf) = alu::szp(r.result, width, parity);
    mem.set_flag(Flag::Sf, sf);
    mem.set_flag(Flag::Zf, zf);
    mem.set_flag(Flag::Pf, pf);
    mem.set_flag(Flag::Af, r.af);
    mem.set_flag(Flag::Of, r.of);
}

fn apply_shift_flags(mem: &mut Mem, r: shift::ShiftFlags, width: Width, parity: &[bool; 256]) {
    let (sf, zf, pf) = alu::szp(r.result, width, parity);
    mem.set_flag(Flag::Sf, sf);
    mem.set_flag(Flag::Zf, zf);
    mem.set_flag(Flag::Pf, pf);
    mem.set_flag(Flag::Cf, r.cf);
    mem.set_flag(Flag::Of, r.of);
}

/// The 8086/80186/NEC V20 core. Holds no register state of its own — every
/// register lives in the `Mem` passed to each call (`core::mem` module docs).
pub struct Cpu8086 {
    halted: bool,
    bridge: InterruptBridge,
    int8_rate_limit: u32,
    /// Set when the host requests a full reset (`TickEvent::reset_requested`).
    /// `Cpu8086::reset` only re-seeds registers, not the BIOS image or the
    /// boot-sector count; reloading those is `Engine`'s job (C8), so `tick`
    /// raises this flag for `Engine::step` to notice and act on instead of
    /// resetting the CPU on its own.
    pending_full_reset: bool,
}

impl Default for Cpu8086 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu8086 {
    pub fn new() -> Cpu8086 {
        Cpu8086 {
            halted: false,
            bridge: InterruptBridge::new(),
            int8_rate_limit: 20_000,
            pending_full_reset: false,
        }
    }

    /// Set by `Engine::reset` from `EngineConfig::int8_rate_limit`.
    pub fn set_int8_rate_limit(&mut self, limit: u32) {
        self.int8_rate_limit = limit;
    }

    /// Consume and clear a pending host-requested full reset, if one was
    /// raised since the last call. `Engine::step` polls this after each
    /// `tick` and, when set, re-invokes the full C8 reset (BIOS reload,
    /// boot vector reseed) rather than just the CPU's own register reset.
    pub fn take_pending_reset(&mut self) -> bool {
        std::mem::take(&mut self.pending_full_reset)
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &mut self,
        mem: &mut Mem,
        tables: &DecodeTables,
        host: &mut dyn HostInterface,
        instr_ip: u16,
        instr_addr: usize,
        opcode: u8,
        class: XlatClass,
        extra: u8,
        seg_override: Option<Reg16>,
        rep: Option<bool>,
    ) -> Flow {
        let parity = &tables.parity;

        match class {
            XlatClass::MovRegImm => {
                let width = if opcode < 0xB8 { Width::Byte } else { Width::Word };
                let reg_field = opcode & 0x07;
                let addr = Mem::reg_addr(reg_field, width);
                let (imm, size) = match width {
                    Width::Byte => (mem.read8(instr_addr + 1) as u32, 1),
                    Width::Word => (mem.read16(instr_addr + 1) as u32, 2),
                };
                write_op(mem, width, addr, imm);
                Flow::Advance(1 + size)
            }

            XlatClass::GroupFfFe => match extra {
                0 => {
                    let reg = Reg16::from_field(opcode & 0x07);
                    let addr = Mem::reg16_offset(reg);
                    let r = alu::inc_dec(false, mem.read16(addr) as u32, Width::Word);
                    mem.write16(addr, r.result as u16);
                    apply_incdec_flags(mem, r, Width::Word, parity);
                    Flow::Advance(1)
                }
                1 => {
                    let reg = Reg16::from_field(opcode & 0x07);
                    let addr = Mem::reg16_offset(reg);
                    let r = alu::inc_dec(true, mem.read16(addr) as u32, Width::Word);
                    mem.write16(addr, r.result as u16);
                    apply_incdec_flags(mem, r, Width::Word, parity);
                    Flow::Advance(1)
                }
                _ => {
                    let width = width_of(opcode & 1);
                    let modrm = decode_modrm(mem, tables, instr_addr + 1, width, seg_override);
                    let consumed = 1 + modrm.bytes as u16;
                    match modrm.i_reg & 0x07 {
                        0 => {
                            let r = alu::inc_dec(false, read_op(mem, width, modrm.rm_addr), width);
                            write_op(mem, width, modrm.rm_addr, r.result);
                            apply_incdec_flags(mem, r, width, parity);
                            Flow::Advance(consumed)
                        }
                        1 => {
                            let r = alu::inc_dec(true, read_op(mem, width, modrm.rm_addr), width);
                            write_op(mem, width, modrm.rm_addr, r.result);
                            apply_incdec_flags(mem, r, width, parity);
                            Flow::Advance(consumed)
                        }
                        2 => {
                            let target = mem.read16(modrm.rm_addr);
                            let ret = instr_ip.wrapping_add(consumed);
                            stack::push16(mem, ret);
                            mem.set_ip(target);
                            Flow::Absolute
                        }
                        3 => {
                            let new_ip = mem.read16(modrm.rm_addr);
                            let new_cs = mem.read16(modrm.rm_addr + 2);
                            let ret = instr_ip.wrapping_add(consumed);
                            stack::push16(mem, mem.reg16(Reg16::Cs));
                            stack::push16(mem, ret);
                            mem.set_reg16(Reg16::Cs, new_cs);
                            mem.set_ip(new_ip);
                            Flow::Absolute
                        }
                        4 => {
                            mem.set_ip(mem.read16(modrm.rm_addr));
                            Flow::Absolute
                        }
                        5 => {
                            let new_ip = mem.read16(modrm.rm_addr);
                            let new_cs = mem.read16(modrm.rm_addr + 2);
                            mem.set_reg16(Reg16::Cs, new_cs);
                            mem.set_ip(new_ip);
                            Flow::Absolute
                        }
                        6 => {
                            stack::push16(mem, mem.read16(modrm.rm_addr));
                            Flow::Advance(consumed)
                        }
                        _ => {
                            interrupt::log_unimplemented(mem, opcode);
                            Flow::Advance(consumed)
                        }
                    }
                }
            },

            XlatClass::PushFixedReg => {
                stack::push16(mem, mem.reg16(Reg16::from_field(opcode & 0x07)));
                Flow::Advance(1)
            }
            XlatClass::PopFixedReg => {
                let val = stack::pop16(mem);
                mem.set_reg16(Reg16::from_field(opcode & 0x07), val);
                Flow::Advance(1)
            }
            XlatClass::PushSegReg => {
                stack::push16(mem, mem.reg16(Reg16::from_seg_field(extra)));
                Flow::Advance(1)
            }
            XlatClass::PopSegReg => {
                let val = stack::pop16(mem);
                mem.set_reg16(Reg16::from_seg_field(extra), val);
                Flow::Advance(1)
            }

            XlatClass::GroupF6F7 => {
                let width = width_of(opcode & 1);
                let modrm = decode_modrm(mem, tables, instr_addr + 1, width, seg_override);
                let base = 1 + modrm.bytes as u16;
                match modrm.i_reg & 0x07 {
                    0 | 1 => {
                        let (imm, size) = match width {
                            Width::Byte => (mem.read8(instr_addr + base as usize) as u32, 1),
                            Width::Word => (mem.read16(instr_addr + base as usize) as u32, 2),
                        };
                        let dest = read_op(mem, width, modrm.rm_addr);
                        let r = alu::arith(AluOp::And, dest, imm, width, false);
                        apply_arith_flags(mem, r, width, parity);
                        Flow::Advance(base + size)
                    }
                    2 => {
                        let dest = read_op(mem, width, modrm.rm_addr);
                        let mask = match width {
                            Width::Byte => 0xFF,
                            Width::Word => 0xFFFF,
                        };
                        write_op(mem, width, modrm.rm_addr, (!dest) & mask);
                        Flow::Advance(base)
                    }
                    3 => {
                        let dest = read_op(mem, width, modrm.rm_addr);
                        let r = alu::arith(AluOp::Sub, 0, dest, width, false);
                        write_op(mem, width, modrm.rm_addr, r.result);
                        apply_arith_flags(mem, r, width, parity);
                        Flow::Advance(base)
                    }
                    4 => {
                        match width {
                            Width::Byte => {
                                let al = mem.reg8(0) as u32;
                                let rm = read_op(mem, width, modrm.rm_addr);
                                let product = al * rm;
                                mem.set_reg16(Reg16::Ax, product as u16);
                                let cf = product > 0xFF;
                                mem.set_flag(Flag::Cf, cf);
                                mem.set_flag(Flag::Of, cf);
                            }
                            Width::Word => {
                                let ax = mem.reg16(Reg16::Ax) as u32;
                                let rm = read_op(mem, width, modrm.rm_addr);
                                let product = ax * rm;
                                mem.set_reg16(Reg16::Ax, product as u16);
                                mem.set_reg16(Reg16::Dx, (product >> 16) as u16);
                                let cf = product > 0xFFFF;
                                mem.set_flag(Flag::Cf, cf);
                                mem.set_flag(Flag::Of, cf);
                            }
                        }
                        Flow::Advance(base)
                    }
                    5 => {
                        match width {
                            Width::Byte => {
                                let al = mem.reg8(0) as i8 as i32;
                                let rm = mem.read8(modrm.rm_addr) as i8 as i32;
                                let product = al * rm;
                                mem.set_reg16(Reg16::Ax, product as u16);
                                let fits = (i8::MIN as i32..=i8::MAX as i32).contains(&product);
                                mem.set_flag(Flag::Cf, !fits);
                                mem.set_flag(Flag::Of, !fits);
                            }
                            Width::Word => {
                                let ax = mem.reg16(Reg16::Ax) as i16 as i32;
                                let rm = mem.read16(modrm.rm_addr) as i16 as i32;
                                let product = ax * rm;
                                mem.set_reg16(Reg16::Ax, product as u16);
                                mem.set_reg16(Reg16::Dx, (product >> 16) as u16);
                                let fits = (i16::MIN as i32..=i16::MAX as i32).contains(&product);
                                mem.set_flag(Flag::Cf, !fits);
                                mem.set_flag(Flag::Of, !fits);
                            }
                        }
                        Flow::Advance(base)
                    }
                    6 => {
                        match width {
                            Width::Byte => {
                                let dividend = mem.reg16(Reg16::Ax) as u32;
                                let divisor = mem.read8(modrm.rm_addr) as u32;
                                if divisor == 0 || dividend / divisor > 0xFF {
                                    mem.set_ip(instr_ip.wrapping_add(base));
                                    interrupt::pc_interrupt(mem, 0);
                                    return Flow::Absolute;
                                }
                                let (q, r) = (dividend / divisor, dividend % divisor);
                                mem.set_reg8(0, q as u8);
                                mem.set_reg8(4, r as u8);
                            }
                            Width::Word => {
                                let dividend = ((mem.reg16(Reg16::Dx) as u32) << 16) | mem.reg16(Reg16::Ax) as u32;
                                let divisor = mem.read16(modrm.rm_addr) as u32;
                                if divisor == 0 || dividend / divisor > 0xFFFF {
                                    mem.set_ip(instr_ip.wrapping_add(base));
                                    interrupt::pc_interrupt(mem, 0);
                                    return Flow::Absolute;
                                }
                                let (q, r) = (dividend / divisor, dividend % divisor);
                                mem.set_reg16(Reg16::Ax, q as u16);
                                mem.set_reg16(Reg16::Dx, r as u16);
                            }
                        }
                        Flow::Advance(base)
                    }
                    _ => {
                        match width {
                            Width::Byte => {
                                let dividend = mem.reg16(Reg16::Ax) as i16 as i32;
                                let divisor = mem.read8(modrm.rm_addr) as i8 as i32;
                                if divisor == 0 {
                                    mem.set_ip(instr_ip.wrapping_add(base));
                                    interrupt::pc_interrupt(mem, 0);
                                    return Flow::Absolute;
                                }
                                let (q, r) = (dividend / divisor, dividend % divisor);
                                if !(i8::MIN as i32..=i8::MAX as i32).contains(&q) {
                                    mem.set_ip(instr_ip.wrapping_add(base));
                                    interrupt::pc_interrupt(mem, 0);
                                    return Flow::Absolute;
                                }
                                mem.set_reg8(0, q as u8);
                                mem.set_reg8(4, r as u8);
                            }
                            Width::Word => {
                                let dividend = (((mem.reg16(Reg16::Dx) as u32) << 16) | mem.reg16(Reg16::Ax) as u32) as i32;
                                let divisor = mem.read16(modrm.rm_addr) as i16 as i32;
                                if divisor == 0 {
                                    mem.set_ip(instr_ip.wrapping_add(base));
                                    interrupt::pc_interrupt(mem, 0);
                                    return Flow::Absolute;
                                }
                                let (q, r) = (dividend / divisor, dividend % divisor);
                                if !(i16::MIN as i32..=i16::MAX as i32).contains(&q) {
                                    mem.set_ip(instr_ip.wrapping_add(base));
                                    interrupt::pc_interrupt(mem, 0);
                                    return Flow::Absolute;
                                }
                                mem.set_reg16(Reg16::Ax, q as u16);
                                mem.set_reg16(Reg16::Dx, r as u16);
                            }
                        }
                        Flow::Advance(base)
                    }
                }
            }

            XlatClass::AluImmAcc => {
                let width = width_of(opcode & 1);
                let alu_op = AluOp::from_field(extra);
                let (imm, size) = match width {
                    Width::Byte => (mem.read8(instr_addr + 1) as u32, 1),
                    Width::Word => (mem.read16(instr_addr + 1) as u32, 2),
                };
                let acc_addr = Mem::reg_addr(0, width);
                let dest = read_op(mem, width, acc_addr);
                let carry_in = matches!(alu_op, AluOp::Adc | AluOp::Sbb) && mem.flag(Flag::Cf);
                let r = alu::arith(alu_op, dest, imm, width, carry_in);
                if alu_op != AluOp::Cmp {
                    write_op(mem, width, acc_addr, r.result);
                }
                apply_arith_flags(mem, r, width, parity);
                Flow::Advance(1 + size)
            }

            XlatClass::AluRmImm => {
                let width = if extra == 1 || extra == 3 { Width::Word } else { Width::Byte };
                let modrm = decode_modrm(mem, tables, instr_addr + 1, width, seg_override);
                let imm_addr = instr_addr + 1 + modrm.bytes as usize;
                let (imm, size): (u32, u16) = if extra == 1 {
                    (mem.read16(imm_addr) as u32, 2)
                } else if extra == 3 {
                    ((mem.read8(imm_addr) as i8 as i16 as u16) as u32, 1)
                } else {
                    (mem.read8(imm_addr) as u32, 1)
                };
                let alu_op = AluOp::from_field(modrm.i_reg);
                let dest = read_op(mem, width, modrm.rm_addr);
                let carry_in = matches!(alu_op, AluOp::Adc | AluOp::Sbb) && mem.flag(Flag::Cf);
                let r = alu::arith(alu_op, dest, imm, width, carry_in);
                if alu_op != AluOp::Cmp {
                    write_op(mem, width, modrm.rm_addr, r.result);
                }
                apply_arith_flags(mem, r, width, parity);
                Flow::Advance(1 + modrm.bytes as u16 + size)
            }

            XlatClass::AluRegRm => {
                let width = width_of(opcode & 1);
                let i_d = (opcode >> 1) & 1;
                let modrm = decode_modrm(mem, tables, instr_addr + 1, width, seg_override);
                let consumed = 1 + modrm.bytes as u16;
                let reg_addr = modrm.reg_addr(width);
                let (to_addr, from_addr) = if i_d == 0 {
                    (modrm.rm_addr, reg_addr)
                } else {
                    (reg_addr, modrm.rm_addr)
                };
                if extra == 8 {
                    let src = read_op(mem, width, from_addr);
                    write_op(mem, width, to_addr, src);
                } else {
                    let alu_op = AluOp::from_field(extra);
                    let dest = read_op(mem, width, to_addr);
                    let src = read_op(mem, width, from_addr);
                    let carry_in = matches!(alu_op, AluOp::Adc | AluOp::Sbb) && mem.flag(Flag::Cf);
                    let r = alu::arith(alu_op, dest, src, width, carry_in);
                    if alu_op != AluOp::Cmp {
                        write_op(mem, width, to_addr, r.result);
                    }
                    apply_arith_flags(mem, r, width, parity);
                }
                Flow::Advance(consumed)
            }

            XlatClass::MovSregPopRmLea => {
                let modrm = decode_modrm(mem, tables, instr_addr + 1, Width::Word, seg_override);
                let consumed = 1 + modrm.bytes as u16;
                match extra {
                    0 => {
                        let val = mem.reg16(Reg16::from_seg_field(modrm.i_reg));
                        mem.write16(modrm.rm_addr, val);
                    }
                    1 => {
                        let val = mem.read16(modrm.rm_addr);
                        mem.set_reg16(Reg16::from_seg_field(modrm.i_reg), val);
                    }
                    2 => {
                        mem.set_reg16(Reg16::from_field(modrm.i_reg), modrm.offset);
                    }
                    _ => {
                        let val = stack::pop16(mem);
                        mem.write16(modrm.rm_addr, val);
                    }
                }
                Flow::Advance(consumed)
            }

            XlatClass::MovAccMemAbs => {
                let width = width_of(extra & 1);
                let is_store = extra >= 2;
                let off = mem.read16(instr_addr + 1);
                let seg_val = mem.reg16(seg_override.unwrap_or(Reg16::Ds));
                let addr = Mem::linear(seg_val, off);
                let acc_addr = Mem::reg_addr(0, width);
                if is_store {
                    let v = read_op(mem, width, acc_addr);
                    write_op(mem, width, addr, v);
                } else {
                    let v = read_op(mem, width, addr);
                    write_op(mem, width, acc_addr, v);
                }
                Flow::Advance(3)
            }

            XlatClass::ShiftRotate => {
                let width = width_of(opcode & 1);
                let modrm = decode_modrm(mem, tables, instr_addr + 1, width, seg_override);
                let shift_op = ShiftOp::from_field(modrm.i_reg);
                let (count, extra_bytes): (u32, u16) = if extra == 1 {
                    (mem.read8(instr_addr + 1 + modrm.bytes as usize) as u32, 1)
                } else if opcode & 0x02 != 0 {
                    (mem.reg8(1) as u32, 0)
                } else {
                    (1, 0)
                };
                if count != 0 {
                    let cf_in = mem.flag(Flag::Cf);
                    let dest = read_op(mem, width, modrm.rm_addr);
                    let r = shift::apply(shift_op, dest, count, cf_in, width);
                    write_op(mem, width, modrm.rm_addr, r.result);
                    apply_shift_flags(mem, r, width, parity);
                }
                Flow::Advance(1 + modrm.bytes as u16 + extra_bytes)
            }

            XlatClass::LoopJcxz => {
                let rel8 = mem.read8(instr_addr + 1) as i8;
                mem.set_ip(instr_ip.wrapping_add(2));
                match extra {
                    0 => branch::loop_instr(mem, rel8, Some(false)),
                    1 => branch::loop_instr(mem, rel8, Some(true)),
                    2 => branch::loop_instr(mem, rel8, None),
                    _ => branch::jcxz(mem, rel8),
                }
                Flow::Absolute
            }

            XlatClass::CondJump => {
                let taken = tables.cond_jump[extra as usize](mem);
                let next = instr_ip.wrapping_add(2);
                mem.set_ip(if taken {
                    next.wrapping_add((mem.read8(instr_addr + 1) as i8) as i16 as u16)
                } else {
                    next
                });
                Flow::Absolute
            }

            XlatClass::JmpCallNearFarImm => {
                match extra {
                    0 => {
                        let rel16 = mem.read16(instr_addr + 1) as i16;
                        let ret = instr_ip.wrapping_add(3);
                        stack::push16(mem, ret);
                        mem.set_ip(ret.wrapping_add(rel16 as u16));
                    }
                    1 => {
                        let rel16 = mem.read16(instr_addr + 1) as i16;
                        mem.set_ip(instr_ip.wrapping_add(3).wrapping_add(rel16 as u16));
                    }
                    2 => {
                        let new_ip = mem.read16(instr_addr + 1);
                        let new_cs = mem.read16(instr_addr + 3);
                        mem.set_reg16(Reg16::Cs, new_cs);
                        mem.set_ip(new_ip);
                    }
                    _ => {
                        let rel8 = mem.read8(instr_addr + 1) as i8;
                        mem.set_ip(instr_ip.wrapping_add(2).wrapping_add(rel8 as i16 as u16));
                    }
                }
                Flow::Absolute
            }

            XlatClass::TestRegRm => {
                let width = width_of(opcode & 1);
                if extra == 0 {
                    let modrm = decode_modrm(mem, tables, instr_addr + 1, width, seg_override);
                    let a = read_op(mem, width, modrm.rm_addr);
                    let b = read_op(mem, width, modrm.reg_addr(width));
                    let r = alu::arith(AluOp::And, a, b, width, false);
                    apply_arith_flags(mem, r, width, parity);
                    Flow::Advance(1 + modrm.bytes as u16)
                } else {
                    let (imm, size) = match width {
                        Width::Byte => (mem.read8(instr_addr + 1) as u32, 1),
                        Width::Word => (mem.read16(instr_addr + 1) as u32, 2),
                    };
                    let acc = read_op(mem, width, Mem::reg_addr(0, width));
                    let r = alu::arith(AluOp::And, acc, imm, width, false);
                    apply_arith_flags(mem, r, width, parity);
                    Flow::Advance(1 + size)
                }
            }

            XlatClass::XchgAccReg => {
                if extra != 0 {
                    let other = Reg16::from_field(extra);
                    let a = mem.reg16(Reg16::Ax);
                    let b = mem.reg16(other);
                    mem.set_reg16(Reg16::Ax, b);
                    mem.set_reg16(other, a);
                }
                Flow::Advance(1)
            }
            XlatClass::XchgRegRm => {
                let width = width_of(opcode & 1);
                let modrm = decode_modrm(mem, tables, instr_addr + 1, width, seg_override);
                let a = read_op(mem, width, modrm.rm_addr);
                let b = read_op(mem, width, modrm.reg_addr(width));
                write_op(mem, width, modrm.rm_addr, b);
                write_op(mem, width, modrm.reg_addr(width), a);
                Flow::Advance(1 + modrm.bytes as u16)
            }

            XlatClass::PortIo => {
                let is_dx = extra & 0x08 != 0;
                let is_out = extra & 0x02 != 0;
                let width = width_of(extra & 1);
                let (port, consumed): (u16, u16) = if is_dx {
                    (mem.reg16(Reg16::Dx), 1)
                } else {
                    (mem.read8(instr_addr + 1) as u16, 2)
                };
                match width {
                    Width::Byte => {
                        if is_out {
                            host.write_port(port, mem.reg8(0));
                        } else {
                            let v = host.read_port(port);
                            mem.set_reg8(0, v);
                        }
                    }
                    Width::Word => {
                        if is_out {
                            let v = mem.reg16(Reg16::Ax);
                            host.write_port(port, v as u8);
                            host.write_port(port.wrapping_add(1), (v >> 8) as u8);
                        } else {
                            let lo = host.read_port(port);
                            let hi = host.read_port(port.wrapping_add(1));
                            mem.set_reg16(Reg16::Ax, lo as u16 | ((hi as u16) << 8));
                        }
                    }
                }
                Flow::Advance(consumed)
            }

            XlatClass::StringMovStosLods => {
                let width = width_of(opcode & 1);
                let run = |mem: &mut Mem| match extra {
                    0 => string_ops::movs(mem, width, seg_override),
                    1 => string_ops::stos(mem, width),
                    _ => string_ops::lods(mem, width, seg_override),
                };
                if rep.is_some() {
                    while string_ops::should_continue(mem, true, false) {
                        run(mem);
                        string_ops::decrement_cx(mem);
                    }
                } else {
                    run(mem);
                }
                Flow::Advance(1)
            }

            XlatClass::StringCmpsScas => {
                let width = width_of(opcode & 1);
                let run = |mem: &mut Mem| match extra {
                    0 => string_ops::cmps(mem, width, seg_override, parity),
                    _ => string_ops::scas(mem, width, parity),
                };
                if let Some(want) = rep {
                    while string_ops::should_continue(mem, want, false) {
                        run(mem);
                        string_ops::decrement_cx(mem);
                        if !string_ops::should_continue(mem, want, true) {
                            break;
                        }
                    }
                } else {
                    run(mem);
                }
                Flow::Advance(1)
            }

            XlatClass::RetIret => match extra {
                0 => {
                    if opcode & 1 == 0 {
                        let popbytes = mem.read16(instr_addr + 1);
                        let ip = stack::pop16(mem);
                        mem.set_ip(ip);
                        let sp = mem.reg16(Reg16::Sp).wrapping_add(popbytes);
                        mem.set_reg16(Reg16::Sp, sp);
                    } else {
                        let ip = stack::pop16(mem);
                        mem.set_ip(ip);
                    }
                    Flow::Absolute
                }
                1 => {
                    if opcode & 1 == 0 {
                        let popbytes = mem.read16(instr_addr + 1);
                        stack::pop_far_return(mem);
                        let sp = mem.reg16(Reg16::Sp).wrapping_add(popbytes);
                        mem.set_reg16(Reg16::Sp, sp);
                    } else {
                        stack::pop_far_return(mem);
                    }
                    Flow::Absolute
                }
                _ => {
                    stack::pop_return_frame(mem);
                    Flow::Absolute
                }
            },

            XlatClass::MovRmImm => {
                let width = width_of(opcode & 1);
                let modrm = decode_modrm(mem, tables, instr_addr + 1, width, seg_override);
                let imm_addr = instr_addr + 1 + modrm.bytes as usize;
                let (imm, size) = match width {
                    Width::Byte => (mem.read8(imm_addr) as u32, 1),
                    Width::Word => (mem.read16(imm_addr) as u32, 2),
                };
                write_op(mem, width, modrm.rm_addr, imm);
                Flow::Advance(1 + modrm.bytes as u16 + size)
            }

            XlatClass::Bcd => {
                match opcode {
                    0x27 => bcd::daa(mem),
                    0x2F => bcd::das(mem),
                    0x37 => bcd::aaa(mem),
                    0x3F => bcd::aas(mem),
                    0x98 => bcd::cbw(mem),
                    0x99 => bcd::cwd(mem),
                    _ => interrupt::log_unimplemented(mem, opcode),
                }
                Flow::Advance(1)
            }

            XlatClass::CallFarImm => {
                let imm_ip = mem.read16(instr_addr + 1);
                let imm_cs = mem.read16(instr_addr + 3);
                let ret_ip = instr_ip.wrapping_add(5);
                stack::push16(mem, mem.reg16(Reg16::Cs));
                stack::push16(mem, ret_ip);
                mem.set_reg16(Reg16::Cs, imm_cs);
                mem.set_ip(imm_ip);
                Flow::Absolute
            }

            XlatClass::FlagsStackOp => {
                match extra {
                    0 => stack::pushf(mem),
                    1 => stack::popf(mem),
                    2 => stack::sahf(mem),
                    _ => stack::lahf(mem),
                }
                Flow::Advance(1)
            }

            XlatClass::LesLds => {
                let modrm = decode_modrm(mem, tables, instr_addr + 1, Width::Word, seg_override);
                let off = mem.read16(modrm.rm_addr);
                let seg = mem.read16(modrm.rm_addr + 2);
                mem.set_reg16(Reg16::from_field(modrm.i_reg), off);
                let target_seg = if extra == 0 { Reg16::Es } else { Reg16::Ds };
                mem.set_reg16(target_seg, seg);
                Flow::Advance(1 + modrm.bytes as u16)
            }

            XlatClass::SoftInt => match extra {
                3 => {
                    mem.set_ip(instr_ip.wrapping_add(1));
                    interrupt::pc_interrupt(mem, 3);
                    Flow::Absolute
                }
                4 => {
                    mem.set_ip(instr_ip.wrapping_add(1));
                    if mem.flag(Flag::Of) {
                        interrupt::pc_interrupt(mem, 4);
                    }
                    Flow::Absolute
                }
                _ => {
                    let n = mem.read8(instr_addr + 1);
                    mem.set_ip(instr_ip.wrapping_add(2));
                    interrupt::pc_interrupt(mem, n);
                    Flow::Absolute
                }
            },

            XlatClass::AamAad => {
                let base = mem.read8(instr_addr + 1);
                if extra == 0 {
                    if !bcd::aam(mem, base) {
                        mem.set_ip(instr_ip.wrapping_add(2));
                        interrupt::pc_interrupt(mem, 0);
                        return Flow::Absolute;
                    }
                } else {
                    bcd::aad(mem, base);
                }
                Flow::Advance(2)
            }

            XlatClass::Misc => {
                match extra {
                    0 => bcd::salc(mem),
                    1 => bcd::xlat(mem, seg_override),
                    2 => {
                        let cf = mem.flag(Flag::Cf);
                        mem.set_flag(Flag::Cf, !cf);
                    }
                    3 => mem.set_flag(Flag::Cf, false),
                    4 => mem.set_flag(Flag::Cf, true),
                    5 => mem.set_flag(Flag::If, false),
                    6 => mem.set_flag(Flag::If, true),
                    7 => mem.set_flag(Flag::Df, false),
                    _ => mem.set_flag(Flag::Df, true),
                }
                Flow::Advance(1)
            }

            XlatClass::Halt => {
                self.halted = true;
                Flow::Advance(1)
            }

            XlatClass::Hypercall => {
                let imm8 = mem.read8(instr_addr + 1);
                interrupt::dispatch_hypercall(mem, imm8, host);
                Flow::Advance(2)
            }

            XlatClass::Enter => {
                let frame_size = mem.read16(instr_addr + 1);
                let nesting = mem.read8(instr_addr + 3);
                stack::enter(mem, frame_size, nesting);
                Flow::Advance(4)
            }
            XlatClass::Leave => {
                stack::leave(mem);
                Flow::Advance(1)
            }
            XlatClass::Pusha => {
                stack::pusha(mem);
                Flow::Advance(1)
            }
            XlatClass::Popa => {
                stack::popa(mem);
                Flow::Advance(1)
            }
            XlatClass::PushImm => {
                if extra == 1 {
                    let imm16 = mem.read16(instr_addr + 1);
                    stack::push16(mem, imm16);
                    Flow::Advance(3)
                } else {
                    let imm8 = (mem.read8(instr_addr + 1) as i8) as i16 as u16;
                    stack::push16(mem, imm8);
                    Flow::Advance(2)
                }
            }

            XlatClass::InsOuts => {
                let width = width_of(extra & 1);
                let is_out = extra & 0x02 != 0;
                let run = |mem: &mut Mem, host: &mut dyn HostInterface| {
                    if is_out {
                        string_ops::outs(mem, width, seg_override, host);
                    } else {
                        string_ops::ins(mem, width, host);
                    }
                };
                if rep.is_some() {
                    while string_ops::should_continue(mem, true, false) {
                        run(mem, host);
                        string_ops::decrement_cx(mem);
                    }
                } else {
                    run(mem, host);
                }
                Flow::Advance(1)
            }

            XlatClass::SegOverridePrefix | XlatClass::RepPrefix | XlatClass::LockPrefix => {
                unreachable!("prefixes are consumed before dispatch")
            }

            XlatClass::Unimplemented | XlatClass::BadOpcode => {
                interrupt::log_unimplemented(mem, opcode);
                Flow::Advance(1)
            }
        }
    }
}

impl Component for Cpu8086 {
    fn tick(&mut self, mem: &mut Mem, tables: &DecodeTables, host: &mut dyn HostInterface) -> bool {
        if self.halted {
            let (event, delivered) = self.bridge.service(mem, host, false, self.int8_rate_limit);
            if delivered {
                self.halted = false;
            }
            if event.reset_requested {
                self.pending_full_reset = true;
            }
            return !event.exit;
        }

        let mut seg_override: Option<Reg16> = None;
        let mut rep: Option<bool> = None;
        let mut prefix_len: u16 = 0;

        loop {
            let addr = Mem::linear(mem.reg16(Reg16::Cs), mem.ip().wrapping_add(prefix_len));
            match tables.class(mem.read8(addr)) {
                XlatClass::SegOverridePrefix => {
                    seg_override = Some(Reg16::from_seg_field(tables.extra(mem.read8(addr))));
                    prefix_len += 1;
                }
                XlatClass::RepPrefix => {
                    rep = Some(tables.extra(mem.read8(addr)) == 1);
                    prefix_len += 1;
                }
                XlatClass::LockPrefix => {
                    prefix_len += 1;
                }
                _ => break,
            }
        }

        let instr_ip = mem.ip().wrapping_add(prefix_len);
        let instr_addr = Mem::linear(mem.reg16(Reg16::Cs), instr_ip);
        let opcode = mem.read8(instr_addr);
        let class = tables.class(opcode);
        let extra = tables.extra(opcode);

        let flow = self.execute(mem, tables, host, instr_ip, instr_addr, opcode, class, extra, seg_override, rep);

        match flow {
            Flow::Advance(n) => mem.set_ip(instr_ip.wrapping_add(n)),
            Flow::Absolute => {}
        }

        let prefix_active = seg_override.is_some() || rep.is_some();
        let (event, _delivered) = self.bridge.service(mem, host, prefix_active, self.int8_rate_limit);
        if event.reset_requested {
            self.pending_full_reset = true;
        }
        !event.exit
    }
}

impl Cpu for Cpu8086 {
    /// Boot vector: `CS:IP = F000:0100`, the classic BIOS-entry convention —
    /// matches the linear layout `pc_interrupt`'s tests already assume.
    fn reset(&mut self, mem: &mut Mem) {
        mem.set_reg16(Reg16::Cs, 0xF000);
        mem.set_ip(0x0100);
        mem.set_flags_word(0);
        self.halted = false;
        self.bridge = InterruptBridge::new();
        self.pending_full_reset = false;
    }

    fn is_halted(&self) -> bool {
        self.halted
    }
}

impl CpuStateTrait for Cpu8086 {
    type Snapshot = Cpu8086State;

    fn snapshot(&self, mem: &Mem) -> Cpu8086State {
        Cpu8086State {
            ax: mem.reg16(Reg16::Ax),
            cx: mem.reg16(Reg16::Cx),
            dx: mem.reg16(Reg16::Dx),
            bx: mem.reg16(Reg16::Bx),
            sp: mem.reg16(Reg16::Sp),
            bp: mem.reg16(Reg16::Bp),
            si: mem.reg16(Reg16::Si),
            di: mem.reg16(Reg16::Di),
            es: mem.reg16(Reg16::Es),
            cs: mem.reg16(Reg16::Cs),
            ss: mem.reg16(Reg16::Ss),
            ds: mem.reg16(Reg16::Ds),
            ip: mem.ip(),
            flags: mem.flags_word(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::{DiskSelect, RtcTime, TickEvent};
    use crate::core::mem::DEFAULT_MEM_SIZE;
    use std::io;

    struct TestHost;

    impl HostInterface for TestHost {
        fn read_port(&mut self, _port: u16) -> u8 {
            0
        }
        fn write_port(&mut self, _port: u16, _value: u8) {}
        fn timer_tick(&mut self, _n: u32) -> TickEvent {
            TickEvent::default()
        }
        fn int_pending(&mut self) -> Option<u8> {
            None
        }
        fn fd_changed(&mut self) {}
        fn putchar(&mut self, _byte: u8) {}
        fn read_rtc(&self) -> RtcTime {
            RtcTime::default()
        }
        fn disk_sector_count(&self, _drive: DiskSelect) -> Option<u32> {
            None
        }
        fn disk_read(&mut self, _drive: DiskSelect, _lba: u32, _buf: &mut [u8]) -> io::Result<()> {
            Ok(())
        }
        fn disk_write(&mut self, _drive: DiskSelect, _lba: u32, _buf: &[u8]) -> io::Result<()> {
            Ok(())
        }
    }

    fn boot() -> (Cpu8086, Mem, DecodeTables, TestHost) {
        let mut cpu = Cpu8086::new();
        let mut mem = Mem::new(DEFAULT_MEM_SIZE);
        cpu.reset(&mut mem);
        (cpu, mem, DecodeTables::classic(), TestHost)
    }

    #[test]
    fn mov_ax_imm16_then_inc_ax() {
        let (mut cpu, mut mem, tables, mut host) = boot();
        let base = Mem::linear(mem.reg16(Reg16::Cs), mem.ip());
        mem.write8(base, 0xB8); // MOV AX, imm16
        mem.write16(base + 1, 0x1234);
        mem.write8(base + 3, 0x40); // INC AX
        cpu.tick(&mut mem, &tables, &mut host);
        assert_eq!(mem.reg16(Reg16::Ax), 0x1234);
        cpu.tick(&mut mem, &tables, &mut host);
        assert_eq!(mem.reg16(Reg16::Ax), 0x1235);
    }

    #[test]
    fn add_reg_reg_sets_flags_and_advances_ip() {
        let (mut cpu, mut mem, tables, mut host) = boot();
        let start_ip = mem.ip();
        let base = Mem::linear(mem.reg16(Reg16::Cs), start_ip);
        mem.set_reg16(Reg16::Ax, 0xFFFF);
        mem.set_reg16(Reg16::Bx, 0x0001);
        mem.write8(base, 0x01); // ADD r/m16, r16 (d=0)
        mem.write8(base + 1, 0b11_011_000); // mod=11 reg=BX rm=AX -> AX += BX
        cpu.tick(&mut mem, &tables, &mut host);
        assert_eq!(mem.reg16(Reg16::Ax), 0x0000);
        assert!(mem.flag(Flag::Zf));
        assert!(mem.flag(Flag::Cf));
        assert_eq!(mem.ip(), start_ip.wrapping_add(2));
    }

    #[test]
    fn call_near_then_ret_round_trips() {
        let (mut cpu, mut mem, tables, mut host) = boot();
        mem.set_reg16(Reg16::Ss, 0x2000);
        mem.set_reg16(Reg16::Sp, 0x0100);
        let start_ip = mem.ip();
        let base = Mem::linear(mem.reg16(Reg16::Cs), start_ip);
        mem.write8(base, 0xE8); // CALL near
        mem.write16(base + 1, 0x0005); // rel16
        mem.write8(Mem::linear(mem.reg16(Reg16::Cs), start_ip.wrapping_add(3).wrapping_add(5)), 0xC3); // RET at target
        cpu.tick(&mut mem, &tables, &mut host); // CALL
        let after_call_ip = mem.ip();
        assert_eq!(after_call_ip, start_ip.wrapping_add(3).wrapping_add(5));
        cpu.tick(&mut mem, &tables, &mut host); // RET
        assert_eq!(mem.ip(), start_ip.wrapping_add(3));
    }

    #[test]
    fn halt_stays_halted_until_interrupt_delivered() {
        let (mut cpu, mut mem, tables, mut host) = boot();
        let base = Mem::linear(mem.reg16(Reg16::Cs), mem.ip());
        mem.write8(base, 0xF4); // HLT
        cpu.tick(&mut mem, &tables, &mut host);
        assert!(cpu.is_halted());
        cpu.tick(&mut mem, &tables, &mut host);
        assert!(cpu.is_halted()); // no pending interrupt, stays halted
    }
}
