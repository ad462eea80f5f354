//! Generates randomized single-step fixtures for a given opcode by running
//! it through a real `Engine` and diffing registers/memory before and after,
//! the same shape as the teacher's per-legacy-CPU generators but without a
//! bus to trace: this core has no cycle-level tracing to record, so a
//! fixture only needs a before/after snapshot.

use std::fs;
use std::path::Path;

use rand::Rng;
use xt8086_cpu_validation::{sparsen, sparsen_nonzero, Xt8086State, Xt8086TestCase, ARENA_BASE, ARENA_LEN};
use xt8086_core::core::mem::Reg16;
use xt8086_core::cpu::decode::XlatClass;
use xt8086_core::prelude::*;

const NUM_TESTS: usize = 1000;
/// Bytes of headroom left after the placed opcode so the longest encodings
/// (modrm + disp16 + imm16, e.g. `81 /n r/m16, imm16`) always fit.
const INSTR_MARGIN: usize = 8;

/// Opcodes this generator can usefully fuzz: real instructions with a single
/// well-defined decode, as opposed to prefix bytes (which only make sense
/// composed with a following opcode) or opcodes this core doesn't implement.
fn is_generatable(tables: &DecodeTables, opcode: u8) -> bool {
    !matches!(
        tables.class(opcode),
        XlatClass::SegOverridePrefix
            | XlatClass::RepPrefix
            | XlatClass::LockPrefix
            | XlatClass::Unimplemented
            | XlatClass::BadOpcode
    )
}

struct NullHost;

impl xt8086_core::core::host::HostInterface for NullHost {
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
    fn disk_read(&mut self, _drive: DiskSelect, _lba: u32, _buf: &mut [u8]) -> std::io::Result<()> {
        Ok(())
    }
    fn disk_write(&mut self, _drive: DiskSelect, _lba: u32, _buf: &[u8]) -> std::io::Result<()> {
        Ok(())
    }
}

fn generate_opcode(rng: &mut impl Rng, opcode: u8) -> Vec<Xt8086TestCase> {
    let mut tests = Vec::with_capacity(NUM_TESTS);
    let max_ip = (ARENA_LEN - INSTR_MARGIN) as u16;

    for _ in 0..NUM_TESTS {
        let mut engine = Engine::new(EngineConfig::default());
        let mut host = NullHost;

        let mut arena = vec![0u8; ARENA_LEN];
        rng.fill(&mut arena[..]);
        let ip = rng.gen_range(0..max_ip);
        arena[ip as usize] = opcode;
        engine.mem.as_mut_slice()[ARENA_BASE..ARENA_BASE + ARENA_LEN].copy_from_slice(&arena);

        engine.mem.set_reg16(Reg16::Ax, rng.r#gen());
        engine.mem.set_reg16(Reg16::Cx, rng.r#gen());
        engine.mem.set_reg16(Reg16::Dx, rng.r#gen());
        engine.mem.set_reg16(Reg16::Bx, rng.r#gen());
        engine.mem.set_reg16(Reg16::Sp, rng.r#gen());
        engine.mem.set_reg16(Reg16::Bp, rng.r#gen());
        engine.mem.set_reg16(Reg16::Si, rng.r#gen());
        engine.mem.set_reg16(Reg16::Di, rng.r#gen());
        engine.mem.set_reg16(Reg16::Cs, 0);
        engine.mem.set_reg16(Reg16::Ds, 0);
        engine.mem.set_reg16(Reg16::Es, 0);
        engine.mem.set_reg16(Reg16::Ss, 0);
        engine.mem.set_ip(ip);
        engine.mem.set_flags_word(rng.r#gen());

        let dense_initial = Xt8086State::capture(&engine.mem, &engine.cpu);
        engine.step(&mut host);
        let dense_final = Xt8086State::capture(&engine.mem, &engine.cpu);

        let name = format!("{opcode:02x} @ ip={ip:04x}");
        tests.push(Xt8086TestCase {
            name,
            final_state: Xt8086State { ram: sparsen(&dense_initial, &dense_final), ..dense_final },
            initial: Xt8086State { ram: sparsen_nonzero(&dense_initial), ..dense_initial },
        });
    }

    tests
}

fn generate_and_write(rng: &mut impl Rng, opcode: u8, out_dir: &Path) {
    let tests = generate_opcode(rng, opcode);
    let out_path = out_dir.join(format!("{opcode:02x}.json"));
    let json = serde_json::to_string_pretty(&tests).expect("serialize test cases");
    fs::write(&out_path, json).expect("write output file");
    println!("generated {} tests for 0x{opcode:02X} -> {}", tests.len(), out_path.display());
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: gen_8086_tests <opcode_hex | all>");
        std::process::exit(1);
    }

    let out_dir = Path::new("test_data/8086");
    fs::create_dir_all(out_dir).expect("create output directory");
    let tables = DecodeTables::classic();
    let mut rng = rand::thread_rng();

    if args[1] == "all" {
        let mut count = 0;
        for opcode in 0x00..=0xFFu8 {
            if is_generatable(&tables, opcode) {
                generate_and_write(&mut rng, opcode, out_dir);
                count += 1;
            }
        }
        println!("generated tests for {count} opcodes");
    } else {
        let opcode_str = args[1].trim_start_matches("0x").trim_start_matches("0X");
        let opcode = u8::from_str_radix(opcode_str, 16).unwrap_or_else(|_| {
            eprintln!("invalid hex opcode: {}", args[1]);
            std::process::exit(1);
        });
        if !is_generatable(&tables, opcode) {
            eprintln!("opcode 0x{opcode:02X} is a prefix or unimplemented; not supported for generation");
            std::process::exit(1);
        }
        generate_and_write(&mut rng, opcode, out_dir);
    }
}
