use xt8086_core::prelude::*;
use xt8086_cpu_validation::{Xt8086State, Xt8086TestCase, ARENA_BASE};

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

fn run_test_case(tc: &Xt8086TestCase) {
    let mut engine = Engine::new(EngineConfig::default());
    let mut host = NullHost;

    tc.initial.install(&mut engine.mem);
    engine.step(&mut host);

    let got = Xt8086State::capture(&engine.mem, &engine.cpu);
    assert_eq!(got.ax, tc.final_state.ax, "{}: AX", tc.name);
    assert_eq!(got.cx, tc.final_state.cx, "{}: CX", tc.name);
    assert_eq!(got.dx, tc.final_state.dx, "{}: DX", tc.name);
    assert_eq!(got.bx, tc.final_state.bx, "{}: BX", tc.name);
    assert_eq!(got.sp, tc.final_state.sp, "{}: SP", tc.name);
    assert_eq!(got.bp, tc.final_state.bp, "{}: BP", tc.name);
    assert_eq!(got.si, tc.final_state.si, "{}: SI", tc.name);
    assert_eq!(got.di, tc.final_state.di, "{}: DI", tc.name);
    assert_eq!(got.es, tc.final_state.es, "{}: ES", tc.name);
    assert_eq!(got.cs, tc.final_state.cs, "{}: CS", tc.name);
    assert_eq!(got.ss, tc.final_state.ss, "{}: SS", tc.name);
    assert_eq!(got.ds, tc.final_state.ds, "{}: DS", tc.name);
    assert_eq!(got.ip, tc.final_state.ip, "{}: IP", tc.name);
    assert_eq!(got.flags & 0x0FD5, tc.final_state.flags & 0x0FD5, "{}: FLAGS", tc.name);

    for &(addr, expected) in &tc.final_state.ram {
        assert_eq!(
            engine.mem.read8(ARENA_BASE + addr as usize),
            expected,
            "{}: RAM[0x{addr:04X}]",
            tc.name
        );
    }
}

fn load_fixtures(opcode_hex: &str) -> Vec<Xt8086TestCase> {
    let path = format!("test_data/8086/{opcode_hex}.json");
    let json = std::fs::read_to_string(&path).unwrap_or_else(|_| {
        panic!("missing test data at {path}; run: cargo run --bin gen_8086_tests -- 0x{opcode_hex}")
    });
    let tests: Vec<Xt8086TestCase> = serde_json::from_str(&json).unwrap();
    assert!(!tests.is_empty(), "test file {path} is empty");
    tests
}

#[test]
fn mov_reg_imm16_b8() {
    for tc in &load_fixtures("b8") {
        run_test_case(tc);
    }
}

#[test]
fn add_reg_rm_00() {
    for tc in &load_fixtures("00") {
        run_test_case(tc);
    }
}

#[test]
fn group_f6f7_byte_unary_f6() {
    for tc in &load_fixtures("f6") {
        run_test_case(tc);
    }
}

#[test]
fn shift_rotate_d1() {
    for tc in &load_fixtures("d1") {
        run_test_case(tc);
    }
}
