//! CPU conformance: documented cycle traffic and flag semantics, exercised
//! through the Harte-style single-opcode harness.

use ricoh_core::testing::{harte_case_run, parse_harte_cases, BusCycle, CycleKind, HarteCase, HarteState};

fn case(ram: &[(u16, u8)], setup: impl FnOnce(&mut HarteState)) -> HarteCase {
    let mut initial = HarteState {
        pc: 0x8000,
        s: 0xFD,
        a: 0,
        x: 0,
        y: 0,
        p: 0x24,
        ram: ram.to_vec(),
    };
    setup(&mut initial);
    HarteCase {
        name: String::new(),
        initial: initial.clone(),
        final_state: HarteState { ram: vec![], ..initial },
        cycles: vec![],
    }
}

fn read(addr: u16, val: u8) -> BusCycle {
    BusCycle {
        addr,
        val,
        kind: CycleKind::Read,
    }
}

fn write(addr: u16, val: u8) -> BusCycle {
    BusCycle {
        addr,
        val,
        kind: CycleKind::Write,
    }
}

#[test]
fn lda_immediate_trace_and_state() {
    let case = case(&[(0x8000, 0xA9), (0x8001, 0x42)], |_| {});
    let out = harte_case_run(&case).unwrap();
    assert_eq!(out.state.a, 0x42);
    assert_eq!(out.state.pc, 0x8002);
    assert_eq!(out.state.p, 0x24);
    assert_eq!(out.cycles, vec![read(0x8000, 0xA9), read(0x8001, 0x42)]);
}

#[test]
fn adc_immediate_overflow() {
    // A=$50 + $50: carry clear, overflow set, negative set.
    let case = case(&[(0x8000, 0x69), (0x8001, 0x50)], |s| {
        s.a = 0x50;
        s.p = 0x20;
    });
    let out = harte_case_run(&case).unwrap();
    assert_eq!(out.state.a, 0xA0);
    assert_eq!(out.state.p & 0x01, 0, "carry clear");
    assert_eq!(out.state.p & 0x40, 0x40, "overflow set");
    assert_eq!(out.state.p & 0x80, 0x80, "negative set");
    assert_eq!(out.state.p & 0x02, 0, "zero clear");
}

#[test]
fn jmp_indirect_page_wrap() {
    let case = case(
        &[
            (0x8000, 0x6C),
            (0x8001, 0xFF),
            (0x8002, 0x02),
            (0x02FF, 0x00),
            (0x0200, 0x80),
        ],
        |_| {},
    );
    let out = harte_case_run(&case).unwrap();
    assert_eq!(out.state.pc, 0x8000);
    // The high byte comes from $0200, not $0300.
    assert_eq!(
        out.cycles,
        vec![
            read(0x8000, 0x6C),
            read(0x8001, 0xFF),
            read(0x8002, 0x02),
            read(0x02FF, 0x00),
            read(0x0200, 0x80),
        ]
    );
}

#[test]
fn indexed_read_page_cross_re_reads_uncarried_address() {
    // LDA $80FF,X with X=1: the extra cycle reads ($80, $00) before the
    // carried address.
    let case = case(
        &[(0x8000, 0xBD), (0x8001, 0xFF), (0x8002, 0x80), (0x8100, 0x77)],
        |s| s.x = 1,
    );
    let out = harte_case_run(&case).unwrap();
    assert_eq!(out.state.a, 0x77);
    assert_eq!(
        out.cycles,
        vec![
            read(0x8000, 0xBD),
            read(0x8001, 0xFF),
            read(0x8002, 0x80),
            read(0x8000, 0xBD), // dummy read at ($80 << 8) | $00
            read(0x8100, 0x77),
        ]
    );
}

#[test]
fn indexed_store_always_pays_the_re_read() {
    // STA $1000,Y with Y=0: no crossing, the re-read happens anyway.
    let case = case(&[(0x8000, 0x99), (0x8001, 0x00), (0x8002, 0x10)], |s| {
        s.a = 0x5A;
    });
    let out = harte_case_run(&case).unwrap();
    assert_eq!(
        out.cycles,
        vec![
            read(0x8000, 0x99),
            read(0x8001, 0x00),
            read(0x8002, 0x10),
            read(0x1000, 0x00),
            write(0x1000, 0x5A),
        ]
    );
}

#[test]
fn rmw_dummy_write_is_observable() {
    // INC $0010 holding $7F: read, write of $7F, write of $80.
    let case = case(&[(0x8000, 0xE6), (0x8001, 0x10), (0x0010, 0x7F)], |_| {});
    let out = harte_case_run(&case).unwrap();
    assert_eq!(
        out.cycles,
        vec![
            read(0x8000, 0xE6),
            read(0x8001, 0x10),
            read(0x0010, 0x7F),
            write(0x0010, 0x7F),
            write(0x0010, 0x80),
        ]
    );
    assert_eq!(out.state.p & 0x80, 0x80);
}

#[test]
fn zero_page_indexed_dummy_reads_the_unindexed_address() {
    // LDA $F0,X with X=$20 wraps to $10.
    let case = case(
        &[(0x8000, 0xB5), (0x8001, 0xF0), (0x0010, 0x33)],
        |s| s.x = 0x20,
    );
    let out = harte_case_run(&case).unwrap();
    assert_eq!(out.state.a, 0x33);
    assert_eq!(
        out.cycles,
        vec![
            read(0x8000, 0xB5),
            read(0x8001, 0xF0),
            read(0x00F0, 0x00),
            read(0x0010, 0x33),
        ]
    );
}

#[test]
fn indirect_indexed_crossing_adds_one_cycle() {
    // LDA ($10),Y crossing: base $01FF + Y=1 -> $0200.
    let case1 = case(
        &[
            (0x8000, 0xB1),
            (0x8001, 0x10),
            (0x0010, 0xFF),
            (0x0011, 0x01),
            (0x0200, 0x44),
        ],
        |s| s.y = 1,
    );
    let out = harte_case_run(&case1).unwrap();
    assert_eq!(out.state.a, 0x44);
    assert_eq!(out.cycles.len(), 6, "5 + 1 page-cross cycle");

    // Same shape without the crossing: 5 cycles.
    let case2 = case(
        &[
            (0x8000, 0xB1),
            (0x8001, 0x10),
            (0x0010, 0x00),
            (0x0011, 0x01),
            (0x0101, 0x44),
        ],
        |s| s.y = 1,
    );
    let out = harte_case_run(&case2).unwrap();
    assert_eq!(out.cycles.len(), 5);
}

#[test]
fn sbc_treats_operand_as_complement() {
    // SEC-equivalent start (carry set in P), $40 - $41 = $FF with borrow.
    let case = case(&[(0x8000, 0xE9), (0x8001, 0x41)], |s| {
        s.a = 0x40;
        s.p = 0x25;
    });
    let out = harte_case_run(&case).unwrap();
    assert_eq!(out.state.a, 0xFF);
    assert_eq!(out.state.p & 0x01, 0, "borrow clears carry");
    assert_eq!(out.state.p & 0x80, 0x80);
}

#[test]
fn unofficial_sbc_eb_matches_e9() {
    let official = case(&[(0x8000, 0xE9), (0x8001, 0x10)], |s| {
        s.a = 0x50;
        s.p = 0x25;
    });
    let unofficial = case(&[(0x8000, 0xEB), (0x8001, 0x10)], |s| {
        s.a = 0x50;
        s.p = 0x25;
    });
    let a = harte_case_run(&official).unwrap();
    let b = harte_case_run(&unofficial).unwrap();
    assert_eq!(a.state.a, b.state.a);
    assert_eq!(a.state.p, b.state.p);
}

#[test]
fn isb_increments_then_subtracts() {
    // *ISB $10: $0F -> $10, then A = $30 - $10 (carry set).
    let case = case(&[(0x8000, 0xE7), (0x8001, 0x10), (0x0010, 0x0F)], |s| {
        s.a = 0x30;
        s.p = 0x25;
    });
    let out = harte_case_run(&case).unwrap();
    assert_eq!(out.state.a, 0x20);
    assert_eq!(out.cycles.len(), 5);
}

#[test]
fn slo_shifts_then_ors() {
    let case = case(&[(0x8000, 0x07), (0x8001, 0x10), (0x0010, 0x81)], |s| {
        s.a = 0x01;
    });
    let out = harte_case_run(&case).unwrap();
    assert_eq!(out.state.a, 0x03);
    assert_eq!(out.state.p & 0x01, 0x01, "carry from the shifted-out bit");
}

#[test]
fn execution_is_deterministic() {
    let case = case(
        &[(0x8000, 0x7D), (0x8001, 0xF0), (0x8002, 0x12), (0x12F5, 0x09)],
        |s| {
            s.a = 0x13;
            s.x = 0x05;
            s.p = 0x65;
        },
    );
    let first = harte_case_run(&case).unwrap();
    for _ in 0..3 {
        let again = harte_case_run(&case).unwrap();
        assert_eq!(again.state, first.state);
        assert_eq!(again.cycles, first.cycles);
    }
}

#[test]
fn fixture_json_runs_end_to_end() {
    // One fixture in the published format: TAX with N flag.
    let json = r#"[{
        "name": "aa 00 00",
        "initial": {"pc": 17476, "s": 253, "a": 128, "x": 0, "y": 0, "p": 36,
                    "ram": [[17476, 170], [17477, 0]]},
        "final": {"pc": 17477, "s": 253, "a": 128, "x": 128, "y": 0, "p": 164,
                  "ram": [[17476, 170], [17477, 0]]},
        "cycles": [[17476, 170, "read"], [17477, 0, "read"]]
    }]"#;
    for case in parse_harte_cases(json).unwrap() {
        let out = harte_case_run(&case).unwrap();
        assert_eq!(out.state, case.final_state, "case {}", case.name);
        assert_eq!(out.cycles, case.expected_cycles(), "case {}", case.name);
    }
}
