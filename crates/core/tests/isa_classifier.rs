use entryfix_core::isa::{
    classify, encode, is_call_and_link, is_delay_slot_branch, return_address,
    BranchClassification, Instruction,
};

fn word(opcode: u32, rs: u32, rt: u32, low: u32) -> u32 {
    (opcode << 26) | (rs << 21) | (rt << 16) | (low & 0xFFFF)
}

#[test]
fn jal_is_always_a_delay_slot_branch() {
    // Every operand pattern under the primary opcode 3.
    for low in [0u32, 1, 0x3FF_FFFF, 0x155_5555, 0x2AA_AAAA] {
        let w = (3 << 26) | low;
        assert_eq!(classify(w), BranchClassification::DelaySlotBranch, "{w:#010x}");
        assert!(is_call_and_link(w));
    }
}

#[test]
fn classify_is_total_over_a_spread_of_words() {
    let mut w: u32 = 0x1234_5678;
    for _ in 0..100_000 {
        // xorshift; every result must be one of the two classes.
        w ^= w << 13;
        w ^= w >> 17;
        w ^= w << 5;
        let class = classify(w);
        assert!(matches!(
            class,
            BranchClassification::NotABranch | BranchClassification::DelaySlotBranch
        ));
    }
    assert_eq!(classify(0), BranchClassification::NotABranch);
    assert_eq!(classify(u32::MAX), BranchClassification::NotABranch);
}

#[test]
fn primary_branch_opcodes_carry_delay_slots() {
    for opcode in [0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x14, 0x15, 0x16, 0x17] {
        assert!(is_delay_slot_branch(word(opcode, 4, 5, 0x10)), "opcode {opcode:#x}");
    }
    for opcode in [0x08, 0x09, 0x0F, 0x23, 0x2B] {
        assert!(!is_delay_slot_branch(word(opcode, 4, 5, 0x10)), "opcode {opcode:#x}");
    }
}

#[test]
fn special_only_jr_and_jalr_branch() {
    assert!(is_delay_slot_branch(encode::jr(31)));
    assert!(is_delay_slot_branch(encode::jalr(25)));
    // addu, sll, syscall
    assert!(!is_delay_slot_branch(0x0085_1021));
    assert!(!is_delay_slot_branch(0x0004_2080));
    assert!(!is_delay_slot_branch(0x0000_000C));
}

#[test]
fn regimm_branches_by_rt() {
    for rt in [0x00, 0x01, 0x02, 0x03, 0x10, 0x11, 0x12, 0x13] {
        assert!(is_delay_slot_branch(word(1, 4, rt, 0x20)), "rt {rt:#x}");
    }
    // tgei / teqi are traps, not branches.
    for rt in [0x08, 0x0C] {
        assert!(!is_delay_slot_branch(word(1, 4, rt, 0x20)), "rt {rt:#x}");
    }
}

#[test]
fn cop1_bc_is_a_branch_but_arithmetic_is_not() {
    let bc1t = (0x11 << 26) | (0x08 << 21) | (1 << 16) | 0x0010;
    assert!(is_delay_slot_branch(bc1t));
    let mov_s = (0x11 << 26) | (0x10 << 21) | 0x06;
    assert!(!is_delay_slot_branch(mov_s));
}

#[test]
fn only_jal_and_jalr_link() {
    assert!(is_call_and_link(encode::jal(0x0010_0000)));
    assert!(is_call_and_link(encode::jalr(25)));
    assert!(!is_call_and_link(encode::j(0x0010_0000)));
    assert!(!is_call_and_link(encode::jr(31)));
    // bgezal links too, but is not a call the recompiler dispatches.
    assert!(!is_call_and_link(word(1, 4, 0x11, 0x20)));
}

#[test]
fn decoded_fields_match_encoding() {
    let insn = Instruction::decode(encode::beq(4, 5, -2));
    assert_eq!(insn.opcode(), 0x04);
    assert_eq!(insn.rt(), 5);
    assert_eq!(insn.classification(), BranchClassification::DelaySlotBranch);
}

#[test]
fn return_address_skips_the_delay_slot() {
    assert_eq!(return_address(0x1000), Some(0x1008));
    assert_eq!(return_address(u32::MAX - 3), None);
}
