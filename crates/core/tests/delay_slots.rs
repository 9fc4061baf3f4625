use entryfix_core::analysis::{
    correct_delay_slots, find_split_delay_slots, DelaySlotError, DEFAULT_MAX_SWEEPS,
};
use entryfix_core::image::{CodeImage, Region};
use entryfix_core::isa::{encode, is_delay_slot_branch};
use entryfix_core::model::{FunctionEntry, FunctionTable};

fn table(entries: &[(&str, u32, u32)]) -> FunctionTable {
    FunctionTable::from_entries(entries.iter().map(|(n, a, s)| FunctionEntry::new(*n, *a, *s)))
        .expect("valid table")
}

fn assert_fixpoint(table: &FunctionTable, image: &CodeImage) {
    let last = table.last().map(|e| e.address);
    for entry in table.iter().filter(|e| Some(e.address) != last) {
        let word = image.read_word(entry.address + entry.size - 4).unwrap_or(encode::NOP);
        assert!(!is_delay_slot_branch(word), "{} still ends in a branch", entry.name);
    }
}

#[test]
fn branch_at_end_pulls_delay_slot_back() {
    // a: addiu, jr ra | b: nop (delay slot), addiu, jr ra, nop
    let image = CodeImage::from_regions(vec![Region::from_words(
        0x1000,
        &[
            encode::addiu(2, 0, 1),
            encode::jr(31),
            encode::NOP,
            encode::addiu(2, 0, 2),
            encode::jr(31),
            encode::NOP,
        ],
    )]);
    let mut t = table(&[("a", 0x1000, 0x8), ("b", 0x1008, 0x10)]);
    assert_eq!(find_split_delay_slots(&t, &image), vec![0x1000]);

    let report = correct_delay_slots(&mut t, &image, DEFAULT_MAX_SWEEPS).unwrap();
    assert_eq!(report.fixes.len(), 1);
    assert_eq!(report.fixes[0].function, "a");
    assert_eq!(report.fixes[0].branch_address, 0x1004);
    assert_eq!(t.get(0x1000).map(|e| e.size), Some(0xC));
    assert_eq!(t.get(0x100C).map(|e| e.name.as_str()), Some("b"));
    assert_fixpoint(&t, &image);
    t.validate().unwrap();

    // Idempotent: a second run changes nothing.
    let before = t.clone();
    let again = correct_delay_slots(&mut t, &image, DEFAULT_MAX_SWEEPS).unwrap();
    assert!(again.fixes.is_empty());
    assert_eq!(t, before);
}

#[test]
fn delay_slot_only_entry_is_removed() {
    let image = CodeImage::from_regions(vec![Region::from_words(
        0x1000,
        &[encode::jal(0x2000), encode::NOP, encode::jr(31), encode::NOP],
    )]);
    let mut t = table(&[("a", 0x1000, 0x4), ("slot", 0x1004, 0x4), ("c", 0x1008, 0x8)]);
    let report = correct_delay_slots(&mut t, &image, DEFAULT_MAX_SWEEPS).unwrap();
    assert_eq!(report.fixes.len(), 1);
    assert!(report.fixes[0].removed_next);
    assert_eq!(report.fixes[0].next_function, "slot");
    assert_eq!(t.len(), 2);
    assert_eq!(t.get(0x1000).map(|e| e.size), Some(0x8));
    t.validate().unwrap();
}

#[test]
fn corrections_cascade_until_fixpoint() {
    // Each one-word entry is a branch; every fix exposes the next branch.
    let words = [
        encode::beq(1, 2, 4),
        encode::beq(3, 4, 4),
        encode::beq(5, 6, 4),
        encode::NOP,
        encode::NOP,
        encode::NOP,
    ];
    let image = CodeImage::from_regions(vec![Region::from_words(0x1000, &words)]);
    let mut t = table(&[
        ("a", 0x1000, 0x4),
        ("b", 0x1004, 0x4),
        ("c", 0x1008, 0x4),
        ("d", 0x100C, 0xC),
    ]);
    let report = correct_delay_slots(&mut t, &image, DEFAULT_MAX_SWEEPS).unwrap();
    assert!(!report.fixes.is_empty());
    assert!(report.sweeps >= 2);
    assert_fixpoint(&t, &image);
    t.validate().unwrap();
    let (start, end) = t.span().unwrap();
    assert_eq!((start, end), (0x1000, 0x1018));
}

#[test]
fn trailing_branch_is_reported_not_truncated() {
    let image = CodeImage::from_regions(vec![Region::from_words(
        0x1000,
        &[encode::NOP, encode::NOP, encode::NOP, encode::jr(31)],
    )]);
    let mut t = table(&[("a", 0x1000, 0x8), ("last", 0x1008, 0x8)]);
    let before = t.clone();
    let report = correct_delay_slots(&mut t, &image, DEFAULT_MAX_SWEEPS).unwrap();
    assert!(report.fixes.is_empty());
    let trailing = report.trailing_branch.expect("trailing branch");
    assert_eq!(trailing.function, "last");
    assert_eq!(trailing.branch_address, 0x100C);
    assert_eq!(t, before);
}

#[test]
fn gapped_table_is_rejected() {
    let image = CodeImage::default();
    let mut t = table(&[("a", 0x1000, 0x8), ("b", 0x1010, 0x8)]);
    let err = correct_delay_slots(&mut t, &image, DEFAULT_MAX_SWEEPS).unwrap_err();
    assert!(matches!(err, DelaySlotError::InvalidTable(_)));
}

#[test]
fn sweep_budget_exhaustion_is_non_convergent() {
    let words = [encode::beq(1, 2, 4), encode::beq(3, 4, 4), encode::NOP, encode::NOP];
    let image = CodeImage::from_regions(vec![Region::from_words(0x1000, &words)]);
    let mut t = table(&[("a", 0x1000, 0x4), ("b", 0x1004, 0x4), ("c", 0x1008, 0x8)]);
    let err = correct_delay_slots(&mut t, &image, 1).unwrap_err();
    assert!(matches!(err, DelaySlotError::NonConvergent { sweeps: 1 }));
}
