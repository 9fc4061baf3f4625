use std::fs;
use std::path::Path;

use entryfix::{canonicalize_or_current, infer_project_name, parse_address};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let nested = tmp.path().join("nested");
    fs::create_dir_all(&nested).expect("create nested");

    let result = canonicalize_or_current(&nested.to_string_lossy()).expect("canonicalize");
    assert_eq!(result, nested.canonicalize().expect("canonicalize nested"));
}

#[test]
fn canonicalize_or_current_joins_missing_relative_path_onto_cwd() {
    let cwd = std::env::current_dir().expect("cwd");
    let result = canonicalize_or_current("does-not-exist-yet").expect("resolve");
    assert_eq!(result, cwd.join("does-not-exist-yet"));
}

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let cwd = std::env::current_dir().expect("cwd");
    assert_eq!(canonicalize_or_current(".").expect("resolve"), cwd);
}

#[test]
fn infer_project_name_uses_last_path_component() {
    assert_eq!(infer_project_name(Path::new("/work/sm64-recomp")), "sm64-recomp");
    assert_eq!(infer_project_name(Path::new("/tmp/project-root")), "project-root");
}

#[test]
fn infer_project_name_falls_back_when_missing() {
    assert_eq!(infer_project_name(Path::new("/")), "unnamed-project");
}

#[test]
fn parse_address_accepts_hex_and_decimal() {
    assert_eq!(parse_address("0x80001000").unwrap(), 0x8000_1000);
    assert_eq!(parse_address("0XFF").unwrap(), 0xff);
    assert_eq!(parse_address(" 4096 ").unwrap(), 4096);
}

#[test]
fn parse_address_rejects_garbage() {
    for text in ["", "0x", "0x1_0000_0000", "-4", "0x100000000", "nope"] {
        let err = parse_address(text).unwrap_err();
        assert!(err.to_string().contains("Invalid address"), "{text}: {err}");
    }
}
