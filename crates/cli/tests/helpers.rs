use std::fs;
use std::path::Path;

use chunkwise::{input_stem, sha256_file};
use tempfile::tempdir;

#[test]
fn input_stem_drops_directory_and_extension() {
    assert_eq!(input_stem(Path::new("/work/dumps/libgame.so.json")), "libgame.so");
    assert_eq!(input_stem(Path::new("fw.yml")), "fw");
}

#[test]
fn input_stem_falls_back_when_missing() {
    assert_eq!(input_stem(Path::new("/")), "output");
}

#[test]
fn file_hash_is_hex_sha256() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("blob.bin");
    fs::write(&path, b"abc").expect("write blob");

    let expected = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    assert_eq!(sha256_file(&path).expect("hash file"), expected);
}

#[test]
fn hashing_missing_file_fails_with_path() {
    let tmp = tempdir().expect("tempdir");
    let err = sha256_file(&tmp.path().join("nope.bin")).unwrap_err();
    assert!(format!("{err:#}").contains("nope.bin"));
}
