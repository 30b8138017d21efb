//! Fake executables for the external audio tools.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Piper stand-in: copies stdin into the `--output_file` argument.
pub fn fake_piper(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "piper",
        r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output_file" ]; then out="$2"; fi
  shift
done
cat > "$out""#,
    )
}

/// `say -o <aiff> -f -` stand-in: writes `FORM` plus stdin, and refuses option-looking text.
pub fn fake_say(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "say",
        r#"[ "$3" = "-f" ] && [ "$4" = "-" ] && [ $# -eq 4 ] || { echo "usage: say -o out -f -" >&2; exit 64; }
{ printf 'FORM'; cat; } > "$2""#,
    )
}

/// `afconvert -f WAVE -d LEI16@22050 <aiff> <wav>` stand-in.
pub fn fake_afconvert(dir: &Path) -> PathBuf {
    write_script(dir, "afconvert", r#"cp "$5" "$6""#)
}

pub fn failing(dir: &Path, name: &str) -> PathBuf {
    write_script(dir, name, "echo \"$0 is broken\" >&2\nexit 1")
}

/// Names of everything in `dir`, sorted.
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
