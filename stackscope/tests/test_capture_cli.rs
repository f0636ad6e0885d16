use std::process::Command;

fn stackscope() -> Command {
    Command::new(env!("CARGO_BIN_EXE_stackscope"))
}

#[test]
fn test_capture_prints_frames() {
    let output = stackscope().output().expect("run stackscope");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let frame_lines: Vec<&str> = stdout.lines().filter(|l| l.trim_start().starts_with("0x")).collect();
    assert!(
        frame_lines.len() >= 3,
        "expected at least 3 frames, got:\n{stdout}"
    );
}

#[test]
fn test_all_threads_capture_succeeds() {
    let output = stackscope().arg("--all-threads").output().expect("run stackscope");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("contributor"), "missing banner:\n{stdout}");
}

#[test]
fn test_pack_then_decode_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let packed = dir.path().join("stacks.bin");

    let capture = stackscope()
        .args(["--quiet", "--pack"])
        .arg(&packed)
        .output()
        .expect("run capture");
    assert!(capture.status.success(), "stderr: {}", String::from_utf8_lossy(&capture.stderr));
    assert!(packed.is_file());

    // A fresh process with no shared address space decodes the same text.
    let decode = stackscope().arg("--decode").arg(&packed).output().expect("run decode");
    assert!(decode.status.success(), "stderr: {}", String::from_utf8_lossy(&decode.stderr));

    assert_eq!(
        String::from_utf8_lossy(&capture.stdout),
        String::from_utf8_lossy(&decode.stdout),
        "decoded rendering differs from the capturing process's rendering"
    );
}

#[test]
fn test_export_writes_json_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let json = dir.path().join("stacks.json");

    let output = stackscope()
        .args(["--quiet", "--export"])
        .arg(&json)
        .output()
        .expect("run capture");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).expect("read json")).expect("parse");
    assert_eq!(value["version"], 1);
    assert_eq!(value["stack"]["contributors"], 1);
}
