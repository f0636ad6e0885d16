use std::process::Command;

fn run_demo(mode: &str) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_stackscope"))
        .args(["--demo", mode])
        .output()
        .expect("run stackscope demo")
}

#[test]
fn test_abort_terminates_abnormally_with_one_report() {
    let output = run_demo("abort");
    assert!(!output.status.success(), "abort demo exited cleanly");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.matches("Program abort called").count(),
        1,
        "expected exactly one report, stderr:\n{stderr}"
    );
    assert!(stderr.contains("abort demo requested"));
    assert!(stderr.contains("Memory in use:"));
    assert!(stderr.contains("Call stack:"));
}

#[test]
fn test_concurrent_aborts_emit_exactly_one_report() {
    let output = run_demo("abort-concurrent");
    assert!(!output.status.success(), "concurrent abort demo exited cleanly");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.matches("Program abort called").count(),
        1,
        "second entrant must go straight to termination, stderr:\n{stderr}"
    );
    assert!(stderr.contains("concurrent abort from thread"));
}

#[test]
fn test_group_abort_invokes_hook_after_report() {
    let output = run_demo("group-abort");
    assert!(!output.status.success(), "group abort demo exited cleanly");

    let stderr = String::from_utf8_lossy(&output.stderr);
    let report_at = stderr.find("Program abort called").expect("report missing");
    let hook_at = stderr.find("[group] abort broadcast").expect("group hook not invoked");
    assert!(report_at < hook_at, "report must be flushed before the group is killed");
}

#[test]
fn test_fatal_signal_is_reported_by_name() {
    let output = run_demo("segfault");
    assert!(!output.status.success(), "segfault demo exited cleanly");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SIGSEGV"), "signal not named, stderr:\n{stderr}");
    assert!(stderr.contains("Call stack:"));
}
