use super::*;

#[test]
fn captures_stdout_and_exit_code() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "echo hello; exit 3"]);

    let out = run_with_deadline(&mut cmd, Duration::from_secs(5), || false)
        .unwrap();

    assert_eq!(out.exit, ProcessExit::Exited(Some(3)));
    assert_eq!(out.stdout, "hello\n");
}

#[test]
fn kills_process_after_deadline() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");

    let started = Instant::now();
    let out = run_with_deadline(&mut cmd, Duration::from_millis(200), || {
        false
    })
    .unwrap();

    assert_eq!(out.exit, ProcessExit::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn kills_process_when_aborted() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");

    let started = Instant::now();
    let out = run_with_deadline(&mut cmd, Duration::from_secs(10), || {
        started.elapsed() > Duration::from_millis(100)
    })
    .unwrap();

    assert_eq!(out.exit, ProcessExit::Aborted);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn returns_invocation_error_for_missing_program() {
    let mut cmd = Command::new("definitely-not-a-real-binary-r-nettools");

    let res = run_with_deadline(&mut cmd, Duration::from_secs(1), || false);

    match res {
        Err(NetToolsError::ProcessInvocation { program, .. }) => {
            assert_eq!(program, "definitely-not-a-real-binary-r-nettools");
        }
        other => panic!("expected invocation error, got {:?}", other),
    }
}
