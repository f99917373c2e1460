//! Integration test: a process that outlives its deadline is reported as timed out and
//! neither it nor its descendants survive the call. Linux only (reads /proc).
#![cfg(target_os = "linux")]

use hlf_controller::command::Invocation;
use hlf_controller::exec::{CommandRunner, ExitState, ProcessRunner};
use std::time::{Duration, Instant};

/// True while `pid` is a live (non-zombie) process.
fn alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // state is the field after the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .map(|state| state != "Z" && state != "X")
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[tokio::test]
async fn timed_out_process_group_is_gone() {
    let runner = ProcessRunner::new(64 * 1024, Duration::from_millis(500));
    // background child plus a foreground sleep; both belong to the spawned group
    let inv = Invocation {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            "sleep 60 & echo bg=$!; echo fg=$$; sleep 60".to_string(),
        ],
    };

    let started = Instant::now();
    let result = runner.run(&inv, Duration::from_secs(1)).await.expect("spawn sh");
    assert_eq!(
        result.exit,
        ExitState::TimedOut {
            after: Duration::from_secs(1)
        }
    );
    assert!(started.elapsed() < Duration::from_secs(10));

    let pids: Vec<u32> = result
        .output
        .lines()
        .filter_map(|l| l.split_once('=').and_then(|(_, p)| p.trim().parse().ok()))
        .collect();
    assert_eq!(pids.len(), 2, "output: {:?}", result.output);

    // reparented orphans may take a moment to be reaped; only liveness matters
    for pid in pids {
        let mut gone = false;
        for _ in 0..40 {
            if !alive(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "pid {} still running after timeout", pid);
    }
}

#[tokio::test]
async fn fast_process_is_not_affected_by_deadline() {
    let runner = ProcessRunner::default();
    let inv = Invocation {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), "printf 'Chaincode is installed'; exit 1".to_string()],
    };
    let result = runner.run(&inv, Duration::from_secs(5)).await.expect("spawn sh");
    assert!(matches!(result.exit, ExitState::Failed { code: Some(1), .. }));
    assert_eq!(result.output, "Chaincode is installed");
    assert!(hlf_controller::outcome::classify(&result.exit, &result.output).is_success());
}
