mod common;

use common::{document, fast_config, online_host, payloads, wait_until, FakeController, Recorder, WAIT};
use printlink_communication::TransportKind;
use printlink_core::{Error, JobError, JobPhase};

#[test]
fn test_write_failures_leave_a_recoverable_job() {
    let fake = FakeController::acking();
    fake.fail_from(|line| line.contains("G1 X2"));
    let host = online_host(&fake, fast_config());
    let recorder = Recorder::attach(&host);

    let doc = document(&["G1 Z0.4", "G1 X1", "G1 X2", "G1 X3"]);
    host.start_print(doc, 0).unwrap();

    assert!(wait_until(|| recorder.disconnects() == 1));
    assert_eq!(host.phase(), JobPhase::Recoverable);
    assert!(!host.is_connected());
    assert_eq!(
        payloads(&fake.written()),
        vec!["M110", "G1 Z0.4", "G1 X1"]
    );
    assert!(recorder.errors()[0].contains("4 consecutive write failures"));

    let snapshot = host.recovery_snapshot().unwrap();
    assert_eq!(snapshot.queue_index, 2);
    assert_eq!(snapshot.z, 0.4);
    assert_eq!(host.progress().queue_index, 2);

    let replacement = FakeController::acking();
    host.connect_with(replacement.clone()).unwrap();
    assert!(host.wait_online(WAIT));
    host.recover().unwrap();
    assert!(wait_until(|| host.phase() == JobPhase::Idle
        && payloads(&replacement.written()).len() == 6));
    assert_eq!(
        payloads(&replacement.written()),
        vec!["M110", "G92 Z0.4", "G28 X Y", "G1 X2", "G1 X3", "M110"]
    );
    assert_eq!(*recorder.starts.lock().unwrap(), vec![false, true]);

    host.disconnect().unwrap();
}

#[test]
fn test_peer_hangup_leaves_a_recoverable_job() {
    let fake = FakeController::mute(TransportKind::Serial);
    let host = online_host(&fake, fast_config());
    let recorder = Recorder::attach(&host);

    host.start_print(document(&["G28", "G1 X1"]), 0).unwrap();
    assert!(wait_until(|| !payloads(&fake.written()).is_empty()));
    fake.hang_up();

    assert!(wait_until(|| recorder.disconnects() == 1));
    assert_eq!(host.phase(), JobPhase::Recoverable);
    assert_eq!(host.recovery_snapshot().unwrap().queue_index, 0);
    assert!(!host.is_online());
    assert_eq!(recorder.errors().len(), 1);
    assert!(fake.is_closed());
}

#[test]
fn test_disconnect_during_print_is_recoverable() {
    let fake = FakeController::mute(TransportKind::Serial);
    let host = online_host(&fake, fast_config());
    let recorder = Recorder::attach(&host);

    host.start_print(document(&["G28", "G1 X1"]), 0).unwrap();
    assert!(wait_until(|| !payloads(&fake.written()).is_empty()));
    host.disconnect().unwrap();

    assert_eq!(host.phase(), JobPhase::Recoverable);
    assert_eq!(recorder.ends(), 1);
    assert_eq!(recorder.disconnects(), 1);
    assert!(recorder.errors().is_empty());

    // Abandoning the interrupted job drops its snapshot
    host.cancel().unwrap();
    assert_eq!(host.phase(), JobPhase::Idle);
    assert!(host.recovery_snapshot().is_none());
}

#[test]
fn test_recover_without_snapshot_fails() {
    let fake = FakeController::acking();
    let host = online_host(&fake, fast_config());

    assert!(matches!(
        host.recover(),
        Err(Error::Job(JobError::NothingToRecover))
    ));
    host.disconnect().unwrap();
    assert_eq!(host.phase(), JobPhase::Idle);
}
