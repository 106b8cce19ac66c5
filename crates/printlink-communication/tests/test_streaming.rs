mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{
    document, fast_config, online_host, payloads, wait_until, FakeController, Recorder,
};
use printlink_communication::protocol::{frame, verify};
use printlink_communication::TransportKind;
use printlink_core::{JobPhase, PrintEvent};

fn resets(written: &[String]) -> usize {
    payloads(written).iter().filter(|p| *p == "M110").count()
}

#[test]
fn test_job_streams_numbered_frames() {
    let fake = FakeController::acking();
    let host = online_host(&fake, fast_config());
    let recorder = Recorder::attach(&host);
    let doc = document(&[
        "G28",
        "G1 Z0.2 F1200",
        "G1 X10 E1",
        "; second layer",
        "G1 Z0.4",
        "G1 X20 E2",
    ]);

    host.start_print(doc.clone(), 0).unwrap();
    assert!(wait_until(|| resets(&fake.written()) == 2));
    assert_eq!(host.phase(), JobPhase::Idle);

    let written: Vec<String> = fake
        .written()
        .into_iter()
        .filter(|line| line != "M105")
        .collect();
    assert_eq!(
        payloads(&written),
        vec!["M110", "G28", "G1 Z0.2 F1200", "G1 X10 E1", "G1 Z0.4", "G1 X20 E2", "M110"]
    );
    assert!(written.iter().all(|line| verify(line)));
    assert!(written[0].starts_with("N-1 M110*"));
    assert_eq!(written[1], frame(0, "G28"));
    assert_eq!(written[5], frame(4, "G1 X20 E2"));
    assert!(written[6].starts_with("N-1 M110*"));

    let expected: Vec<usize> = (0..doc.layer_count()).collect();
    assert_eq!(recorder.layers(), expected);
    assert_eq!(*recorder.starts.lock().unwrap(), vec![false]);
    assert!(wait_until(|| recorder.ends() == 1));
    assert!(wait_until(|| recorder.sent.lock().unwrap().len() == 7));

    host.disconnect().unwrap();
}

#[test]
fn test_resend_replays_identical_frame() {
    let mut asked = false;
    let fake = FakeController::with_responder(move |line| {
        if !asked && line.starts_with("N5 ") {
            asked = true;
            vec!["rs 5".to_string()]
        } else {
            vec!["ok".to_string()]
        }
    });
    fake.push_line("start");
    let host = online_host(&fake, fast_config());

    let doc = document(&["G1 X1", "G1 X2", "G1 X3", "G1 X4", "G1 X5", "G1 X10", "G1 X11"]);
    host.start_print(doc, 0).unwrap();
    assert!(wait_until(|| resets(&fake.written()) == 2));

    let written = fake.written();
    let n5 = frame(5, "G1 X10");
    let first = written.iter().position(|l| *l == n5).unwrap();
    assert_eq!(written[first + 1], n5);
    assert_eq!(written[first + 2], frame(6, "G1 X11"));
    assert_eq!(written.iter().filter(|l| **l == n5).count(), 2);

    host.disconnect().unwrap();
}

#[test]
fn test_unacknowledged_line_blocks_the_next() {
    let fake = FakeController::mute(TransportKind::Serial);
    let host = online_host(&fake, fast_config());

    host.start_print(document(&["G28", "G1 X1"]), 0).unwrap();
    assert!(wait_until(|| resets(&fake.written()) == 1));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(payloads(&fake.written()), vec!["M110"]);

    fake.push_line("ok");
    assert!(wait_until(|| payloads(&fake.written()).len() == 2));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(payloads(&fake.written()), vec!["M110", "G28"]);

    host.disconnect().unwrap();
}

#[test]
fn test_tcp_streaming_skips_acknowledgements() {
    let fake = FakeController::mute(TransportKind::Tcp);
    let mut config = fast_config();
    config.tcp_streaming = true;
    let host = online_host(&fake, config);

    host.start_print(document(&["G28", "G1 X1", "G1 X2"]), 0).unwrap();
    assert!(wait_until(|| resets(&fake.written()) == 2));
    assert_eq!(
        payloads(&fake.written()),
        vec!["M110", "G28", "G1 X1", "G1 X2", "M110"]
    );
    host.disconnect().unwrap();
}

#[test]
fn test_priority_commands_and_temperature_events() {
    let fake = FakeController::with_responder(|line| {
        if line == "M105" {
            vec!["ok T:200.0 /200.0 B:60.0 /60.0".to_string()]
        } else {
            vec!["ok".to_string()]
        }
    });
    fake.push_line("start");
    let host = online_host(&fake, fast_config());
    let mut events = host.subscribe();

    host.send_now("M104 S200").unwrap();
    host.send_now("M105").unwrap();
    assert!(wait_until(|| fake.written().iter().filter(|l| *l == "M105").count() == 2));

    let written = fake.written();
    let bare = written.iter().position(|l| l == "M104 S200").unwrap();
    assert_eq!(written[bare + 1], "M105");
    assert!(wait_until(|| matches!(
        events.try_recv(),
        Ok(PrintEvent::Temperature(_))
    )));

    host.disconnect().unwrap();
}

#[test]
fn test_directive_runs_registered_handler() {
    let fake = FakeController::acking();
    let host = online_host(&fake, fast_config());
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        host.register_directive("beep", move |_, args| {
            seen.lock().unwrap().push(args.to_string())
        });
    }

    host.start_print(document(&["G28", ";@BEEP 3 times", ";@unknown", "G1 X1"]), 0)
        .unwrap();
    assert!(wait_until(|| resets(&fake.written()) == 2));

    assert_eq!(*seen.lock().unwrap(), vec!["3 times".to_string()]);
    assert_eq!(
        payloads(&fake.written()),
        vec!["M110", "G28", "G1 X1", "M110"]
    );

    host.send_now(";@beep now").unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);
    host.disconnect().unwrap();
}

#[test]
fn test_cancel_stops_streaming() {
    let fake = FakeController::mute(TransportKind::Serial);
    let host = online_host(&fake, fast_config());
    let recorder = Recorder::attach(&host);

    host.start_print(document(&["G28", "G1 X1", "G1 X2"]), 0).unwrap();
    assert!(wait_until(|| resets(&fake.written()) == 1));

    host.cancel().unwrap();
    assert_eq!(host.phase(), JobPhase::Idle);
    assert_eq!(recorder.ends(), 1);

    // Credit returns with the ack; the sender then emits the pending reset
    fake.push_line("ok");
    assert!(wait_until(|| resets(&fake.written()) == 2));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(payloads(&fake.written()), vec!["M110", "M110"]);
    assert!(host.cancel().is_err());

    host.disconnect().unwrap();
}

#[test]
fn test_progress_tracks_queue() {
    let fake = FakeController::mute(TransportKind::Serial);
    let host = online_host(&fake, fast_config());

    host.start_print(document(&["G28", "G1 X1", "G1 X2", "G1 X3"]), 0)
        .unwrap();
    assert!(wait_until(|| resets(&fake.written()) == 1));
    fake.push_line("ok");
    assert!(wait_until(|| host.progress().queue_index == 1));

    let progress = host.progress();
    assert_eq!(progress.phase, JobPhase::Printing);
    assert_eq!(progress.total, 4);
    assert!((progress.fraction - 0.25).abs() < 1e-9);
    assert!(progress.started_at.is_some());

    host.cancel().unwrap();
    host.disconnect().unwrap();
}
