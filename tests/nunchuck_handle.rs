use nunchuck::controller::frame::scramble;
use nunchuck::controller::{
    Callbacks, ControllerState, DeviceError, HandleState, NunchuckError, NunchuckHandle,
    NunchuckSettings,
};
use nunchuck::transport::SimulatedBus;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

type Log = Arc<Mutex<Vec<String>>>;

fn reading(button_c: bool, button_z: bool) -> ControllerState {
    ControllerState::neutral()
        .with_button_c(button_c)
        .with_button_z(button_z)
}

fn recording_callbacks(log: &Log) -> Callbacks {
    let (c_log, z_log, any_log) = (log.clone(), log.clone(), log.clone());
    Callbacks::new()
        .on_c_change(move |s| c_log.lock().push(format!("c:{}", s.button_c)))
        .on_z_change(move |s| z_log.lock().push(format!("z:{}", s.button_z)))
        .on_any_update(move |_| any_log.lock().push("any".to_string()))
}

async fn next_update(rx: &mut watch::Receiver<HandleState>) -> HandleState {
    rx.changed().await.unwrap();
    *rx.borrow_and_update()
}

#[tokio::test(start_paused = true)]
async fn decodes_a_captured_frame() {
    let bus = SimulatedBus::new();
    bus.push_raw_frame([0x20, 0x30, 0x80, 0x80, 0x80, 0x00].map(scramble));

    let handle = NunchuckHandle::spawn(Box::new(bus.clone()), None, Callbacks::new())
        .await
        .unwrap();
    let mut rx = handle.subscribe();
    next_update(&mut rx).await;

    assert_eq!(handle.stick(), Some((0x20, 0x30)));
    assert_eq!(handle.accel(), Some((0x80, 0x80, 0x80)));
    assert_eq!(handle.button_c(), Some(true));
    assert_eq!(handle.button_z(), Some(true));
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn press_hold_release_over_three_polls() {
    let bus = SimulatedBus::new();
    for state in [
        reading(false, false),
        reading(true, false),
        reading(true, false),
        reading(false, false),
    ] {
        bus.push_state(state);
    }

    let log = Log::default();
    let handle = NunchuckHandle::spawn(Box::new(bus.clone()), None, recording_callbacks(&log))
        .await
        .unwrap();
    let mut rx = handle.subscribe();

    let baseline = next_update(&mut rx).await;
    assert!(!baseline.button_c_changed);

    let mut flags = Vec::new();
    for _ in 0..3 {
        flags.push(next_update(&mut rx).await.button_c_changed);
    }
    assert_eq!(flags, vec![true, false, true]);
    assert_eq!(
        *log.lock(),
        vec!["any", "c:true", "any", "any", "c:false", "any"]
    );
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn both_edges_in_one_poll_fire_c_then_z_then_any() {
    let bus = SimulatedBus::new();
    bus.push_state(reading(false, false));
    bus.push_state(reading(true, true));

    let log = Log::default();
    let handle = NunchuckHandle::spawn(Box::new(bus.clone()), None, recording_callbacks(&log))
        .await
        .unwrap();
    let mut rx = handle.subscribe();
    next_update(&mut rx).await;
    log.lock().clear();

    let snapshot = next_update(&mut rx).await;
    assert!(snapshot.button_c_changed && snapshot.button_z_changed);
    assert_eq!(*log.lock(), vec!["c:true", "z:true", "any"]);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_poll_leaves_state_and_callbacks_alone() {
    let bus = SimulatedBus::new();
    bus.push_state(reading(false, true));

    let log = Log::default();
    let handle = NunchuckHandle::spawn(Box::new(bus.clone()), None, recording_callbacks(&log))
        .await
        .unwrap();
    let mut rx = handle.subscribe();
    let before = next_update(&mut rx).await;

    // Both the trigger write and its retry fail on the tick at 500 ms
    bus.push_state(reading(true, false));
    bus.fail_next_writes(2);
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(bus.queued_frames(), 1);

    assert!(!rx.has_changed().unwrap());
    assert_eq!(handle.snapshot(), before);
    assert_eq!(*log.lock(), vec!["any"]);

    // The loop carries on and picks the queued reading up one tick later
    let after = next_update(&mut rx).await;
    assert_eq!(after.state, Some(reading(true, false)));
    assert!(after.button_c_changed && after.button_z_changed);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn single_write_failure_is_recovered_within_the_cycle() {
    let bus = SimulatedBus::new();
    bus.push_state(reading(false, false));

    let handle = NunchuckHandle::spawn(Box::new(bus.clone()), None, Callbacks::new())
        .await
        .unwrap();
    let mut rx = handle.subscribe();
    next_update(&mut rx).await;

    bus.push_state(reading(true, false));
    bus.fail_next_writes(1);
    let snapshot = next_update(&mut rx).await;
    assert_eq!(snapshot.state, Some(reading(true, false)));
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn manual_override_goes_through_the_poll_path() {
    let bus = SimulatedBus::new();
    let mut moved = reading(false, false);
    moved.stick = (12, 240);
    moved.accel = (1, 2, 3);
    bus.push_state(moved);

    let log = Log::default();
    let settings = NunchuckSettings {
        tick_ms: 60_000,
        ..NunchuckSettings::default()
    };
    let handle =
        NunchuckHandle::spawn(Box::new(bus.clone()), Some(settings), recording_callbacks(&log))
            .await
            .unwrap();
    let mut rx = handle.subscribe();
    next_update(&mut rx).await;
    log.lock().clear();

    let snapshot = handle.fake_button_c(true).await.unwrap();
    assert!(snapshot.button_c_changed);
    assert!(!snapshot.button_z_changed);
    assert_eq!(snapshot.state, Some(moved.with_button_c(true)));
    assert_eq!(handle.snapshot(), snapshot);
    assert_eq!(*log.lock(), vec!["c:true", "any"]);

    // Same value again is not an edge
    let again = handle.fake_button_c(true).await.unwrap();
    assert!(!again.button_c_changed);

    let released = handle.fake_button_z(false).await.unwrap();
    assert!(!released.button_z_changed);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_handshake_never_yields_a_handle() {
    let bus = SimulatedBus::new();
    bus.fail_next_writes(1);

    let result = NunchuckHandle::spawn(Box::new(bus.clone()), None, Callbacks::new()).await;
    assert!(matches!(
        result,
        Err(NunchuckError::DeviceError(DeviceError::InitializationError(_)))
    ));
    // Nothing polls the bus after a failed start
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(bus.read_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn state_channel_closes_after_shutdown() {
    let bus = SimulatedBus::new();
    let handle = NunchuckHandle::spawn(Box::new(bus.clone()), None, Callbacks::new())
        .await
        .unwrap();
    let rx = handle.subscribe();
    handle.shutdown().await.unwrap();

    // The poll task is gone, so the published value no longer changes
    assert!(rx.has_changed().is_err());
}

#[tokio::test(start_paused = true)]
async fn accessors_are_empty_before_the_first_reading() {
    let bus = SimulatedBus::new();
    let settings = NunchuckSettings {
        tick_ms: 1_000,
        ..NunchuckSettings::default()
    };
    let handle = NunchuckHandle::spawn(Box::new(bus.clone()), Some(settings), Callbacks::new())
        .await
        .unwrap();

    assert_eq!(handle.state(), None);
    assert_eq!(handle.stick(), None);
    assert!(!handle.button_c_changed());
    assert!(!handle.button_z_changed());
    assert_eq!(handle.address(), 0x52);
    assert!(handle.ident().is_some());
    handle.shutdown().await.unwrap();
}
