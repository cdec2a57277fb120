//! End-to-end tests for the playback synchronization core
//!
//! Exercises the session layer the way connected devices would: device
//! registration, active-device selection, command relay, state sync
//! fan-out, and disconnect handling, all against a shared registry and
//! in-memory state store.

mod common;

use assert_matches::assert_matches;
use common::SyncHarness;
use unison_protocol::{ClientMessage, DeviceClass, ServerMessage};
use unison_test_utils::PlaybackStateBuilder;

#[tokio::test]
async fn test_first_device_becomes_active_without_selection() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();

    let a_id = a.register("Web Tab", DeviceClass::Web).await;

    assert_eq!(harness.manager.active_device(harness.user_id), Some(a_id));
}

#[tokio::test]
async fn test_active_pointer_names_a_registered_device() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();
    let mut b = harness.connect();
    let mut c = harness.connect();

    let a_id = a.register("A", DeviceClass::Web).await;
    b.register("B", DeviceClass::Mobile).await;
    c.register("C", DeviceClass::Desktop).await;

    let active = harness.manager.active_device(harness.user_id).unwrap();
    assert_eq!(active, a_id);
    let devices = harness.manager.list_devices(harness.user_id);
    assert_eq!(devices.len(), 3);
    assert!(devices.iter().any(|d| d.device_id == active));
}

#[tokio::test]
async fn test_select_active_device_is_idempotent() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();
    let mut b = harness.connect();

    a.register("A", DeviceClass::Web).await;
    let b_id = b.register("B", DeviceClass::Mobile).await;
    a.drain();
    b.drain();

    for _ in 0..2 {
        a.send(ClientMessage::SelectActiveDevice {
            device_id: b_id.clone(),
        })
        .await;
    }

    assert_eq!(
        harness.manager.active_device(harness.user_id),
        Some(b_id.clone())
    );
    // Every broadcast named the same device; no other observable change
    for msg in a.drain() {
        assert_matches!(
            msg,
            ServerMessage::ActiveDeviceChanged { active_device_id } if active_device_id == b_id
        );
    }
}

#[tokio::test]
async fn test_disconnect_twice_is_noop_second_time() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();
    let mut b = harness.connect();

    a.register("A", DeviceClass::Web).await;
    b.register("B", DeviceClass::Mobile).await;
    a.drain();
    b.drain();

    a.disconnect();
    assert_eq!(b.drain().len(), 1);

    a.disconnect();
    assert!(b.drain().is_empty());
    assert_eq!(harness.manager.device_count(harness.user_id), 1);
}

#[tokio::test]
async fn test_sync_state_never_echoes_to_origin() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();
    let mut b = harness.connect();
    let mut c = harness.connect();

    a.register("A", DeviceClass::Web).await;
    b.register("B", DeviceClass::Mobile).await;
    c.register("C", DeviceClass::Desktop).await;
    a.drain();
    b.drain();
    c.drain();

    a.send(ClientMessage::SyncPlaybackState(
        PlaybackStateBuilder::new().playing("song-7").build(),
    ))
    .await;

    assert!(a.drain().is_empty(), "origin received its own echo");
    for device in [&mut b, &mut c] {
        let msgs = device.drain();
        assert_eq!(msgs.len(), 1);
        assert_matches!(
            &msgs[0],
            ServerMessage::PlaybackStateUpdated(s)
                if s.current_song_id.as_deref() == Some("song-7")
        );
    }
}

#[tokio::test]
async fn test_play_with_no_devices_is_silent() {
    let harness = SyncHarness::new();
    let mut caller = harness.connect();

    caller.send(ClientMessage::Play).await;

    // No push of any kind, in particular no error
    assert!(caller.drain().is_empty());
    assert!(!harness.store.get_state(harness.user_id).await.is_playing);
}

#[tokio::test]
async fn test_play_song_from_non_active_device_is_dropped() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();
    let mut b = harness.connect();

    a.register("A", DeviceClass::Web).await;
    b.register("B", DeviceClass::Mobile).await;
    a.drain();
    b.drain();

    b.send(ClientMessage::PlaySong {
        song_id: "song-42".to_string(),
        start_time_secs: 0.0,
    })
    .await;

    // Nothing is delivered and the stored state is untouched
    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());
    let state = harness.store.get_state(harness.user_id).await;
    assert!(state.current_song_id.is_none());
    assert_eq!(state.last_updated, 0);
}

#[tokio::test]
async fn test_set_volume_from_active_device_persists() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();

    a.register("A", DeviceClass::Web).await;
    a.drain();

    a.send(ClientMessage::SetVolume { volume: 30 }).await;

    // No push anywhere: the only device is the caller itself
    assert!(a.drain().is_empty());
    assert_eq!(harness.store.get_state(harness.user_id).await.volume, 30);

    // A newly connecting device reads the stored volume
    let mut late = harness.connect();
    late.register("Late", DeviceClass::Mobile).await;
    late.drain();
    late.send(ClientMessage::GetPlaybackState).await;
    let msgs = late.drain();
    assert_matches!(&msgs[0], ServerMessage::PlaybackStateUpdated(s) if s.volume == 30);
}

#[tokio::test]
async fn test_late_joiner_observes_state_without_live_push() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();

    let a_id = a.register("A", DeviceClass::Web).await;
    a.drain();
    a.send(ClientMessage::SyncPlaybackState(
        PlaybackStateBuilder::new().playing("s1").position(10.0).build(),
    ))
    .await;

    let mut b = harness.connect();
    b.register("B", DeviceClass::Mobile).await;
    b.drain();

    b.send(ClientMessage::GetConnectedDevices).await;
    b.send(ClientMessage::GetPlaybackState).await;

    let msgs = b.drain();
    assert_eq!(msgs.len(), 2);
    assert_matches!(
        &msgs[0],
        ServerMessage::DeviceList(p)
            if p.active_device_id.as_deref() == Some(a_id.as_str()) && p.devices.len() == 2
    );
    assert_matches!(
        &msgs[1],
        ServerMessage::PlaybackStateUpdated(s)
            if s.current_song_id.as_deref() == Some("s1") && s.position_secs == 10.0
    );
}

#[tokio::test]
async fn test_active_disconnect_leaves_stale_pointer_and_relay_noops() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();
    let mut b = harness.connect();

    let a_id = a.register("A", DeviceClass::Web).await;
    b.register("B", DeviceClass::Mobile).await;
    a.drain();
    b.drain();

    a.disconnect();
    b.drain();

    // The pointer still names the departed device
    assert_eq!(harness.manager.active_device(harness.user_id), Some(a_id));

    // Relay treats the stale pointer as "no active device"
    b.send(ClientMessage::Play).await;
    assert!(b.drain().is_empty());
    assert!(!harness.store.get_state(harness.user_id).await.is_playing);
}

#[tokio::test]
async fn test_next_from_active_is_pure_relay() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();

    a.register("A", DeviceClass::Web).await;
    a.drain();

    a.send(ClientMessage::SyncPlaybackState(
        PlaybackStateBuilder::new()
            .playing("s1")
            .queue(&["s2", "s3"])
            .build(),
    ))
    .await;
    let before = harness.store.get_state(harness.user_id).await;

    a.send(ClientMessage::Next).await;

    // The server does not advance the queue; the client publishes the result
    let after = harness.store.get_state(harness.user_id).await;
    assert_eq!(after, before);

    a.send(ClientMessage::SyncPlaybackState(
        PlaybackStateBuilder::new().playing("s2").queue(&["s3"]).build(),
    ))
    .await;
    let published = harness.store.get_state(harness.user_id).await;
    assert_eq!(published.current_song_id.as_deref(), Some("s2"));
    assert_eq!(published.queue, vec!["s3".to_string()]);
}

#[tokio::test]
async fn test_malformed_device_id_errors_only_to_caller() {
    let harness = SyncHarness::new();
    let mut a = harness.connect();
    let mut b = harness.connect();

    a.register("A", DeviceClass::Web).await;
    b.register("B", DeviceClass::Mobile).await;
    a.drain();
    b.drain();

    b.send(ClientMessage::SelectActiveDevice {
        device_id: "no spaces allowed".to_string(),
    })
    .await;

    let msgs = b.drain();
    assert_eq!(msgs.len(), 1);
    assert_matches!(&msgs[0], ServerMessage::Error(e) if e.code == "INVALID_DEVICE_ID");
    assert!(a.drain().is_empty());
}
