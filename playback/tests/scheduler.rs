use std::time::Duration;

use playback::{PlaybackError, PlaybackEvent, PlaybackScheduler, SchedulerConfig};
use tts::{CancelFlag, MissingReason, RunStatus, SegmentStore};

mod common;
use common::{drain, ready_store, scheduler, segment, wait_started};

#[tokio::test]
async fn segments_play_back_to_back_without_overlap() {
    let (player, output) = scheduler(SchedulerConfig::default());
    let store = ready_store(&[0.05, 0.03, 0.04]);
    player.attach(store.clone(), CancelFlag::new());

    player.play_from(0).await.unwrap();
    let state = player.wait_idle().await;
    assert!(state.ended);
    assert_eq!(state.active_index, None);

    let schedule = output.schedule();
    let indices: Vec<_> = schedule.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    for pair in schedule.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(b.start_at >= a.start_at);
        assert!(
            b.start_at + 1e-9 >= a.start_at + a.duration / f64::from(a.rate),
            "{b:?} overlaps {a:?}"
        );
    }
    assert!(schedule.iter().all(|e| e.ended_at.is_some()));
    assert_eq!(output.peak_concurrency(), 1);
    assert_eq!(output.active_sources(), 0);
}

#[tokio::test]
async fn waits_for_segments_still_being_synthesized() {
    let (player, output) = scheduler(SchedulerConfig::default());
    let store = SegmentStore::new(2);
    player.attach(store.clone(), CancelFlag::new());
    player.play_from(0).await.unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(output.schedule().is_empty());
    assert_eq!(player.state().active_index, Some(0));

    for index in 0..2 {
        store.begin(index);
        store.complete(segment(index, 0.02));
    }
    store.finish(RunStatus::Completed);

    assert!(player.wait_idle().await.ended);
    assert_eq!(output.schedule().len(), 2);
}

#[tokio::test]
async fn failed_segment_is_skipped() {
    let (player, output) = scheduler(SchedulerConfig::default());
    let mut events = player.subscribe();
    let store = SegmentStore::new(3);
    store.begin(0);
    store.complete(segment(0, 0.02));
    store.begin(1);
    store.fail(1);
    store.begin(2);
    store.complete(segment(2, 0.02));
    store.finish(RunStatus::Failed { index: 1 });
    player.attach(store, CancelFlag::new());

    player.play_from(0).await.unwrap();
    player.wait_idle().await;

    let played: Vec<_> = output.schedule().iter().map(|e| e.index).collect();
    assert_eq!(played, vec![0, 2]);
    assert!(drain(&mut events).contains(&PlaybackEvent::Skipped {
        index: 1,
        reason: MissingReason::Failed
    }));
}

#[tokio::test]
async fn timed_out_segment_is_skipped() {
    let (player, output) = scheduler(SchedulerConfig {
        ready_timeout: Duration::from_millis(30),
        ..SchedulerConfig::default()
    });
    let mut events = player.subscribe();
    let store = SegmentStore::new(2);
    store.begin(1);
    store.complete(segment(1, 0.02));
    player.attach(store, CancelFlag::new());

    player.play_from(0).await.unwrap();
    assert!(player.wait_idle().await.ended);

    let played: Vec<_> = output.schedule().iter().map(|e| e.index).collect();
    assert_eq!(played, vec![1]);
    assert!(drain(&mut events).contains(&PlaybackEvent::Skipped {
        index: 0,
        reason: MissingReason::TimedOut
    }));
}

#[tokio::test]
async fn stop_is_idempotent() {
    let (player, output) = scheduler(SchedulerConfig::default());
    let mut events = player.subscribe();
    player.attach(ready_store(&[5.0, 5.0]), CancelFlag::new());

    player.play_from(0).await.unwrap();
    wait_started(&mut events, 0).await;
    player.stop();
    player.stop();

    let state = player.state();
    assert!(!state.is_playing);
    assert!(state.cancelled);
    assert_eq!(state.active_index, None);
    assert!(!state.ended);
    assert_eq!(output.active_sources(), 0);
    assert!(output.schedule()[0].stopped_at.is_some());

    let stops = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, PlaybackEvent::Stopped { .. }))
        .count();
    assert_eq!(stops, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(output.schedule().len(), 1);
}

#[tokio::test]
async fn seek_replaces_the_sounding_segment() {
    let (player, output) = scheduler(SchedulerConfig::default());
    let mut events = player.subscribe();
    let store = ready_store(&[5.0, 5.0, 5.0]);
    player.attach(store.clone(), CancelFlag::new());

    player.play_from(0).await.unwrap();
    wait_started(&mut events, 0).await;
    player.play_from(2).await.unwrap();
    wait_started(&mut events, 2).await;

    assert_eq!(player.state().active_index, Some(2));
    let schedule = output.schedule();
    assert_eq!(schedule.len(), 2);
    assert!(schedule[0].stopped_at.is_some());
    assert_eq!(schedule[1].index, 2);
    assert_eq!(output.peak_concurrency(), 1);
    assert_eq!(store.run_status(), RunStatus::Completed);
    player.stop();
}

#[tokio::test]
async fn rate_applies_to_sounding_and_later_segments_without_touching_audio() {
    let (player, output) = scheduler(SchedulerConfig::default());
    let mut events = player.subscribe();
    let store = ready_store(&[0.4, 0.05]);
    let before = store.audio(0).unwrap();
    player.attach(store.clone(), CancelFlag::new());

    player.play_from(0).await.unwrap();
    wait_started(&mut events, 0).await;
    player.set_rate(2.0).unwrap();
    player.wait_idle().await;

    let schedule = output.schedule();
    assert_eq!(schedule[0].rate, 1.0);
    assert_eq!(schedule[1].rate, 2.0);
    assert_eq!(player.state().rate, 2.0);
    let sounded = schedule[0].ended_at.unwrap() - schedule[0].start_at;
    assert!(
        (sounded - schedule[0].duration / 2.0).abs() < 0.05,
        "first segment sounded for {sounded}s"
    );
    let after = store.audio(0).unwrap();
    assert_eq!(after.samples, before.samples);
    assert_eq!(after.sample_rate, before.sample_rate);
}

#[tokio::test]
async fn reset_lets_the_next_segment_start_at_once() {
    let (player, output) = scheduler(SchedulerConfig::default());
    let mut events = player.subscribe();
    let store = ready_store(&[0.5, 0.05]);
    player.attach(store, CancelFlag::new());

    player.play_from(0).await.unwrap();
    wait_started(&mut events, 0).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    player.reset();
    assert!(!player.is_playing());

    use playback::AudioOutput;
    let now = output.now();
    player.play_from(1).await.unwrap();
    wait_started(&mut events, 1).await;

    let schedule = output.schedule();
    let stale_end = schedule[0].start_at + schedule[0].duration;
    assert!(schedule[0].stopped_at.is_some());
    assert_eq!(schedule[1].index, 1);
    assert!(schedule[1].start_at >= now);
    assert!(schedule[1].start_at < now + 0.02, "{:?}", schedule[1]);
    assert!(schedule[1].start_at < stale_end);
    player.wait_idle().await;
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (player, _) = scheduler(SchedulerConfig::default());
    assert!(matches!(
        player.play_from(0).await,
        Err(PlaybackError::NoTimeline)
    ));
    player.attach(ready_store(&[0.01]), CancelFlag::new());
    assert!(matches!(
        player.play_from(3).await,
        Err(PlaybackError::IndexOutOfRange { index: 3, len: 1 })
    ));
    assert!(matches!(
        player.set_rate(0.0),
        Err(PlaybackError::InvalidRate(_))
    ));
    assert!(player.set_rate(f32::NAN).is_err());
}

#[tokio::test]
async fn device_starts_suspended() {
    let output = playback::ClockOutput::new();
    let player = PlaybackScheduler::new(std::sync::Arc::new(output.clone()));
    use playback::AudioOutput;
    assert!(!output.is_running());
    player.ensure_running().await.unwrap();
    assert!(output.is_running());
}
