use tokio::sync::broadcast;
use tts::{
    CancelFlag, EngineHandle, GeneratedAudio, RunOutcome, RunStatus, SynthesisDriver,
    SynthesisEvent, SynthesisState, TtsError,
};

use mock_engine::{MockEngine, RATE, segments};

fn drain(rx: &mut broadcast::Receiver<SynthesisEvent>) -> Vec<SynthesisEvent> {
    let mut events = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        events.push(evt);
    }
    events
}

fn ready_indices(events: &[SynthesisEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            SynthesisEvent::SegmentReady { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn ready_events_follow_index_order() {
    let engine = MockEngine::new();
    let driver = SynthesisDriver::new(EngineHandle::new(engine.clone()), 3);
    let mut rx = driver.subscribe();
    let segs = segments(&["one.", "two two.", "three three three.", "four."]);

    let run = driver.start(segs.clone(), CancelFlag::new());
    let store = run.store().clone();
    let outcome = run.join().await.unwrap();

    assert_eq!(outcome, RunOutcome::Completed { segments: 4 });
    let events = drain(&mut rx);
    assert_eq!(ready_indices(&events), vec![0, 1, 2, 3]);
    assert_eq!(events.first(), Some(&SynthesisEvent::Started { total: 4 }));
    assert_eq!(events.last(), Some(&SynthesisEvent::Finished { total: 4 }));
    assert_eq!(store.run_status(), RunStatus::Completed);
    assert!(store.states().iter().all(|s| *s == SynthesisState::Ready));

    for seg in &segs {
        let audio = store.audio(seg.index).unwrap();
        assert_eq!(audio.index, seg.index);
        assert_eq!(audio.sample_rate, RATE);
        assert_eq!(audio.samples.len(), seg.char_len() * 10);
    }
    let texts: Vec<_> = engine.calls().into_iter().map(|c| c.text).collect();
    assert_eq!(texts, vec!["one.", "two two.", "three three three.", "four."]);
}

#[tokio::test]
async fn engine_always_runs_at_nominal_speed() {
    let engine = MockEngine::new();
    let driver = SynthesisDriver::new(EngineHandle::new(engine.clone()), 7);
    driver
        .start(segments(&["a.", "b."]), CancelFlag::new())
        .join()
        .await
        .unwrap();
    for call in engine.calls() {
        assert_eq!(call.speed, 1.0);
        assert_eq!(call.speaker_id, 7);
    }
}

#[tokio::test]
async fn failure_stops_the_run() {
    let engine = MockEngine::failing_on("bad");
    let driver = SynthesisDriver::new(EngineHandle::new(engine.clone()), 0);
    let mut rx = driver.subscribe();

    let run = driver.start(segments(&["good.", "bad.", "never."]), CancelFlag::new());
    let store = run.store().clone();
    let err = run.join().await.unwrap_err();

    assert!(matches!(err, TtsError::SegmentSynthesis { index: 1, .. }));
    let events = drain(&mut rx);
    assert_eq!(ready_indices(&events), vec![0]);
    assert!(matches!(
        events.last(),
        Some(SynthesisEvent::Failed { index: 1, total: 3, .. })
    ));
    assert_eq!(
        store.states(),
        vec![
            SynthesisState::Ready,
            SynthesisState::Failed,
            SynthesisState::Pending
        ]
    );
    assert_eq!(store.run_status(), RunStatus::Failed { index: 1 });
    assert!(store.audio(0).is_some());
    assert_eq!(engine.calls().len(), 2);
}

#[tokio::test]
async fn null_result_counts_as_failure() {
    let engine = MockEngine {
        null_on: Some("empty".into()),
        ..MockEngine::default()
    };
    let driver = SynthesisDriver::new(EngineHandle::new(engine), 0);
    let run = driver.start(segments(&["empty."]), CancelFlag::new());
    let store = run.store().clone();
    let err = run.join().await.unwrap_err();
    assert!(matches!(err, TtsError::SegmentSynthesis { index: 0, .. }));
    assert_eq!(store.state(0), Some(SynthesisState::Failed));
}

#[tokio::test]
async fn panicking_engine_is_a_segment_failure() {
    let engine = |text: &str, _: u32, _: f32| -> anyhow::Result<GeneratedAudio> {
        if text == "boom." {
            panic!("engine crashed");
        }
        Ok(GeneratedAudio {
            samples: vec![0.0; 10],
            sample_rate: RATE,
        })
    };
    let driver = SynthesisDriver::new(EngineHandle::new(engine), 0);
    let run = driver.start(segments(&["fine.", "boom.", "later."]), CancelFlag::new());
    let store = run.store().clone();
    let err = run.join().await.unwrap_err();
    assert!(matches!(err, TtsError::SegmentSynthesis { index: 1, .. }));
    assert_eq!(store.state(2), Some(SynthesisState::Pending));
}

#[tokio::test]
async fn cancel_before_start_synthesizes_nothing() {
    let engine = MockEngine::new();
    let driver = SynthesisDriver::new(EngineHandle::new(engine.clone()), 0);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let run = driver.start(segments(&["a.", "b."]), cancel);
    let store = run.store().clone();
    assert_eq!(
        run.join().await.unwrap(),
        RunOutcome::Cancelled { completed: 0 }
    );
    assert!(engine.calls().is_empty());
    assert_eq!(store.run_status(), RunStatus::Cancelled);
    assert!(store.states().iter().all(|s| *s == SynthesisState::Pending));
}

#[tokio::test]
async fn cancel_between_segments_keeps_finished_audio() {
    let engine = MockEngine::new();
    let driver = SynthesisDriver::new(EngineHandle::new(engine.clone()), 0);
    let mut rx = driver.subscribe();
    let cancel = CancelFlag::new();

    let run = driver.start(segments(&["first.", "second.", "third."]), cancel.clone());
    loop {
        match rx.recv().await.unwrap() {
            SynthesisEvent::SegmentReady { index: 0, .. } => break,
            _ => continue,
        }
    }
    cancel.cancel();

    let store = run.store().clone();
    assert_eq!(
        run.join().await.unwrap(),
        RunOutcome::Cancelled { completed: 1 }
    );
    let rest = drain(&mut rx);
    assert!(ready_indices(&rest).is_empty());
    assert!(matches!(
        rest.last(),
        Some(SynthesisEvent::Cancelled { completed: 1, total: 3 })
    ));
    assert_eq!(engine.calls().len(), 1);
    assert_eq!(store.state(0), Some(SynthesisState::Ready));
    assert_eq!(store.state(1), Some(SynthesisState::Pending));
    assert_eq!(store.state(2), Some(SynthesisState::Pending));
    assert_eq!(store.audio(0).unwrap().samples.len(), 60);
}

#[tokio::test]
async fn in_flight_result_is_discarded_after_cancel() {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    let engine = move |text: &str, _: u32, _: f32| -> anyhow::Result<GeneratedAudio> {
        if text == "slow." {
            flag.cancel();
        }
        Ok(GeneratedAudio {
            samples: vec![0.0; 10],
            sample_rate: RATE,
        })
    };
    let driver = SynthesisDriver::new(EngineHandle::new(engine), 0);
    let mut rx = driver.subscribe();

    let run = driver.start(segments(&["fast.", "slow.", "never."]), cancel);
    let store = run.store().clone();
    assert_eq!(
        run.join().await.unwrap(),
        RunOutcome::Cancelled { completed: 1 }
    );
    assert_eq!(ready_indices(&drain(&mut rx)), vec![0]);
    assert_eq!(store.state(1), Some(SynthesisState::Generating));
    assert!(store.audio(1).is_none());
    assert_eq!(store.run_status(), RunStatus::Cancelled);
}

#[tokio::test]
async fn runs_share_the_engine_sequentially() {
    let engine = MockEngine::new();
    let driver = SynthesisDriver::new(EngineHandle::new(engine.clone()), 0);
    let first = driver.start(segments(&["a.", "b."]), CancelFlag::new());
    let second = driver.start(segments(&["c.", "d."]), CancelFlag::new());
    first.join().await.unwrap();
    second.join().await.unwrap();

    let texts: Vec<_> = engine.calls().into_iter().map(|c| c.text).collect();
    let first_pos = texts.iter().position(|t| t == "a.").unwrap();
    assert_eq!(&texts[first_pos..first_pos + 2], &["a.", "b."]);
    assert_eq!(texts.len(), 4);
}
