use std::time::Duration;

use tts::{GeneratedAudio, PendingEngine, TtsError};

use mock_engine::MockEngine;

#[tokio::test]
async fn ready_engine_resolves_immediately() {
    let mut pending = PendingEngine::ready(MockEngine::new());
    assert!(matches!(pending.try_take(), Some(Ok(_))));
}

#[tokio::test]
async fn spawned_load_is_pending_until_done() {
    let (release, gate) = std::sync::mpsc::channel::<()>();
    let mut pending = PendingEngine::spawn(move || {
        gate.recv_timeout(Duration::from_secs(5))?;
        Ok(MockEngine::new())
    });
    assert!(pending.try_take().is_none());

    release.send(()).unwrap();
    let handle = pending.wait().await;
    assert!(handle.is_ok());
}

#[tokio::test]
async fn load_failure_is_reported() {
    let pending = PendingEngine::spawn(|| -> anyhow::Result<MockEngine> {
        anyhow::bail!("model file missing")
    });
    let err = pending.wait().await.unwrap_err();
    assert!(matches!(err, TtsError::EngineLoad(_)));
    assert!(std::error::Error::source(&err)
        .unwrap()
        .to_string()
        .contains("model file missing"));
}

#[tokio::test]
async fn closures_are_engines() {
    let pending = PendingEngine::ready(|text: &str, _: u32, _: f32| -> anyhow::Result<GeneratedAudio> {
        Ok(GeneratedAudio {
            samples: vec![0.0; text.len()],
            sample_rate: 16_000,
        })
    });
    assert!(pending.wait().await.is_ok());
}
