//! Load: direct replacement, crossfade, gapless idempotence, failures

mod helpers;

use cadenza_common::config::EngineSettings;
use cadenza_common::events::{EngineEvent, EngineState, FadeDirection, TrackChangeKind};
use cadenza_engine::pipeline::{PipelineEvent, PipelineEventKind};
use cadenza_engine::Error;
use helpers::{crossfade_settings, url, TestEngine};

#[test]
fn test_load_without_crossfade_releases_previous_pipeline() {
    let mut t = TestEngine::new(EngineSettings::default());

    t.engine
        .load(&url("http://example.com/a.ogg"), TrackChangeKind::Manual)
        .unwrap();
    let a = t.engine.current_pipeline_id().unwrap();
    assert_eq!(t.pipelines.live(), vec![a]);

    t.engine
        .load(&url("http://example.com/b.ogg"), TrackChangeKind::Manual)
        .unwrap();
    let b = t.engine.current_pipeline_id().unwrap();

    assert_ne!(a, b);
    assert!(t.pipelines.is_released(a));
    assert_eq!(t.pipelines.live(), vec![b]);
    assert!(t.engine.fadeout_pipeline_id().is_none());
    assert!(t.pipelines.record(b).faders.is_empty());
    assert_eq!(t.engine.state(), EngineState::Idle);
}

#[test]
fn test_manual_load_crossfades_when_enabled() {
    let mut t = TestEngine::new(crossfade_settings());

    t.engine
        .load(&url("http://example.com/a.ogg"), TrackChangeKind::Manual)
        .unwrap();
    t.engine.play(0).unwrap();
    let a = t.engine.current_pipeline_id().unwrap();

    t.engine
        .load(&url("http://example.com/b.ogg"), TrackChangeKind::Manual)
        .unwrap();
    let b = t.engine.current_pipeline_id().unwrap();

    // Both alive during the overlap
    assert_eq!(t.engine.fadeout_pipeline_id(), Some(a));
    assert_eq!(t.pipelines.live(), vec![a, b]);
    assert_eq!(
        t.pipelines.record(a).faders,
        vec![(1500, FadeDirection::Backward)]
    );
    assert_eq!(
        t.pipelines.record(b).faders,
        vec![(1500, FadeDirection::Forward)]
    );

    t.engine.handle_pipeline_event(PipelineEvent {
        source: a,
        kind: PipelineEventKind::FaderFinished,
    });

    assert!(t.engine.fadeout_pipeline_id().is_none());
    assert!(t.pipelines.is_released(a));
    assert_eq!(t.pipelines.live(), vec![b]);
}

#[test]
fn test_first_load_never_crossfades() {
    let mut t = TestEngine::new(crossfade_settings());

    t.engine
        .load(&url("http://example.com/a.ogg"), TrackChangeKind::Manual)
        .unwrap();

    assert!(t.engine.fadeout_pipeline_id().is_none());
    assert!(t.pipelines.last().faders.is_empty());
}

#[test]
fn test_auto_load_of_current_url_is_noop() {
    let mut t = TestEngine::new(crossfade_settings());
    let track = url("http://example.com/a.ogg");

    t.engine.load(&track, TrackChangeKind::Manual).unwrap();
    t.engine.play(0).unwrap();
    let a = t.engine.current_pipeline_id().unwrap();
    t.take_events();

    t.engine.load(&track, TrackChangeKind::Auto).unwrap();

    assert_eq!(t.pipelines.constructions(), 1);
    assert_eq!(t.engine.current_pipeline_id(), Some(a));
    assert_eq!(t.engine.state(), EngineState::Playing);
    assert!(t.take_events().is_empty());
}

#[test]
fn test_auto_load_of_current_url_reloads_with_autocrossfade() {
    let mut settings = crossfade_settings();
    settings.autocrossfade_enabled = true;
    let mut t = TestEngine::new(settings);
    let track = url("http://example.com/a.ogg");

    t.engine.load(&track, TrackChangeKind::Manual).unwrap();
    let a = t.engine.current_pipeline_id().unwrap();
    t.engine.load(&track, TrackChangeKind::Auto).unwrap();

    assert_eq!(t.pipelines.constructions(), 2);
    assert_eq!(t.engine.fadeout_pipeline_id(), Some(a));
}

#[test]
fn test_manual_load_of_current_url_reloads() {
    let mut t = TestEngine::new(EngineSettings::default());
    let track = url("http://example.com/a.ogg");

    t.engine.load(&track, TrackChangeKind::Manual).unwrap();
    t.engine.load(&track, TrackChangeKind::Manual).unwrap();

    assert_eq!(t.pipelines.constructions(), 2);
}

#[test]
fn test_missing_local_file_fails_without_construction() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.flac");
    let mut t = TestEngine::new(EngineSettings::default());

    t.engine
        .load(&url("http://example.com/a.ogg"), TrackChangeKind::Manual)
        .unwrap();
    let a = t.engine.current_pipeline_id().unwrap();

    let result = t.engine.load(
        &url::Url::from_file_path(&missing).unwrap(),
        TrackChangeKind::Manual,
    );

    assert!(matches!(result, Err(Error::FileNotFound(path)) if path == missing));
    assert_eq!(t.pipelines.constructions(), 1);
    assert_eq!(t.engine.current_pipeline_id(), Some(a));
}

#[test]
fn test_auto_reload_of_deleted_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short-lived.flac");
    std::fs::write(&path, b"fLaC").unwrap();
    let file_url = url::Url::from_file_path(&path).unwrap();
    let mut t = TestEngine::new(EngineSettings::default());

    t.engine.load(&file_url, TrackChangeKind::Manual).unwrap();
    let a = t.engine.current_pipeline_id().unwrap();
    std::fs::remove_file(&path).unwrap();

    let result = t.engine.load(&file_url, TrackChangeKind::Auto);

    assert!(matches!(result, Err(Error::FileNotFound(missing)) if missing == path));
    assert_eq!(t.pipelines.constructions(), 1);
    assert_eq!(t.engine.current_pipeline_id(), Some(a));
}

#[test]
fn test_existing_local_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("here.flac");
    std::fs::write(&present, b"fLaC").unwrap();
    let mut t = TestEngine::new(EngineSettings::default());

    t.engine
        .load(
            &url::Url::from_file_path(&present).unwrap(),
            TrackChangeKind::Manual,
        )
        .unwrap();

    assert_eq!(t.pipelines.constructions(), 1);
}

#[test]
fn test_construction_failure_leaves_current_untouched() {
    let mut t = TestEngine::new(crossfade_settings());
    let broken = url("http://example.com/broken.xyz");
    t.pipelines.fail_init(&broken);

    t.engine
        .load(&url("http://example.com/a.ogg"), TrackChangeKind::Manual)
        .unwrap();
    t.engine.play(0).unwrap();
    let a = t.engine.current_pipeline_id().unwrap();
    t.take_events();

    let result = t.engine.load(&broken, TrackChangeKind::Manual);

    assert!(matches!(result, Err(Error::Pipeline(_))));
    assert_eq!(t.engine.current_pipeline_id(), Some(a));
    assert!(t.engine.fadeout_pipeline_id().is_none());
    assert!(t.pipelines.record(a).faders.is_empty());
    assert_eq!(t.engine.state(), EngineState::Playing);
    assert_eq!(
        t.engine.current_url(),
        Some(&url("http://example.com/a.ogg"))
    );

    let events = t.take_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], EngineEvent::Error { message, .. } if message.contains("broken.xyz")));
}

#[test]
fn test_load_applies_cached_settings() {
    let mut settings = EngineSettings::default();
    settings.output.sink = "alsasink".to_string();
    settings.output.device = "hw:1".to_string();
    settings.replay_gain.enabled = true;
    settings.replay_gain.preamp = 3.5;
    let mut t = TestEngine::new(settings);

    t.engine.set_volume(50);
    t.engine.set_equalizer_enabled(true);
    t.engine
        .set_equalizer_parameters(4, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    t.engine
        .load(&url("http://example.com/a.ogg"), TrackChangeKind::Manual)
        .unwrap();

    let record = t.pipelines.last();
    let output = record.output.unwrap();
    assert_eq!(output.sink, "alsasink");
    assert_eq!(output.device, "hw:1");
    let replay_gain = record.replay_gain.unwrap();
    assert!(replay_gain.enabled);
    assert_eq!(replay_gain.preamp, 3.5);
    assert_eq!(record.volume, Some(25));
    assert_eq!(record.equalizer_enabled, Some(true));
    assert_eq!(
        record.equalizer_params,
        Some((4, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]))
    );
}

#[test]
fn test_reloaded_settings_apply_to_next_load_only() {
    let mut t = TestEngine::new(EngineSettings::default());
    t.engine
        .load(&url("http://example.com/a.ogg"), TrackChangeKind::Manual)
        .unwrap();
    let a = t.engine.current_pipeline_id().unwrap();

    let mut settings = EngineSettings::default();
    settings.output.sink = "pulsesink".to_string();
    settings.crossfade_enabled = true;
    t.engine.reload_settings(settings);

    assert_eq!(t.pipelines.record(a).output.unwrap().sink, "autoaudiosink");

    t.engine
        .load(&url("http://example.com/b.ogg"), TrackChangeKind::Manual)
        .unwrap();
    assert_eq!(t.pipelines.last().output.unwrap().sink, "pulsesink");
    // The new crossfade flag is honoured
    assert_eq!(t.engine.fadeout_pipeline_id(), Some(a));
}
