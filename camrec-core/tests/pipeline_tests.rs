//! End-to-end pipeline tests over the synthetic camera and encoder

mod mocks;

use camrec_core::capture::SessionState;
use camrec_core::synthetic::{
    SyntheticCamera, SyntheticCameraOptions, SyntheticEncoderFactory, SyntheticEncoderOptions,
    SyntheticWindows,
};
use camrec_core::{CameraEvent, CameraPipeline, CamrecError, Codec, PipelineMode, SurfaceId};
use mocks::*;
use std::os::fd::AsFd;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_preview_round_trip() {
    let mut h = harness(fast_camera(None), SyntheticEncoderOptions::default());

    h.pipeline.set_surface(SurfaceId(1)).unwrap();
    h.pipeline.open_camera().unwrap();
    assert_eq!(h.pipeline.mode(), PipelineMode::PreviewOnly);
    assert_eq!(h.pipeline.session_state(), SessionState::Repeating);

    assert!(wait_for(WAIT, || h.camera.preview_frames() >= 5));
    assert!(wait_for(WAIT, || h.pipeline.is_session_active()));

    h.pipeline.close_camera();
    assert_eq!(h.pipeline.mode(), PipelineMode::Idle);
    assert_eq!(h.pipeline.session_state(), SessionState::Closed);
    assert_eq!(h.camera.live_handles(), 0);
    assert!(h.camera.double_frees().is_empty());

    // The set_surface window outlives the camera session
    assert_eq!(h.windows.live(), 1);
    h.pipeline.shutdown();
    assert_eq!(h.windows.live(), 0);
}

#[test]
fn test_reopen_after_close() {
    let mut h = harness(fast_camera(None), SyntheticEncoderOptions::default());
    h.pipeline.set_surface(SurfaceId(1)).unwrap();

    for _ in 0..3 {
        h.pipeline.open_camera().unwrap();
        h.pipeline.close_camera();
    }

    assert_eq!(h.camera.devices_opened(), 3);
    assert_eq!(h.camera.live_handles(), 0);
    assert!(h.camera.double_frees().is_empty());
    assert_eq!(h.windows.acquired(), 1);
}

#[test]
fn test_start_preview_owns_its_window() {
    let mut h = harness(fast_camera(None), SyntheticEncoderOptions::default());

    h.pipeline.start_preview(SurfaceId(3)).unwrap();
    assert_eq!(h.windows.live(), 1);

    h.pipeline.stop_preview();
    assert_eq!(h.pipeline.mode(), PipelineMode::Idle);
    assert_eq!(h.windows.live(), 0);
    assert_eq!(h.camera.live_handles(), 0);
}

#[test]
fn test_record_ten_frames() {
    let mut h = harness(fast_camera(Some(10)), SyntheticEncoderOptions::default());
    let file = output_file();

    h.pipeline.start_recording(file.as_fd(), SurfaceId(7)).unwrap();
    assert_eq!(h.pipeline.mode(), PipelineMode::Recording);
    assert_eq!(h.camera.live_targets(), 2);

    assert!(wait_for(WAIT, || h.camera.frames_delivered() == 10));
    assert!(wait_for(WAIT, || h.pipeline.stats().samples_written == 10));

    let summary = h.pipeline.stop_recording().unwrap().unwrap();
    assert!(summary.finalized);
    assert_eq!(summary.frames_encoded, 10);
    assert_eq!(summary.samples_written, 10);
    assert_eq!(summary.samples_before_track, 0);
    assert_eq!(summary.pts_range_us, Some((0, 9 * 5_000)));

    let events = h.mux.events();
    assert!(matches!(events.first(), Some(MuxEvent::AddTrack(_))));
    assert_eq!(events.get(1), Some(&MuxEvent::Start));
    assert_eq!(events.last(), Some(&MuxEvent::Stop));
    assert_eq!(h.mux.tracks(), 1);
    assert_eq!(h.mux.stops(), 1);

    let pts = h.mux.samples();
    assert_eq!(pts.len(), 10);
    assert!(pts.windows(2).all(|w| w[0] < w[1]));

    assert_eq!(h.encoder.stop_calls(), 1);
    assert_eq!(h.encoder.outputs_released(), h.encoder.outputs_emitted());
    assert_eq!(h.encoder.bad_releases(), 0);

    assert_eq!(h.pipeline.mode(), PipelineMode::Idle);
    assert_eq!(h.camera.live_handles(), 0);
    assert!(h.camera.double_frees().is_empty());
    assert_eq!(h.windows.live(), 0);
}

#[test]
fn test_encoder_starts_after_repeating_request() {
    let camera = SyntheticCamera::new(fast_camera(Some(10)));
    let camera_probe = camera.probe();
    let encoders = InspectingEncoderFactory::new(camera_probe.clone());
    let starts = encoders.starts();
    let muxers = LoggingMuxerFactory::default();
    let log = muxers.log();
    let mut pipeline = CameraPipeline::builder()
        .with_camera(camera)
        .with_windows(SyntheticWindows::new(64, 48))
        .with_encoders(encoders)
        .with_muxers(muxers)
        .with_config(test_config())
        .build()
        .unwrap();
    let file = output_file();

    pipeline.start_recording(file.as_fd(), SurfaceId(1)).unwrap();
    assert_eq!(*starts.lock(), vec![1]);

    // Frames produced before the encoder started are still encoded
    assert!(wait_for(WAIT, || camera_probe.frames_delivered() == 10));
    assert!(wait_for(WAIT, || pipeline.stats().samples_written == 10));
    let summary = pipeline.stop_recording().unwrap().unwrap();
    assert_eq!(summary.frames_dropped, 0);
    assert_eq!(log.samples().len(), 10);
}

#[test]
fn test_frames_dropped_without_input_buffer() {
    let camera = SyntheticCamera::new(fast_camera(Some(5)));
    let camera_probe = camera.probe();
    let muxers = LoggingMuxerFactory::default();
    let log = muxers.log();
    let mut pipeline = CameraPipeline::builder()
        .with_camera(camera)
        .with_windows(SyntheticWindows::new(64, 48))
        .with_encoders(InspectingEncoderFactory::new(camera_probe.clone()).starved())
        .with_muxers(muxers)
        .with_config(test_config())
        .build()
        .unwrap();
    let file = output_file();

    pipeline.start_recording(file.as_fd(), SurfaceId(1)).unwrap();
    assert!(wait_for(WAIT, || camera_probe.frames_delivered() == 5));
    assert!(wait_for(WAIT, || pipeline.stats().frames_dropped == 5));
    let summary = pipeline.stop_recording().unwrap().unwrap();

    assert_eq!(summary.frames_encoded, 0);
    assert_eq!(summary.frames_dropped, 5);
    assert_eq!(summary.samples_written, 0);
    assert!(log.samples().is_empty());
}

#[test]
fn test_first_sample_is_key_frame() {
    let mut h = harness(fast_camera(Some(3)), SyntheticEncoderOptions::default());
    let file = output_file();

    h.pipeline.start_recording(file.as_fd(), SurfaceId(1)).unwrap();
    assert!(wait_for(WAIT, || h.pipeline.stats().samples_written == 3));
    h.pipeline.stop_recording().unwrap();

    let first = h
        .mux
        .events()
        .into_iter()
        .find(|e| matches!(e, MuxEvent::Sample { .. }));
    assert!(matches!(first, Some(MuxEvent::Sample { key_frame: true, .. })));
}

#[test]
fn test_codec_config_buffers_not_written() {
    let encoder = SyntheticEncoderOptions {
        emit_codec_config: true,
        ..Default::default()
    };
    let mut h = harness(fast_camera(Some(5)), encoder);
    let file = output_file();

    h.pipeline.start_recording(file.as_fd(), SurfaceId(1)).unwrap();
    assert!(wait_for(WAIT, || h.camera.frames_delivered() == 5));
    let summary = h.pipeline.stop_recording().unwrap().unwrap();

    assert_eq!(summary.samples_written, 5);
    assert_eq!(h.mux.samples().len(), 5);
    assert_eq!(h.encoder.outputs_released(), h.encoder.outputs_emitted());
}

#[test]
fn test_buffer_before_format_change_is_dropped() {
    let camera = SyntheticCamera::new(fast_camera(Some(5)));
    let camera_probe = camera.probe();
    let muxers = LoggingMuxerFactory::default();
    let log = muxers.log();
    let mut pipeline = CameraPipeline::builder()
        .with_camera(camera)
        .with_windows(SyntheticWindows::new(64, 48))
        .with_encoders(EarlyBufferEncoderFactory)
        .with_muxers(muxers)
        .with_config(test_config())
        .build()
        .unwrap();
    let file = output_file();

    pipeline.start_recording(file.as_fd(), SurfaceId(1)).unwrap();
    assert!(wait_for(WAIT, || camera_probe.frames_delivered() == 5));
    let summary = pipeline.stop_recording().unwrap().unwrap();

    assert_eq!(summary.samples_before_track, 1);
    assert_eq!(summary.samples_written, 4);
    assert!(matches!(log.events().first(), Some(MuxEvent::AddTrack(_))));
    assert_eq!(pipeline.stats().samples_before_track, 1);
}

#[test]
fn test_recording_teardown_detaches_both_targets() {
    let mut h = harness(fast_camera(Some(3)), SyntheticEncoderOptions::default());
    let file = output_file();

    h.pipeline.start_recording(file.as_fd(), SurfaceId(1)).unwrap();
    assert!(wait_for(WAIT, || h.pipeline.stats().samples_written == 3));
    h.pipeline.stop_recording().unwrap();

    // Frame source first, then the preview, both while the request is alive
    assert_eq!(h.camera.targets_detached(), 2);
    assert_eq!(h.camera.live_handles(), 0);
    assert!(h.camera.double_frees().is_empty());
}

#[test]
fn test_stop_recording_twice() {
    let mut h = harness(fast_camera(None), SyntheticEncoderOptions::default());
    let file = output_file();

    h.pipeline.start_recording(file.as_fd(), SurfaceId(1)).unwrap();
    assert!(wait_for(WAIT, || h.pipeline.stats().samples_written >= 3));

    assert!(h.pipeline.stop_recording().unwrap().is_some());
    assert!(h.pipeline.stop_recording().unwrap().is_none());

    assert_eq!(h.mux.stops(), 1);
    assert_eq!(h.encoder.stop_calls(), 1);
    assert!(h.camera.double_frees().is_empty());
}

#[test]
fn test_no_samples_after_stop() {
    let mut h = harness(fast_camera(None), SyntheticEncoderOptions::default());

    for round in 0..5 {
        let file = output_file();
        h.pipeline.start_recording(file.as_fd(), SurfaceId(round)).unwrap();
        std::thread::sleep(Duration::from_millis(10 * round));
        let summary = h.pipeline.stop_recording().unwrap().unwrap();
        assert!(summary.finalized);
    }

    // Each recording's samples sit between its AddTrack and its Stop
    let mut stopped = true;
    for event in h.mux.events() {
        match event {
            MuxEvent::AddTrack(_) => stopped = false,
            MuxEvent::Sample { .. } => assert!(!stopped, "sample written after stop"),
            MuxEvent::Stop => stopped = true,
            MuxEvent::Start => {}
        }
    }

    assert_eq!(h.encoder.encoders_created(), 5);
    assert_eq!(h.encoder.stop_calls(), 5);
    assert_eq!(h.camera.live_handles(), 0);
    assert!(h.camera.double_frees().is_empty());
    assert_eq!(h.windows.live(), 0);
}

#[test]
fn test_slow_writes_never_outlive_stop() {
    let camera = SyntheticCameraOptions {
        fps: 1000,
        ..fast_camera(None)
    };
    let muxers = LoggingMuxerFactory::slow(Duration::from_millis(3));
    let mut h = harness_with_muxers(camera, SyntheticEncoderOptions::default(), muxers);

    for round in 0..30 {
        let file = output_file();
        h.pipeline.start_recording(file.as_fd(), SurfaceId(round)).unwrap();
        std::thread::sleep(Duration::from_millis(round % 4));
        let summary = h.pipeline.stop_recording().unwrap().unwrap();
        assert!(summary.finalized);
    }

    let mut stopped = true;
    let mut writes = 0;
    let mut writes_after_stop = 0;
    for event in h.mux.events() {
        match event {
            MuxEvent::AddTrack(_) => stopped = false,
            MuxEvent::Sample { .. } if stopped => writes_after_stop += 1,
            MuxEvent::Sample { .. } => writes += 1,
            MuxEvent::Stop => stopped = true,
            MuxEvent::Start => {}
        }
    }
    assert!(writes > 0);
    assert_eq!(writes_after_stop, 0);

    assert_eq!(h.mux.stops(), 30);
    assert_eq!(h.encoder.stop_calls(), 30);
    assert_eq!(h.camera.live_handles(), 0);
    assert!(h.camera.double_frees().is_empty());
    assert_eq!(h.windows.live(), 0);
}

#[cfg(feature = "ffmpeg")]
#[test]
fn test_record_ten_frames_to_mp4() {
    use camrec_core::ContainerFormat;
    use ffmpeg_next as ffmpeg;

    let mut pipeline = CameraPipeline::builder()
        .with_camera(SyntheticCamera::new(fast_camera(Some(10))))
        .with_windows(SyntheticWindows::new(64, 48))
        .with_encoders(SyntheticEncoderFactory::default())
        .with_config(test_config().with_container(ContainerFormat::Mpeg4))
        .build()
        .unwrap();
    let output = tempfile::NamedTempFile::new().unwrap();

    pipeline
        .start_recording(output.as_file().as_fd(), SurfaceId(1))
        .unwrap();
    assert!(wait_for(WAIT, || pipeline.stats().samples_written == 10));
    let summary = pipeline.stop_recording().unwrap().unwrap();
    assert!(summary.finalized);
    assert_eq!(summary.samples_written, 10);

    ffmpeg::init().unwrap();
    let mut input = ffmpeg::format::input(output.path()).unwrap();
    assert_eq!(input.streams().count(), 1);
    let video = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .expect("video stream")
        .index();

    let pts: Vec<i64> = input
        .packets()
        .filter(|(stream, _)| stream.index() == video)
        .filter_map(|(_, packet)| packet.pts())
        .collect();
    assert_eq!(pts.len(), 10);
    assert!(pts.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_recording_rejected_while_previewing() {
    let mut h = harness(fast_camera(None), SyntheticEncoderOptions::default());
    let file = output_file();

    h.pipeline.start_preview(SurfaceId(1)).unwrap();
    let err = h
        .pipeline
        .start_recording(file.as_fd(), SurfaceId(2))
        .unwrap_err();
    assert!(matches!(err, CamrecError::SessionAlreadyRunning));
    assert_eq!(h.pipeline.mode(), PipelineMode::PreviewOnly);

    h.pipeline.stop_preview();
    assert_eq!(h.camera.live_handles(), 0);
}

#[test]
fn test_read_only_descriptor_rejected_before_camera() {
    let mut h = harness(fast_camera(None), SyntheticEncoderOptions::default());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.h264");
    std::fs::write(&path, b"").unwrap();
    let file = std::fs::File::open(&path).unwrap();

    let err = h
        .pipeline
        .start_recording(file.as_fd(), SurfaceId(1))
        .unwrap_err();
    assert!(matches!(err, CamrecError::InvalidDescriptor(_)));
    assert_eq!(h.windows.acquired(), 0);
    assert_eq!(h.camera.devices_opened(), 0);
}

#[test]
fn test_no_camera() {
    let camera = SyntheticCameraOptions {
        camera_count: 0,
        ..fast_camera(None)
    };
    let mut h = harness(camera, SyntheticEncoderOptions::default());

    h.pipeline.set_surface(SurfaceId(1)).unwrap();
    assert!(matches!(h.pipeline.open_camera(), Err(CamrecError::NoDevice)));
    assert_eq!(h.pipeline.mode(), PipelineMode::Idle);

    let file = output_file();
    assert!(matches!(
        h.pipeline.start_recording(file.as_fd(), SurfaceId(2)),
        Err(CamrecError::NoDevice)
    ));
    assert_eq!(h.camera.live_handles(), 0);
    assert_eq!(h.windows.live(), 0);
    assert!(h.mux.events().is_empty());
}

#[test]
fn test_unsupported_codec_cleans_up() {
    let camera = SyntheticCamera::new(fast_camera(None));
    let camera_probe = camera.probe();
    let windows = SyntheticWindows::new(64, 48);
    let window_probe = windows.probe();
    let mut pipeline = CameraPipeline::builder()
        .with_camera(camera)
        .with_windows(windows)
        .with_encoders(SyntheticEncoderFactory::default())
        .with_muxers(LoggingMuxerFactory::default())
        .with_config(test_config().with_codec(Codec::Hevc))
        .build()
        .unwrap();
    let file = output_file();

    let err = pipeline
        .start_recording(file.as_fd(), SurfaceId(1))
        .unwrap_err();
    assert!(matches!(err, CamrecError::Unsupported(_)));
    assert_eq!(pipeline.mode(), PipelineMode::Idle);
    assert_eq!(pipeline.session_state(), SessionState::Closed);
    assert_eq!(camera_probe.live_handles(), 0);
    assert_eq!(window_probe.live(), 0);
}

#[test]
fn test_window_failure_leaves_camera_closed() {
    let camera = SyntheticCamera::new(fast_camera(None));
    let camera_probe = camera.probe();
    let mut pipeline = CameraPipeline::builder()
        .with_camera(camera)
        .with_windows(SyntheticWindows::failing())
        .with_encoders(SyntheticEncoderFactory::default())
        .with_config(test_config())
        .build()
        .unwrap();

    assert!(pipeline.start_preview(SurfaceId(1)).is_err());
    assert!(matches!(pipeline.open_camera(), Err(CamrecError::NoSurface)));
    assert_eq!(camera_probe.devices_opened(), 0);
}

#[test]
fn test_camera_events_are_broadcast() {
    let mut h = harness(fast_camera(None), SyntheticEncoderOptions::default());
    let mut events = h.pipeline.subscribe();
    let mut seen = Vec::new();

    h.pipeline.start_preview(SurfaceId(1)).unwrap();
    assert!(wait_for(WAIT, || {
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen.contains(&CameraEvent::SessionActive)
    }));
    assert!(seen.contains(&CameraEvent::SessionReady));

    h.camera.disconnect_all();
    assert!(wait_for(WAIT, || {
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen.iter()
            .any(|e| matches!(e, CameraEvent::DeviceDisconnected { .. }))
    }));
    assert!(!h.pipeline.is_session_active());

    h.pipeline.stop_preview();
    assert!(wait_for(WAIT, || {
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen.contains(&CameraEvent::SessionClosed)
    }));
}

#[test]
fn test_drop_releases_everything() {
    let h = harness(fast_camera(None), SyntheticEncoderOptions::default());
    let (camera, windows, mux) = (h.camera.clone(), h.windows.clone(), h.mux.clone());
    let mut pipeline = h.pipeline;
    let file = output_file();

    pipeline.start_recording(file.as_fd(), SurfaceId(1)).unwrap();
    assert!(wait_for(WAIT, || pipeline.stats().samples_written >= 2));
    drop(pipeline);

    assert_eq!(mux.stops(), 1);
    assert_eq!(camera.live_handles(), 0);
    assert_eq!(windows.live(), 0);
}

#[test]
fn test_stats_display() {
    let h = harness(fast_camera(None), SyntheticEncoderOptions::default());
    let stats = h.pipeline.stats().to_string();
    assert!(stats.contains("64x48"));
    assert!(stats.contains("Idle"));
}
