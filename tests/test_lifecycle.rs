// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_genicam::{
    control::FeatureTable,
    device::{DeviceHandle, FeatureValue, Transport, UsbMode},
    features::discover_features,
    genicam,
    lifecycle::{
        stream_channel_count, trigger_period, Camera, CameraSettings, LifecycleError,
        ShutdownRequest, SinkFactory,
    },
    mock::{MockDevice, MockProvider},
    sink::{CollectingMessages, CollectingSink, ImageSink, MessageSink, SubscriberChangeFn},
    stream::GvTuning,
    telemetry::{AutoParameters, ExtendedCameraInfo},
};
use parking_lot::Mutex;
use serde_json::json;
use serial_test::serial;
use std::{
    error::Error,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

const STARTUP: Duration = Duration::from_secs(5);

/// Sink factory keeping every sink it hands out.
struct TestSinks {
    subscribers: usize,
    images: Mutex<Vec<Arc<CollectingSink>>>,
    on_change: Mutex<Vec<SubscriberChangeFn>>,
    extended: Mutex<Vec<Arc<CollectingMessages<ExtendedCameraInfo>>>>,
    auto: Arc<CollectingMessages<AutoParameters>>,
}

impl TestSinks {
    fn new(subscribers: usize) -> Arc<Self> {
        Arc::new(TestSinks {
            subscribers,
            images: Mutex::new(Vec::new()),
            on_change: Mutex::new(Vec::new()),
            extended: Mutex::new(Vec::new()),
            auto: CollectingMessages::new(),
        })
    }

    fn image(&self, index: usize) -> Arc<CollectingSink> {
        self.images.lock()[index].clone()
    }

    /// Changes the subscriber count of channel `index` and notifies the
    /// camera the way a middleware would.
    fn set_subscribers(&self, index: usize, subscribers: usize) {
        self.image(index).set_subscribers(subscribers);
        let on_change = self.on_change.lock()[index].clone();
        on_change();
    }
}

impl SinkFactory for TestSinks {
    fn image_sink(
        &self,
        _index: usize,
        _name: &str,
        on_change: SubscriberChangeFn,
    ) -> Arc<dyn ImageSink> {
        let sink = CollectingSink::new(self.subscribers);
        self.images.lock().push(sink.clone());
        self.on_change.lock().push(on_change);
        sink
    }

    fn extended_info_sink(
        &self,
        _index: usize,
        _name: &str,
    ) -> Arc<dyn MessageSink<ExtendedCameraInfo>> {
        let sink = CollectingMessages::new();
        self.extended.lock().push(sink.clone());
        sink
    }

    fn auto_sink(&self) -> Arc<dyn MessageSink<AutoParameters>> {
        self.auto.clone()
    }
}

fn fast_settings() -> CameraSettings {
    CameraSettings {
        open_retry: Duration::from_millis(1),
        enumeration_retry: Duration::from_millis(1),
        stream_retry: Duration::from_millis(5),
        initial_buffers: 4,
        ..Default::default()
    }
}

fn count(commands: &[String], command: &str) -> usize {
    commands.iter().filter(|c| *c == command).count()
}

#[test]
#[serial]
fn test_open_stream_shutdown() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder().standard_features().build();
    let provider = MockProvider::single(device.clone());
    let sinks = TestSinks::new(1);

    let camera = Camera::open(&provider, fast_settings(), sinks.clone())?;
    assert!(camera.wait_streaming(STARTUP));
    assert_eq!(camera.channels().len(), 1);
    assert_eq!(count(&device.commands(), genicam::ACQUISITION_START), 1);

    let streams = device.streams();
    assert_eq!(streams.len(), 1);
    let stream = &streams[0];
    assert!(stream.is_emitting());
    assert!(stream.has_listener());
    assert_eq!(stream.tuning(), Some(GvTuning::default()));
    assert_eq!(stream.n_queued(), 4);

    device.trigger();
    let published = sinks.image(0).take();
    assert_eq!(published.len(), 1);
    let (image, info) = &published[0];
    assert_eq!(image.header.seq, 1);
    assert_eq!(image.header.frame_id, "camera");
    assert_eq!(image.encoding, "bayer_rggb8");
    assert_eq!((image.width, image.height), (640, 480));
    // The default calibration file does not exist, so the size is filled in.
    assert_eq!((info.width, info.height), (640, 480));
    drop(published);

    camera.shutdown();
    assert!(camera.is_stopped());
    assert!(!camera.is_streaming());
    assert!(!stream.is_emitting());
    assert!(!stream.has_listener());
    assert!(camera.channels().is_empty());
    assert_eq!(count(&device.commands(), genicam::ACQUISITION_STOP), 1);

    // Idempotent.
    camera.shutdown();
    drop(camera);
    assert_eq!(count(&device.commands(), genicam::ACQUISITION_STOP), 1);
    Ok(())
}

#[test]
#[serial]
fn test_subscribers_drive_acquisition() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder().standard_features().build();
    let provider = MockProvider::single(device.clone());
    let sinks = TestSinks::new(0);

    let camera = Camera::open(&provider, fast_settings(), sinks.clone())?;
    assert!(camera.wait_streaming(STARTUP));
    let commands = device.commands();
    assert_eq!(count(&commands, genicam::ACQUISITION_START), 0);
    assert_eq!(count(&commands, genicam::ACQUISITION_STOP), 0);

    sinks.set_subscribers(0, 1);
    assert_eq!(count(&device.commands(), genicam::ACQUISITION_START), 1);

    // Unchanged state issues nothing.
    sinks.set_subscribers(0, 2);
    camera.subscribers_changed();
    assert_eq!(count(&device.commands(), genicam::ACQUISITION_START), 1);

    sinks.set_subscribers(0, 0);
    assert_eq!(count(&device.commands(), genicam::ACQUISITION_STOP), 1);

    // Frames arriving without subscribers go straight back.
    device.trigger();
    assert!(sinks.image(0).is_empty());
    assert_eq!(device.streams()[0].n_queued(), 4);
    Ok(())
}

#[test]
#[serial]
fn test_initial_configuration() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .standard_features()
        .feature(genicam::WIDTH, 320i64)
        .feature(genicam::HEIGHT, 240i64)
        .feature(genicam::TRIGGER_MODE, "On")
        .build();
    let provider = MockProvider::single(device.clone());
    let table: FeatureTable = serde_json::from_value(json!({
        "load_order": ["AcquisitionFrameRate"],
        "features": {
            "Gain": 2.0,
            "GainSelector": "All",
            "AcquisitionFrameRate": 30.0,
            "NoSuchFeature": 1
        }
    }))?;
    let settings = CameraSettings {
        pixel_formats: vec!["Mono8".to_string()],
        feature_table: table,
        ..fast_settings()
    };

    let camera = Camera::open(&provider, settings, TestSinks::new(0))?;

    assert_eq!(device.writes_to(genicam::WIDTH), [FeatureValue::Integer(640)]);
    assert_eq!(device.writes_to(genicam::HEIGHT), [FeatureValue::Integer(480)]);
    assert_eq!(
        device.writes_to(genicam::TRIGGER_MODE),
        [FeatureValue::from("Off")]
    );
    assert_eq!(
        device.writes_to(genicam::SOURCE_SELECTOR),
        [FeatureValue::from("Source0")]
    );
    assert_eq!(
        device.writes_to(genicam::PIXEL_FORMAT),
        [FeatureValue::from("Mono8")]
    );
    assert!(device.writes_to("NoSuchFeature").is_empty());

    let order: Vec<String> = device.writes().into_iter().map(|(name, _)| name).collect();
    let position = |name: &str| order.iter().position(|n| n == name);
    assert!(position("AcquisitionFrameRate") < position(genicam::GAIN_SELECTOR));
    assert!(position(genicam::GAIN_SELECTOR) < position(genicam::GAIN));
    assert!(position(genicam::GAIN) < position(genicam::PIXEL_FORMAT));

    let sensor = &camera.sensors()[0];
    assert_eq!(sensor.pixel_format, "Mono8");
    assert_eq!(sensor.bits_per_pixel, 8);
    assert_eq!((sensor.width, sensor.height), (640, 480));
    Ok(())
}

#[test]
#[serial]
fn test_no_devices() -> Result<(), Box<dyn Error>> {
    let provider = MockProvider::new(Vec::new());
    let settings = CameraSettings {
        enumeration_attempts: 3,
        ..fast_settings()
    };

    match Camera::open(&provider, settings, TestSinks::new(0)) {
        Err(LifecycleError::NoDevices(attempts)) => assert_eq!(attempts, 3),
        Err(error) => return Err(error.into()),
        Ok(_) => return Err("opened a camera without devices".into()),
    }
    assert_eq!(provider.opens(), 0);
    Ok(())
}

#[test]
#[serial]
fn test_enumeration_and_open_retries() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder().standard_features().build();
    let provider = MockProvider::single(device)
        .with_enumeration_failures(2)
        .with_open_failures(2);

    let camera = Camera::open(&provider, fast_settings(), TestSinks::new(0))?;
    assert_eq!(provider.opens(), 3);
    assert!(camera.wait_streaming(STARTUP));
    Ok(())
}

#[test]
#[serial]
fn test_stream_creation_retry() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .standard_features()
        .stream_failures(3)
        .build();
    let provider = MockProvider::single(device.clone());

    let camera = Camera::open(&provider, fast_settings(), TestSinks::new(0))?;
    assert!(camera.wait_streaming(STARTUP));
    assert_eq!(device.streams().len(), 1);
    Ok(())
}

#[test]
#[serial]
fn test_shutdown_while_spawning() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .standard_features()
        .stream_failures(usize::MAX)
        .build();
    let provider = MockProvider::single(device.clone());
    let settings = CameraSettings {
        stream_retry: Duration::from_secs(30),
        ..fast_settings()
    };

    let camera = Camera::open(&provider, settings, TestSinks::new(1))?;
    thread::sleep(Duration::from_millis(50));
    assert!(!camera.is_streaming());

    let start = Instant::now();
    camera.shutdown();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(device.streams().is_empty());
    assert_eq!(count(&device.commands(), genicam::ACQUISITION_START), 0);
    Ok(())
}

#[test]
#[serial]
fn test_control_lost() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder().standard_features().build();
    let provider = MockProvider::single(device.clone());

    let camera = Camera::open(&provider, fast_settings(), TestSinks::new(0))?;
    assert!(camera.wait_streaming(STARTUP));

    let requests = camera.shutdown_requests();
    assert_eq!(requests.try_recv()?, None);
    device.lose_control();
    // A second loss while the first is pending must not block.
    device.lose_control();
    assert_eq!(requests.try_recv()?, Some(ShutdownRequest::ControlLost));

    camera.shutdown();
    Ok(())
}

#[test]
#[serial]
fn test_software_trigger() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder().standard_features().build();
    let provider = MockProvider::single(device.clone());
    let sinks = TestSinks::new(1);
    let settings = CameraSettings {
        software_trigger_rate: Some(100.0),
        ..fast_settings()
    };

    let camera = Camera::open(&provider, settings, sinks.clone())?;
    assert!(camera.wait_streaming(STARTUP));
    assert_eq!(
        device.writes_to(genicam::TRIGGER_MODE),
        [FeatureValue::from("Off"), FeatureValue::from("On")]
    );

    // Published frames are drained so the pool keeps its buffers.
    let deadline = Instant::now() + STARTUP;
    let mut received = 0;
    while received < 3 && Instant::now() < deadline {
        received += sinks.image(0).take().len();
        thread::sleep(Duration::from_millis(10));
    }
    camera.shutdown();
    assert!(received >= 3, "only {received} frames published");

    let triggers = count(&device.commands(), genicam::TRIGGER_SOFTWARE);
    assert!(triggers >= 3, "only {triggers} software triggers");

    // Stopped with the camera.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count(&device.commands(), genicam::TRIGGER_SOFTWARE), triggers);
    Ok(())
}

#[test]
#[serial]
fn test_software_trigger_needs_subscribers() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder().standard_features().build();
    let provider = MockProvider::single(device.clone());
    let settings = CameraSettings {
        software_trigger_rate: Some(200.0),
        ..fast_settings()
    };

    let camera = Camera::open(&provider, settings, TestSinks::new(0))?;
    assert!(camera.wait_streaming(STARTUP));
    thread::sleep(Duration::from_millis(100));
    camera.shutdown();

    assert_eq!(count(&device.commands(), genicam::TRIGGER_SOFTWARE), 0);
    Ok(())
}

#[test]
#[serial]
fn test_multiple_channels() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .standard_features()
        .feature(genicam::DEVICE_STREAM_CHANNEL_COUNT, 2i64)
        .build();
    let provider = MockProvider::single(device.clone());
    let sinks = TestSinks::new(1);
    let settings = CameraSettings {
        channel_names: vec!["left".to_string(), "right".to_string(), "spare".to_string()],
        ..fast_settings()
    };

    let camera = Camera::open(&provider, settings, sinks.clone())?;
    assert!(camera.wait_streaming(STARTUP));
    assert_eq!(camera.channels().len(), 2);
    assert_eq!(device.streams().len(), 2);
    assert_eq!(
        device.writes_to(genicam::SOURCE_SELECTOR),
        [FeatureValue::from("Source0"), FeatureValue::from("Source1")]
    );

    device.trigger();
    for (index, frame_id) in [(0, "camera/left"), (1, "camera/right")] {
        let published = sinks.image(index).take();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0.header.frame_id, frame_id);
        assert_eq!(published[0].0.header.seq, 1);
    }
    Ok(())
}

#[test]
fn test_stream_channel_count() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .standard_features()
        .feature(genicam::DEVICE_STREAM_CHANNEL_COUNT, 4i64)
        .build();
    let handle = DeviceHandle::new(device);
    let features = discover_features(&handle);
    assert_eq!(stream_channel_count(&handle, &features, 1), 1);
    assert_eq!(stream_channel_count(&handle, &features, 6), 4);

    // Falls back to the GigE Vision count, then to one.
    let device = MockDevice::builder()
        .transport(Transport::GigEVision)
        .feature(genicam::GEV_STREAM_CHANNEL_COUNT, 2i64)
        .build();
    let handle = DeviceHandle::new(device);
    let features = discover_features(&handle);
    assert_eq!(stream_channel_count(&handle, &features, 3), 2);

    // A device count of zero also falls back to the GigE Vision count.
    let device = MockDevice::builder()
        .transport(Transport::GigEVision)
        .feature(genicam::DEVICE_STREAM_CHANNEL_COUNT, 0i64)
        .feature(genicam::GEV_STREAM_CHANNEL_COUNT, 3i64)
        .build();
    let handle = DeviceHandle::new(device);
    let features = discover_features(&handle);
    assert!(features.is_usable(genicam::DEVICE_STREAM_CHANNEL_COUNT));
    assert_eq!(stream_channel_count(&handle, &features, 4), 3);

    let device = MockDevice::builder().transport(Transport::Usb3Vision).build();
    let handle = DeviceHandle::new(device);
    let features = discover_features(&handle);
    assert_eq!(stream_channel_count(&handle, &features, 3), 1);
    Ok(())
}

#[test]
fn test_trigger_period() -> Result<(), Box<dyn Error>> {
    assert_eq!(trigger_period(30.0), Some(Duration::from_millis(33)));
    assert_eq!(trigger_period(1.0), Some(Duration::from_secs(1)));
    // Rates above 2 kHz would round to zero.
    assert_eq!(trigger_period(5_000.0), Some(Duration::from_millis(1)));
    assert_eq!(trigger_period(f64::INFINITY), None);
    assert_eq!(trigger_period(f64::NAN), None);
    assert_eq!(trigger_period(0.0), None);
    assert_eq!(trigger_period(-10.0), None);
    Ok(())
}

#[test]
#[serial]
fn test_usb_device() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .transport(Transport::Usb3Vision)
        .standard_features()
        .build();
    let provider = MockProvider::single(device.clone());
    let settings = CameraSettings {
        usb_mode: UsbMode::Async,
        ..fast_settings()
    };

    let camera = Camera::open(&provider, settings, TestSinks::new(0))?;
    assert!(camera.wait_streaming(STARTUP));
    assert_eq!(device.usb_mode(), Some(UsbMode::Async));
    assert_eq!(device.streams()[0].tuning(), None);
    Ok(())
}

#[test]
#[serial]
fn test_extended_info_and_calibration() -> Result<(), Box<dyn Error>> {
    let path = std::env::temp_dir().join(format!("genicam-calibration-{}.json", std::process::id()));
    std::fs::write(
        &path,
        json!({
            "image_width": 640,
            "image_height": 480,
            "camera_matrix": { "rows": 3, "cols": 3, "data": [500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0] },
            "distortion_coefficients": { "rows": 1, "cols": 5, "data": [0.1, 0.0, 0.0, 0.0, 0.0] }
        })
        .to_string(),
    )?;

    let device = MockDevice::builder().standard_features().build();
    let provider = MockProvider::single(device.clone());
    let sinks = TestSinks::new(1);
    let settings = CameraSettings {
        extended_camera_info: true,
        camera_info_urls: vec![format!("file://{}", path.display())],
        ..fast_settings()
    };

    let camera = Camera::open(&provider, settings, sinks.clone())?;
    assert!(camera.wait_streaming(STARTUP));
    device.trigger();
    camera.shutdown();
    std::fs::remove_file(&path)?;

    let published = sinks.image(0).take();
    let info = &published[0].1;
    assert_eq!(info.k[2], 320.0);
    assert_eq!(info.p[6], 240.0);
    assert_eq!(info.d, [0.1, 0.0, 0.0, 0.0, 0.0]);

    let extended = sinks.extended.lock()[0].take();
    assert_eq!(extended.len(), 1);
    assert_eq!(extended[0].header.seq, 1);
    assert_eq!(extended[0].exposure_time, 10_000.0);
    assert_eq!(extended[0].temperature, 41.5);
    Ok(())
}

#[test]
#[serial]
fn test_auto_master_and_slave() -> Result<(), Box<dyn Error>> {
    let master = MockDevice::builder().standard_features().build();
    let master_sinks = TestSinks::new(1);
    let master_camera = Camera::open(
        &MockProvider::single(master.clone()),
        CameraSettings {
            auto_master: true,
            ..fast_settings()
        },
        master_sinks.clone(),
    )?;

    let slave = MockDevice::builder()
        .standard_features()
        .feature(genicam::EXPOSURE_TIME, 20_000.0)
        .build();
    let slave_camera = Camera::open(
        &MockProvider::single(slave.clone()),
        CameraSettings {
            auto_slave: true,
            ..fast_settings()
        },
        TestSinks::new(0),
    )?;
    assert_eq!(
        slave.writes_to(genicam::EXPOSURE_AUTO),
        [FeatureValue::from("Off")]
    );
    assert_eq!(slave.writes_to("BalanceWhiteAuto"), [FeatureValue::from("Off")]);

    assert!(master_camera.wait_streaming(STARTUP));
    master.trigger();
    let snapshots = master_sinks.auto.take();
    assert_eq!(snapshots.len(), 1);

    let controller = slave_camera.auto_slave().ok_or("no auto slave")?;
    slave.clear_writes();
    controller.apply(&snapshots[0]);
    assert_eq!(
        slave.writes_to(genicam::EXPOSURE_TIME),
        [FeatureValue::Float(10_000.0)]
    );
    // Gain, black level and white balance already match.
    assert!(slave.writes_to(genicam::GAIN).is_empty());
    assert!(slave.writes_to(genicam::BALANCE_RATIO).is_empty());
    Ok(())
}
