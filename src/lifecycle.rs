// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Camera lifecycle.
//!
//! [`Camera::open`] brings a device from enumeration to streaming:
//!
//! 1. enumerate devices, giving up after a few short retries;
//! 2. open the device, retrying until it responds;
//! 3. discover features and size the stream channels;
//! 4. write the initial configuration and resolve each channel's format,
//!    conversion and calibration;
//! 5. create streams and buffer pools on a background thread, retrying
//!    until each stream comes up or the camera shuts down;
//! 6. enable buffer-ready events and start acquisition once a subscriber is
//!    present.
//!
//! [`Camera::shutdown`] undoes all of it and may be called any number of
//! times, from any state.

use crate::{
    calibration::{self, CalibrationManager, CalibrationProvider},
    control::{FeatureControl, FeatureTable},
    convert::ConversionRegistry,
    device::{DeviceHandle, DeviceProvider, Region, UsbMode},
    dispatch::{ChannelSetup, DeviceContext, StreamChannel},
    features::{discover_features, FeatureMap},
    genicam,
    image::{pfnc_bits_per_pixel, SensorDescription},
    pool::BufferPool,
    ptp,
    sink::{ImageSink, MessageSink, SubscriberChangeFn},
    stream::{BufferReadyFn, GvTuning},
    telemetry::{AutoController, AutoParameters, ExtendedCameraInfo, ExtendedInfoReader},
};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const SLEEP_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no cameras found after {0} attempts")]
    NoDevices(usize),

    #[error("failed to start {name} thread: {source}")]
    Thread {
        name: &'static str,
        source: std::io::Error,
    },
}

/// Why the camera asks to be shut down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownRequest {
    ControlLost,
}

/// Creates the publish sinks of an opened camera.
pub trait SinkFactory: Send + Sync {
    /// Image sink of channel `index`. The sink must call `on_change` whenever
    /// its subscriber count changes.
    fn image_sink(
        &self,
        index: usize,
        name: &str,
        on_change: SubscriberChangeFn,
    ) -> Arc<dyn ImageSink>;

    fn extended_info_sink(
        &self,
        index: usize,
        name: &str,
    ) -> Arc<dyn MessageSink<ExtendedCameraInfo>>;

    fn auto_sink(&self) -> Arc<dyn MessageSink<AutoParameters>>;
}

/// Camera startup configuration.
#[derive(Clone, Debug)]
pub struct CameraSettings {
    /// Device to open, the first one found when `None`.
    pub guid: Option<String>,
    pub channel_names: Vec<String>,
    /// Pixel format per channel. Empty entries keep the device's format.
    pub pixel_formats: Vec<String>,
    /// Calibration url per channel. Empty entries use the default url.
    pub camera_info_urls: Vec<String>,
    pub frame_id: String,
    pub use_ptp_timestamp: bool,
    pub extended_camera_info: bool,
    pub usb_mode: UsbMode,
    /// Software trigger rate in Hz.
    pub software_trigger_rate: Option<f64>,
    pub feature_table: FeatureTable,
    pub auto_master: bool,
    pub auto_slave: bool,
    pub conversions: ConversionRegistry,
    pub open_retry: Duration,
    pub enumeration_attempts: usize,
    pub enumeration_retry: Duration,
    pub stream_retry: Duration,
    pub initial_buffers: usize,
    pub gv_tuning: GvTuning,
}

impl Default for CameraSettings {
    fn default() -> Self {
        CameraSettings {
            guid: None,
            channel_names: Vec::new(),
            pixel_formats: Vec::new(),
            camera_info_urls: Vec::new(),
            frame_id: "camera".to_string(),
            use_ptp_timestamp: false,
            extended_camera_info: false,
            usb_mode: UsbMode::Default,
            software_trigger_rate: None,
            feature_table: FeatureTable::default(),
            auto_master: false,
            auto_slave: false,
            conversions: ConversionRegistry::default(),
            open_retry: Duration::from_secs(1),
            enumeration_attempts: 5,
            enumeration_retry: Duration::from_millis(100),
            stream_retry: Duration::from_secs(1),
            initial_buffers: 10,
            gv_tuning: GvTuning::default(),
        }
    }
}

impl CameraSettings {
    /// Configured channel names. A single unnamed channel when none are
    /// configured.
    pub fn channel_names(&self) -> Vec<String> {
        if self.channel_names.is_empty() {
            vec![String::new()]
        } else {
            self.channel_names.clone()
        }
    }
}

/// Starts and stops acquisition as subscribers come and go.
struct AcquisitionControl {
    device: DeviceHandle,
    sinks: Mutex<Vec<Arc<dyn ImageSink>>>,
    acquiring: Mutex<bool>,
    ready: AtomicBool,
}

impl AcquisitionControl {
    fn any_subscribers(&self) -> bool {
        self.sinks
            .lock()
            .iter()
            .any(|sink| sink.subscriber_count() > 0)
    }

    /// Issues `AcquisitionStart` or `AcquisitionStop` when the wanted state
    /// differs from the last one issued.
    fn update(&self) {
        if !self.ready.load(Ordering::Acquire) {
            return;
        }
        let want = self.any_subscribers();
        let mut acquiring = self.acquiring.lock();
        if *acquiring == want {
            return;
        }

        let command = if want {
            genicam::ACQUISITION_START
        } else {
            genicam::ACQUISITION_STOP
        };
        info!(command, "subscribers changed");
        self.device.execute_command(command);
        *acquiring = want;
    }
}

struct SoftwareTrigger {
    active: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Per-channel configuration resolved before streams are created.
struct ChannelPlan {
    name: String,
    sensor: SensorDescription,
    calibration: Arc<dyn CalibrationProvider>,
}

/// An opened, streaming camera.
pub struct Camera {
    device: DeviceHandle,
    features: Arc<FeatureMap>,
    control: FeatureControl,
    sensors: Vec<SensorDescription>,
    channels: Arc<Mutex<Vec<Arc<StreamChannel>>>>,
    acquisition: Arc<AcquisitionControl>,
    auto_slave: Option<Arc<AutoController>>,
    spawning: Arc<AtomicBool>,
    spawn_thread: Mutex<Option<JoinHandle<()>>>,
    trigger: Mutex<Option<SoftwareTrigger>>,
    shutdown_rx: kanal::Receiver<ShutdownRequest>,
    stopped: AtomicBool,
}

impl Camera {
    /// Opens and starts a camera. Blocks until the device responds.
    pub fn open(
        provider: &dyn DeviceProvider,
        settings: CameraSettings,
        sinks: Arc<dyn SinkFactory>,
    ) -> Result<Camera, LifecycleError> {
        let ids = enumerate(provider, &settings)?;
        info!(cameras = ?ids, "found cameras");

        let device = open_device(provider, &settings);
        let features = Arc::new(discover_features(&device));
        let control = FeatureControl::new(device.clone(), features.clone());

        if device.is_uv() {
            device.set_usb_mode(settings.usb_mode);
        }

        let names = settings.channel_names();
        let n_channels = stream_channel_count(&device, &features, names.len());
        let sensors = configure(&control, &settings, n_channels);

        let serial = device.get_string(genicam::DEVICE_SERIAL_NUMBER);
        let device_id = if serial.is_empty() {
            device.get_string(genicam::DEVICE_ID)
        } else {
            String::new()
        };
        let plans: Vec<ChannelPlan> = sensors
            .iter()
            .enumerate()
            .map(|(i, sensor)| {
                let name = names.get(i).cloned().unwrap_or_default();
                let url = match settings.camera_info_urls.get(i) {
                    Some(url) if !url.is_empty() => url.clone(),
                    _ => calibration::default_url(&serial, &device_id),
                };
                ChannelPlan {
                    calibration: Arc::new(CalibrationManager::new(&name, &url)),
                    name,
                    sensor: sensor.clone(),
                }
            })
            .collect();

        print_capabilities(&control, &sensors);

        if settings.use_ptp_timestamp {
            ptp::check_and_reset(&device);
        }

        let mut context = DeviceContext::new(device.clone(), features.clone());
        context.use_ptp_timestamp = settings.use_ptp_timestamp;
        if settings.extended_camera_info {
            context.extended_info = Some(ExtendedInfoReader::new(&device.vendor_name(), &features));
        }
        if settings.auto_master {
            let controller = Arc::new(AutoController::new(device.clone(), features.clone()));
            controller.sync();
            context.auto_master = Some((controller, sinks.auto_sink()));
        }
        let auto_slave = settings.auto_slave.then(|| {
            let controller = Arc::new(AutoController::new(device.clone(), features.clone()));
            controller.make_slave();
            controller
        });

        let (shutdown_tx, shutdown_rx) = kanal::bounded(1);
        let camera = Camera {
            device: device.clone(),
            features,
            control,
            sensors,
            channels: Arc::new(Mutex::new(Vec::new())),
            acquisition: Arc::new(AcquisitionControl {
                device: device.clone(),
                sinks: Mutex::new(Vec::new()),
                acquiring: Mutex::new(false),
                ready: AtomicBool::new(false),
            }),
            auto_slave,
            spawning: Arc::new(AtomicBool::new(true)),
            spawn_thread: Mutex::new(None),
            trigger: Mutex::new(None),
            shutdown_rx,
            stopped: AtomicBool::new(false),
        };

        let spawner = Spawner {
            device,
            context: Arc::new(context),
            plans,
            settings: settings.clone(),
            sinks,
            channels: camera.channels.clone(),
            acquisition: camera.acquisition.clone(),
            spawning: camera.spawning.clone(),
            shutdown_tx,
        };
        let spawn_thread = thread::Builder::new()
            .name("genicam-spawn".to_string())
            .spawn(move || spawner.run())
            .map_err(|source| LifecycleError::Thread {
                name: "stream spawn",
                source,
            })?;
        *camera.spawn_thread.lock() = Some(spawn_thread);

        if let Some(rate) = settings.software_trigger_rate {
            camera.start_software_trigger(rate)?;
        }

        Ok(camera)
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn features(&self) -> &Arc<FeatureMap> {
        &self.features
    }

    /// Serialized feature access for operator requests.
    pub fn control(&self) -> &FeatureControl {
        &self.control
    }

    /// Negotiated format of each configured channel.
    pub fn sensors(&self) -> &[SensorDescription] {
        &self.sensors
    }

    /// Channels whose stream is up.
    pub fn channels(&self) -> Vec<Arc<StreamChannel>> {
        self.channels.lock().clone()
    }

    /// Auto-parameter follower, present when configured as auto slave.
    pub fn auto_slave(&self) -> Option<&Arc<AutoController>> {
        self.auto_slave.as_ref()
    }

    /// Receives shutdown requests raised by the device, such as a lost
    /// control channel.
    pub fn shutdown_requests(&self) -> kanal::Receiver<ShutdownRequest> {
        self.shutdown_rx.clone()
    }

    /// Whether every stream is up and buffer-ready events are enabled.
    pub fn is_streaming(&self) -> bool {
        self.acquisition.ready.load(Ordering::Acquire)
    }

    /// Waits up to `timeout` for [`Camera::is_streaming`].
    pub fn wait_streaming(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_streaming() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(SLEEP_SLICE);
        }
        true
    }

    /// Re-evaluates subscribers and starts or stops acquisition.
    pub fn subscribers_changed(&self) {
        self.acquisition.update();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn start_software_trigger(&self, rate: f64) -> Result<(), LifecycleError> {
        let Some(period) = trigger_period(rate) else {
            warn!(rate, "software trigger rate must be positive, trigger disabled");
            return Ok(());
        };
        if !self.features.is_usable(genicam::TRIGGER_SOFTWARE) {
            info!("camera does not support the TriggerSoftware command");
            return Ok(());
        }

        self.control.with_selectors(|device| {
            if self.features.is_usable(genicam::TRIGGER_SELECTOR) {
                device.set_string(genicam::TRIGGER_SELECTOR, "FrameStart");
            }
            if self.features.is_usable(genicam::TRIGGER_MODE) {
                device.set_string(genicam::TRIGGER_MODE, "On");
            }
            if self.features.is_usable(genicam::TRIGGER_SOURCE) {
                device.set_string(genicam::TRIGGER_SOURCE, "Software");
            }
        });

        let active = Arc::new(AtomicBool::new(true));
        let thread = {
            let active = active.clone();
            let device = self.device.clone();
            let acquisition = self.acquisition.clone();
            thread::Builder::new()
                .name("genicam-trigger".to_string())
                .spawn(move || software_trigger_loop(device, acquisition, active, period))
                .map_err(|source| LifecycleError::Thread {
                    name: "software trigger",
                    source,
                })?
        };

        info!(
            rate = 1000.0 / period.as_millis() as f64,
            "software trigger started"
        );
        *self.trigger.lock() = Some(SoftwareTrigger { active, thread });
        Ok(())
    }

    /// Stops streaming and releases the device's resources. Safe to call
    /// repeatedly and on a partially started camera.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("camera shutting down");

        let disable_signals = || {
            for channel in self.channels.lock().iter() {
                channel.stream().set_emit_signals(false);
            }
        };
        disable_signals();

        self.spawning.store(false, Ordering::Release);
        if let Some(thread) = self.spawn_thread.lock().take() {
            if thread.join().is_err() {
                error!("stream spawn thread panicked");
            }
        }
        // Channels created while the spawn thread was winding down.
        disable_signals();
        self.acquisition.ready.store(false, Ordering::Release);

        if let Some(trigger) = self.trigger.lock().take() {
            trigger.active.store(false, Ordering::Release);
            if trigger.thread.join().is_err() {
                error!("software trigger thread panicked");
            }
        }

        let channels = std::mem::take(&mut *self.channels.lock());
        for channel in &channels {
            let stats = channel.stream().statistics();
            match (stats.resent, stats.missing) {
                (Some(resent), Some(missing)) => info!(
                    channel = channel.index(),
                    completed = stats.completed,
                    failures = stats.failures,
                    underruns = stats.underruns,
                    resent,
                    missing,
                    "stream statistics"
                ),
                _ => info!(
                    channel = channel.index(),
                    completed = stats.completed,
                    failures = stats.failures,
                    underruns = stats.underruns,
                    "stream statistics"
                ),
            }
        }

        self.device.execute_command(genicam::ACQUISITION_STOP);

        for channel in &channels {
            channel.stream().set_buffer_ready_listener(None);
            if let Some(pool) = channel.pool() {
                pool.detach();
                let freed = pool.release_idle();
                debug!(channel = channel.index(), freed, stats = ?pool.stats(), "buffer pool released");
            }
        }
        self.acquisition.sinks.lock().clear();
        info!("camera stopped");
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Owns everything the spawn thread needs.
struct Spawner {
    device: DeviceHandle,
    context: Arc<DeviceContext>,
    plans: Vec<ChannelPlan>,
    settings: CameraSettings,
    sinks: Arc<dyn SinkFactory>,
    channels: Arc<Mutex<Vec<Arc<StreamChannel>>>>,
    acquisition: Arc<AcquisitionControl>,
    spawning: Arc<AtomicBool>,
    shutdown_tx: kanal::Sender<ShutdownRequest>,
}

impl Spawner {
    fn run(self) {
        for (index, plan) in self.plans.iter().enumerate() {
            let Some(channel) = self.spawn_channel(index, plan) else {
                debug!(channel = index, "stream spawn cancelled");
                return;
            };
            self.channels.lock().push(channel);
        }

        if !self.spawning.load(Ordering::Acquire) {
            return;
        }
        for channel in self.channels.lock().iter() {
            channel.stream().set_emit_signals(true);
        }

        let shutdown_tx = self.shutdown_tx.clone();
        self.device.on_control_lost(Arc::new(move || {
            error!("control of the camera was lost, shutting down");
            if let Err(error) = shutdown_tx.try_send(ShutdownRequest::ControlLost) {
                debug!(%error, "shutdown already requested");
            }
        }));

        self.acquisition.ready.store(true, Ordering::Release);
        self.acquisition.update();
        info!(channels = self.plans.len(), "camera streaming");
    }

    fn spawn_channel(&self, index: usize, plan: &ChannelPlan) -> Option<Arc<StreamChannel>> {
        let device = &self.device;

        let (stream, payload_size) = loop {
            if !self.spawning.load(Ordering::Acquire) {
                return None;
            }
            let created = {
                let _selectors = device.lock_selectors();
                if device.is_gv() {
                    device.select_stream_channel(index);
                }
                device
                    .create_stream()
                    .map(|stream| (stream, device.payload_size()))
            };
            match created {
                Some(created) => break created,
                None => {
                    warn!(channel = index, "could not create image stream, retrying");
                    sleep_while(&self.spawning, self.settings.stream_retry);
                }
            }
        };

        let pool = BufferPool::new(stream.clone());
        let pool = match pool.acquire_initial(self.settings.initial_buffers, payload_size) {
            Ok(()) => Some(pool),
            Err(error) => {
                error!(channel = index, %error, "failed to allocate buffer pool");
                None
            }
        };

        if device.is_gv() {
            if let Err(error) = stream.tune(&self.settings.gv_tuning) {
                warn!(channel = index, %error, "failed to tune GigE Vision stream");
            }
        }

        let conversion = self.settings.conversions.lookup(&plan.sensor.pixel_format);
        if conversion.is_none() {
            warn!(
                channel = index,
                pixel_format = plan.sensor.pixel_format,
                "no conversion for pixel format, publishing the native format"
            );
        }

        let on_change: SubscriberChangeFn = {
            let acquisition = self.acquisition.clone();
            Arc::new(move || acquisition.update())
        };
        let sink = self.sinks.image_sink(index, &plan.name, on_change);
        self.acquisition.sinks.lock().push(sink.clone());

        let extended_sink = self
            .context
            .extended_info
            .as_ref()
            .map(|_| self.sinks.extended_info_sink(index, &plan.name));

        let channel = Arc::new(StreamChannel::new(
            ChannelSetup {
                index,
                name: plan.name.clone(),
                frame_id: self.settings.frame_id.clone(),
                stream: stream.clone(),
                pool,
                sensor: plan.sensor.clone(),
                conversion,
                sink,
                calibration: plan.calibration.clone(),
                extended_sink,
            },
            self.context.clone(),
        ));

        let listener: BufferReadyFn = {
            let channel = channel.clone();
            Arc::new(move || {
                channel.on_buffer_ready();
            })
        };
        stream.set_buffer_ready_listener(Some(listener));

        info!(channel = index, name = plan.name, sensor = %plan.sensor, payload_size, "stream created");
        Some(channel)
    }
}

/// Sleeps for `duration` or until `flag` is cleared.
fn sleep_while(flag: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while flag.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

fn enumerate(
    provider: &dyn DeviceProvider,
    settings: &CameraSettings,
) -> Result<Vec<String>, LifecycleError> {
    let attempts = settings.enumeration_attempts.max(1);
    for attempt in 1..=attempts {
        let ids = provider.device_ids();
        if !ids.is_empty() {
            return Ok(ids);
        }
        debug!(attempt, "no cameras found");
        if attempt < attempts {
            thread::sleep(settings.enumeration_retry);
        }
    }
    error!(attempts, "no cameras found");
    Err(LifecycleError::NoDevices(attempts))
}

fn open_device(provider: &dyn DeviceProvider, settings: &CameraSettings) -> DeviceHandle {
    let guid = settings.guid.as_deref();
    loop {
        match provider.open(guid) {
            Ok(device) => {
                info!(guid = guid.unwrap_or("first available"), "opened camera");
                return DeviceHandle::new(device);
            }
            Err(error) => {
                warn!(guid = guid.unwrap_or("first available"), %error, "unable to open camera, retrying");
                thread::sleep(settings.open_retry);
            }
        }
    }
}

/// Software trigger period for `rate` Hz, at least one millisecond. `None`
/// when the rate is not a positive finite number.
pub fn trigger_period(rate: f64) -> Option<Duration> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    let millis = (1000.0 / rate).round().max(1.0);
    Some(Duration::from_millis(millis as u64))
}

/// Number of stream channels to create: the device's stream channel count,
/// falling back to the GigE Vision count and then to one, clamped to the
/// number of configured channel names.
pub fn stream_channel_count(device: &DeviceHandle, features: &FeatureMap, names: usize) -> usize {
    let mut reported = 0;
    if features.is_usable(genicam::DEVICE_STREAM_CHANNEL_COUNT) {
        reported = device.get_integer(genicam::DEVICE_STREAM_CHANNEL_COUNT);
    }
    if reported == 0
        && device.is_gv()
        && features.is_usable(genicam::GEV_STREAM_CHANNEL_COUNT)
    {
        reported = device.get_integer(genicam::GEV_STREAM_CHANNEL_COUNT);
    }
    if reported == 0 {
        reported = 1;
    }

    let count = (reported.max(1) as usize).min(names);
    if reported > names as i64 {
        info!(
            reported,
            configured = names,
            "camera has more stream channels than configured names"
        );
    }
    count
}

/// Writes the initial configuration and returns each channel's negotiated
/// sensor description.
fn configure(
    control: &FeatureControl,
    settings: &CameraSettings,
    n_channels: usize,
) -> Vec<SensorDescription> {
    let features = control.features();

    control.with_selectors(|device| {
        if features.all_usable(&[genicam::WIDTH, genicam::HEIGHT]) {
            let width = device.integer_bounds(genicam::WIDTH).max;
            let height = device.integer_bounds(genicam::HEIGHT).max;
            if width > 0 && height > 0 {
                device.set_region(Region {
                    x: 0,
                    y: 0,
                    width,
                    height,
                });
            }
        }

        if features.all_usable(&[genicam::TRIGGER_SELECTOR, genicam::TRIGGER_MODE]) {
            device.set_string(genicam::TRIGGER_SELECTOR, "FrameStart");
            device.set_string(genicam::TRIGGER_MODE, "Off");
        }
    });

    if !settings.feature_table.is_empty() {
        control.apply_table(&settings.feature_table);
    }

    (0..n_channels)
        .map(|i| {
            control.with_selectors(|device| {
                if features.is_usable(genicam::SOURCE_SELECTOR) {
                    device.set_string(genicam::SOURCE_SELECTOR, &format!("Source{i}"));
                }

                if let Some(format) = settings.pixel_formats.get(i).filter(|f| !f.is_empty()) {
                    if features.is_usable(genicam::PIXEL_FORMAT) {
                        device.set_string(genicam::PIXEL_FORMAT, format);
                    }
                }

                let pixel_format = device.get_string(genicam::PIXEL_FORMAT);
                let bits_per_pixel = pfnc_bits_per_pixel(device.get_integer(genicam::PIXEL_FORMAT));
                let region = device.region();
                SensorDescription {
                    width: region.width.max(0) as u32,
                    height: region.height.max(0) as u32,
                    pixel_format,
                    bits_per_pixel,
                }
            })
        })
        .collect()
}

fn print_capabilities(control: &FeatureControl, sensors: &[SensorDescription]) {
    let features = control.features();
    let device = control.device();
    let (sensor_width, sensor_height) = device.sensor_size();
    let or_absent = |feature: &str| {
        if features.is_usable(feature) {
            control.get_string(feature)
        } else {
            "(not implemented in camera)".to_string()
        }
    };

    info!(
        vendor = control.get_string(genicam::DEVICE_VENDOR_NAME),
        model = control.get_string(genicam::DEVICE_MODEL_NAME),
        device_id = control.get_string(genicam::DEVICE_USER_ID),
        serial = control.get_string(genicam::DEVICE_SERIAL_NUMBER),
        transport = %device.transport(),
        "camera"
    );
    info!(
        sensor_width,
        sensor_height,
        roi = %device.region(),
        features = features.len(),
        usable = features.usable_count(),
        "sensor"
    );
    for (channel, sensor) in sensors.iter().enumerate() {
        info!(channel, %sensor, "channel format");
    }
    info!(
        acquisition_mode = or_absent(genicam::ACQUISITION_MODE),
        trigger_mode = or_absent(genicam::TRIGGER_MODE),
        trigger_source = or_absent(genicam::TRIGGER_SOURCE),
        "acquisition"
    );

    for (feature, auto) in [
        (genicam::ACQUISITION_FRAME_RATE, None),
        (genicam::EXPOSURE_TIME, Some(genicam::EXPOSURE_AUTO)),
        (genicam::GAIN, Some(genicam::GAIN_AUTO)),
    ] {
        if !features.is_usable(feature) {
            info!(feature, "not settable");
            continue;
        }
        let bounds = device.float_bounds(feature);
        info!(
            feature,
            value = control.get_float(feature),
            min = bounds.min,
            max = bounds.max,
            auto = auto.map(|auto| features.is_usable(auto)),
            "settable"
        );
    }
}

fn software_trigger_loop(
    device: DeviceHandle,
    acquisition: Arc<AcquisitionControl>,
    active: Arc<AtomicBool>,
    period: Duration,
) {
    let mut next = Instant::now();
    while active.load(Ordering::Acquire) {
        next += period;
        if acquisition.any_subscribers() {
            device.execute_command(genicam::TRIGGER_SOFTWARE);
        }

        let now = Instant::now();
        if next > now {
            sleep_while(&active, next - now);
        } else {
            warn!("missed a software trigger event");
            next = now;
        }
    }
    info!("software trigger stopped");
}
