// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Simulated GenICam camera.
//!
//! [`MockDevice`] implements the device capability layer on top of an in
//! memory feature store and a generated [`GenicamDocument`]. Features may be
//! selector dependent (`Gain` under `GainSelector`, ...). Every successful
//! write and command is recorded so tests can assert on device traffic.
//!
//! [`MockStream`] keeps a fill queue and an output queue. Frames complete on
//! [`MockStream::complete_next`], on `TriggerSoftware`, or from a free-run
//! producer thread started by `AcquisitionStart` when the device is built
//! with [`MockDeviceBuilder::free_run`].

use crate::{
    device::{
        Bounds, ControlLostFn, Device, DeviceError, DeviceProvider, FeatureValue, Region, Result,
        Transport, UsbMode,
    },
    genicam::{self, FeatureTree, GenicamDocument},
    image::{pfnc_bits_per_pixel, pixel_format_value},
    stream::{
        BufferReadyFn, BufferStatus, GvTuning, NativeBuffer, Stream, StreamStatistics,
    },
};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, warn};

/// Simulated native stream.
pub struct MockStream {
    transport: Transport,
    input: Mutex<VecDeque<NativeBuffer>>,
    output: Mutex<VecDeque<NativeBuffer>>,
    listener: Mutex<Option<BufferReadyFn>>,
    emit: AtomicBool,
    stats: Mutex<StreamStatistics>,
    pushes: Mutex<HashMap<u64, usize>>,
    tuning: Mutex<Option<GvTuning>>,
    epoch: Instant,
}

impl MockStream {
    pub fn new(transport: Transport) -> Arc<Self> {
        let gv = transport == Transport::GigEVision;
        Arc::new(MockStream {
            transport,
            input: Mutex::new(VecDeque::new()),
            output: Mutex::new(VecDeque::new()),
            listener: Mutex::new(None),
            emit: AtomicBool::new(false),
            stats: Mutex::new(StreamStatistics {
                resent: gv.then_some(0),
                missing: gv.then_some(0),
                ..Default::default()
            }),
            pushes: Mutex::new(HashMap::new()),
            tuning: Mutex::new(None),
            epoch: Instant::now(),
        })
    }

    pub fn new_usb() -> Arc<Self> {
        Self::new(Transport::Usb3Vision)
    }

    pub fn new_gv() -> Arc<Self> {
        Self::new(Transport::GigEVision)
    }

    /// Fills the oldest queued buffer as frame `frame_id` with `status`,
    /// moves it to the output queue and signals the listener. Returns false
    /// and counts an underrun when no buffer is queued.
    pub fn complete_next(&self, frame_id: u64, status: BufferStatus) -> bool {
        let buffer = self.input.lock().pop_front();
        let Some(mut buffer) = buffer else {
            self.stats.lock().underruns += 1;
            return false;
        };

        if status == BufferStatus::Success {
            buffer.data_mut().fill(frame_id as u8);
        }
        buffer.status = status;
        buffer.frame_id = frame_id;
        buffer.timestamp_ns = self.epoch.elapsed().as_nanos() as u64;
        buffer.system_timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        {
            let mut stats = self.stats.lock();
            if status == BufferStatus::Success {
                stats.completed += 1;
            } else {
                stats.failures += 1;
                if let Some(missing) = stats.missing.as_mut() {
                    *missing += 1;
                }
            }
        }

        self.output.lock().push_back(buffer);
        self.notify();
        true
    }

    /// Re-signals the listener without completing a buffer.
    pub fn notify(&self) {
        if !self.emit.load(Ordering::Acquire) {
            return;
        }
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    /// Pops the oldest completed buffer.
    pub fn pop_completed(&self) -> Option<NativeBuffer> {
        self.output.lock().pop_front()
    }

    /// Buffers queued for filling.
    pub fn n_queued(&self) -> usize {
        self.input.lock().len()
    }

    /// Completed buffers not yet popped.
    pub fn n_completed(&self) -> usize {
        self.output.lock().len()
    }

    /// Buffers currently owned by the stream.
    pub fn n_owned(&self) -> usize {
        self.n_queued() + self.n_completed()
    }

    /// How many times the buffer with `id` was pushed, including its
    /// initial queueing.
    pub fn push_count(&self, id: u64) -> usize {
        self.pushes.lock().get(&id).copied().unwrap_or(0)
    }

    pub fn tuning(&self) -> Option<GvTuning> {
        self.tuning.lock().clone()
    }

    pub fn is_emitting(&self) -> bool {
        self.emit.load(Ordering::Acquire)
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }
}

impl Stream for MockStream {
    fn push_buffer(&self, buffer: NativeBuffer) {
        *self.pushes.lock().entry(buffer.id()).or_insert(0) += 1;
        self.input.lock().push_back(buffer);
    }

    fn try_pop_buffer(&self) -> Option<NativeBuffer> {
        self.output.lock().pop_front()
    }

    fn n_buffers(&self) -> (usize, usize) {
        (self.n_queued(), self.n_completed())
    }

    fn statistics(&self) -> StreamStatistics {
        *self.stats.lock()
    }

    fn set_emit_signals(&self, emit: bool) {
        self.emit.store(emit, Ordering::Release);
    }

    fn set_buffer_ready_listener(&self, listener: Option<BufferReadyFn>) {
        *self.listener.lock() = listener;
    }

    fn transport(&self) -> Transport {
        self.transport
    }

    fn tune(&self, tuning: &GvTuning) -> Result<()> {
        if self.transport != Transport::GigEVision {
            return Err(DeviceError::Sdk {
                domain: "stream".to_string(),
                code: 1,
                message: "not a GigE Vision stream".to_string(),
            });
        }
        *self.tuning.lock() = Some(tuning.clone());
        Ok(())
    }
}

struct Producer {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Simulated camera.
pub struct MockDevice {
    transport: Transport,
    tree: Option<Arc<GenicamDocument>>,
    values: Mutex<HashMap<String, FeatureValue>>,
    selected: Mutex<HashMap<(String, String), FeatureValue>>,
    selectors: HashMap<String, String>,
    commands_known: HashSet<String>,
    read_only: HashSet<String>,
    integer_bounds: HashMap<String, Bounds<i64>>,
    float_bounds: HashMap<String, Bounds<f64>>,
    read_delay: Option<Duration>,
    free_run: bool,
    writes: Mutex<Vec<(String, FeatureValue)>>,
    commands: Mutex<Vec<String>>,
    streams: Arc<Mutex<Vec<Arc<MockStream>>>>,
    stream_failures: AtomicUsize,
    stream_channel: AtomicUsize,
    frame_counter: Arc<AtomicU64>,
    usb_mode: Mutex<Option<UsbMode>>,
    control_lost: Mutex<Option<ControlLostFn>>,
    producer: Mutex<Option<Producer>>,
}

impl MockDevice {
    pub fn builder() -> MockDeviceBuilder {
        MockDeviceBuilder::default()
    }

    /// A colour GigE camera with the standard feature set, free running at
    /// the configured frame rate once acquisition starts.
    pub fn simulated() -> Arc<MockDevice> {
        Self::builder()
            .transport(Transport::GigEVision)
            .standard_features()
            .free_run(true)
            .build()
    }

    /// Successful feature writes in order.
    pub fn writes(&self) -> Vec<(String, FeatureValue)> {
        self.writes.lock().clone()
    }

    /// Successful writes to `feature`, in order.
    pub fn writes_to(&self, feature: &str) -> Vec<FeatureValue> {
        self.writes
            .lock()
            .iter()
            .filter(|(name, _)| name == feature)
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }

    /// Executed commands in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn streams(&self) -> Vec<Arc<MockStream>> {
        self.streams.lock().clone()
    }

    pub fn usb_mode(&self) -> Option<UsbMode> {
        *self.usb_mode.lock()
    }

    /// Stores a value without recording a write, as if the camera changed it
    /// by itself.
    pub fn poke(&self, feature: &str, value: impl Into<FeatureValue>) {
        let value = value.into();
        match self.selector_key(feature) {
            Some(key) => {
                self.selected.lock().insert(key, value);
            }
            None => {
                self.values.lock().insert(feature.to_owned(), value);
            }
        }
    }

    /// Completes one frame on every stream.
    pub fn trigger(&self) {
        let frame_id = self.frame_counter.fetch_add(1, Ordering::AcqRel) + 1;
        for stream in self.streams() {
            stream.complete_next(frame_id, BufferStatus::Success);
        }
    }

    /// Simulates a lost control channel.
    pub fn lose_control(&self) {
        warn!("simulated camera lost control channel");
        let callback = self.control_lost.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn selector_key(&self, feature: &str) -> Option<(String, String)> {
        let selector = self.selectors.get(feature)?;
        let value = match self.values.lock().get(selector) {
            Some(FeatureValue::String(v)) => v.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Some((feature.to_owned(), value))
    }

    fn get(&self, feature: &str) -> Result<FeatureValue> {
        if let Some(delay) = self.read_delay {
            thread::sleep(delay);
        }
        if let Some(key) = self.selector_key(feature) {
            if let Some(value) = self.selected.lock().get(&key) {
                return Ok(value.clone());
            }
        }
        self.values
            .lock()
            .get(feature)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(feature.to_owned()))
    }

    fn set(&self, feature: &str, value: FeatureValue) -> Result<()> {
        if self.read_only.contains(feature) {
            return Err(DeviceError::ReadOnly(feature.to_owned()));
        }
        let current = self.get(feature)?;
        if current.kind() != value.kind() {
            return Err(DeviceError::TypeMismatch {
                feature: feature.to_owned(),
                expected: current.kind(),
                actual: value.kind(),
            });
        }
        self.check_bounds(feature, &value)?;

        match self.selector_key(feature) {
            Some(key) => {
                self.selected.lock().insert(key, value.clone());
            }
            None => {
                self.values.lock().insert(feature.to_owned(), value.clone());
            }
        }
        self.writes.lock().push((feature.to_owned(), value));
        Ok(())
    }

    fn check_bounds(&self, feature: &str, value: &FeatureValue) -> Result<()> {
        let in_range = match value {
            FeatureValue::Integer(v) => self
                .integer_bounds
                .get(feature)
                .map_or(true, |b| (b.min..=b.max).contains(v)),
            FeatureValue::Float(v) => self
                .float_bounds
                .get(feature)
                .map_or(true, |b| (b.min..=b.max).contains(v)),
            _ => true,
        };
        if in_range {
            Ok(())
        } else {
            Err(DeviceError::OutOfRange {
                feature: feature.to_owned(),
                value: value.to_string(),
            })
        }
    }

    fn mismatch(feature: &str, expected: &'static str, actual: &FeatureValue) -> DeviceError {
        DeviceError::TypeMismatch {
            feature: feature.to_owned(),
            expected,
            actual: actual.kind(),
        }
    }

    fn start_producer(&self) {
        let mut producer = self.producer.lock();
        if producer.is_some() {
            return;
        }

        let fps = match self.get(genicam::ACQUISITION_FRAME_RATE) {
            Ok(FeatureValue::Float(fps)) if fps > 0.0 => fps,
            _ => 10.0,
        };
        let period = Duration::from_secs_f64(1.0 / fps);
        let stop = Arc::new(AtomicBool::new(false));
        let streams = self.streams.clone();
        let counter = self.frame_counter.clone();
        let stop_flag = stop.clone();

        let spawned = thread::Builder::new()
            .name("mock-camera".to_string())
            .spawn(move || {
                let mut next = Instant::now();
                while !stop_flag.load(Ordering::Acquire) {
                    next += period;
                    if let Some(delay) = next.checked_duration_since(Instant::now()) {
                        thread::sleep(delay);
                    }
                    let frame_id = counter.fetch_add(1, Ordering::AcqRel) + 1;
                    let streams = streams.lock().clone();
                    for stream in streams {
                        stream.complete_next(frame_id, BufferStatus::Success);
                    }
                }
            });

        match spawned {
            Ok(thread) => {
                info!(fps, "simulated camera free running");
                *producer = Some(Producer { stop, thread });
            }
            Err(error) => warn!(%error, "failed to start simulated camera"),
        }
    }

    fn stop_producer(&self) {
        let producer = self.producer.lock().take();
        if let Some(producer) = producer {
            producer.stop.store(true, Ordering::Release);
            if producer.thread.join().is_err() {
                warn!("simulated camera thread panicked");
            }
        }
    }

    fn trigger_mode_on(&self) -> bool {
        matches!(self.get(genicam::TRIGGER_MODE), Ok(FeatureValue::String(mode)) if mode == "On")
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.stop_producer();
    }
}

impl Device for MockDevice {
    fn transport(&self) -> Transport {
        self.transport
    }

    fn feature_tree(&self) -> Option<Arc<dyn FeatureTree>> {
        self.tree
            .clone()
            .map(|tree| tree as Arc<dyn FeatureTree>)
    }

    fn get_boolean(&self, feature: &str) -> Result<bool> {
        match self.get(feature)? {
            FeatureValue::Boolean(v) => Ok(v),
            other => Err(Self::mismatch(feature, "boolean", &other)),
        }
    }

    fn set_boolean(&self, feature: &str, value: bool) -> Result<()> {
        self.set(feature, value.into())
    }

    fn get_integer(&self, feature: &str) -> Result<i64> {
        match self.get(feature)? {
            FeatureValue::Integer(v) => Ok(v),
            FeatureValue::String(name) if feature == genicam::PIXEL_FORMAT => {
                pixel_format_value(&name).ok_or(DeviceError::OutOfRange {
                    feature: feature.to_owned(),
                    value: name,
                })
            }
            other => Err(Self::mismatch(feature, "integer", &other)),
        }
    }

    fn set_integer(&self, feature: &str, value: i64) -> Result<()> {
        self.set(feature, value.into())
    }

    fn get_float(&self, feature: &str) -> Result<f64> {
        match self.get(feature)? {
            FeatureValue::Float(v) => Ok(v),
            other => Err(Self::mismatch(feature, "float", &other)),
        }
    }

    fn set_float(&self, feature: &str, value: f64) -> Result<()> {
        self.set(feature, value.into())
    }

    fn get_string(&self, feature: &str) -> Result<String> {
        match self.get(feature)? {
            FeatureValue::String(v) => Ok(v),
            other => Err(Self::mismatch(feature, "string", &other)),
        }
    }

    fn set_string(&self, feature: &str, value: &str) -> Result<()> {
        self.set(feature, value.into())
    }

    fn integer_bounds(&self, feature: &str) -> Result<Bounds<i64>> {
        self.integer_bounds
            .get(feature)
            .copied()
            .ok_or_else(|| DeviceError::NotFound(feature.to_owned()))
    }

    fn float_bounds(&self, feature: &str) -> Result<Bounds<f64>> {
        self.float_bounds
            .get(feature)
            .copied()
            .ok_or_else(|| DeviceError::NotFound(feature.to_owned()))
    }

    fn execute_command(&self, feature: &str) -> Result<()> {
        if !self.commands_known.contains(feature) {
            return Err(DeviceError::NotFound(feature.to_owned()));
        }
        self.commands.lock().push(feature.to_owned());

        match feature {
            genicam::ACQUISITION_START if self.free_run && !self.trigger_mode_on() => {
                self.start_producer()
            }
            genicam::ACQUISITION_STOP => self.stop_producer(),
            genicam::TRIGGER_SOFTWARE => self.trigger(),
            _ => {}
        }
        Ok(())
    }

    fn region(&self) -> Result<Region> {
        Ok(Region {
            x: self.get_integer("OffsetX").unwrap_or(0),
            y: self.get_integer("OffsetY").unwrap_or(0),
            width: self.get_integer(genicam::WIDTH)?,
            height: self.get_integer(genicam::HEIGHT)?,
        })
    }

    fn set_region(&self, region: Region) -> Result<()> {
        self.set_integer("OffsetX", region.x)?;
        self.set_integer("OffsetY", region.y)?;
        self.set_integer(genicam::WIDTH, region.width)?;
        self.set_integer(genicam::HEIGHT, region.height)
    }

    fn sensor_size(&self) -> Result<(i64, i64)> {
        Ok((
            self.get_integer("SensorWidth")?,
            self.get_integer("SensorHeight")?,
        ))
    }

    fn payload_size(&self) -> Result<usize> {
        if let Ok(FeatureValue::Integer(size)) = self.get("PayloadSize") {
            return Ok(size as usize);
        }
        let region = self.region()?;
        let bits = self
            .get_integer(genicam::PIXEL_FORMAT)
            .map(pfnc_bits_per_pixel)
            .unwrap_or(8) as i64;
        Ok((region.width * region.height * bits / 8) as usize)
    }

    fn select_stream_channel(&self, channel: usize) -> Result<()> {
        self.stream_channel.store(channel, Ordering::Release);
        Ok(())
    }

    fn create_stream(&self) -> Result<Arc<dyn Stream>> {
        if self
            .stream_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DeviceError::Sdk {
                domain: "stream".to_string(),
                code: 2,
                message: "simulated stream creation failure".to_string(),
            });
        }

        let stream = MockStream::new(self.transport);
        debug!(
            channel = self.stream_channel.load(Ordering::Acquire),
            "simulated stream created"
        );
        self.streams.lock().push(stream.clone());
        Ok(stream)
    }

    fn set_usb_mode(&self, mode: UsbMode) -> Result<()> {
        *self.usb_mode.lock() = Some(mode);
        Ok(())
    }

    fn on_control_lost(&self, callback: ControlLostFn) {
        *self.control_lost.lock() = Some(callback);
    }
}

/// Builder for [`MockDevice`].
#[derive(Default)]
pub struct MockDeviceBuilder {
    transport: Option<Transport>,
    values: BTreeMap<String, FeatureValue>,
    selected: Vec<(String, String, String, FeatureValue)>,
    selectors: HashMap<String, String>,
    commands: Vec<String>,
    unimplemented: HashSet<String>,
    read_only: HashSet<String>,
    integer_bounds: HashMap<String, Bounds<i64>>,
    float_bounds: HashMap<String, Bounds<f64>>,
    tree: Option<GenicamDocument>,
    no_tree: bool,
    read_delay: Option<Duration>,
    free_run: bool,
    stream_failures: usize,
}

impl MockDeviceBuilder {
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn vendor(self, vendor: &str) -> Self {
        self.feature(genicam::DEVICE_VENDOR_NAME, vendor)
    }

    pub fn feature(mut self, name: &str, value: impl Into<FeatureValue>) -> Self {
        self.values.insert(name.to_owned(), value.into());
        self
    }

    /// Makes `feature` depend on the value of `selector`.
    pub fn selected(
        mut self,
        feature: &str,
        selector: &str,
        values: &[(&str, FeatureValue)],
    ) -> Self {
        self.selectors
            .insert(feature.to_owned(), selector.to_owned());
        for (selection, value) in values {
            self.selected.push((
                feature.to_owned(),
                selector.to_owned(),
                selection.to_string(),
                value.clone(),
            ));
        }
        self
    }

    pub fn command(mut self, name: &str) -> Self {
        self.commands.push(name.to_owned());
        self
    }

    /// Marks a feature as present in the tree but not implemented.
    pub fn unimplemented(mut self, name: &str) -> Self {
        self.unimplemented.insert(name.to_owned());
        self
    }

    pub fn read_only(mut self, name: &str) -> Self {
        self.read_only.insert(name.to_owned());
        self
    }

    pub fn integer_bounds(mut self, name: &str, min: i64, max: i64) -> Self {
        self.integer_bounds
            .insert(name.to_owned(), Bounds { min, max });
        self
    }

    pub fn float_bounds(mut self, name: &str, min: f64, max: f64) -> Self {
        self.float_bounds
            .insert(name.to_owned(), Bounds { min, max });
        self
    }

    /// Replaces the generated feature tree.
    pub fn tree(mut self, tree: GenicamDocument) -> Self {
        self.tree = Some(tree);
        self
    }

    /// Builds a device that exposes no feature tree.
    pub fn without_tree(mut self) -> Self {
        self.no_tree = true;
        self
    }

    /// Delays every feature read, widening race windows in tests.
    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Generates frames at `AcquisitionFrameRate` while acquiring.
    pub fn free_run(mut self, free_run: bool) -> Self {
        self.free_run = free_run;
        self
    }

    /// Fails the first `n` stream creations.
    pub fn stream_failures(mut self, n: usize) -> Self {
        self.stream_failures = n;
        self
    }

    /// Adds the identification, image format, acquisition, analog and
    /// trigger features of a typical colour camera.
    pub fn standard_features(self) -> Self {
        let transport = self.transport.unwrap_or(Transport::GigEVision);
        let builder = self
            .feature(genicam::DEVICE_VENDOR_NAME, "EdgeFirst")
            .feature(genicam::DEVICE_MODEL_NAME, "Simulated GenICam Camera")
            .feature(genicam::DEVICE_SERIAL_NUMBER, "SIM0001")
            .feature(genicam::DEVICE_ID, "sim-0")
            .feature(genicam::DEVICE_USER_ID, "simulated")
            .feature(genicam::DEVICE_STREAM_CHANNEL_COUNT, 1i64)
            .feature("SensorWidth", 640i64)
            .feature("SensorHeight", 480i64)
            .feature(genicam::WIDTH, 640i64)
            .feature(genicam::HEIGHT, 480i64)
            .feature("OffsetX", 0i64)
            .feature("OffsetY", 0i64)
            .integer_bounds(genicam::WIDTH, 16, 640)
            .integer_bounds(genicam::HEIGHT, 16, 480)
            .feature(genicam::PIXEL_FORMAT, "BayerRG8")
            .feature(genicam::SOURCE_SELECTOR, "Source0")
            .feature(genicam::ACQUISITION_MODE, "Continuous")
            .feature(genicam::ACQUISITION_FRAME_RATE_ENABLE, true)
            .feature(genicam::ACQUISITION_FRAME_RATE, 10.0)
            .float_bounds(genicam::ACQUISITION_FRAME_RATE, 1.0, 60.0)
            .feature(genicam::EXPOSURE_AUTO, "Continuous")
            .feature(genicam::EXPOSURE_TIME, 10_000.0)
            .float_bounds(genicam::EXPOSURE_TIME, 20.0, 1_000_000.0)
            .feature(genicam::GAIN_AUTO, "Continuous")
            .feature(genicam::GAIN_SELECTOR, "All")
            .feature(genicam::GAIN, 0.0)
            .float_bounds(genicam::GAIN, 0.0, 24.0)
            .selected(
                genicam::GAIN,
                genicam::GAIN_SELECTOR,
                &[
                    ("All", 0.0.into()),
                    ("Red", 1.0.into()),
                    ("Green", 0.0.into()),
                    ("Blue", 1.5.into()),
                ],
            )
            .feature(genicam::BLACK_LEVEL_SELECTOR, "All")
            .feature(genicam::BLACK_LEVEL, 0.0)
            .selected(
                genicam::BLACK_LEVEL,
                genicam::BLACK_LEVEL_SELECTOR,
                &[
                    ("All", 4.0.into()),
                    ("Red", 4.0.into()),
                    ("Green", 4.0.into()),
                    ("Blue", 4.0.into()),
                ],
            )
            .feature("BalanceWhiteAuto", "Continuous")
            .feature(genicam::BALANCE_RATIO_SELECTOR, "Red")
            .feature(genicam::BALANCE_RATIO, 1.0)
            .selected(
                genicam::BALANCE_RATIO,
                genicam::BALANCE_RATIO_SELECTOR,
                &[
                    ("Red", 1.8.into()),
                    ("Green", 1.0.into()),
                    ("Blue", 1.4.into()),
                ],
            )
            .feature(genicam::DEVICE_TEMPERATURE, 41.5)
            .feature(genicam::TRIGGER_SELECTOR, "FrameStart")
            .feature(genicam::TRIGGER_MODE, "Off")
            .feature(genicam::TRIGGER_SOURCE, "Software")
            .command(genicam::TRIGGER_SOFTWARE);

        match transport {
            Transport::GigEVision => builder
                .feature(genicam::GEV_STREAM_CHANNEL_COUNT, 1i64)
                .feature(genicam::GEV_SCPS_PACKET_SIZE, 1500i64)
                .feature("GevIEEE1588", true)
                .feature("GevIEEE1588Status", "Slave"),
            _ => builder,
        }
    }

    pub fn build(self) -> Arc<MockDevice> {
        let mut commands: Vec<String> = vec![
            genicam::ACQUISITION_START.to_string(),
            genicam::ACQUISITION_STOP.to_string(),
        ];
        for command in &self.commands {
            if !commands.contains(command) {
                commands.push(command.clone());
            }
        }

        let tree = if self.no_tree {
            None
        } else {
            Some(Arc::new(match self.tree {
                Some(tree) => tree,
                None => generate_tree(&self.values, &commands, &self.unimplemented),
            }))
        };

        let mut selected = HashMap::new();
        for (feature, _selector, selection, value) in self.selected {
            selected.insert((feature, selection), value);
        }

        Arc::new(MockDevice {
            transport: self.transport.unwrap_or(Transport::GigEVision),
            tree,
            values: Mutex::new(self.values.into_iter().collect()),
            selected: Mutex::new(selected),
            selectors: self.selectors,
            commands_known: commands.into_iter().collect(),
            read_only: self.read_only,
            integer_bounds: self.integer_bounds,
            float_bounds: self.float_bounds,
            read_delay: self.read_delay,
            free_run: self.free_run,
            writes: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            streams: Arc::new(Mutex::new(Vec::new())),
            stream_failures: AtomicUsize::new(self.stream_failures),
            stream_channel: AtomicUsize::new(0),
            frame_counter: Arc::new(AtomicU64::new(0)),
            usb_mode: Mutex::new(None),
            control_lost: Mutex::new(None),
            producer: Mutex::new(None),
        })
    }
}

/// Lays the features out the way device description files do: `Root` lists
/// one category, numeric features point at a register node through
/// `pValue`, and registers point back at the category through `pPort`.
fn generate_tree(
    values: &BTreeMap<String, FeatureValue>,
    commands: &[String],
    unimplemented: &HashSet<String>,
) -> GenicamDocument {
    let mut doc = GenicamDocument::new();
    let names: Vec<&str> = values
        .keys()
        .map(String::as_str)
        .chain(commands.iter().map(String::as_str))
        .chain(unimplemented.iter().map(String::as_str))
        .collect();

    doc.add_category(genicam::ROOT, &["DeviceControl"]);
    doc.add_category("DeviceControl", &names);

    for (name, value) in values {
        let (tag, register) = match value {
            FeatureValue::Boolean(_) => ("Boolean", "IntReg"),
            FeatureValue::Integer(_) => ("Integer", "IntReg"),
            FeatureValue::Float(_) => ("Float", "FloatReg"),
            FeatureValue::String(_) => ("Enumeration", "IntReg"),
        };
        let node = doc.add_feature(tag, name);
        doc.set_availability(node, true, !unimplemented.contains(name));
        doc.add_element(node, "pInvalidator", Some(name));

        let register_name = format!("{name}Reg");
        doc.add_element(node, "pValue", Some(&register_name));
        let register = doc.add_feature(register, &register_name);
        doc.add_element(register, "pPort", Some("DeviceControl"));
    }

    for name in commands {
        let node = doc.add_feature("Command", name);
        doc.add_element(node, "pValue", Some(&format!("{name}Reg")));
        doc.add_feature("IntReg", &format!("{name}Reg"));
    }

    for name in unimplemented.iter().filter(|n| !values.contains_key(*n)) {
        let node = doc.add_feature("Integer", name);
        doc.set_availability(node, true, false);
    }

    doc
}

/// Device provider over a fixed set of simulated cameras.
pub struct MockProvider {
    devices: Vec<(String, Arc<MockDevice>)>,
    enumeration_failures: AtomicUsize,
    open_failures: AtomicUsize,
    opens: AtomicUsize,
}

impl MockProvider {
    pub fn new(devices: Vec<(String, Arc<MockDevice>)>) -> Self {
        MockProvider {
            devices,
            enumeration_failures: AtomicUsize::new(0),
            open_failures: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn single(device: Arc<MockDevice>) -> Self {
        Self::new(vec![("sim-0".to_string(), device)])
    }

    /// Reports no devices for the first `n` enumerations.
    pub fn with_enumeration_failures(self, n: usize) -> Self {
        self.enumeration_failures.store(n, Ordering::Release);
        self
    }

    /// Fails the first `n` open attempts.
    pub fn with_open_failures(self, n: usize) -> Self {
        self.open_failures.store(n, Ordering::Release);
        self
    }

    /// Open attempts so far, failed ones included.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Acquire)
    }
}

impl DeviceProvider for MockProvider {
    fn device_ids(&self) -> Vec<String> {
        if self
            .enumeration_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            return Vec::new();
        }
        self.devices.iter().map(|(id, _)| id.clone()).collect()
    }

    fn open(&self, id: Option<&str>) -> Result<Arc<dyn Device>> {
        self.opens.fetch_add(1, Ordering::AcqRel);
        if self
            .open_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DeviceError::Sdk {
                domain: "device".to_string(),
                code: 3,
                message: "simulated device not responding".to_string(),
            });
        }

        let device = match id {
            Some(id) => self.devices.iter().find(|(name, _)| name == id),
            None => self.devices.first(),
        };
        match device {
            Some((_, device)) => Ok(device.clone() as Arc<dyn Device>),
            None => Err(DeviceError::NoDevice(id.unwrap_or("any").to_owned())),
        }
    }
}
