// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Native acquisition stream interface.
//!
//! A [`Stream`] owns two queues: an input queue of empty buffers waiting to
//! be filled and an output queue of completed buffers. Whenever a buffer
//! completes, the stream invokes its buffer-ready listener on the stream's
//! own thread, provided signal emission is enabled.

use crate::device::{self, Transport};
use std::{fmt, sync::Arc};

/// Completion status of a native buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferStatus {
    Unknown,
    Success,
    /// Buffer was cleared before being filled.
    Cleared,
    Timeout,
    MissingPackets,
    WrongPacketId,
    /// Image did not fit in the buffer.
    SizeMismatch,
    /// Buffer is still being filled.
    Filling,
    Aborted,
    PayloadNotSupported,
}

impl BufferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferStatus::Unknown => "Unknown",
            BufferStatus::Success => "Success",
            BufferStatus::Cleared => "Cleared",
            BufferStatus::Timeout => "Timeout",
            BufferStatus::MissingPackets => "MissingPackets",
            BufferStatus::WrongPacketId => "WrongPacketId",
            BufferStatus::SizeMismatch => "SizeMismatch",
            BufferStatus::Filling => "Filling",
            BufferStatus::Aborted => "Aborted",
            BufferStatus::PayloadNotSupported => "PayloadNotSupported",
        }
    }
}

impl fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One native acquisition buffer and its backing memory.
///
/// Ownership moves between the pool, the stream's queues and the image
/// wrapping it, so a buffer can only ever be in one place at a time.
pub struct NativeBuffer {
    id: u64,
    data: Vec<u8>,
    /// Completion status set by the stream.
    pub status: BufferStatus,
    /// Frame sequence number reported by the device.
    pub frame_id: u64,
    /// Device (or PTP) timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Host receipt time in nanoseconds since the Unix epoch.
    pub system_timestamp_ns: u64,
}

impl NativeBuffer {
    pub fn new(id: u64, data: Vec<u8>) -> Self {
        NativeBuffer {
            id,
            data,
            status: BufferStatus::Unknown,
            frame_id: 0,
            timestamp_ns: 0,
            system_timestamp_ns: 0,
        }
    }

    /// Pool assigned identity, stable for the buffer's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("id", &self.id)
            .field("size", &self.data.len())
            .field("status", &self.status)
            .field("frame_id", &self.frame_id)
            .finish()
    }
}

/// Listener invoked once per completed buffer.
pub type BufferReadyFn = Arc<dyn Fn() + Send + Sync>;

/// Per-stream counters drained at teardown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStatistics {
    pub completed: u64,
    pub failures: u64,
    pub underruns: u64,
    /// Resent packets, GigE Vision only.
    pub resent: Option<u64>,
    /// Missing packets, GigE Vision only.
    pub missing: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketResend {
    Never,
    Always,
}

/// Extra options applied to GigE Vision streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GvTuning {
    pub packet_timeout_us: u32,
    pub frame_retention_us: u32,
    pub packet_resend: PacketResend,
    /// Let the driver size the socket buffer.
    pub auto_socket_buffer: bool,
}

impl Default for GvTuning {
    fn default() -> Self {
        GvTuning {
            packet_timeout_us: 40 * 1000,
            frame_retention_us: 200 * 1000,
            packet_resend: PacketResend::Always,
            auto_socket_buffer: false,
        }
    }
}

/// A native acquisition stream.
pub trait Stream: Send + Sync {
    /// Queues an empty buffer for filling.
    fn push_buffer(&self, buffer: NativeBuffer);

    /// Pops the next completed buffer without blocking.
    fn try_pop_buffer(&self) -> Option<NativeBuffer>;

    /// Returns `(input, output)` queue lengths. A zero input length means the
    /// next frame has nowhere to land.
    fn n_buffers(&self) -> (usize, usize);

    fn statistics(&self) -> StreamStatistics;

    /// Enables or disables buffer-ready callbacks.
    fn set_emit_signals(&self, emit: bool);

    fn set_buffer_ready_listener(&self, listener: Option<BufferReadyFn>);

    fn transport(&self) -> Transport;

    /// Applies network stream options. Only GigE Vision streams support this.
    fn tune(&self, tuning: &GvTuning) -> device::Result<()>;
}
