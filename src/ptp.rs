// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PTP (IEEE 1588) clock supervisor.
//!
//! A camera whose clock synchronisation ends up `Faulty` or `Disabled` does
//! not recover by itself. Toggling the enable feature forces it to
//! renegotiate. The check runs on every dispatched frame while PTP
//! timestamps are in use.

use crate::device::DeviceHandle;
use std::fmt;
use tracing::warn;

pub const PTP_ENABLE: &str = "GevIEEE1588";
pub const PTP_STATUS: &str = "GevIEEE1588Status";

/// Synchronisation state reported by the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PtpStatus {
    Initializing,
    Faulty,
    Disabled,
    Listening,
    PreMaster,
    Master,
    Passive,
    Uncalibrated,
    Slave,
    Other(String),
}

impl PtpStatus {
    pub fn parse(status: &str) -> PtpStatus {
        match status {
            "Initializing" => PtpStatus::Initializing,
            "Faulty" => PtpStatus::Faulty,
            "Disabled" => PtpStatus::Disabled,
            "Listening" => PtpStatus::Listening,
            "PreMaster" => PtpStatus::PreMaster,
            "Master" => PtpStatus::Master,
            "Passive" => PtpStatus::Passive,
            "Uncalibrated" => PtpStatus::Uncalibrated,
            "Slave" => PtpStatus::Slave,
            other => PtpStatus::Other(other.to_owned()),
        }
    }

    /// Whether the device needs a reset to resume synchronisation.
    pub fn needs_reset(&self) -> bool {
        matches!(self, PtpStatus::Faulty | PtpStatus::Disabled)
    }
}

impl fmt::Display for PtpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PtpStatus::Other(status) => f.write_str(status),
            status => write!(f, "{status:?}"),
        }
    }
}

/// Reads the PTP status and, when it is `Faulty` or `Disabled`, disables
/// then re-enables PTP. Returns whether a reset was issued.
pub fn check_and_reset(device: &DeviceHandle) -> bool {
    let status = PtpStatus::parse(&device.get_string(PTP_STATUS));
    if !status.needs_reset() {
        return false;
    }

    warn!(%status, "PTP clock not synchronised, resetting");
    device.set_boolean(PTP_ENABLE, false);
    device.set_boolean(PTP_ENABLE, true);
    true
}
