//! Software Management Mode (MM) Interrupt Component
//!
//! Provides the `SwMmiTrigger` service to trigger software management mode interrupts (SWMMIs) in the MM environment.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_sdk::error::{EfiError, Result};

use crate::config::MmCommunicationConfiguration;
use crate::service::{io_port::IoPort, platform_mm_control::PlatformMmControl};

/// Software Management Mode (MM) Interrupt Trigger Service
///
/// Provides a mechanism to trigger software management mode interrupts (MMIs) in the MM environment. These are
/// synchronous interrupts: the trigger returns only after the MM handlers have finished with the request.
///
/// ## Safety
///
/// This trait is unsafe because an implementation needs to ensure that the service is only invoked after hardware
/// initialization for MMIs is complete and that the system is in a safe state to handle MMIs.
pub unsafe trait SwMmiTrigger {
    /// Triggers a software Management Mode Interrupt (MMI).
    ///
    /// `command` must be a single byte when present; the configured default command is used otherwise. Queued and
    /// periodic activation are not supported.
    ///
    /// ## Safety
    ///
    /// This function is unsafe because it may cause the system to enter a state where MMIs are not handled correctly.
    /// It is the caller's responsibility to ensure that the system is in a safe state before calling this function.
    unsafe fn trigger_sw_mmi(&self, command: Option<&[u8]>, periodic: bool, activation_interval: u64) -> Result<()>;
}

/// A component that provides the `SwMmiTrigger` service.
pub struct SwMmiManager<'a> {
    inner_config: MmCommunicationConfiguration,
    io: &'a dyn IoPort,
}

impl<'a> SwMmiManager<'a> {
    /// Initialize the `SwMmiManager` instance.
    ///
    /// The platform may optionally provide a `PlatformMmControl` service that will be invoked before the trigger
    /// service is made available.
    pub fn entry_point(
        config: &MmCommunicationConfiguration,
        io: &'a dyn IoPort,
        platform_mm_control: Option<&dyn PlatformMmControl>,
    ) -> Result<Self> {
        log::debug!(target: "mm_comm", "Initializing SwMmiManager...");

        if let Some(platform_mm_control) = platform_mm_control {
            log::debug!(target: "mm_comm", "Platform MM Control is available. Calling platform-specific init...");
            platform_mm_control.init()?;
        }

        Ok(Self { inner_config: config.clone(), io })
    }
}

unsafe impl SwMmiTrigger for SwMmiManager<'_> {
    unsafe fn trigger_sw_mmi(&self, command: Option<&[u8]>, periodic: bool, activation_interval: u64) -> Result<()> {
        if periodic || activation_interval > 0 {
            return Err(EfiError::DeviceError);
        }

        let value = match command {
            None => self.inner_config.default_command,
            Some([value]) => *value,
            Some(_) => return Err(EfiError::InvalidParameter),
        };

        log::trace!(target: "mm_comm", "Triggering SW MMI {:#x}", value);

        // The data port does not raise the MMI; the command port write does.
        self.io.write8(self.inner_config.data_port, 0);
        self.io.write8(self.inner_config.cmd_port, value);

        Ok(())
    }
}
