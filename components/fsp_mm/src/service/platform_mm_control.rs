//! Platform Management Mode (MM) Service Trait
//!
//! An optional service that may be installed by a platform to initialize the MM environment prior to software
//! MMIs being enabled.
//!
//! [`Q35MmControl`] programs the ICH9 LPC bridge found on QEMU Q35 so that a write to the APM command port raises an
//! SMI, then locks that configuration.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_sdk::error::{EfiError, Result};

use crate::service::io_port::{pci_or16, pci_read32, IoPort};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Platform Management Mode (MM) Control Service
///
/// A platform may optionally produce this service if it needs to perform any platform-specific initialization of the
/// MM environment.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait PlatformMmControl {
    /// Platform-specific initialization of the MM environment.
    fn init(&self) -> Result<()>;
}

const LPC_DEVICE: u8 = 31;
const PMBASE_REGISTER: u8 = 0x40;
const PMBASE_MASK: u32 = 0xFF80;
const SMI_EN_OFFSET: u16 = 0x30;
const SMI_EN_GBL_SMI_EN: u32 = 0x01;
const SMI_EN_APMC_EN: u32 = 0x20;
const GEN_PMCON_1_REGISTER: u8 = 0xA0;
const GEN_PMCON_1_SMI_LOCK: u16 = 0x10;

/// SMI enablement for the ICH9 LPC bridge at 0:31.0.
pub struct Q35MmControl<'a> {
    io: &'a dyn IoPort,
}

impl<'a> Q35MmControl<'a> {
    pub fn new(io: &'a dyn IoPort) -> Self {
        Self { io }
    }

    fn smi_enable_port(&self) -> u16 {
        let pm_base = pci_read32(self.io, 0, LPC_DEVICE, 0, PMBASE_REGISTER) & PMBASE_MASK;
        pm_base as u16 + SMI_EN_OFFSET
    }
}

impl PlatformMmControl for Q35MmControl<'_> {
    fn init(&self) -> Result<()> {
        let smi_en = self.smi_enable_port();
        let mut value = self.io.read32(smi_en);

        // APMC_EN already set after reset means the virtual platform has no SMI support.
        if value & SMI_EN_APMC_EN != 0 {
            log::error!(target: "mm_ipl", "Q35 platform lacks SMI support (SMI_EN = {:#x})", value);
            return Err(EfiError::Unsupported);
        }

        value |= SMI_EN_APMC_EN | SMI_EN_GBL_SMI_EN;
        self.io.write32(smi_en, value);

        pci_or16(self.io, 0, LPC_DEVICE, 0, GEN_PMCON_1_REGISTER, GEN_PMCON_1_SMI_LOCK);

        // Once locked, clearing GBL_SMI_EN must not stick.
        self.io.write32(smi_en, value & !SMI_EN_GBL_SMI_EN);
        if self.io.read32(smi_en) != value {
            log::error!(target: "mm_ipl", "Failed to lock down GBL_SMI_EN");
            return Err(EfiError::DeviceError);
        }

        log::info!(target: "mm_ipl", "SMI enabled through port {:#x}", smi_en);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::io_port::MockIoPort;
    use mockall::predicate::eq;

    const PM_BASE: u32 = 0x0600;
    const SMI_EN: u16 = 0x0630;

    fn io_with_pm_base() -> MockIoPort {
        let mut io = MockIoPort::new();
        io.expect_write32().with(eq(0xCF8), mockall::predicate::always()).return_const(());
        io.expect_read32().with(eq(0xCFC)).return_const(PM_BASE | 0x1);
        io
    }

    #[test]
    fn test_init_enables_and_locks_smi() {
        let mut io = io_with_pm_base();
        let mut reads = vec![0x0000_0000u32, 0x21];
        io.expect_read32().with(eq(SMI_EN)).times(2).returning(move |_| reads.remove(0));
        io.expect_write32().with(eq(SMI_EN), eq(0x21)).times(1).return_const(());
        io.expect_read16().with(eq(0xCFC)).times(1).return_const(0x0200u16);
        io.expect_write16().with(eq(0xCFC), eq(0x0210)).times(1).return_const(());
        io.expect_write32().with(eq(SMI_EN), eq(0x20)).times(1).return_const(());

        assert_eq!(Q35MmControl::new(&io).init(), Ok(()));
    }

    #[test]
    fn test_init_rejects_platform_without_smi() {
        let mut io = io_with_pm_base();
        io.expect_read32().with(eq(SMI_EN)).times(1).return_const(SMI_EN_APMC_EN);

        assert_eq!(Q35MmControl::new(&io).init(), Err(EfiError::Unsupported));
    }

    #[test]
    fn test_init_detects_unlocked_global_enable() {
        let mut io = io_with_pm_base();
        let mut reads = vec![0u32, 0x20];
        io.expect_read32().with(eq(SMI_EN)).times(2).returning(move |_| reads.remove(0));
        io.expect_write32().with(eq(SMI_EN), mockall::predicate::always()).times(2).return_const(());
        io.expect_read16().return_const(0u16);
        io.expect_write16().return_const(());

        assert_eq!(Q35MmControl::new(&io).init(), Err(EfiError::DeviceError));
    }
}
