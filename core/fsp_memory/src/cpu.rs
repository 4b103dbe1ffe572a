//! Processor address width discovery.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

const CPUID_EXTENDED_FUNCTION: u32 = 0x8000_0000;
const CPUID_VIR_PHY_ADDRESS_SIZE: u32 = 0x8000_0008;

/// Access to the CPUID instruction.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait CpuInfo {
    /// Returns EAX of CPUID for `leaf`.
    fn cpuid_eax(&self, leaf: u32) -> u32;
}

/// Physical address width reported by CPUID, or `fallback` if the extended leaf is not implemented.
pub fn physical_address_bits(cpu: &dyn CpuInfo, fallback: u8) -> u8 {
    if cpu.cpuid_eax(CPUID_EXTENDED_FUNCTION) >= CPUID_VIR_PHY_ADDRESS_SIZE {
        cpu.cpuid_eax(CPUID_VIR_PHY_ADDRESS_SIZE) as u8
    } else {
        fallback
    }
}

fsp_sdk::if_x64! {
    /// CPUID on the executing processor.
    #[derive(Debug, Default)]
    pub struct Cpuid;

    impl CpuInfo for Cpuid {
        fn cpuid_eax(&self, leaf: u32) -> u32 {
            // SAFETY: CPUID is available on every x86_64 processor.
            unsafe { core::arch::x86_64::__cpuid(leaf) }.eax
        }
    }
}
