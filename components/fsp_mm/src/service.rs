//! Management Mode (MM) Services
//!
//! The hardware-facing services the MM IPL and communicator depend on.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub mod io_port;
pub mod platform_mm_control;
pub mod smram_access;

pub use crate::component::communicator::MmCommunication;
pub use crate::component::sw_mmi_manager::SwMmiTrigger;
pub use io_port::IoPort;
pub use platform_mm_control::PlatformMmControl;
pub use smram_access::SmramAccess;
