//! ## MM Technology Background (x86 Architecture)
//!
//! System Management Mode (SMM) or Management Mode (MM) is a special-purpose operating mode in x86 architecture
//! with high execution privilege that is used to monitor and manage various system resources. MM code executes in a
//! region of memory that is isolated from the rest of the system, System Management RAM (SMRAM), which is not
//! accessible to software running outside of MM once it is closed and locked.
//!
//! MM is entered by triggering a System Management Interrupt (SMI), also called a Management Mode Interrupt (MMI).
//! Software raises one synchronously by writing a command value to the APM control port. The processor saves its
//! state, switches to MM, runs the MM core's handlers and returns to the interrupted code.
//!
//! ## Crate Layout
//!
//! - [`ipl`] loads the standalone MM core image from a firmware volume into SMRAM, relocates it and runs its entry
//!   point with the HOB list. [`smram`] holds the SMRAM range table the IPL selects and carves from.
//! - [`component::communicator`] implements the MM communicate protocol over a shared mailbox in
//!   [`core_private`], raising software MMIs through [`component::sw_mmi_manager`].
//! - [`component::gateway`] forwards boot events to the MM core and locks SMRAM when the platform is ready.
//! - [`pecoff`] loads and relocates PE32+ images.
//!
//! ## Examples and Usage
//!
//! ```rust
//! use fsp_mm::service::MmCommunication;
//! use r_efi::efi;
//!
//! const VERSION_HANDLER: efi::Guid =
//!     efi::Guid::from_fields(0x8c633b23, 0x1260, 0x4ea6, 0x83, 0x0f, &[0x7d, 0xdc, 0x97, 0x38, 0x21, 0x11]);
//!
//! fn handler_version(mm_comm: &dyn MmCommunication) -> Option<u32> {
//!     let response = mm_comm.communicate(0, &1u32.to_le_bytes(), VERSION_HANDLER).ok()?;
//!     Some(u32::from_le_bytes(response.get(..4)?.try_into().ok()?))
//! }
//! ```
//!
//! ## Logging
//!
//! The IPL and SMRAM window helpers log with the `mm_ipl` target. The communicator, software MMI trigger and
//! gateway log with the `mm_comm` target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

extern crate alloc;

pub mod component;
pub mod config;
pub mod core_private;
pub mod ipl;
pub mod pecoff;
pub mod service;
pub mod smram;
