//! Stage Dispatch Loader
//!
//! The boot-loader stage that drives the FSP components from reset to the payload:
//!
//! 1. Build a temporary-RAM [`GlobalContext`](fsp_context::GlobalContext), a GDT and an IDT whose lookup word points
//!    at the context.
//! 2. Call FSP-M memory-init with a patched copy of its default UPD.
//! 3. Carve the loader pool below the FSP reserved region, relocate the context and the tables into it, and switch
//!    to a stack in permanent memory.
//! 4. Call temp-RAM-exit, silicon-init and the three notify phases.
//! 5. Read the payload entry point from the slot below the FSP area and jump to it.
//!
//! The sequence is modelled by [`stage::StageLoader`]. FSP entry points are reached through the validated
//! [`fsp_api::FspBinary`] capability, and everything that touches processor state goes through
//! [`cpu::StageCpu`], so the ordering rules can be exercised on the host.
//!
//! ## Logging
//!
//! All modules log with the `fsp_boot` target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

extern crate alloc;

pub mod config;
pub mod cpu;
pub mod fsp_api;
pub mod pool;
pub mod stage;

pub use config::LoaderConfig;
pub use stage::{Stage, StageLoader};
