//! Memory Transition Engine
//!
//! Everything the FSP-M stage does around permanent memory becoming available:
//!
//! - [`layout`] reads the platform memory size and publishes the resource descriptors for low memory, the FSP
//!   reserved region and TSEG.
//! - [`transition`] runs the memory-discovered sequence: address width query, top-of-low-memory computation, config
//!   block migration, cache reprogramming when temporary RAM is being torn down, and completion reporting.
//! - [`mtrr`] holds the fixed cache policy and an MTRR-backed [`mtrr::CacheController`].
//! - [`fv_report`] walks the FSP image for firmware volumes and searches the HOB list by owner.
//!
//! ## Logging
//!
//! All modules log with the `fsp_memory` target.
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
pub mod fv_report;
pub mod layout;
pub mod mtrr;
pub mod transition;

pub use config::MemoryLayoutConfig;
