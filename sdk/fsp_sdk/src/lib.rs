//! FSP Boot Software Development Kit
//!
//! Types and helpers shared by every crate that takes part in the FSP boot-stage hand-off: alignment and size
//! helpers, the [`EfiError`](error::EfiError) type, well-known GUIDs, and a serial logger that can run before any
//! memory allocator is available.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

#[macro_use]
pub mod macros;

pub mod base;
pub mod error;
pub mod guids;
pub mod log;
pub mod serial;
