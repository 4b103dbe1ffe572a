//! SMRAM Access Service Trait
//!
//! Controls visibility of SMRAM to code running outside of MM. Ranges are opened so the MM core can be copied in,
//! closed once it is running, and locked before third-party code runs. A lock holds until reset.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_sdk::error::Result;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// SMRAM Access Service
///
/// Implemented by the chipset layer. Each call applies to all SMRAM ranges.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait SmramAccess {
    /// Makes SMRAM visible outside of MM.
    fn open(&self) -> Result<()>;

    /// Hides SMRAM from code running outside of MM.
    fn close(&self) -> Result<()>;

    /// Prevents SMRAM from being opened again until reset.
    fn lock(&self) -> Result<()>;

    /// Whether SMRAM is currently open.
    fn open_state(&self) -> bool;

    /// Whether SMRAM is locked.
    fn lock_state(&self) -> bool;
}
