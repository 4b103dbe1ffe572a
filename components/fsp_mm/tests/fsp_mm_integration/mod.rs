//! FSP MM Integration Tests
//!
//! Drives the MM IPL, the communicator and the gateway against a simulated MM core that answers software MMIs from
//! the shared mailbox.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

// Shared fakes and image builders
mod common;

mod gateway_flow;
mod ipl_flow;
