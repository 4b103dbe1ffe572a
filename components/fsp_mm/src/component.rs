//! Management Mode (MM) Components
//!
//! This module provides components for interacting with MM from outside of it. These components ultimately do
//! so through the `SwMmiTrigger` service which is provided by the `SwMmiManager` component. The `MmCommunicator`
//! leverages the `SwMmiTrigger` service to exchange messages with MM, and the `MmGateway` forwards boot events to
//! the MM core through the communicator.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub mod communicator;
pub mod gateway;
pub mod sw_mmi_manager;
