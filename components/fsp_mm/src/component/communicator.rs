//! Management Mode (MM) Communicator Service
//!
//! Provides a MM communication service that can be used to send and receive messages to MM handlers.
//!
//! A request is carried in a [`CommunicateBuffer`]: a header naming the handler and the message length, followed by
//! the message. When the MM core is not running and has registered its MMI entry point, the buffer address and size
//! are posted to the [`MmCorePrivate`] mailbox and a software MMI is raised. The MMI returns only after the MM core
//! has handled the request and written the reply size and status back to the mailbox.
//!
//! Before the entry point is registered, or from inside MM, the request is handed straight to the MM core's
//! handler dispatcher through [`SmiManage`]. That path is refused once the firmware has switched to virtual
//! addressing, and from outside MM while SMRAM is closed or locked.
//!
//! Only one request may be outstanding. The communicator is not re-entrant.
//!
//! ## Logging
//!
//! Detailed logging is available for this component using the `mm_comm` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{boxed::Box, vec::Vec};
use core::cell::{Cell, RefCell};
use core::fmt::{self, Debug};

use fsp_sdk::{base::MAX_BIT, error::EfiError, guids};
use r_efi::efi;

use crate::config::{CommunicateBuffer, EfiMmCommunicateHeader, MmCommunicationConfiguration};
use crate::core_private::MmCorePrivate;
use crate::service::{smram_access::SmramAccess, SwMmiTrigger};
use crate::smram::close_window;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Reply byte of a driver dispatch request: the MM core hit an error.
pub const MM_DISPATCH_ERROR: u8 = 0;
/// Reply byte of a driver dispatch request: every driver was dispatched.
pub const MM_DISPATCH_SUCCESS: u8 = 1;
/// Reply byte of a driver dispatch request: more drivers are pending and the request should be sent again.
pub const MM_DISPATCH_RESTART: u8 = 2;

/// Trait for handling MM execution behavior.
///
/// This trait abstracts the actual MM execution logic so testing can
/// be performed without invoking real MM transitions.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait MmExecutor {
    /// Execute MM with the given communication buffer.
    ///
    /// The buffer address and size have already been posted to the MM core mailbox. Returns once the MM core has
    /// written its reply.
    fn execute_mm(&self, comm_buffer: &mut CommunicateBuffer) -> Result<(), Status>;
}

/// The MM core's handler dispatcher, used when no software MMI is needed.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait SmiManage {
    /// Runs the handlers registered for `handler_type` over `data`.
    ///
    /// `size` holds the message length on entry and the reply length on return.
    fn smi_manage(&self, handler_type: &efi::Guid, data: &mut [u8], size: &mut usize) -> efi::Status;
}

/// Real MM Executor that uses the SW MMI trigger service
///
/// This is the production implementation that actually triggers MM execution
/// via the software MMI trigger service.
pub struct RealMmExecutor<'a> {
    sw_mmi_trigger_service: &'a dyn SwMmiTrigger,
    command: Option<u8>,
}

impl<'a> RealMmExecutor<'a> {
    /// Creates a new MM executor instance that raises the default MMI command.
    pub fn new(sw_mmi_trigger_service: &'a dyn SwMmiTrigger) -> Self {
        Self { sw_mmi_trigger_service, command: None }
    }

    /// Creates a new MM executor instance that raises `command`.
    pub fn with_command(sw_mmi_trigger_service: &'a dyn SwMmiTrigger, command: u8) -> Self {
        Self { sw_mmi_trigger_service, command: Some(command) }
    }
}

impl MmExecutor for RealMmExecutor<'_> {
    fn execute_mm(&self, _comm_buffer: &mut CommunicateBuffer) -> Result<(), Status> {
        log::debug!(target: "mm_comm", "Triggering SW MMI for MM communication");
        let command = self.command.as_ref().map(core::slice::from_ref);
        // SAFETY: the communicator is only built once the MM core is loaded and MMIs are enabled.
        unsafe { self.sw_mmi_trigger_service.trigger_sw_mmi(command, false, 0) }.map_err(|err| {
            log::error!(target: "mm_comm", "SW MMI trigger failed: {:?}", err);
            Status::SwMmiFailed
        })
    }
}

/// MM Communicator Service Status Codes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    /// No communication buffers are available.
    NoCommBuffer,
    /// The specified communication buffer was not found.
    CommBufferNotFound,
    /// The specified communication buffer is too small for the operation.
    CommBufferTooSmall,
    /// An error occurred while initializing the communication buffer contents.
    CommBufferInitError,
    /// The given data buffer is empty or invalid.
    InvalidDataBuffer,
    /// The SW MMI Trigger service is not available.
    SwMmiServiceNotAvailable,
    /// The SW MMI Trigger failed.
    SwMmiFailed,
    /// Failed to retrieve a valid response from the communication buffer.
    InvalidResponse,
    /// The request was refused: the size is too small for the header, virtual addressing is active, or SMRAM is
    /// not accessible.
    InvalidParameter,
    /// No MM handler accepted the request.
    HandlerNotFound,
    /// The MM core returned a failing status.
    MmHandlerFailed(efi::Status),
}

impl From<Status> for EfiError {
    fn from(status: Status) -> Self {
        match status {
            Status::NoCommBuffer | Status::CommBufferNotFound | Status::HandlerNotFound => EfiError::NotFound,
            Status::CommBufferTooSmall => EfiError::BufferTooSmall,
            Status::CommBufferInitError | Status::InvalidDataBuffer | Status::InvalidParameter => {
                EfiError::InvalidParameter
            }
            Status::SwMmiServiceNotAvailable => EfiError::NotReady,
            Status::SwMmiFailed | Status::InvalidResponse => EfiError::DeviceError,
            Status::MmHandlerFailed(status) => match EfiError::status_to_result(status) {
                Err(err) => err,
                Ok(()) => EfiError::DeviceError,
            },
        }
    }
}

/// MM Communication Trait
///
/// Provides a mechanism for components to communicate with MM handlers.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait MmCommunication {
    /// Sends messages via a communication ("comm") buffer to a MM handler and receives a response.
    ///
    /// # Parameters
    ///
    /// - `id`: The ID of the comm buffer to use.
    /// - `data_buffer`: The data to send to the MM handler.
    /// - `recipient`: The GUID of the recipient MM handler.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<u8>)`: The response data from the MM handler.
    /// - `Err(Status)`: An error status indicating the failure reason.
    fn communicate(&self, id: u8, data_buffer: &[u8], recipient: efi::Guid) -> Result<Vec<u8>, Status>;
}

/// MM Communicator Service
///
/// Provides a mechanism for components to communicate with MM handlers.
///
/// Allows sending messages via a communication ("comm") buffer and receiving responses from the MM handler where
/// the response is stored in the same buffer.
pub struct MmCommunicator<'a> {
    comm_buffers: RefCell<Vec<CommunicateBuffer>>,
    core: &'a MmCorePrivate,
    smram_access: &'a dyn SmramAccess,
    mm_executor: Option<Box<dyn MmExecutor + 'a>>,
    smi_manage: Option<&'a dyn SmiManage>,
    gone_virtual: Cell<bool>,
}

impl<'a> MmCommunicator<'a> {
    /// Create a new `MmCommunicator` instance without a way to raise MMIs.
    pub fn new(
        config: &MmCommunicationConfiguration,
        core: &'a MmCorePrivate,
        smram_access: &'a dyn SmramAccess,
    ) -> Self {
        Self {
            comm_buffers: RefCell::new(config.comm_buffers.clone()),
            core,
            smram_access,
            mm_executor: None,
            smi_manage: None,
            gone_virtual: Cell::new(false),
        }
    }

    /// Create a new `MmCommunicator` instance that raises MMIs through `sw_mmi_trigger`.
    pub fn entry_point(
        config: &MmCommunicationConfiguration,
        core: &'a MmCorePrivate,
        smram_access: &'a dyn SmramAccess,
        sw_mmi_trigger: &'a dyn SwMmiTrigger,
    ) -> Self {
        log::info!(target: "mm_comm", "MM Communicator entry...");
        let communicator =
            Self::new(config, core, smram_access).with_executor(Box::new(RealMmExecutor::new(sw_mmi_trigger)));
        log::info!(
            target: "mm_comm",
            "MM Communicator initialized with {} communication buffers",
            communicator.comm_buffers.borrow().len()
        );
        communicator
    }

    /// Replaces the MM executor.
    pub fn with_executor(mut self, executor: Box<dyn MmExecutor + 'a>) -> Self {
        self.mm_executor = Some(executor);
        self
    }

    /// Enables requests without a software MMI through the MM core's handler dispatcher.
    pub fn with_smi_manage(mut self, smi_manage: &'a dyn SmiManage) -> Self {
        self.smi_manage = Some(smi_manage);
        self
    }

    /// Set communication buffers for testing purposes.
    pub fn set_test_comm_buffers(&self, buffers: Vec<CommunicateBuffer>) {
        *self.comm_buffers.borrow_mut() = buffers;
    }

    /// Records that the firmware switched to virtual addressing, which rules out direct handler calls.
    pub fn set_gone_virtual(&self) {
        self.gone_virtual.set(true);
    }

    pub fn gone_virtual(&self) -> bool {
        self.gone_virtual.get()
    }

    pub fn core(&self) -> &'a MmCorePrivate {
        self.core
    }

    pub fn smram_access(&self) -> &'a dyn SmramAccess {
        self.smram_access
    }

    /// Sends the request already placed in buffer `id`.
    ///
    /// `comm_size` is the header plus message length on entry and the reply size on return. A failing status from
    /// the MM core is returned with the high bit set. On the direct path `NOT_FOUND` from the handler dispatcher is
    /// passed through unchanged so that "no handler" stays distinct from "handler failed". Requests the communicator
    /// itself refuses return `INVALID_PARAMETER`, and requests it cannot deliver return `UNSUPPORTED`.
    pub fn communicate_raw(&self, id: u8, comm_size: &mut usize) -> efi::Status {
        let mut comm_buffers = self.comm_buffers.borrow_mut();
        let Some(comm_buffer) = comm_buffers.iter_mut().find(|x| x.id() == id) else {
            log::warn!(target: "mm_comm", "Communication buffer not found: id={}", id);
            return efi::Status::INVALID_PARAMETER;
        };
        match self.send(comm_buffer, comm_size) {
            Ok(status) => status,
            Err(Status::InvalidParameter) => efi::Status::INVALID_PARAMETER,
            Err(_) => efi::Status::UNSUPPORTED,
        }
    }

    /// Delivers the request in `comm_buffer`.
    ///
    /// `Ok` carries the status reported by the MM side. `Err` means the request never reached a handler.
    fn send(&self, comm_buffer: &mut CommunicateBuffer, comm_size: &mut usize) -> Result<efi::Status, Status> {
        if *comm_size < EfiMmCommunicateHeader::size() || *comm_size > comm_buffer.len() {
            return Err(Status::InvalidParameter);
        }

        if !self.core.in_mm() && self.core.entry_point_registered() {
            let Some(mm_executor) = self.mm_executor.as_ref() else {
                log::error!(target: "mm_comm", "MM Executor not available");
                return Err(Status::SwMmiServiceNotAvailable);
            };

            self.core.post_request(comm_buffer.address(), *comm_size as u64);
            log::debug!(target: "mm_comm", "Executing MM communication");
            if let Err(err) = mm_executor.execute_mm(comm_buffer) {
                log::error!(target: "mm_comm", "MM execution failed: {:?}", err);
                self.core.clear_request();
                return Err(Status::SwMmiFailed);
            }

            *comm_size = self.core.buffer_size() as usize;
            self.core.clear_request();

            let status = self.core.return_status();
            if status != efi::Status::SUCCESS {
                return Ok(efi::Status::from_usize(status.as_usize() | MAX_BIT));
            }
            return Ok(status);
        }

        if self.gone_virtual.get() {
            return Err(Status::InvalidParameter);
        }

        if !self.core.in_mm() && (!self.smram_access.open_state() || self.smram_access.lock_state()) {
            return Err(Status::InvalidParameter);
        }

        let Some(smi_manage) = self.smi_manage else {
            log::debug!(target: "mm_comm", "No MM handler dispatcher available outside of an MMI");
            return Err(Status::SwMmiFailed);
        };
        let Some(header) = comm_buffer.header() else {
            return Err(Status::InvalidParameter);
        };

        let old_in_mm = self.core.set_in_mm(true);

        let mut size = *comm_size - EfiMmCommunicateHeader::size();
        let status = smi_manage.smi_manage(&header.header_guid, comm_buffer.message_bytes_mut(), &mut size);
        *comm_size = size + EfiMmCommunicateHeader::size();

        self.core.set_in_mm(old_in_mm);

        Ok(match status {
            efi::Status::SUCCESS | efi::Status::NOT_FOUND => status,
            _ => efi::Status::from_usize(status.as_usize() | MAX_BIT),
        })
    }

    /// Sends `data` to `recipient` through the first communication buffer.
    pub fn signal(&self, recipient: efi::Guid, data: &[u8]) -> Result<Vec<u8>, Status> {
        let id = self.comm_buffers.borrow().first().map(|b| b.id()).ok_or(Status::NoCommBuffer)?;
        self.communicate(id, data, recipient)
    }

    /// Asks the MM core to dispatch its drivers, repeating the request for as long as it asks for a restart.
    ///
    /// SMRAM is closed before each repeated request. Returns the number of restarts.
    pub fn run_dispatcher(&self) -> Result<usize, Status> {
        let mut restarts = 0;
        loop {
            let response = self.signal(guids::EVENT_DXE_DISPATCH, &[MM_DISPATCH_ERROR])?;
            if response.first() != Some(&MM_DISPATCH_RESTART) {
                log::debug!(target: "mm_comm", "MM driver dispatch finished after {} restarts", restarts);
                return Ok(restarts);
            }
            restarts += 1;
            if let Err(err) = close_window(self.smram_access) {
                log::warn!(target: "mm_comm", "Could not close SMRAM before dispatch restart: {:?}", err);
            }
        }
    }
}

impl Debug for MmCommunicator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MM Communicator:")?;
        for buffer in self.comm_buffers.borrow().iter() {
            writeln!(f, "Comm Buffer: {buffer:?}")?;
        }
        writeln!(f, "MM Executor Set: {}", self.mm_executor.is_some())?;
        writeln!(f, "Direct Dispatch Set: {}", self.smi_manage.is_some())?;
        Ok(())
    }
}

impl MmCommunication for MmCommunicator<'_> {
    fn communicate(&self, id: u8, data_buffer: &[u8], recipient: efi::Guid) -> Result<Vec<u8>, Status> {
        log::debug!(target: "mm_comm", "Starting MM communication: buffer_id={}, data_size={}, recipient={:?}", id, data_buffer.len(), recipient);

        if self.comm_buffers.borrow().is_empty() {
            log::warn!(target: "mm_comm", "No communication buffers available");
            return Err(Status::NoCommBuffer);
        }

        if data_buffer.is_empty() {
            log::warn!(target: "mm_comm", "Invalid data buffer: empty");
            return Err(Status::InvalidDataBuffer);
        }

        if self.mm_executor.is_none() && self.smi_manage.is_none() {
            log::error!(target: "mm_comm", "MM Executor not available");
            return Err(Status::SwMmiServiceNotAvailable);
        }

        let mut comm_buffers = self.comm_buffers.borrow_mut();
        let comm_buffer: &mut CommunicateBuffer = comm_buffers.iter_mut().find(|x| x.id() == id).ok_or_else(|| {
            log::warn!(target: "mm_comm", "Communication buffer not found: id={}", id);
            Status::CommBufferNotFound
        })?;

        let total_required_comm_buffer_length = EfiMmCommunicateHeader::size() + data_buffer.len();
        if comm_buffer.len() < total_required_comm_buffer_length {
            log::warn!(target: "mm_comm", "Communication buffer too small: available={}, required={}", comm_buffer.len(), total_required_comm_buffer_length);
            return Err(Status::CommBufferTooSmall);
        }

        comm_buffer.reset();
        comm_buffer.set_message_info(recipient).map_err(|err| {
            log::error!(target: "mm_comm", "Failed to set message info: {:?}", err);
            Status::CommBufferInitError
        })?;
        comm_buffer.set_message(data_buffer).map_err(|err| {
            log::error!(target: "mm_comm", "Failed to set message data: {:?}", err);
            Status::CommBufferInitError
        })?;

        log::debug!(target: "mm_comm", "Request Data (hex): {:02X?}", &data_buffer[..core::cmp::min(data_buffer.len(), 64)]);
        log::trace!(target: "mm_comm", "Comm buffer before request: {:?}", comm_buffer);

        let mut comm_size = comm_buffer.request_size();
        match self.send(comm_buffer, &mut comm_size)? {
            efi::Status::SUCCESS => {}
            efi::Status::NOT_FOUND => return Err(Status::HandlerNotFound),
            status => {
                log::warn!(target: "mm_comm", "MM handler returned {:#x}", status.as_usize());
                return Err(Status::MmHandlerFailed(status));
            }
        }

        if comm_size < EfiMmCommunicateHeader::size() || comm_size > comm_buffer.len() {
            log::error!(target: "mm_comm", "Invalid response size: {}", comm_size);
            return Err(Status::InvalidResponse);
        }

        let response = comm_buffer.message_bytes(comm_size - EfiMmCommunicateHeader::size()).to_vec();
        log::debug!(target: "mm_comm", "MM communication response received: size={}", response.len());

        Ok(response)
    }
}
