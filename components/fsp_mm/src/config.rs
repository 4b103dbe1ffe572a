//! Management Mode (MM) Configuration
//!
//! Defines the configuration used to load the MM core and to communicate with it once it is running.
//!
//! ## MM Configuration Usage
//!
//! [`MmIplConfiguration`] is consumed once by the MM IPL while it loads the MM core into SMRAM.
//! [`MmCommunicationConfiguration`] describes the software MMI ports and the communicate buffers shared with the
//! MM core. The buffers are expected to be populated at boot time from memory that outlives the MM core.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;
use core::fmt;
use core::pin::Pin;
use core::ptr::NonNull;

use r_efi::efi;
use scroll::{Pread, LE};

/// APM command port on Intel chipsets.
pub const APM_CNT_PORT: u16 = 0xB2;

/// APM status port on Intel chipsets.
pub const APM_STS_PORT: u16 = 0xB3;

/// Command value written to the command port when the caller does not supply one.
pub const DEFAULT_MMI_COMMAND: u8 = 0xFF;

/// Management Mode (MM) Communication Configuration
///
/// A standardized configuration structure for MM components to use when initializing and using MM services.
#[derive(Debug, Clone)]
pub struct MmCommunicationConfiguration {
    /// I/O port written with the MMI command value. Writing it raises the software MMI.
    pub cmd_port: u16,
    /// I/O port cleared before each trigger.
    pub data_port: u16,
    /// Value written to `cmd_port` when a trigger carries no command byte.
    pub default_command: u8,
    pub comm_buffers: Vec<CommunicateBuffer>,
}

impl Default for MmCommunicationConfiguration {
    fn default() -> Self {
        MmCommunicationConfiguration {
            cmd_port: APM_CNT_PORT,
            data_port: APM_STS_PORT,
            default_command: DEFAULT_MMI_COMMAND,
            comm_buffers: Vec::new(),
        }
    }
}

/// MM IPL Configuration
///
/// Controls where the MM core image is placed in SMRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MmIplConfiguration {
    /// Honor a load offset recorded in the MM core image when it falls within the SMRAM code region.
    pub load_module_at_fixed_address: bool,
    /// Size in pages of the SMRAM code region that fixed-address images must land in.
    pub fixed_code_page_count: u32,
}

/// UEFI MM Communicate Header
///
/// A standard header that must be present at the beginning of any MM communication buffer.
#[derive(Debug, Clone)]
#[repr(C)]
pub struct EfiMmCommunicateHeader {
    /// Allows for disambiguation of the message format.
    /// Used to identify the registered MM handlers that should be given the message.
    pub header_guid: efi::Guid,
    /// The size of Data (in bytes) and does not include the size of the header.
    pub message_length: usize,
}

impl EfiMmCommunicateHeader {
    /// Returns the communicate header as a slice of bytes.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the header is repr(C) plain data and the slice does not outlive `self`.
        unsafe { core::slice::from_raw_parts(self as *const _ as *const u8, EfiMmCommunicateHeader::size()) }
    }

    /// Reads a header from the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::size() {
            return None;
        }
        let guid_bytes: [u8; 16] = bytes[..16].try_into().ok()?;
        let message_length: u64 = bytes.pread_with(16, LE).ok()?;
        Some(Self { header_guid: efi::Guid::from_bytes(&guid_bytes), message_length: message_length as usize })
    }

    /// Returns the size of the header in bytes.
    pub const fn size() -> usize {
        core::mem::size_of::<Self>()
    }
}

/// MM Communicator Service Status Codes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommunicateBufferStatus {
    /// The buffer is too small to hold the header.
    TooSmallForHeader,
    /// The buffer is too small to hold the message.
    TooSmallForMessage,
    /// A valid recipient GUID was not provided.
    InvalidRecipient,
}

/// Management Mode (MM) Communicate Buffer
///
/// A buffer used for communication between the MM handler and the caller.
#[derive(Clone)]
pub struct CommunicateBuffer {
    /// Pointer to the buffer in memory.
    buffer: NonNull<u8>,
    /// ID of the buffer.
    id: u8,
    /// Length of the total buffer in bytes.
    length: usize,
    /// Message length in bytes.
    message_length: usize,
    /// Recipient GUID of the MM handler.
    recipient: Option<efi::Guid>,
}

impl CommunicateBuffer {
    /// Creates a new `CommunicateBuffer` with the given buffer and ID.
    ///
    /// ## Safety
    ///
    /// - The buffer must not be moved in memory while it is being used.
    /// - The buffer must not be used by any other code.
    pub unsafe fn new(buffer: Pin<&'static mut [u8]>, id: u8) -> Self {
        let buffer = Pin::into_inner(buffer);
        let length = buffer.len();
        Self { buffer: NonNull::from(buffer).cast(), id, length, message_length: 0, recipient: None }
    }

    /// Returns a reference to the buffer as a slice of bytes.
    pub fn as_slice(&self) -> &'static [u8] {
        // SAFETY: construction requires a 'static buffer of `length` bytes.
        unsafe { core::slice::from_raw_parts(self.buffer.as_ptr(), self.length) }
    }

    /// Returns a mutable reference to the buffer as a slice of bytes.
    pub fn as_slice_mut(&self) -> &'static mut [u8] {
        // SAFETY: construction requires a 'static buffer of `length` bytes owned by this object.
        unsafe { core::slice::from_raw_parts_mut(self.buffer.as_ptr(), self.length) }
    }

    /// Physical address of the buffer, as published to the MM core.
    pub fn address(&self) -> u64 {
        self.buffer.as_ptr() as u64
    }

    /// Returns the length of the buffer.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the ID of the buffer.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Clears the buffer contents and any pending message information.
    pub fn reset(&mut self) {
        self.as_slice_mut().fill(0);
        self.message_length = 0;
        self.recipient = None;
    }

    /// Sets the information needed for a communication message to be sent to the MM handler.
    ///
    /// ## Parameters
    ///
    /// - `recipient`: The GUID of the recipient MM handler.
    pub fn set_message_info(&mut self, recipient: efi::Guid) -> Result<(), CommunicateBufferStatus> {
        if self.len() < Self::message_start_offset() {
            return Err(CommunicateBufferStatus::TooSmallForHeader);
        }

        self.recipient = Some(recipient);
        Ok(())
    }

    /// Sets the data message used for communication with the MM handler.
    ///
    /// ## Parameters
    ///
    /// - `message`: The message to be sent to the MM handler. The message length in the communicate header is
    ///   set to the length of this slice.
    pub fn set_message(&mut self, message: &[u8]) -> Result<(), CommunicateBufferStatus> {
        if message.len() > self.message_capacity() {
            return Err(CommunicateBufferStatus::TooSmallForMessage);
        }
        let Some(recipient) = self.recipient else {
            return Err(CommunicateBufferStatus::InvalidRecipient);
        };
        self.message_length = message.len();

        self.as_slice_mut()[..Self::message_start_offset()].copy_from_slice(
            EfiMmCommunicateHeader { header_guid: recipient, message_length: self.message_length }.as_bytes(),
        );
        self.as_slice_mut()[Self::message_start_offset()..Self::message_start_offset() + self.message_length]
            .copy_from_slice(message);

        Ok(())
    }

    /// Size in bytes of the header plus the message most recently set.
    pub fn request_size(&self) -> usize {
        Self::message_start_offset() + self.message_length
    }

    /// The header currently in the buffer, which the MM handler may have rewritten.
    pub fn header(&self) -> Option<EfiMmCommunicateHeader> {
        EfiMmCommunicateHeader::from_bytes(self.as_slice())
    }

    /// Returns the message part of the buffer limited to `length` bytes.
    pub fn message_bytes(&self, length: usize) -> &[u8] {
        let start = Self::message_start_offset().min(self.len());
        let end = start.saturating_add(length).min(self.len());
        &self.as_slice()[start..end]
    }

    /// Mutable access to the message part of the buffer.
    pub fn message_bytes_mut(&mut self) -> &mut [u8] {
        let start = Self::message_start_offset().min(self.len());
        &mut self.as_slice_mut()[start..]
    }

    /// Returns the available capacity for the message part of the communicate buffer.
    ///
    /// Note: Zero will be returned if the buffer is too small to hold the header.
    pub fn message_capacity(&self) -> usize {
        self.len().saturating_sub(Self::message_start_offset())
    }

    /// Returns the offset in the buffer where the message starts.
    pub const fn message_start_offset() -> usize {
        EfiMmCommunicateHeader::size()
    }
}

impl fmt::Debug for CommunicateBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommunicateBuffer")
            .field("id", &self.id)
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.length)
            .field("recipient", &self.recipient)
            .field("message", &self.message_bytes(self.message_length))
            .finish()
    }
}
