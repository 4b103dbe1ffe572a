//! Error types for the boot-stage crates.
//!
//! [`EfiError`] mirrors the EFI status codes that can surface from the FSP and MM interfaces. [`BootError`] is the
//! coarser failure taxonomy used when reporting why a boot stage could not proceed.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;

/// A specialized [`Result`](core::result::Result) type for EFI operations.
pub type Result<T> = core::result::Result<T, EfiError>;

/// EDK II Error Code equivalent as a Rust Error enum
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EfiError {
    /// The image failed to load.
    LoadError,
    /// The parameter was incorrect.
    InvalidParameter,
    /// The operation is not supported.
    Unsupported,
    /// The buffer was not the proper size for the request.
    BadBufferSize,
    /// The buffer was not large enough to hold the requested data.
    BufferTooSmall,
    /// There is no data pending upon return.
    NotReady,
    /// The physical device reported an error while attempting the operation.
    DeviceError,
    /// The resource has run out.
    OutOfResources,
    /// An inconsistency was detected on the file system causing the operation to fail.
    VolumeCorrupted,
    /// The item was not found.
    NotFound,
    /// Access was denied.
    AccessDenied,
    /// The protocol has already been started.
    AlreadyStarted,
    /// The operation was aborted.
    Aborted,
    /// The function was not performed due to a security violation.
    SecurityViolation,
    /// An unknown EFI status code was encountered.
    Unknown(efi::Status),
}

impl EfiError {
    /// Converts an `r_efi::efi::Status` to a `Result`.
    ///
    /// If the status is `SUCCESS`, it returns `Ok(())`. Otherwise, it returns an `Err` with the corresponding
    /// `EfiError`.
    pub fn status_to_result(status: efi::Status) -> Result<()> {
        match status {
            efi::Status::SUCCESS => Ok(()),
            efi::Status::LOAD_ERROR => Err(EfiError::LoadError),
            efi::Status::INVALID_PARAMETER => Err(EfiError::InvalidParameter),
            efi::Status::UNSUPPORTED => Err(EfiError::Unsupported),
            efi::Status::BAD_BUFFER_SIZE => Err(EfiError::BadBufferSize),
            efi::Status::BUFFER_TOO_SMALL => Err(EfiError::BufferTooSmall),
            efi::Status::NOT_READY => Err(EfiError::NotReady),
            efi::Status::DEVICE_ERROR => Err(EfiError::DeviceError),
            efi::Status::OUT_OF_RESOURCES => Err(EfiError::OutOfResources),
            efi::Status::VOLUME_CORRUPTED => Err(EfiError::VolumeCorrupted),
            efi::Status::NOT_FOUND => Err(EfiError::NotFound),
            efi::Status::ACCESS_DENIED => Err(EfiError::AccessDenied),
            efi::Status::ALREADY_STARTED => Err(EfiError::AlreadyStarted),
            efi::Status::ABORTED => Err(EfiError::Aborted),
            efi::Status::SECURITY_VIOLATION => Err(EfiError::SecurityViolation),
            _ => Err(EfiError::Unknown(status)),
        }
    }
}

impl From<EfiError> for efi::Status {
    fn from(e: EfiError) -> efi::Status {
        match e {
            EfiError::LoadError => efi::Status::LOAD_ERROR,
            EfiError::InvalidParameter => efi::Status::INVALID_PARAMETER,
            EfiError::Unsupported => efi::Status::UNSUPPORTED,
            EfiError::BadBufferSize => efi::Status::BAD_BUFFER_SIZE,
            EfiError::BufferTooSmall => efi::Status::BUFFER_TOO_SMALL,
            EfiError::NotReady => efi::Status::NOT_READY,
            EfiError::DeviceError => efi::Status::DEVICE_ERROR,
            EfiError::OutOfResources => efi::Status::OUT_OF_RESOURCES,
            EfiError::VolumeCorrupted => efi::Status::VOLUME_CORRUPTED,
            EfiError::NotFound => efi::Status::NOT_FOUND,
            EfiError::AccessDenied => efi::Status::ACCESS_DENIED,
            EfiError::AlreadyStarted => efi::Status::ALREADY_STARTED,
            EfiError::Aborted => efi::Status::ABORTED,
            EfiError::SecurityViolation => efi::Status::SECURITY_VIOLATION,
            EfiError::Unknown(status) => status,
        }
    }
}

/// Why a boot stage could not proceed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BootError {
    /// A header, signature, size, or alignment check failed.
    ConfigurationInvalid,
    /// A required HOB, owner, or memory region is missing.
    ResourceNotFound,
    /// No suitable protected-memory range exists or an allocation failed.
    ResourceExhausted,
    /// The request asks for a mode this build does not implement.
    UnsupportedOperation,
    /// Hardware did not respond as programmed.
    DeviceError,
}

impl From<BootError> for EfiError {
    fn from(value: BootError) -> Self {
        match value {
            BootError::ConfigurationInvalid => EfiError::InvalidParameter,
            BootError::ResourceNotFound => EfiError::NotFound,
            BootError::ResourceExhausted => EfiError::OutOfResources,
            BootError::UnsupportedOperation => EfiError::Unsupported,
            BootError::DeviceError => EfiError::DeviceError,
        }
    }
}

impl From<BootError> for efi::Status {
    fn from(value: BootError) -> Self {
        let err: EfiError = value.into();
        err.into()
    }
}
