//! PE/COFF Errors
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_sdk::error::EfiError;

pub type Result<T> = core::result::Result<T, Error>;

/// Type for describing errors that result from working with PE/COFF images.
#[derive(Debug)]
pub enum Error {
    /// Goblin failed to parse the PE32 image.
    ///
    /// See the enclosed goblin error for a reason why the parsing failed.
    Goblin(goblin::error::Error),
    BufferTooShort(usize, &'static str),
    Parse(scroll::Error),
    BadSignature(u16),
    /// The parsed image does not contain an Optional Header.
    NoOptionalHeader,
    /// The image is not a PE32+ image. The MM core runs in long mode.
    NotPe32Plus,
    /// A base relocation type other than absolute, high-low and dir64.
    UnsupportedRelocation(u16),
}

impl From<scroll::Error> for Error {
    fn from(e: scroll::Error) -> Self {
        Error::Parse(e)
    }
}

impl From<goblin::error::Error> for Error {
    fn from(e: goblin::error::Error) -> Self {
        Error::Goblin(e)
    }
}

impl From<Error> for EfiError {
    fn from(e: Error) -> Self {
        log::error!(target: "mm_ipl", "MM core image rejected: {:?}", e);
        match e {
            Error::BufferTooShort(..) => EfiError::BufferTooSmall,
            Error::UnsupportedRelocation(_) => EfiError::Unsupported,
            _ => EfiError::LoadError,
        }
    }
}
