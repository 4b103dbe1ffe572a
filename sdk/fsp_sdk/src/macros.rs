//! Macro definitions for the FSP SDK.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Includes the given items only when building for an x86_64 UEFI target, or when the "doc" feature is set.
#[macro_export]
macro_rules! if_x64 {
    ($($i:item)*) => {
        $(
            #[cfg(any(feature = "doc", all(target_os = "uefi", target_arch = "x86_64")))]
            $i
        )*
    };
}

/// Halts the processor forever after logging a fatal boot failure.
///
/// Boot-stage failures that leave the memory map or silicon state inconsistent are not recoverable. On host builds
/// the macro panics instead so the failure is observable from tests.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        $crate::base::dead_loop(format_args!($($arg)*))
    }};
}
