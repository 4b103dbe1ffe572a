//! Exception reporting for the stage IDT.
//!
//! Every gate points at a 16-byte stub that pushes its vector number and jumps to a common path. The common path
//! hands the stack pointer to [`common_exception_handler`], which logs the faulting location and halts. Boot-time
//! exceptions are never resumed.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Vectors below 32 for which the processor pushes an error code: 8, 10-14 and 17.
pub const ERROR_CODE_VECTORS: u32 = 0x0002_7D00;

pub const CPU_EXCEPTION_NUM: u8 = 32;

/// Distance between consecutive exception stubs.
pub const EXCEPTION_STUB_SIZE: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionReport {
    pub vector: u8,
    pub segment: u16,
    pub instruction_pointer: u64,
}

pub fn has_error_code(vector: u8) -> bool {
    vector < CPU_EXCEPTION_NUM && ERROR_CODE_VECTORS & (1 << vector) != 0
}

/// Decodes the words a stub leaves on the stack: the vector, the optional error code, then RIP and CS.
pub fn decode_frame(frame: &[u64]) -> Option<ExceptionReport> {
    let vector = *frame.first()? as u8;
    let rest = if has_error_code(vector) { frame.get(2..)? } else { frame.get(1..)? };
    Some(ExceptionReport { vector, instruction_pointer: *rest.first()?, segment: *rest.get(1)? as u16 })
}

fsp_sdk::if_x64! {
    use core::arch::global_asm;

    global_asm!(
        ".section .text",
        ".balign 16",
        ".global fsp_exception_stubs",
        "fsp_exception_stubs:",
        ".irp vector, 0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22,23,24,25,26,27,28,29,30,31,32,33",
        ".balign 16",
        "push \\vector",
        "jmp fsp_exception_common",
        ".endr",
        "fsp_exception_common:",
        "mov rcx, rsp",
        "and rsp, -16",
        "sub rsp, 0x20",
        "call {handler}",
        "2:",
        "hlt",
        "jmp 2b",
        handler = sym common_exception_handler,
    );

    unsafe extern "efiapi" {
        fn fsp_exception_stubs();
    }

    /// Address of the stub for `vector`.
    pub fn exception_stub(vector: u8) -> u64 {
        fsp_exception_stubs as usize as u64 + vector as u64 * EXCEPTION_STUB_SIZE
    }

    extern "efiapi" fn common_exception_handler(stack: *const u64) -> ! {
        // SAFETY: the stub left the vector, an optional error code, RIP and CS on the stack.
        let frame = unsafe { core::slice::from_raw_parts(stack, 4) };
        match decode_frame(frame) {
            Some(report) => fsp_sdk::fatal!(
                "Exception #{} from {:#06x}:{:#010x} !!!",
                report.vector,
                report.segment,
                report.instruction_pointer
            ),
            None => fsp_sdk::fatal!("Exception with unreadable frame"),
        }
    }
}
