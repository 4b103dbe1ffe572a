//! MM Gateway Integration Tests
//!
//! Drives the gateway and the communicate protocol against a core loaded by the IPL.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use super::common::*;

use std::cell::RefCell;

use fsp_mm::{
    component::{
        communicator::{MmCommunicator, Status},
        gateway::{EventSource, LockState, MmGateway, ProtocolPresence, GATEWAY_RULES},
    },
    service::{MmCommunication, SmramAccess},
};
use fsp_pi::hob::HobList;
use fsp_sdk::{error::EfiError, guids};
use r_efi::efi;

#[derive(Default)]
struct InstalledProtocols(RefCell<Vec<efi::Guid>>);

impl InstalledProtocols {
    fn install(&self, protocol: efi::Guid) {
        self.0.borrow_mut().push(protocol);
    }
}

impl ProtocolPresence for InstalledProtocols {
    fn is_installed(&self, protocol: &efi::Guid) -> bool {
        self.0.borrow().contains(protocol)
    }
}

fn rule_index(source: EventSource) -> usize {
    GATEWAY_RULES.iter().position(|rule| rule.source == source).unwrap()
}

#[test]
fn start_hands_environment_to_core() {
    let core = SimulatedMmCore::new();
    let access = FakeSmramAccess::default();
    let mut hobs = boot_hobs();
    let private = load_simulated_core(&mut hobs, &core, &access).unwrap();

    let communication = communication_config(0x1000);
    let communicator = MmCommunicator::entry_point(&communication, private, &access, &core);
    let protocols = InstalledProtocols::default();
    let gateway = MmGateway::new(&communicator, &protocols);

    gateway.start(&hobs, 0x7E00_1000).unwrap();

    assert_eq!(
        core.request_guids(),
        vec![guids::MM_UEFI_INFO, guids::MM_FV_DISPATCH, guids::EVENT_DXE_DISPATCH]
    );
    let requests = core.requests.borrow();
    assert_eq!(requests[0].1, 0x7E00_1000u64.to_le_bytes().to_vec());
    let mut fv_message = 0xFF80_0000u64.to_le_bytes().to_vec();
    fv_message.extend_from_slice(&0x4_0000u64.to_le_bytes());
    assert_eq!(requests[1].1, fv_message);
    assert_eq!(gateway.lock_state(), LockState::Unlocked);
    assert!((0..GATEWAY_RULES.len()).all(|index| gateway.is_subscribed(index)));
}

#[test]
fn ready_to_lock_protocol_locks_smram_once() {
    let core = SimulatedMmCore::new();
    let access = FakeSmramAccess::default();
    let mut hobs = boot_hobs();
    let private = load_simulated_core(&mut hobs, &core, &access).unwrap();

    let communication = communication_config(0x1000);
    let communicator = MmCommunicator::entry_point(&communication, private, &access, &core);
    let protocols = InstalledProtocols::default();
    let gateway = MmGateway::new(&communicator, &protocols);
    gateway.start(&hobs, 0).unwrap();
    core.requests.borrow_mut().clear();

    let ready_to_lock = EventSource::Protocol(guids::DXE_SMM_READY_TO_LOCK_PROTOCOL);
    gateway.signal(ready_to_lock);
    assert_eq!(gateway.lock_state(), LockState::Unlocked);
    assert!(core.requests.borrow().is_empty());

    protocols.install(guids::DXE_SMM_READY_TO_LOCK_PROTOCOL);
    gateway.signal(ready_to_lock);

    assert_eq!(gateway.lock_state(), LockState::Locked);
    assert!(access.lock_state());
    assert_eq!(access.locks.get(), 1);
    assert_eq!(core.request_guids(), vec![guids::DXE_SMM_READY_TO_LOCK_PROTOCOL]);
    assert!(!gateway.is_subscribed(rule_index(EventSource::Group(guids::EVENT_DXE_DISPATCH))));
    assert!(gateway.is_subscribed(rule_index(EventSource::Group(guids::END_OF_DXE_EVENT_GROUP))));

    // Dispatch requests stop after lock, while end-of-DXE is still forwarded.
    gateway.signal(EventSource::Group(guids::EVENT_DXE_DISPATCH));
    gateway.signal(EventSource::Group(guids::EVENT_READY_TO_BOOT));
    gateway.signal(EventSource::Group(guids::END_OF_DXE_EVENT_GROUP));
    assert_eq!(
        core.request_guids(),
        vec![guids::DXE_SMM_READY_TO_LOCK_PROTOCOL, guids::END_OF_DXE_EVENT_GROUP]
    );
    assert_eq!(access.locks.get(), 1);
}

#[test]
fn communicate_reaches_handler_through_mailbox() {
    let core = SimulatedMmCore::new();
    let access = FakeSmramAccess::default();
    let mut hobs = boot_hobs();
    let private = load_simulated_core(&mut hobs, &core, &access).unwrap();

    let communication = communication_config(0x200);
    let communicator = MmCommunicator::entry_point(&communication, private, &access, &core);

    let response = communicator.communicate(0, b"ping", ECHO_HANDLER).unwrap();
    assert_eq!(response, b"ping");
    let last = core.requests.borrow().last().cloned();
    assert_eq!(last, Some((ECHO_HANDLER, b"ping".to_vec())));

    let unknown = efi::Guid::from_fields(0, 0, 0, 0, 0, &[0; 6]);
    assert_eq!(communicator.communicate(0, b"ping", unknown), Err(Status::HandlerNotFound));
    assert_eq!(communicator.communicate(0, &[0u8; 0x200], ECHO_HANDLER), Err(Status::CommBufferTooSmall));
}

#[test]
fn virtual_address_change_still_uses_mailbox() {
    let core = SimulatedMmCore::new();
    let access = FakeSmramAccess::default();
    let mut hobs = boot_hobs();
    let private = load_simulated_core(&mut hobs, &core, &access).unwrap();

    let communication = communication_config(0x200);
    let communicator = MmCommunicator::entry_point(&communication, private, &access, &core);
    let protocols = InstalledProtocols::default();
    let gateway = MmGateway::new(&communicator, &protocols);
    gateway.start(&hobs, 0).unwrap();

    gateway.signal(EventSource::Group(guids::EVENT_VIRTUAL_ADDRESS_CHANGE));

    assert!(communicator.gone_virtual());
    assert_eq!(communicator.communicate(0, b"late", ECHO_HANDLER).unwrap(), b"late");
}

#[test]
fn gateway_requires_loaded_core() {
    let core = SimulatedMmCore::new();
    let access = FakeSmramAccess::default();
    let mut with_core = boot_hobs();
    let private = load_simulated_core(&mut with_core, &core, &access).unwrap();

    let communication = communication_config(0x200);
    let communicator = MmCommunicator::entry_point(&communication, private, &access, &core);
    let protocols = InstalledProtocols::default();
    let gateway = MmGateway::new(&communicator, &protocols);

    assert_eq!(gateway.start(&HobList::new(), 0), Err(EfiError::Unsupported));
    assert!((0..GATEWAY_RULES.len()).all(|index| !gateway.is_subscribed(index)));
    assert!(core.requests.borrow().is_empty());
}
