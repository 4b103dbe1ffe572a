//! DXE to MM gateway.
//!
//! Forwards boot progress events to the MM core and locks SMRAM when the platform is ready. The set of events and
//! what each one does is fixed in [`GATEWAY_RULES`]. Protocol sourced rules are evaluated once as soon as the
//! gateway starts, mirroring a protocol notification that fires immediately for interfaces already installed.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::cell::Cell;

use fsp_pi::hob::HobList;
use fsp_sdk::{error::EfiError, guids};
use r_efi::efi;

use crate::component::communicator::MmCommunicator;
use crate::smram::lock_window;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Where a rule's trigger comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// A protocol interface was installed.
    Protocol(efi::Guid),
    /// An event group was signaled.
    Group(efi::Guid),
}

impl EventSource {
    pub fn guid(&self) -> efi::Guid {
        match self {
            EventSource::Protocol(guid) | EventSource::Group(guid) => *guid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Lock SMRAM and tell the MM core. Runs at most once.
    ReadyToLock,
    /// Pass the event GUID on to the MM core.
    Forward,
    /// Run the MM driver dispatcher.
    Dispatch,
    /// Stop calling into MM handlers directly.
    GoneVirtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRule {
    pub source: EventSource,
    /// The subscription is dropped once SMRAM is locked.
    pub close_on_lock: bool,
    pub action: Action,
}

pub const GATEWAY_RULES: [EventRule; 6] = [
    EventRule {
        source: EventSource::Protocol(guids::DXE_SMM_READY_TO_LOCK_PROTOCOL),
        close_on_lock: true,
        action: Action::ReadyToLock,
    },
    EventRule { source: EventSource::Group(guids::END_OF_DXE_EVENT_GROUP), close_on_lock: false, action: Action::Forward },
    EventRule { source: EventSource::Group(guids::EVENT_DXE_DISPATCH), close_on_lock: true, action: Action::Dispatch },
    EventRule {
        source: EventSource::Group(guids::EVENT_READY_TO_BOOT),
        close_on_lock: true,
        action: Action::ReadyToLock,
    },
    EventRule { source: EventSource::Group(guids::EVENT_LEGACY_BOOT), close_on_lock: false, action: Action::Forward },
    EventRule {
        source: EventSource::Group(guids::EVENT_VIRTUAL_ADDRESS_CHANGE),
        close_on_lock: false,
        action: Action::GoneVirtual,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked,
}

/// Answers whether a protocol interface is installed.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait ProtocolPresence {
    fn is_installed(&self, protocol: &efi::Guid) -> bool;
}

/// Message sent to the MM core with the address of the UEFI system table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UefiInfoMessage {
    pub system_table: u64,
}

impl UefiInfoMessage {
    pub fn to_bytes(&self) -> [u8; 8] {
        self.system_table.to_le_bytes()
    }
}

/// Message asking the MM core to dispatch the drivers in a firmware volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FvDispatchMessage {
    pub address: u64,
    pub size: u64,
}

impl FvDispatchMessage {
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.address.to_le_bytes());
        bytes[8..].copy_from_slice(&self.size.to_le_bytes());
        bytes
    }
}

pub struct MmGateway<'a> {
    communicator: &'a MmCommunicator<'a>,
    protocols: &'a dyn ProtocolPresence,
    lock_state: Cell<LockState>,
    subscribed: Cell<[bool; GATEWAY_RULES.len()]>,
}

impl<'a> MmGateway<'a> {
    pub fn new(communicator: &'a MmCommunicator<'a>, protocols: &'a dyn ProtocolPresence) -> Self {
        Self {
            communicator,
            protocols,
            lock_state: Cell::new(LockState::Unlocked),
            subscribed: Cell::new([false; GATEWAY_RULES.len()]),
        }
    }

    /// Subscribes to the gateway events and hands the UEFI environment to the MM core.
    ///
    /// Returns `Unsupported` when `hobs` carries no MM core data, meaning no MM core was loaded.
    pub fn start(&self, hobs: &HobList, system_table: u64) -> Result<(), EfiError> {
        if hobs.guid_hob_data(&guids::MM_CORE_DATA_HOB).is_none() {
            log::warn!(target: "mm_comm", "No MM core data HOB; MM gateway not started");
            return Err(EfiError::Unsupported);
        }

        self.subscribed.set([true; GATEWAY_RULES.len()]);
        for (index, rule) in GATEWAY_RULES.iter().enumerate() {
            if matches!(rule.source, EventSource::Protocol(_)) {
                self.notify(index);
            }
        }

        self.notify_uefi_info(system_table);
        self.dispatch_firmware_volumes(hobs);
        self.dispatch_drivers();
        Ok(())
    }

    pub fn lock_state(&self) -> LockState {
        self.lock_state.get()
    }

    /// Whether the rule at `index` in [`GATEWAY_RULES`] still receives events.
    pub fn is_subscribed(&self, index: usize) -> bool {
        self.subscribed.get().get(index).copied().unwrap_or(false)
    }

    /// Delivers an event to every rule still subscribed to `source`.
    pub fn signal(&self, source: EventSource) {
        for (index, rule) in GATEWAY_RULES.iter().enumerate() {
            if rule.source == source {
                self.notify(index);
            }
        }
    }

    fn notify(&self, index: usize) {
        if !self.is_subscribed(index) {
            return;
        }
        let rule = &GATEWAY_RULES[index];
        match rule.action {
            Action::ReadyToLock => self.ready_to_lock(rule.source),
            Action::Forward => self.forward(rule.source.guid()),
            Action::Dispatch => self.dispatch_drivers(),
            Action::GoneVirtual => self.communicator.set_gone_virtual(),
        }
    }

    fn ready_to_lock(&self, source: EventSource) {
        if self.lock_state.get() == LockState::Locked {
            return;
        }

        match source {
            EventSource::Protocol(protocol) => {
                if !self.protocols.is_installed(&protocol) {
                    return;
                }
            }
            EventSource::Group(_) => {
                log::warn!(target: "mm_comm", "SMM IPL!  DXE SMM Ready To Lock Protocol not installed before Ready To Boot signal");
            }
        }

        if let Err(err) = lock_window(self.communicator.smram_access()) {
            log::warn!(target: "mm_comm", "SMRAM lock failed: {:?}", err);
        }

        let mut subscribed = self.subscribed.get();
        for (active, rule) in subscribed.iter_mut().zip(GATEWAY_RULES.iter()) {
            if rule.close_on_lock {
                *active = false;
            }
        }
        self.subscribed.set(subscribed);

        self.forward(guids::DXE_SMM_READY_TO_LOCK_PROTOCOL);
        self.lock_state.set(LockState::Locked);
    }

    fn forward(&self, guid: efi::Guid) {
        if let Err(err) = self.communicator.signal(guid, &[0]) {
            log::warn!(target: "mm_comm", "Forwarding {:?} to MM failed: {:?}", guid, err);
        }
    }

    fn notify_uefi_info(&self, system_table: u64) {
        log::info!(target: "mm_comm", "SmmIplNotifyUefiInfo");
        let message = UefiInfoMessage { system_table };
        if let Err(err) = self.communicator.signal(guids::MM_UEFI_INFO, &message.to_bytes()) {
            log::warn!(target: "mm_comm", "UEFI info not delivered to MM: {:?}", err);
        }
    }

    fn dispatch_firmware_volumes(&self, hobs: &HobList) {
        log::info!(target: "mm_comm", "SmmIplDispatchFv");
        for fv in hobs.fv2_volumes() {
            log::info!(target: "mm_comm", "Fv Base - {:#x}, Length - {:#x}", fv.base_address, fv.length);
            let message = FvDispatchMessage { address: fv.base_address, size: fv.length };
            if let Err(err) = self.communicator.signal(guids::MM_FV_DISPATCH, &message.to_bytes()) {
                log::warn!(target: "mm_comm", "FV dispatch request failed: {:?}", err);
            }
        }
    }

    fn dispatch_drivers(&self) {
        log::info!(target: "mm_comm", "SmmIplDispatchDriver");
        if let Err(err) = self.communicator.run_dispatcher() {
            log::warn!(target: "mm_comm", "MM driver dispatch failed: {:?}", err);
        }
    }
}
