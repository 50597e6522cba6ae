// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Extension slot table: late-bound per-module state.
//!
//! Modules that need private state attached to the decoder (an IO backend,
//! a UI bridge, a protocol extension) install a typed value into one of 32
//! slots, partitioned by module range. Install and remove are serialized by
//! a mutex; slot values are set once and read many, so lookups take the
//! same lock but never contend in steady state. Each slot may carry a
//! teardown hook that runs when the table is dropped.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;

use crate::config::EXT_SLOTS;

/// Slot identity, partitioned by owning module family.
///
/// Engine slots 0-7, IO slots 8-15, UI slots 16-23, protocol slots 24-31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtSlotId {
    Engine(u8),
    Io(u8),
    Ui(u8),
    Protocol(u8),
}

impl ExtSlotId {
    /// Flat table index; `None` when the per-family offset is out of range.
    pub fn index(self) -> Option<usize> {
        let (base, off) = match self {
            ExtSlotId::Engine(o) => (0u8, o),
            ExtSlotId::Io(o) => (8, o),
            ExtSlotId::Ui(o) => (16, o),
            ExtSlotId::Protocol(o) => (24, o),
        };
        (off < 8).then(|| usize::from(base + off))
    }
}

type Teardown = Box<dyn FnOnce(Box<dyn Any + Send>) + Send>;

struct Slot {
    value: Box<dyn Any + Send>,
    teardown: Option<Teardown>,
}

/// Fixed-width table of typed extension slots.
pub struct ExtTable {
    slots: Mutex<HashMap<usize, Slot>>,
}

impl ExtTable {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Install a value into `id`.
    ///
    /// # Errors
    /// [`crate::Error::ExtSlot`] when the id is out of range or taken.
    pub fn install<T: Any + Send>(
        &self,
        id: ExtSlotId,
        value: T,
        teardown: Option<Teardown>,
    ) -> crate::Result<()> {
        let idx = id.index().ok_or(crate::Error::ExtSlot("offset out of range"))?;
        debug_assert!(idx < EXT_SLOTS);
        let mut slots = self.slots.lock();
        if slots.contains_key(&idx) {
            return Err(crate::Error::ExtSlot("slot already installed"));
        }
        slots.insert(
            idx,
            Slot {
                value: Box::new(value),
                teardown,
            },
        );
        Ok(())
    }

    /// Run `f` over the installed value of type `T`, if present and typed.
    pub fn with<T: Any + Send, R>(&self, id: ExtSlotId, f: impl FnOnce(&T) -> R) -> Option<R> {
        let idx = id.index()?;
        let slots = self.slots.lock();
        slots.get(&idx)?.value.downcast_ref::<T>().map(f)
    }

    /// Run `f` over a mutable installed value of type `T`.
    pub fn with_mut<T: Any + Send, R>(
        &self,
        id: ExtSlotId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let idx = id.index()?;
        let mut slots = self.slots.lock();
        slots.get_mut(&idx)?.value.downcast_mut::<T>().map(f)
    }

    /// Remove a slot, running its teardown hook.
    pub fn remove(&self, id: ExtSlotId) -> bool {
        let Some(idx) = id.index() else {
            return false;
        };
        let removed = self.slots.lock().remove(&idx);
        match removed {
            Some(slot) => {
                if let Some(td) = slot.teardown {
                    td(slot.value);
                }
                true
            }
            None => false,
        }
    }

    /// Tear down every installed slot (state destruction).
    pub fn teardown_all(&self) {
        let drained: Vec<Slot> = {
            let mut slots = self.slots.lock();
            let keys: Vec<usize> = slots.keys().copied().collect();
            keys.into_iter().filter_map(|k| slots.remove(&k)).collect()
        };
        for slot in drained {
            if let Some(td) = slot.teardown {
                td(slot.value);
            }
        }
    }
}

impl Default for ExtTable {
    fn default() -> Self {
        Self::new()
    }
}
