use tracing::trace;

use super::value::Value;

/// Owned reference into the [`Registry`].
///
/// Not `Clone`: releasing consumes the key, so each reference can be
/// released at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct RegistryKey {
    index: usize,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    value: Option<Value>,
}

/// Table of values kept reachable on behalf of native code
#[derive(Debug, Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
    released: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: Value) -> RegistryKey {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.live += 1;
        trace!(target: "host", "registry ref {} (gen {})", index, slot.generation);
        RegistryKey {
            index,
            generation: slot.generation,
        }
    }

    fn slot(&self, key: &RegistryKey) -> Option<&Slot> {
        self.slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)
    }

    pub fn get(&self, key: &RegistryKey) -> Option<&Value> {
        self.slot(key).and_then(|slot| slot.value.as_ref())
    }

    /// Swap the value behind a key, returning the previous one
    pub fn replace(&mut self, key: &RegistryKey, value: Value) -> Option<Value> {
        let slot = self
            .slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)?;
        slot.value.replace(value)
    }

    pub fn release(&mut self, key: RegistryKey) -> Option<Value> {
        let slot = self
            .slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)?;
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.live -= 1;
        self.released += 1;
        trace!(target: "host", "registry unref {}", key.index);
        value
    }

    /// Number of live references
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total number of releases since creation
    pub fn released_count(&self) -> u64 {
        self.released
    }
}
