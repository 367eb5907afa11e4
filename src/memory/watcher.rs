use super::access::ProcessMemory;
use super::error::Result;
use crate::types::{ValueType, WatchValue};

/// Polls one typed value at a resolved address in the target process
#[derive(Clone, Debug)]
pub struct MemoryWatcher {
    name: String,
    address: usize,
    value_type: ValueType,
    previous: Option<WatchValue>,
    current: Option<WatchValue>,
}

impl MemoryWatcher {
    pub fn new(name: impl Into<String>, address: usize, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            address,
            value_type,
            previous: None,
            current: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Value seen on the tick before the last successful poll
    pub fn previous(&self) -> Option<&WatchValue> {
        self.previous.as_ref()
    }

    /// Value seen on the last successful poll
    pub fn current(&self) -> Option<&WatchValue> {
        self.current.as_ref()
    }

    /// Reads the value and shifts `current` into `previous`
    ///
    /// A failed read leaves both values untouched.
    pub fn poll<M: ProcessMemory + ?Sized>(&mut self, mem: &M) -> Result<()> {
        let bytes = mem.read_bytes(self.address, self.value_type.size())?;
        let value = WatchValue::from_bytes(&bytes, self.value_type);

        if value != self.current {
            tracing::trace!(
                "{}: {} -> {}",
                self.name,
                fmt_value(self.current.as_ref()),
                fmt_value(value.as_ref())
            );
        }

        self.previous = std::mem::replace(&mut self.current, value);
        Ok(())
    }

    /// Whether the last poll observed a different value than the one before it
    ///
    /// The first successful poll counts as a change.
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

fn fmt_value(value: Option<&WatchValue>) -> String {
    value.map_or_else(|| "<none>".to_string(), |v| v.to_string())
}

/// Named set of watchers polled together every tick
#[derive(Clone, Debug, Default)]
pub struct WatcherList {
    watchers: Vec<MemoryWatcher>,
}

impl WatcherList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, watcher: MemoryWatcher) {
        self.watchers.push(watcher);
    }

    /// Polls every watcher in declaration order, stopping at the first failure
    pub fn poll_all<M: ProcessMemory + ?Sized>(&mut self, mem: &M) -> Result<()> {
        self.watchers.iter_mut().try_for_each(|w| w.poll(mem))
    }

    pub fn get(&self, name: &str) -> Option<&MemoryWatcher> {
        self.watchers.iter().find(|w| w.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryWatcher> {
        self.watchers.iter()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    pub fn any_changed(&self) -> bool {
        self.watchers.iter().any(MemoryWatcher::changed)
    }
}
