//! The scheduler plugin registry. Tracks every registered plugin and
//! which one is presently active; the five-phase switch in `switch.rs`
//! is what actually moves tasks and flips `active`.

use dsrtos_core::error::{Error, Kind};
use dsrtos_core::ids::PluginId;

use crate::config::MAX_PLUGINS;
use crate::scheduler::plugin::Plugin;
use crate::scheduler::PluginDescriptor;

struct Entry {
    plugin: Plugin,
    descriptor: PluginDescriptor,
    checksum: u16,
    generation: u16,
}

pub struct Registry {
    entries: [Option<Entry>; MAX_PLUGINS],
    active: Option<PluginId>,
}

const NO_ENTRY: Option<Entry> = None;

impl Registry {
    pub const fn new() -> Self {
        Self {
            entries: [NO_ENTRY; MAX_PLUGINS],
            active: None,
        }
    }

    /// Registers `plugin`, recording its descriptor's checksum at this
    /// point in time for later re-verification.
    pub fn register(&mut self, plugin: Plugin) -> Result<PluginId, Error> {
        let descriptor = plugin.descriptor();
        let checksum = descriptor.checksum();
        for (i, slot) in self.entries.iter_mut().enumerate() {
            if slot.is_none() {
                let generation = 1;
                *slot = Some(Entry {
                    plugin,
                    descriptor,
                    checksum,
                    generation,
                });
                return Ok(PluginId::new(i as u16, generation));
            }
        }
        Err(Error::new(Kind::PluginTableFull))
    }

    fn check(&self, id: PluginId) -> Result<(), Error> {
        match self.entries.get(id.index()).and_then(|e| e.as_ref()) {
            Some(e) if e.generation == id.generation() => Ok(()),
            _ => Err(Error::new(Kind::InvalidPluginId)),
        }
    }

    pub fn get(&self, id: PluginId) -> Result<&Plugin, Error> {
        self.check(id)?;
        Ok(&self.entries[id.index()].as_ref().unwrap().plugin)
    }

    pub fn get_mut(&mut self, id: PluginId) -> Result<&mut Plugin, Error> {
        self.check(id)?;
        Ok(&mut self.entries[id.index()].as_mut().unwrap().plugin)
    }

    pub fn descriptor(&self, id: PluginId) -> Result<PluginDescriptor, Error> {
        self.check(id)?;
        Ok(self.entries[id.index()].as_ref().unwrap().descriptor)
    }

    /// Re-verifies a plugin's descriptor checksum against the value
    /// recorded at registration time, the defense-in-depth check Phase 1
    /// of the switch engine performs before accepting a migration target.
    pub fn verify_checksum(&self, id: PluginId) -> Result<bool, Error> {
        self.check(id)?;
        let entry = self.entries[id.index()].as_ref().unwrap();
        Ok(entry.descriptor.checksum() == entry.checksum)
    }

    pub fn active(&self) -> Option<PluginId> {
        self.active
    }

    /// Finds the first registered plugin whose descriptor name matches
    /// `name`. Used by the decision engine's recommendation, which knows
    /// plugins only by name, to resolve an actual switch target.
    pub fn find_by_name(&self, name: &str) -> Option<PluginId> {
        self.entries.iter().enumerate().find_map(|(i, slot)| {
            let entry = slot.as_ref()?;
            (entry.descriptor.name == name).then(|| PluginId::new(i as u16, entry.generation))
        })
    }

    /// Records `id` as the active plugin. Does not itself move any tasks;
    /// `switch.rs` calls this only after Phase 4 (Activate) succeeds.
    pub fn set_active(&mut self, id: PluginId) -> Result<(), Error> {
        self.check(id)?;
        self.active = Some(id);
        Ok(())
    }

    pub fn unregister(&mut self, id: PluginId) -> Result<(), Error> {
        self.check(id)?;
        if self.active == Some(id) {
            return Err(Error::new(Kind::PluginAlreadyActive));
        }
        self.entries[id.index()] = None;
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::round_robin::RoundRobin;
    use crate::scheduler::static_priority::StaticPriority;

    #[test]
    fn register_then_activate() {
        let mut reg = Registry::new();
        let rr = reg.register(Plugin::RoundRobin(RoundRobin::new(10))).unwrap();
        assert_eq!(reg.active(), None);
        reg.set_active(rr).unwrap();
        assert_eq!(reg.active(), Some(rr));
    }

    #[test]
    fn checksum_is_stable_across_reads() {
        let mut reg = Registry::new();
        let id = reg.register(Plugin::StaticPriority(StaticPriority::new())).unwrap();
        assert!(reg.verify_checksum(id).unwrap());
    }

    #[test]
    fn unregistering_active_plugin_is_rejected() {
        let mut reg = Registry::new();
        let id = reg.register(Plugin::RoundRobin(RoundRobin::new(5))).unwrap();
        reg.set_active(id).unwrap();
        assert!(reg.unregister(id).is_err());
    }

    #[test]
    fn find_by_name_resolves_registered_plugin() {
        let mut reg = Registry::new();
        let sp = reg.register(Plugin::StaticPriority(StaticPriority::new())).unwrap();
        assert_eq!(reg.find_by_name("static-priority"), Some(sp));
        assert_eq!(reg.find_by_name("nonexistent"), None);
    }

    #[test]
    fn invalid_id_is_rejected() {
        let reg = Registry::new();
        let bogus = PluginId::new(0, 99);
        assert!(reg.get(bogus).is_err());
    }
}
