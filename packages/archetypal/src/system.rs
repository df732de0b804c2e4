//! Systems and the passes they run in.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::world::World;

/// A unit of behaviour which runs over the world.
///
/// Systems are installed into named passes of a `SystemManager`. Each system
/// type appears at most once in a pass.
pub trait System: Any {
    /// Called once when the system is installed.
    fn initialize(&mut self, _world: &World) {}

    /// Called once when the system is replaced, removed or its manager is
    /// dropped.
    fn terminate(&mut self) {}

    /// Run the system.
    ///
    /// `parameter` is the value supplied for this system's type in the
    /// `SystemParameters` the pass was run with, if any.
    fn run(&mut self, world: &World, parameter: Option<&mut dyn Any>);
}

/// Per-run arguments for systems, keyed by system type.
#[derive(Default)]
pub struct SystemParameters<'a> {
    parameters: HashMap<TypeId, &'a mut dyn Any>,
}

impl<'a> SystemParameters<'a> {
    /// Create an empty parameter set.
    pub fn new() -> SystemParameters<'a> {
        SystemParameters::default()
    }

    /// Supply a parameter to the system `S`.
    pub fn with<S: System>(mut self, parameter: &'a mut dyn Any) -> Self {
        self.insert::<S>(parameter);
        self
    }

    /// Supply a parameter to the system `S`, replacing any previous one.
    pub fn insert<S: System>(&mut self, parameter: &'a mut dyn Any) {
        self.parameters.insert(TypeId::of::<S>(), parameter);
    }

    /// Get the parameter supplied for a system type.
    pub fn get_mut(&mut self, system: TypeId) -> Option<&mut dyn Any> {
        match self.parameters.get_mut(&system) {
            Some(parameter) => Some(&mut **parameter),
            None => None,
        }
    }

    /// Returns true if no parameters were supplied.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[derive(Clone)]
struct SystemEntry {
    type_id: TypeId,
    name: &'static str,
    system: Rc<RefCell<dyn System>>,
    any: Rc<dyn Any>,
}

impl SystemEntry {
    fn new<S: System>(system: S) -> (SystemEntry, Rc<RefCell<S>>) {
        let system = Rc::new(RefCell::new(system));
        let entry = SystemEntry {
            type_id: TypeId::of::<S>(),
            name: type_name::<S>(),
            system: system.clone(),
            any: system.clone(),
        };
        (entry, system)
    }

    fn is_running(&self) -> bool {
        self.system.try_borrow_mut().is_err()
    }

    fn terminate(&self) {
        match self.system.try_borrow_mut() {
            Ok(mut system) => system.terminate(),
            Err(_) => warn!(system = self.name, "cannot terminate running system"),
        }
    }
}

struct SystemPass {
    name: String,
    systems: Vec<SystemEntry>,
}

impl SystemPass {
    fn position(&self, type_id: TypeId) -> Option<usize> {
        self.systems.iter().position(|entry| entry.type_id == type_id)
    }
}

/// A handle to the systems of a pass, detached from the `SystemManager`.
///
/// Running a pass through `World::run_pass` uses this so that systems can
/// reach the `SystemManager` themselves while they run.
#[derive(Clone, Default)]
pub struct PassSystems {
    systems: Vec<SystemEntry>,
}

impl PassSystems {
    /// Return the number of systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns true if there are no systems.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Run every system in order.
    pub fn run(&self, world: &World, parameters: &mut SystemParameters<'_>) {
        for entry in &self.systems {
            let mut system = match entry.system.try_borrow_mut() {
                Ok(system) => system,
                Err(_) => {
                    warn!(system = entry.name, "skipping system which is already running");
                    continue;
                }
            };

            system.run(world, parameters.get_mut(entry.type_id));
        }
    }
}

/// Groups systems into ordered, named passes.
///
/// Passes are created on first use and kept in creation order. Within a
/// pass, systems run in installation order. Dropping the manager terminates
/// every installed system.
#[derive(Default)]
pub struct SystemManager {
    passes: Vec<SystemPass>,
}

impl SystemManager {
    /// Create a new system manager with no passes.
    pub fn new() -> SystemManager {
        SystemManager::default()
    }

    /// Return the names of every pass, in creation order.
    pub fn passes(&self) -> impl Iterator<Item = &str> + '_ {
        self.passes.iter().map(|pass| pass.name.as_str())
    }

    /// Return the number of systems installed in a pass.
    pub fn pass_len(&self, pass: &str) -> usize {
        self.pass(pass).map_or(0, |pass| pass.systems.len())
    }

    /// Install a system into a pass, initializing it.
    ///
    /// If the pass already has a system of this type, the old one is
    /// terminated and the new one takes its place in the run order. Returns
    /// `None`, leaving the old system installed and `system` uninitialized, if
    /// the old system is running.
    pub fn set_system<S: System>(&mut self, world: &World, pass: &str, system: S) -> Option<Rc<RefCell<S>>> {
        let pass_index = match self.passes.iter().position(|p| p.name == pass) {
            Some(index) => index,
            None => {
                self.passes.push(SystemPass { name: pass.to_string(), systems: Vec::new() });
                self.passes.len() - 1
            }
        };

        let existing = self.passes[pass_index].position(TypeId::of::<S>());
        if let Some(index) = existing {
            let old = &self.passes[pass_index].systems[index];
            if old.is_running() {
                warn!(pass, system = old.name, "cannot replace running system");
                return None;
            }

            old.terminate();
            debug!(pass, system = old.name, "terminated replaced system");
        }

        let (entry, system) = SystemEntry::new(system);
        system.borrow_mut().initialize(world);

        let target = &mut self.passes[pass_index];
        match existing {
            Some(index) => target.systems[index] = entry,
            None => {
                debug!(pass, system = entry.name, "installed system");
                target.systems.push(entry);
            }
        }

        Some(system)
    }

    /// Install a default-constructed system into a pass.
    pub fn add_system<S: System + Default>(&mut self, world: &World, pass: &str) -> Option<Rc<RefCell<S>>> {
        self.set_system(world, pass, S::default())
    }

    /// Returns true if the pass has a system of type `S`.
    pub fn has_system<S: System>(&self, pass: &str) -> bool {
        self.pass(pass)
            .map_or(false, |p| p.position(TypeId::of::<S>()).is_some())
    }

    /// Get the system of type `S` in a pass.
    pub fn get_system<S: System>(&self, pass: &str) -> Option<Rc<RefCell<S>>> {
        let pass = self.pass(pass)?;
        let entry = &pass.systems[pass.position(TypeId::of::<S>())?];
        entry.any.clone().downcast::<RefCell<S>>().ok()
    }

    /// Terminate and remove the system of type `S` from a pass.
    ///
    /// Returns false if there was no such system or it is running.
    pub fn remove_system<S: System>(&mut self, pass: &str) -> bool {
        let target = match self.passes.iter_mut().find(|p| p.name == pass) {
            Some(target) => target,
            None => return false,
        };

        match target.position(TypeId::of::<S>()) {
            Some(index) if target.systems[index].is_running() => {
                warn!(pass, system = target.systems[index].name, "cannot remove running system");
                false
            }
            Some(index) => {
                let entry = target.systems.remove(index);
                entry.terminate();
                debug!(pass, system = entry.name, "removed system");
                true
            }
            None => false,
        }
    }

    /// Return the systems of a pass, which can be run without borrowing the
    /// manager.
    pub fn pass_systems(&self, pass: &str) -> PassSystems {
        PassSystems {
            systems: self.pass(pass).map(|p| p.systems.clone()).unwrap_or_default(),
        }
    }

    /// Run every system in a pass, in installation order.
    ///
    /// Running an unknown pass does nothing.
    pub fn run(&self, world: &World, pass: &str, parameters: &mut SystemParameters<'_>) {
        self.pass_systems(pass).run(world, parameters);
    }

    /// Terminate and remove every system in every pass.
    pub fn terminate_all(&mut self) {
        for pass in self.passes.drain(..) {
            for entry in pass.systems {
                entry.terminate();
                debug!(pass = %pass.name, system = entry.name, "terminated system");
            }
        }
    }

    fn pass(&self, pass: &str) -> Option<&SystemPass> {
        self.passes.iter().find(|p| p.name == pass)
    }
}

impl Drop for SystemManager {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

impl Debug for SystemManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for pass in &self.passes {
            let names: Vec<&str> = pass.systems.iter().map(|entry| entry.name).collect();
            map.entry(&pass.name, &names);
        }
        map.finish()
    }
}
