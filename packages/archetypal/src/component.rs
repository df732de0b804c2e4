//! Base definitions for components.
//!
//! All entities in this library are built out of components. There is no intrinsic
//! value to an entity. This module provides means of identifying component types
//! and of manipulating their values without knowing their static type.
//!
//! Each component type is allocated a unique ID by a `TypeRegistry`. Registries
//! are ordinary values: construct one, share it by `Rc` and pass it to whatever
//! needs to name component types.

use std::alloc::Layout;
use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::ptr::{self, NonNull};

use tracing::trace;

/// A component type ID which is unique for a specific component type within
/// one `TypeRegistry`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentTypeID(u32);

impl ComponentTypeID {
    /// Construct a new `ComponentTypeID` from the inner value.
    pub(crate) fn new(inner: u32) -> ComponentTypeID {
        ComponentTypeID(inner)
    }

    /// Return the inner unique ID.
    pub fn id(&self) -> usize {
        self.0 as usize
    }
}

impl Debug for ComponentTypeID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeID(#{})", self.0)
    }
}

/// The component trait is implemented on all component types.
///
/// Any `'static` type with a default value which can be cloned is a component.
pub trait Component: Default + Clone + 'static {}

impl<T: Default + Clone + 'static> Component for T {}

/// The type-erased operations and memory layout of a component type.
///
/// This is the dynamic version of a type implementing `Component`. It is
/// created once when the type is registered and copied into every archetype
/// which contains the type.
#[derive(Clone, Copy)]
pub struct ComponentInfo {
    type_id: ComponentTypeID,
    rust_type: TypeId,
    layout: Layout,
    name: &'static str,
    construct: unsafe fn(*mut u8),
    clone_into: unsafe fn(*const u8, *mut u8),
    move_into: unsafe fn(*mut u8, *mut u8),
    drop_in_place: unsafe fn(*mut u8),
}

impl ComponentInfo {
    /// Create a `ComponentInfo` for a static type.
    pub(crate) fn new<T: Component>(type_id: ComponentTypeID) -> ComponentInfo {
        unsafe fn construct<T: Component>(dst: *mut u8) {
            ptr::write(dst as *mut T, T::default());
        }

        unsafe fn clone_into<T: Component>(src: *const u8, dst: *mut u8) {
            let value = (*(src as *const T)).clone();
            ptr::write(dst as *mut T, value);
        }

        unsafe fn move_into<T: Component>(src: *mut u8, dst: *mut u8) {
            ptr::write(dst as *mut T, ptr::read(src as *const T));
        }

        unsafe fn drop_in_place<T: Component>(ptr: *mut u8) {
            ptr::drop_in_place(ptr as *mut T);
        }

        ComponentInfo {
            type_id,
            rust_type: TypeId::of::<T>(),
            layout: Layout::new::<T>(),
            name: type_name::<T>(),
            construct: construct::<T>,
            clone_into: clone_into::<T>,
            move_into: move_into::<T>,
            drop_in_place: drop_in_place::<T>,
        }
    }

    /// Return the unique type ID for this component type.
    pub fn type_id(&self) -> ComponentTypeID {
        self.type_id
    }

    /// Return the Rust `TypeId` of the component type.
    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    /// Returns true if this describes the component type `T`.
    pub fn is<T: Component>(&self) -> bool {
        self.rust_type == TypeId::of::<T>()
    }

    /// Return the memory layout of a single instance of this component.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Return the size in bytes of a single instance of this component.
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Return the alignment of this component type.
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    /// Get the name of this component type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Write the default value of the component into `dst`.
    ///
    /// # Safety
    /// `dst` must be valid for writes and aligned for this component type, and
    /// must not hold a live value (it would be leaked).
    pub unsafe fn construct(&self, dst: NonNull<u8>) {
        (self.construct)(dst.as_ptr())
    }

    /// Write a clone of the component at `src` into `dst`.
    ///
    /// # Safety
    /// `src` must hold a live value of this type and `dst` must be valid
    /// uninitialized storage for one. They must not overlap.
    pub unsafe fn clone_into(&self, src: NonNull<u8>, dst: NonNull<u8>) {
        (self.clone_into)(src.as_ptr(), dst.as_ptr())
    }

    /// Move the component at `src` into `dst`.
    ///
    /// Ownership is transferred: afterwards `src` is uninitialized and must
    /// not be destroyed.
    ///
    /// # Safety
    /// As `clone_into`.
    pub unsafe fn move_into(&self, src: NonNull<u8>, dst: NonNull<u8>) {
        (self.move_into)(src.as_ptr(), dst.as_ptr())
    }

    /// Destroy the component at `ptr` in place.
    ///
    /// # Safety
    /// `ptr` must hold a live value of this type, which is uninitialized
    /// afterwards.
    pub unsafe fn drop_in_place(&self, ptr: NonNull<u8>) {
        (self.drop_in_place)(ptr.as_ptr())
    }
}

impl PartialEq for ComponentInfo {
    fn eq(&self, other: &ComponentInfo) -> bool {
        self.type_id.eq(&other.type_id)
    }
}

impl Eq for ComponentInfo {}

impl Debug for ComponentInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<ComponentInfo #{} {}>", self.type_id.0, self.name)
    }
}

#[derive(Default)]
struct Registrations {
    by_type: HashMap<TypeId, ComponentTypeID>,
    infos: Vec<ComponentInfo>,
}

/// Assigns process-lifetime-unique `ComponentTypeID`s to component types.
///
/// IDs are dense and handed out in registration order. The same type always
/// maps to the same ID on the same registry; distinct types never collide.
#[derive(Default)]
pub struct TypeRegistry {
    registrations: RefCell<Registrations>,
}

impl TypeRegistry {
    /// Create a new, empty, registry.
    pub fn new() -> TypeRegistry {
        TypeRegistry::default()
    }

    /// Fetch the `ComponentTypeID` of `T`, registering it if this is the first
    /// time the registry has seen it.
    pub fn type_of<T: Component>(&self) -> ComponentTypeID {
        self.register::<T>().type_id()
    }

    /// Fetch the `ComponentInfo` of `T`, registering it if required.
    pub fn register<T: Component>(&self) -> ComponentInfo {
        let mut r = self.registrations.borrow_mut();
        if let Some(id) = r.by_type.get(&TypeId::of::<T>()) {
            return r.infos[id.id()];
        }

        let id = ComponentTypeID(r.infos.len() as u32);
        let info = ComponentInfo::new::<T>(id);
        trace!(id = id.0, name = info.name(), "registered component type");
        r.infos.push(info);
        r.by_type.insert(TypeId::of::<T>(), id);
        info
    }

    /// Return the `ComponentTypeID` of `T` without registering it.
    pub fn lookup<T: Component>(&self) -> Option<ComponentTypeID> {
        self.registrations.borrow().by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Fetch the registration for a `ComponentTypeID`, returning None if this
    /// registry never issued it.
    pub fn info(&self, type_id: ComponentTypeID) -> Option<ComponentInfo> {
        self.registrations.borrow().infos.get(type_id.id()).copied()
    }

    /// Return the name of a registered component type.
    pub fn name(&self, type_id: ComponentTypeID) -> Option<&'static str> {
        self.info(type_id).map(|info| info.name())
    }

    /// Return the number of registered component types.
    pub fn len(&self) -> usize {
        self.registrations.borrow().infos.len()
    }

    /// Returns true if no component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.registrations.borrow().infos.iter())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;
    use std::mem::MaybeUninit;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_uniqueness() {
        #[derive(Debug, Clone, Copy, Default)]
        struct A;
        #[derive(Debug, Clone, Copy, Default)]
        struct B;

        let registry = TypeRegistry::new();
        let a = registry.type_of::<A>();
        let b = registry.type_of::<B>();

        assert_ne!(a, b);
        assert_eq!(a, registry.type_of::<A>());
        assert_eq!(b, registry.type_of::<B>());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_does_not_register() {
        #[derive(Debug, Clone, Copy, Default)]
        struct A;

        let registry = TypeRegistry::new();
        assert_eq!(registry.lookup::<A>(), None);
        assert!(registry.is_empty());

        let a = registry.type_of::<A>();
        assert_eq!(registry.lookup::<A>(), Some(a));
        assert_eq!(registry.info(a).unwrap().name(), type_name::<A>());
        assert!(registry.info(ComponentTypeID::new(7)).is_none());
    }

    #[test]
    fn test_default() {
        #[derive(Debug, Clone, Copy)]
        struct A(u8);

        impl Default for A {
            fn default() -> A {
                A(42)
            }
        }

        let registry = TypeRegistry::new();
        let info = registry.register::<A>();
        assert_eq!(info.layout(), Layout::new::<A>());
        assert!(info.is::<A>());

        let mut raw = MaybeUninit::<A>::uninit();
        unsafe {
            info.construct(NonNull::new_unchecked(raw.as_mut_ptr() as *mut u8));
            assert_eq!(raw.assume_init().0, 42);
        }
    }

    #[test]
    fn test_clone_move_drop() {
        #[derive(Clone, Default)]
        struct Counted(Rc<Cell<usize>>);

        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let registry = TypeRegistry::new();
        let info = registry.register::<Counted>();

        let mut a = MaybeUninit::new(Counted(drops.clone()));
        let mut b = MaybeUninit::<Counted>::uninit();
        let mut c = MaybeUninit::<Counted>::uninit();

        unsafe {
            let a_ptr = NonNull::new_unchecked(a.as_mut_ptr() as *mut u8);
            let b_ptr = NonNull::new_unchecked(b.as_mut_ptr() as *mut u8);
            let c_ptr = NonNull::new_unchecked(c.as_mut_ptr() as *mut u8);

            info.clone_into(a_ptr, b_ptr);
            assert_eq!(Rc::strong_count(&drops), 3);

            info.move_into(b_ptr, c_ptr);
            assert_eq!(drops.get(), 0);

            info.drop_in_place(a_ptr);
            info.drop_in_place(c_ptr);
        }

        assert_eq!(drops.get(), 2);
        assert_eq!(Rc::strong_count(&drops), 1);
    }
}
