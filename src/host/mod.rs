// This module is the boundary between the pipeline and the host runtime. It defines the two
// host capabilities the service consumes: LoadedUnits enumerates the units the host has
// loaded (read once, when the reference catalog is built) and UnitLoader turns a UnitHandle
// into a LoadedUnit that lists its exported types in toolchain order and can construct a
// default instance of one of them. materialize() is the last pipeline stage: it loads the
// unit, returns no instance when nothing is exported, and otherwise instantiates the first
// exported type. Instance is the opaque, owned result handed to the caller.

//! Host runtime capabilities and result materialization.

pub mod modules;
pub mod native;

use std::any::Any;
use std::fmt;

use crate::core::error::ScriptResult;
use crate::toolchain::UnitHandle;

pub use modules::{LoadedUnits, ModuleInfo, ProcessModules};
pub use native::{NativeObject, NativeUnitLoader};

/// Object constructed from a compiled unit. The caller owns it.
pub struct Instance {
    type_name: String,
    object: Box<dyn Any + Send>,
}

impl Instance {
    pub fn new<T: Any + Send>(type_name: impl Into<String>, object: T) -> Self {
        Self {
            type_name: type_name.into(),
            object: Box::new(object),
        }
    }

    /// Name of the exported type this instance was constructed from.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.object.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.object.downcast_mut()
    }

    /// Take the object out, or get the instance back if it is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let Instance { type_name, object } = self;
        match object.downcast::<T>() {
            Ok(object) => Ok(*object),
            Err(object) => Err(Instance { type_name, object }),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A compiled unit the host has loaded.
pub trait LoadedUnit {
    /// Publicly exported types, in the order the toolchain emitted them.
    fn exported_types(&self) -> Vec<String>;

    /// Construct a default instance of `type_name`. Errors are
    /// [`crate::ScriptError::InstantiationFailure`].
    fn instantiate(&self, type_name: &str) -> ScriptResult<Instance>;
}

/// Capability to load produced units into the host.
pub trait UnitLoader: Send + Sync {
    /// Errors are [`crate::ScriptError::UnitLoad`].
    fn load(&self, unit: &UnitHandle) -> ScriptResult<Box<dyn LoadedUnit>>;
}

/// Load `unit` and construct its first exported type, if it has any.
pub fn materialize(loader: &dyn UnitLoader, unit: &UnitHandle) -> ScriptResult<Option<Instance>> {
    let loaded = loader.load(unit)?;
    let exported = loaded.exported_types();

    let Some(first) = exported.first() else {
        log::debug!("Compiled unit exports no types");
        return Ok(None);
    };

    log::debug!("Instantiating {} (first of {} exported types)", first, exported.len());
    loaded.instantiate(first).map(Some)
}
