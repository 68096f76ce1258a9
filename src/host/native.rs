// This module loads units produced as native shared objects. A script type is exported as a
// pair of C-ABI symbols: a constructor `{ctor_prefix}{Type}` returning a pointer to a freshly
// built object (null on failure) and an optional destructor `{drop_prefix}{Type}` that
// releases it. load() only parses the unit with the object crate and lists the constructor
// symbols in symbol-table order (dynamic exports first, falling back to global definitions for
// relocatable images), so a unit exporting nothing is never mapped at all. instantiate() maps
// the unit with libloading and calls the constructor. In-memory images are written to a
// scratch file just long enough to be mapped. The returned NativeObject keeps its library
// mapped and calls the destructor when dropped.

//! Native shared-object units.

use std::ffi::c_void;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::Library;
use object::{Object, ObjectSymbol};
use uuid::Uuid;

use crate::core::error::{ScriptError, ScriptResult};
use crate::core::staging::{remove_scratch_file, CleanupHook};
use crate::toolchain::UnitHandle;

use super::{Instance, LoadedUnit, UnitLoader};

pub const DEFAULT_CONSTRUCTOR_PREFIX: &str = "script_new_";
pub const DEFAULT_DESTRUCTOR_PREFIX: &str = "script_drop_";

type Constructor = unsafe extern "C" fn() -> *mut c_void;
type Destructor = unsafe extern "C" fn(*mut c_void);

/// Names of all exported symbols of an object image, in table order.
pub fn exported_symbols(image: &[u8]) -> object::Result<Vec<String>> {
    let file = object::File::parse(image)?;

    let mut names: Vec<String> = file
        .exports()?
        .iter()
        .map(|export| String::from_utf8_lossy(export.name()).into_owned())
        .collect();

    if names.is_empty() {
        names = file
            .symbols()
            .filter(|symbol| symbol.is_global() && symbol.is_definition())
            .filter_map(|symbol| symbol.name().ok().map(str::to_string))
            .collect();
    }

    Ok(names)
}

/// Loader for units compiled to platform shared libraries.
#[derive(Debug, Clone)]
pub struct NativeUnitLoader {
    constructor_prefix: String,
    destructor_prefix: String,
    scratch_dir: PathBuf,
    cleanup_hook: Option<CleanupHook>,
}

impl NativeUnitLoader {
    /// `scratch_dir` receives in-memory images while they are mapped.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            constructor_prefix: DEFAULT_CONSTRUCTOR_PREFIX.to_string(),
            destructor_prefix: DEFAULT_DESTRUCTOR_PREFIX.to_string(),
            scratch_dir: scratch_dir.into(),
            cleanup_hook: None,
        }
    }

    /// Observer for image scratch files that could not be removed.
    pub fn with_cleanup_hook(mut self, hook: Option<CleanupHook>) -> Self {
        self.cleanup_hook = hook;
        self
    }

    pub fn with_prefixes(mut self, constructor: impl Into<String>, destructor: impl Into<String>) -> Self {
        self.constructor_prefix = constructor.into();
        self.destructor_prefix = destructor.into();
        self
    }

    fn exported_types(&self, image: &[u8]) -> ScriptResult<Vec<ExportedType>> {
        let symbols = exported_symbols(image).map_err(|err| ScriptError::UnitLoad {
            reason: err.to_string(),
        })?;

        Ok(symbols
            .iter()
            .filter_map(|name| {
                // Mach-O prefixes C symbols with an underscore that dlsym does not expect.
                let symbol = match name.strip_prefix('_') {
                    Some(bare) if !name.starts_with(&self.constructor_prefix) => bare,
                    _ => name.as_str(),
                };
                let type_name = symbol.strip_prefix(&self.constructor_prefix)?;
                (!type_name.is_empty()).then(|| ExportedType {
                    name: type_name.to_string(),
                    constructor: symbol.to_string(),
                })
            })
            .collect())
    }
}

impl UnitLoader for NativeUnitLoader {
    fn load(&self, unit: &UnitHandle) -> ScriptResult<Box<dyn LoadedUnit>> {
        let types = match unit {
            UnitHandle::File(path) => {
                let image = fs::read(path).map_err(|err| ScriptError::UnitLoad {
                    reason: format!("cannot read {}: {}", path.display(), err),
                })?;
                self.exported_types(&image)?
            }
            UnitHandle::Image(image) => self.exported_types(image)?,
        };

        log::trace!("Native unit exports {} types", types.len());
        Ok(Box::new(NativeUnit {
            unit: unit.clone(),
            types,
            destructor_prefix: self.destructor_prefix.clone(),
            scratch_dir: self.scratch_dir.clone(),
            cleanup_hook: self.cleanup_hook.clone(),
        }))
    }
}

#[derive(Debug, Clone)]
struct ExportedType {
    name: String,
    constructor: String,
}

struct NativeUnit {
    unit: UnitHandle,
    types: Vec<ExportedType>,
    destructor_prefix: String,
    scratch_dir: PathBuf,
    cleanup_hook: Option<CleanupHook>,
}

impl NativeUnit {
    fn open(&self) -> ScriptResult<Library> {
        match &self.unit {
            UnitHandle::File(path) => open_library(path),
            UnitHandle::Image(image) => {
                let path = self
                    .scratch_dir
                    .join(format!("image-{}.{}", Uuid::new_v4().simple(), std::env::consts::DLL_EXTENSION));
                fs::write(&path, image).map_err(|err| ScriptError::UnitLoad {
                    reason: format!("cannot write image to {}: {}", path.display(), err),
                })?;
                let library = open_library(&path);
                // The mapping outlives the file.
                remove_scratch_file(&path, self.cleanup_hook.as_ref());
                library
            }
        }
    }
}

fn open_library(path: &Path) -> ScriptResult<Library> {
    // SAFETY: the unit was just produced by the toolchain for this request;
    // running its initialisers is the point of loading it.
    unsafe { Library::new(path) }.map_err(|err| ScriptError::UnitLoad {
        reason: format!("cannot map {}: {}", path.display(), err),
    })
}

impl LoadedUnit for NativeUnit {
    fn exported_types(&self) -> Vec<String> {
        self.types.iter().map(|ty| ty.name.clone()).collect()
    }

    fn instantiate(&self, type_name: &str) -> ScriptResult<Instance> {
        let failure = |reason: String| ScriptError::InstantiationFailure {
            type_name: type_name.to_string(),
            reason,
        };

        let exported = self
            .types
            .iter()
            .find(|ty| ty.name == type_name)
            .ok_or_else(|| failure("type is not exported by the unit".to_string()))?;

        let library = self.open()?;

        // SAFETY: exported constructors follow the `fn() -> *mut c_void` contract.
        let constructor: Constructor = unsafe { library.get::<Constructor>(exported.constructor.as_bytes()) }
            .map(|symbol| *symbol)
            .map_err(|err| failure(format!("constructor `{}` not found: {}", exported.constructor, err)))?;
        let destructor_name = format!("{}{}", self.destructor_prefix, type_name);
        // SAFETY: as above, for the `fn(*mut c_void)` destructor contract.
        let release: Option<Destructor> = unsafe { library.get::<Destructor>(destructor_name.as_bytes()) }
            .ok()
            .map(|symbol| *symbol);

        // SAFETY: constructor resolved from `library`, which is still mapped.
        let ptr = unsafe { constructor() };
        let ptr = NonNull::new(ptr).ok_or_else(|| failure("constructor returned null".to_string()))?;

        Ok(Instance::new(
            type_name,
            NativeObject {
                ptr,
                release,
                _library: library,
            },
        ))
    }
}

/// Object built by a native unit's constructor.
///
/// Keeps the unit mapped and runs the unit's destructor, when it has one,
/// on drop.
pub struct NativeObject {
    ptr: NonNull<c_void>,
    release: Option<Destructor>,
    _library: Library,
}

// SAFETY: script objects are handed to the caller without thread affinity;
// the unit's constructor contract requires them to be movable across threads.
unsafe impl Send for NativeObject {}

impl NativeObject {
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }
}

impl Drop for NativeObject {
    fn drop(&mut self) {
        if let Some(release) = self.release {
            // SAFETY: `ptr` came from the matching constructor and is released once.
            unsafe { release(self.ptr.as_ptr()) }
        }
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("ptr", &self.ptr)
            .field("has_destructor", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::write::{Object as ObjectWriter, StandardSection, Symbol, SymbolSection};
    use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};

    fn relocatable_with(symbols: &[&str]) -> Vec<u8> {
        let mut obj = ObjectWriter::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let text = obj.section_id(StandardSection::Text);
        for name in symbols {
            let offset = obj.append_section_data(text, &[0xC3], 1); // ret
            obj.add_symbol(Symbol {
                name: name.as_bytes().to_vec(),
                value: offset,
                size: 1,
                kind: SymbolKind::Text,
                scope: SymbolScope::Dynamic,
                weak: false,
                section: SymbolSection::Section(text),
                flags: SymbolFlags::None,
            });
        }
        obj.write().unwrap()
    }

    #[test]
    fn test_exported_types_follow_symbol_order() {
        let dir = tempfile::tempdir().unwrap();
        let image = relocatable_with(&[
            "script_new_Greeter",
            "helper_function",
            "script_drop_Greeter",
            "script_new_Counter",
        ]);

        let loader = NativeUnitLoader::new(dir.path());
        let unit = loader.load(&UnitHandle::Image(image)).unwrap();
        assert_eq!(unit.exported_types(), vec!["Greeter", "Counter"]);
    }

    #[test]
    fn test_custom_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let image = relocatable_with(&["make_Widget", "script_new_Ignored"]);

        let loader = NativeUnitLoader::new(dir.path()).with_prefixes("make_", "free_");
        let unit = loader.load(&UnitHandle::Image(image)).unwrap();
        assert_eq!(unit.exported_types(), vec!["Widget"]);
    }

    #[test]
    fn test_unit_without_types_exports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let image = relocatable_with(&["main_helper"]);

        let unit = NativeUnitLoader::new(dir.path()).load(&UnitHandle::Image(image)).unwrap();
        assert!(unit.exported_types().is_empty());
    }

    #[test]
    fn test_garbage_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = NativeUnitLoader::new(dir.path());

        let err = loader.load(&UnitHandle::Image(b"not an object".to_vec())).err().unwrap();
        assert!(matches!(err, ScriptError::UnitLoad { .. }));

        let missing = UnitHandle::File(dir.path().join("missing.so"));
        assert!(matches!(loader.load(&missing).err().unwrap(), ScriptError::UnitLoad { .. }));
    }

    #[test]
    fn test_unmappable_image_leaves_no_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        // A relocatable object parses but cannot be mapped as a library.
        let image = relocatable_with(&["script_new_Greeter"]);

        let unit = NativeUnitLoader::new(dir.path()).load(&UnitHandle::Image(image)).unwrap();
        let err = unit.instantiate("Greeter").unwrap_err();

        assert!(matches!(err, ScriptError::UnitLoad { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unknown_type_is_instantiation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let image = relocatable_with(&["script_new_Greeter"]);

        let unit = NativeUnitLoader::new(dir.path()).load(&UnitHandle::Image(image)).unwrap();
        let err = unit.instantiate("Stranger").unwrap_err();
        assert!(matches!(err, ScriptError::InstantiationFailure { .. }));
    }
}
