//! Test loader shared by the pipeline tests.
//!
//! A unit is plain text: one exported type name per line. Instances hold
//! their type name as a `String`; types named `Broken*` fail to construct.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use scriptc::{Instance, LoadedUnit, ScriptError, ScriptResult, UnitHandle, UnitLoader};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Type names declared by `type Name...` lines of a script.
pub fn declared_types(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("type "))
        .filter_map(|rest| {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            (!name.is_empty()).then_some(name)
        })
        .collect()
}

pub fn scratch_entries(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

pub struct TextUnit(Vec<String>);

impl LoadedUnit for TextUnit {
    fn exported_types(&self) -> Vec<String> {
        self.0.clone()
    }

    fn instantiate(&self, type_name: &str) -> ScriptResult<Instance> {
        if type_name.starts_with("Broken") {
            return Err(ScriptError::InstantiationFailure {
                type_name: type_name.to_string(),
                reason: "constructor threw".to_string(),
            });
        }
        Ok(Instance::new(type_name, type_name.to_string()))
    }
}

pub struct TextLoader;

impl UnitLoader for TextLoader {
    fn load(&self, unit: &UnitHandle) -> ScriptResult<Box<dyn LoadedUnit>> {
        let text = match unit {
            UnitHandle::File(path) => fs::read_to_string(path).map_err(|err| ScriptError::UnitLoad {
                reason: format!("cannot read {}: {}", path.display(), err),
            })?,
            UnitHandle::Image(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        };
        Ok(Box::new(TextUnit(text.lines().map(str::to_string).collect())))
    }
}
