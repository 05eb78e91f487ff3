use crate::bytecode::Program;
use crate::bytecode::validate::check_program;
use crate::runtime::runtime_error::{ErrorKind, Result, RuntimeError};
use std::collections::HashMap;
use tracing::debug;

/// The universal base type consulted when a method is not found on the
/// object's own type.
pub const ROOT_TYPE: &str = "Object";

/// (owner type, program name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramKey {
    pub owner: String,
    pub name: String,
}

impl ProgramKey {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// Registry of every compiled program, keyed by owner type and name.
///
/// Filled once while loading and read-only afterwards, so a single pool can
/// back any number of running objects. Dropping the pool drops every
/// program it holds.
#[derive(Debug, Default)]
pub struct ProgramPool {
    programs: HashMap<ProgramKey, Program>,
}

impl ProgramPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Was a program registered under exactly this key? No fallback.
    pub fn exists(&self, owner: &str, name: &str) -> bool {
        self.programs.contains_key(&ProgramKey::new(owner, name))
    }

    /// Register `program`. Registering the same key twice is an error and
    /// leaves the first program in place.
    pub fn put(&mut self, owner: &str, name: &str, program: Program) -> Result<()> {
        let key = ProgramKey::new(owner, name);

        if self.programs.contains_key(&key) {
            return Err(RuntimeError::new(ErrorKind::DuplicateProgram {
                owner: key.owner,
                name: key.name,
            }));
        }

        check_program(&program).map_err(|e| {
            RuntimeError::new(ErrorKind::InvalidProgram {
                owner: owner.to_string(),
                name: name.to_string(),
                reason: e.to_string(),
            })
        })?;

        debug!(program = %key, lines = program.len(), "program registered");
        self.programs.insert(key, program);
        Ok(())
    }

    /// Resolve `name` for an object of type `owner`.
    ///
    /// Looks at `owner` first, then once at [`ROOT_TYPE`]. There is no
    /// deeper hierarchy.
    pub fn get(&self, owner: &str, name: &str) -> Result<&Program> {
        self.resolve(owner, name).map(|(_, program)| program)
    }

    /// Like [`get`](Self::get), also reporting which owner supplied the program.
    pub fn resolve(&self, owner: &str, name: &str) -> Result<(&str, &Program)> {
        if let Some((key, program)) = self.programs.get_key_value(&ProgramKey::new(owner, name)) {
            return Ok((key.owner.as_str(), program));
        }

        if let Some((key, program)) = self
            .programs
            .get_key_value(&ProgramKey::new(ROOT_TYPE, name))
        {
            return Ok((key.owner.as_str(), program));
        }

        Err(RuntimeError::new(ErrorKind::UnresolvedProgram {
            owner: owner.to_string(),
            name: name.to_string(),
        }))
    }

    /// All entries, sorted by owner then name.
    pub fn entries(&self) -> Vec<(&ProgramKey, &Program)> {
        let mut entries: Vec<_> = self.programs.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}
