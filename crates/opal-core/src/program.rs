//! Program: the ordered function container

use crate::function::Function;
use rustc_hash::FxHashMap;
use std::ops::{Index, IndexMut};

/// All disassembled functions of the binary being optimized.
///
/// Functions are enumerated in insertion order; that order is the stable
/// tie-breaker for every matching heuristic, so it must not be perturbed
/// after profile processing begins.
#[derive(Debug, Default)]
pub struct Program {
    functions: Vec<Function>,
    by_name: FxHashMap<String, usize>,
}

impl Program {
    /// Create an empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function, indexing every name it answers to. Returns its id.
    ///
    /// On a name collision the earlier function keeps the name. The first
    /// block is always an entry point, whatever the source said.
    pub fn add_function(&mut self, mut function: Function) -> usize {
        if let Some(first) = function.blocks.first_mut() {
            first.is_entry = true;
        }
        let id = self.functions.len();
        for name in function.names() {
            self.by_name.entry(name.clone()).or_insert(id);
        }
        self.functions.push(function);
        id
    }

    /// Function id for any of a function's names.
    pub fn function_by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Function by id.
    pub fn get(&self, id: usize) -> Option<&Function> {
        self.functions.get(id)
    }

    /// Mutable function by id.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Function> {
        self.functions.get_mut(id)
    }

    /// All functions, in enumeration order.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Mutable view of all functions.
    pub fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions
    }

    /// Number of functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the program has no functions.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Index<usize> for Program {
    type Output = Function;

    fn index(&self, id: usize) -> &Function {
        &self.functions[id]
    }
}

impl IndexMut<usize> for Program {
    fn index_mut(&mut self, id: usize) -> &mut Function {
        &mut self.functions[id]
    }
}
