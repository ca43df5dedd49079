// Lambdacore Lexical Environments
//
// Heap-resident chained environment for interpreted (non-frame) execution.
// Compiled calls skip this entirely and write lexical slots into a
// StackFrame by index.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::symbol::SymbolId;
use crate::types::TaggedValue;

#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: Arc<RwLock<HashMap<SymbolId, TaggedValue>>>,
    parent: Option<Box<Environment>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: Environment) -> Self {
        Self {
            bindings: Arc::new(RwLock::new(HashMap::new())),
            parent: Some(Box::new(parent)),
        }
    }

    pub fn bind(&self, sym: SymbolId, val: TaggedValue) {
        self.bindings.write().unwrap().insert(sym, val);
    }

    /// Mark a binding explicitly unbound (keyword pre-marking).
    pub fn mark_unbound(&self, sym: SymbolId) {
        self.bind(sym, TaggedValue::Unbound);
    }

    /// Assign an existing binding in this or an enclosing environment.
    pub fn set(&self, sym: SymbolId, val: TaggedValue) -> bool {
        {
            let mut guard = self.bindings.write().unwrap();
            if guard.contains_key(&sym) {
                guard.insert(sym, val);
                return true;
            }
        }
        match &self.parent {
            Some(parent) => parent.set(sym, val),
            None => false,
        }
    }

    pub fn lookup(&self, sym: SymbolId) -> Option<TaggedValue> {
        if let Some(val) = self.bindings.read().unwrap().get(&sym) {
            return Some(*val);
        }
        self.parent.as_ref().and_then(|p| p.lookup(sym))
    }

    /// True if the symbol is bound here (not merely pre-marked unbound).
    pub fn is_bound(&self, sym: SymbolId) -> bool {
        matches!(self.lookup(sym), Some(val) if !val.is_unbound())
    }
}
