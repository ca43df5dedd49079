// Lambdacore Dynamic Bindings
//
// Special (dynamically scoped) variables live in thread-local value cells,
// one per symbol per thread. DynamicScope is the save/restore guard: it
// records the previous cell contents in binding order and its Drop restores
// them strictly LIFO, on normal return and during panic unwind alike.

use std::cell::RefCell;
use std::collections::HashMap;

use smallvec::SmallVec;

use crate::symbol::SymbolId;
use crate::types::TaggedValue;

thread_local! {
    static DYNAMIC_CELLS: RefCell<HashMap<SymbolId, TaggedValue>> =
        RefCell::new(HashMap::new());
}

/// Current thread-local value of a special variable, if any binding or
/// assignment has touched it on this thread.
pub fn dynamic_value(sym: SymbolId) -> Option<TaggedValue> {
    DYNAMIC_CELLS.with(|cells| cells.borrow().get(&sym).copied())
}

/// Assign the thread-local value cell of a special variable.
pub fn set_dynamic_value(sym: SymbolId, val: TaggedValue) {
    DYNAMIC_CELLS.with(|cells| {
        cells.borrow_mut().insert(sym, val);
    });
}

fn restore_dynamic_value(sym: SymbolId, previous: Option<TaggedValue>) {
    DYNAMIC_CELLS.with(|cells| {
        let mut cells = cells.borrow_mut();
        match previous {
            Some(val) => {
                cells.insert(sym, val);
            }
            None => {
                cells.remove(&sym);
            }
        }
    });
}

/// One scope's worth of special-variable rebindings.
///
/// Must live on the stack of the call that created it; letting it escape the
/// call defeats the restore discipline.
#[derive(Default)]
pub struct DynamicScope {
    saved: SmallVec<[(SymbolId, Option<TaggedValue>); 4]>,
}

impl DynamicScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new dynamic binding, saving the previous cell contents.
    pub fn bind(&mut self, sym: SymbolId, val: TaggedValue) {
        self.saved.push((sym, dynamic_value(sym)));
        set_dynamic_value(sym, val);
    }

    pub fn binding_count(&self) -> usize {
        self.saved.len()
    }
}

impl Drop for DynamicScope {
    fn drop(&mut self) {
        // Reverse of binding order
        while let Some((sym, previous)) = self.saved.pop() {
            restore_dynamic_value(sym, previous);
        }
    }
}
