// Lambdacore Runtime Context
//
// Bundles the heap, the symbol table, and the pre-interned symbols the
// lambda-list machinery compares against (markers, T, QUOTE, the deftype
// wildcard). Built once at startup; markers never change afterwards.

use crate::heap::Heap;
use crate::symbol::{SymbolId, SymbolTable};

/// Pre-interned lambda-list marker symbols and common constants.
pub struct Markers {
    pub amp_optional: SymbolId,
    pub amp_rest: SymbolId,
    /// Alias of &rest in lambda lists for macros
    pub amp_body: SymbolId,
    pub amp_va_rest: SymbolId,
    pub amp_key: SymbolId,
    pub amp_allow_other_keys: SymbolId,
    pub amp_aux: SymbolId,
    pub amp_whole: SymbolId,
    pub amp_environment: SymbolId,
    /// Dotted-tail marker (context-restricted)
    pub dot: SymbolId,
    /// The universal top type; rejected as a parameter name
    pub sym_t: SymbolId,
    pub sym_quote: SymbolId,
    /// Head of (special ...) declaration specifiers
    pub sym_special: SymbolId,
    /// Wildcard used as the deftype default default
    pub sym_star: SymbolId,
    /// Runtime :allow-other-keys keyword
    pub kw_allow_other_keys: SymbolId,
}

impl Markers {
    fn new(symbols: &mut SymbolTable) -> Self {
        Self {
            amp_optional: symbols.intern("&OPTIONAL"),
            amp_rest: symbols.intern("&REST"),
            amp_body: symbols.intern("&BODY"),
            amp_va_rest: symbols.intern("&VA-REST"),
            amp_key: symbols.intern("&KEY"),
            amp_allow_other_keys: symbols.intern("&ALLOW-OTHER-KEYS"),
            amp_aux: symbols.intern("&AUX"),
            amp_whole: symbols.intern("&WHOLE"),
            amp_environment: symbols.intern("&ENVIRONMENT"),
            dot: symbols.intern("."),
            sym_t: symbols.intern("T"),
            sym_quote: symbols.intern("QUOTE"),
            sym_special: symbols.intern("SPECIAL"),
            sym_star: symbols.intern("*"),
            kw_allow_other_keys: symbols.intern_keyword("ALLOW-OTHER-KEYS"),
        }
    }
}

pub struct RuntimeContext {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub markers: Markers,
}

impl RuntimeContext {
    pub fn new() -> Self {
        let heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let markers = Markers::new(&mut symbols);
        Self {
            heap,
            symbols,
            markers,
        }
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}
