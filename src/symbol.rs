// Lambdacore Symbol Table and Package System
//
// Process-wide, append-only interning table with O(1) symbol comparison.
// Symbols carry the globally-proclaimed-special flag consulted by the
// lambda-list target classifier.

use std::collections::HashMap;

/// Unique identifier for a symbol (index into symbol table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Unique identifier for a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageId(pub u32);

pub const KEYWORD_PACKAGE: PackageId = PackageId(0);
pub const CORE_PACKAGE: PackageId = PackageId(1);
pub const USER_PACKAGE: PackageId = PackageId(2);

/// An interned symbol (immutable metadata only; dynamic values live in
/// thread-local cells, see the dynamic module)
#[derive(Debug, Clone)]
pub struct Symbol {
    /// The symbol's name (e.g., "CAR", "*PRINT-BASE*")
    pub name: String,
    /// The home package (None for uninterned symbols)
    pub package: Option<PackageId>,
    /// Globally proclaimed special (dynamically scoped)
    pub special: bool,
}

impl Symbol {
    fn new(name: String, package: Option<PackageId>) -> Self {
        Self {
            name,
            package,
            special: false,
        }
    }

    pub fn is_keyword(&self) -> bool {
        self.package == Some(KEYWORD_PACKAGE)
    }
}

struct Package {
    #[allow(dead_code)]
    name: String,
    symbols: HashMap<String, SymbolId>,
}

/// The global symbol table
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    packages: Vec<Package>,
    gensym_counter: u64,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = Self {
            symbols: Vec::new(),
            packages: Vec::new(),
            gensym_counter: 0,
        };
        // Package ids are fixed: KEYWORD, LAMBDACORE, LAMBDACORE-USER
        table.create_package("KEYWORD");
        table.create_package("LAMBDACORE");
        table.create_package("LAMBDACORE-USER");
        table
    }

    fn create_package(&mut self, name: &str) -> PackageId {
        let id = PackageId(self.packages.len() as u32);
        self.packages.push(Package {
            name: name.to_string(),
            symbols: HashMap::new(),
        });
        id
    }

    /// Intern a symbol in a specific package
    pub fn intern_in(&mut self, name: &str, pkg_id: PackageId) -> SymbolId {
        let upper = name.to_uppercase();
        if let Some(pkg) = self.packages.get(pkg_id.0 as usize) {
            if let Some(sym) = pkg.symbols.get(&upper) {
                return *sym;
            }
        }
        let sym_id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol::new(upper.clone(), Some(pkg_id)));
        if let Some(pkg) = self.packages.get_mut(pkg_id.0 as usize) {
            pkg.symbols.insert(upper, sym_id);
        }
        sym_id
    }

    /// Intern a symbol in the core package
    pub fn intern(&mut self, name: &str) -> SymbolId {
        self.intern_in(name, CORE_PACKAGE)
    }

    /// Intern a keyword (in KEYWORD package)
    pub fn intern_keyword(&mut self, name: &str) -> SymbolId {
        self.intern_in(name, KEYWORD_PACKAGE)
    }

    /// The keyword symbol with the same name as `sym`
    pub fn as_keyword(&mut self, sym: SymbolId) -> SymbolId {
        let name = self
            .symbol_name(sym)
            .unwrap_or_default()
            .to_string();
        self.intern_keyword(&name)
    }

    /// Create a fresh uninterned symbol with a prefixed counter name
    pub fn gensym(&mut self, prefix: &str) -> SymbolId {
        self.gensym_counter += 1;
        let name = format!("{}{}", prefix.to_uppercase(), self.gensym_counter);
        let sym_id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol::new(name, None));
        sym_id
    }

    pub fn get_symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.0 as usize)
    }

    pub fn symbol_name(&self, id: SymbolId) -> Option<&str> {
        self.get_symbol(id).map(|s| s.name.as_str())
    }

    pub fn is_keyword(&self, id: SymbolId) -> bool {
        self.get_symbol(id).map(|s| s.is_keyword()).unwrap_or(false)
    }

    /// Proclaim a symbol globally special (dynamically scoped)
    pub fn proclaim_special(&mut self, id: SymbolId) {
        if let Some(sym) = self.symbols.get_mut(id.0 as usize) {
            sym.special = true;
        }
    }

    pub fn is_special(&self, id: SymbolId) -> bool {
        self.get_symbol(id).map(|s| s.special).unwrap_or(false)
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_identity() {
        let mut table = SymbolTable::new();
        let a = table.intern("FOO");
        let b = table.intern("foo"); // case-folded
        assert_eq!(a, b);
        assert_ne!(a, table.intern("BAR"));
    }

    #[test]
    fn test_keyword_package() {
        let mut table = SymbolTable::new();
        let kw = table.intern_keyword("REST");
        assert!(table.is_keyword(kw));
        let plain = table.intern("REST");
        assert_ne!(kw, plain);
        assert_eq!(table.as_keyword(plain), kw);
    }

    #[test]
    fn test_gensym_uninterned() {
        let mut table = SymbolTable::new();
        let g1 = table.gensym("arg");
        let g2 = table.gensym("arg");
        assert_ne!(g1, g2);
        assert!(table.get_symbol(g1).unwrap().package.is_none());
    }

    #[test]
    fn test_proclaim_special() {
        let mut table = SymbolTable::new();
        let star = table.intern("*DEBUG*");
        assert!(!table.is_special(star));
        table.proclaim_special(star);
        assert!(table.is_special(star));
    }
}
