// Lambdacore Tagged Values
//
// Every runtime value is one machine-word-sized TaggedValue: either an
// inline immediate (fixnum, character, symbol, singleton marker) or a
// reference into the heap, whose entry carries its own type stamp.

pub use crate::symbol::SymbolId;

/// Reference to a heap-allocated object (index into the Heap)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

/// Zero-copy cursor over the tail of a call's argument region.
///
/// Produced by binding a `&va-rest` parameter. Offsets are relative to the
/// start of the argument region of the call that created it; the reference
/// is valid only for the duration of that call. Escaping it beyond the
/// enclosing call reads stale or recycled frame slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaslistRef {
    pub offset: u32,
    pub len: u32,
}

/// A uniform tagged value.
///
/// `Unbound` is the read-before-write sentinel: no well-formed binding ever
/// produces it, so a slot holding `Unbound` is detectably not yet bound.
/// It must be checked for explicitly before a slot's value is used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaggedValue {
    /// The empty list / false
    Nil,
    /// Unbound-slot sentinel, never a user-visible value
    Unbound,
    /// Small integer immediate (61-bit-safe range)
    Fixnum(i64),
    /// Character immediate
    Char(char),
    /// Interned symbol
    Symbol(SymbolId),
    /// Heap object reference
    Object(ObjectId),
    /// Variadic-rest cursor, valid only within the originating call
    VaRest(VaslistRef),
}

impl TaggedValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, TaggedValue::Nil)
    }

    pub fn is_unbound(&self) -> bool {
        matches!(self, TaggedValue::Unbound)
    }

    /// Generalized boolean: everything except NIL is true.
    pub fn truthy(&self) -> bool {
        !self.is_nil()
    }

    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            TaggedValue::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            TaggedValue::Object(o) => Some(*o),
            _ => None,
        }
    }

    /// Type stamp of the referenced heap object, None for immediates.
    pub fn type_stamp(&self, heap: &crate::heap::Heap) -> Option<crate::heap::TypeStamp> {
        self.as_object().and_then(|id| heap.stamp(id))
    }
}
