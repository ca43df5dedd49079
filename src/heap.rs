// Lambdacore Heap
//
// Slab allocator for header-stamped heap objects. Slots are reused through
// a free list; the first word of every live entry is its TypeStamp.
// The JIT memory manager is a collaborator here: it requests raw code/data
// buffers through alloc_code_buffer / alloc_data_buffer and owns nothing.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::types::{ObjectId, TaggedValue};

/// Runtime type identifier of a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeStamp {
    Cons,
    Bignum,
    DoubleFloat,
    Str,
    CodeBuffer,
    DataBuffer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    Cons(TaggedValue, TaggedValue),
    /// Boxed arbitrary-precision integer (fixnum overflow spill)
    Bignum(BigInt),
    DoubleFloat(f64),
    Str(String),
    /// Executable code bytes requested by the JIT memory manager
    CodeBuffer(Vec<u8>),
    /// Read-only data bytes requested by the JIT memory manager
    DataBuffer(Vec<u8>),
}

impl HeapObject {
    pub fn stamp(&self) -> TypeStamp {
        match self {
            HeapObject::Cons(..) => TypeStamp::Cons,
            HeapObject::Bignum(_) => TypeStamp::Bignum,
            HeapObject::DoubleFloat(_) => TypeStamp::DoubleFloat,
            HeapObject::Str(_) => TypeStamp::Str,
            HeapObject::CodeBuffer(_) => TypeStamp::CodeBuffer,
            HeapObject::DataBuffer(_) => TypeStamp::DataBuffer,
        }
    }
}

enum Entry {
    Occupied(HeapObject),
    Free { next: Option<u32> },
}

pub struct Heap {
    objects: Vec<Entry>,
    free_head: Option<u32>,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            objects: Vec::with_capacity(1024),
            free_head: None,
        }
    }

    pub fn alloc(&mut self, obj: HeapObject) -> ObjectId {
        match self.free_head {
            Some(idx) => {
                let entry = &mut self.objects[idx as usize];
                let next_free = match entry {
                    Entry::Free { next } => *next,
                    _ => panic!("corrupt free list"),
                };
                self.free_head = next_free;
                *entry = Entry::Occupied(obj);
                ObjectId(idx)
            }
            None => {
                let idx = self.objects.len() as u32;
                self.objects.push(Entry::Occupied(obj));
                ObjectId(idx)
            }
        }
    }

    pub fn free(&mut self, id: ObjectId) {
        let idx = id.0 as usize;
        if idx < self.objects.len() && matches!(self.objects[idx], Entry::Occupied(_)) {
            self.objects[idx] = Entry::Free {
                next: self.free_head,
            };
            self.free_head = Some(id.0);
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        match self.objects.get(id.0 as usize) {
            Some(Entry::Occupied(obj)) => Some(obj),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        match self.objects.get_mut(id.0 as usize) {
            Some(Entry::Occupied(obj)) => Some(obj),
            _ => None,
        }
    }

    pub fn stamp(&self, id: ObjectId) -> Option<TypeStamp> {
        self.get(id).map(HeapObject::stamp)
    }

    pub fn live_count(&self) -> usize {
        self.objects
            .iter()
            .filter(|e| matches!(e, Entry::Occupied(_)))
            .count()
    }

    // ---- cons/list helpers ----

    pub fn cons(&mut self, car: TaggedValue, cdr: TaggedValue) -> TaggedValue {
        TaggedValue::Object(self.alloc(HeapObject::Cons(car, cdr)))
    }

    pub fn car(&self, value: TaggedValue) -> Option<TaggedValue> {
        match value.as_object().and_then(|id| self.get(id)) {
            Some(HeapObject::Cons(car, _)) => Some(*car),
            _ => None,
        }
    }

    pub fn cdr(&self, value: TaggedValue) -> Option<TaggedValue> {
        match value.as_object().and_then(|id| self.get(id)) {
            Some(HeapObject::Cons(_, cdr)) => Some(*cdr),
            _ => None,
        }
    }

    pub fn is_cons(&self, value: TaggedValue) -> bool {
        matches!(
            value.as_object().and_then(|id| self.get(id)),
            Some(HeapObject::Cons(..))
        )
    }

    /// Build a NIL-terminated list from a slice, front to back.
    pub fn list_from_slice(&mut self, items: &[TaggedValue]) -> TaggedValue {
        let mut list = TaggedValue::Nil;
        for item in items.iter().rev() {
            list = self.cons(*item, list);
        }
        list
    }

    /// Split a (possibly improper) list into its elements and final tail.
    /// A proper list yields tail NIL; `(a . b)` yields `([a], b)`.
    pub fn list_parts(&self, list: TaggedValue) -> (Vec<TaggedValue>, TaggedValue) {
        let mut items = Vec::new();
        let mut current = list;
        loop {
            match current.as_object().and_then(|id| self.get(id)) {
                Some(HeapObject::Cons(car, cdr)) => {
                    items.push(*car);
                    current = *cdr;
                }
                _ => return (items, current),
            }
        }
    }

    /// Elements of a proper list, or None if the list is improper.
    pub fn list_to_vec(&self, list: TaggedValue) -> Option<Vec<TaggedValue>> {
        let (items, tail) = self.list_parts(list);
        if tail.is_nil() {
            Some(items)
        } else {
            None
        }
    }

    /// Normalize an integer into the tagged representation: an immediate
    /// fixnum when it fits, a boxed bignum otherwise.
    pub fn integer(&mut self, value: BigInt) -> TaggedValue {
        match value.to_i64() {
            Some(n) => TaggedValue::Fixnum(n),
            None => TaggedValue::Object(self.alloc(HeapObject::Bignum(value))),
        }
    }

    // ---- buffers for the JIT collaborator ----

    pub fn alloc_code_buffer(&mut self, size: usize) -> ObjectId {
        self.alloc(HeapObject::CodeBuffer(vec![0u8; size]))
    }

    pub fn alloc_data_buffer(&mut self, size: usize) -> ObjectId {
        self.alloc(HeapObject::DataBuffer(vec![0u8; size]))
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaggedValue as TV;

    #[test]
    fn test_list_roundtrip() {
        let mut heap = Heap::new();
        let items = [TV::Fixnum(1), TV::Fixnum(2), TV::Fixnum(3)];
        let list = heap.list_from_slice(&items);
        assert_eq!(heap.list_to_vec(list).unwrap(), items.to_vec());
    }

    #[test]
    fn test_improper_list_parts() {
        let mut heap = Heap::new();
        let tail = TV::Fixnum(9);
        let dotted = heap.cons(TV::Fixnum(1), tail);
        let (items, end) = heap.list_parts(dotted);
        assert_eq!(items, vec![TV::Fixnum(1)]);
        assert_eq!(end, tail);
        assert!(heap.list_to_vec(dotted).is_none());
    }

    #[test]
    fn test_free_list_reuse() {
        let mut heap = Heap::new();
        let a = heap.alloc(HeapObject::DoubleFloat(1.0));
        heap.free(a);
        let b = heap.alloc(HeapObject::Str("x".into()));
        assert_eq!(a, b);
        assert_eq!(heap.stamp(b), Some(TypeStamp::Str));
    }

    #[test]
    fn test_integer_normalization() {
        let mut heap = Heap::new();
        assert_eq!(heap.integer(BigInt::from(42)), TV::Fixnum(42));
        let big = BigInt::from(i64::MAX) + 1i64;
        let boxed = heap.integer(big.clone());
        let id = boxed.as_object().unwrap();
        assert_eq!(heap.stamp(id), Some(TypeStamp::Bignum));
        assert_eq!(heap.get(id), Some(&HeapObject::Bignum(big)));
    }

    #[test]
    fn test_code_buffer_stamp() {
        let mut heap = Heap::new();
        let code = heap.alloc_code_buffer(16);
        assert_eq!(heap.stamp(code), Some(TypeStamp::CodeBuffer));
        match heap.get(code).unwrap() {
            HeapObject::CodeBuffer(bytes) => assert_eq!(bytes.len(), 16),
            _ => panic!("expected code buffer"),
        }
    }
}
