// Lambdacore Stack Frames and Vaslists
//
// StackFrame is a pre-sized array of tagged-value slots for one call's
// lexical variables (or raw arguments); Vaslist is a non-owning cursor over
// a contiguous argument region. The backing storage must always outlive any
// Vaslist pointing into it; the borrowed cursor enforces that through its
// lifetime, the escaped VaslistRef only by allocation discipline.

use smallvec::SmallVec;

use crate::types::{TaggedValue, VaslistRef};

/// Inline slot count before the frame spills to the heap; most lambda lists
/// are small.
const FRAME_INLINE_SLOTS: usize = 8;

/// One call's worth of tagged-value slots.
#[derive(Debug, Clone)]
pub struct StackFrame {
    slots: SmallVec<[TaggedValue; FRAME_INLINE_SLOTS]>,
}

impl StackFrame {
    /// A frame with `size` slots, all marked unbound. Callers size this from
    /// LambdaListHandler::number_of_lexical_variables.
    pub fn with_size(size: usize) -> Self {
        Self {
            slots: smallvec::smallvec![TaggedValue::Unbound; size],
        }
    }

    /// A frame holding the given raw arguments.
    pub fn from_args(args: &[TaggedValue]) -> Self {
        Self {
            slots: SmallVec::from_slice(args),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn set(&mut self, idx: usize, val: TaggedValue) {
        self.slots[idx] = val;
    }

    pub fn value(&self, idx: usize) -> TaggedValue {
        self.slots[idx]
    }

    pub fn make_unbound(&mut self, idx: usize) {
        self.slots[idx] = TaggedValue::Unbound;
    }

    pub fn is_bound(&self, idx: usize) -> bool {
        !self.slots[idx].is_unbound()
    }

    pub fn as_slice(&self) -> &[TaggedValue] {
        &self.slots
    }
}

/// Sequential cursor over an argument region.
///
/// `next_arg` advances and decrements the remaining count; the count hitting
/// zero is the authoritative "no more arguments" signal.
#[derive(Debug, Clone)]
pub struct Vaslist<'a> {
    region: &'a [TaggedValue],
    index: usize,
}

impl<'a> Vaslist<'a> {
    pub fn new(region: &'a [TaggedValue]) -> Self {
        Self { region, index: 0 }
    }

    /// Re-materialize a cursor from an escaped VaslistRef over the same
    /// argument region it was created from.
    pub fn from_ref(region: &'a [TaggedValue], r: VaslistRef) -> Self {
        Self {
            region: &region[r.offset as usize..(r.offset + r.len) as usize],
            index: 0,
        }
    }

    pub fn total_nargs(&self) -> usize {
        self.region.len()
    }

    pub fn remaining_nargs(&self) -> usize {
        self.region.len() - self.index
    }

    /// The unconsumed tail of the region.
    pub fn remaining(&self) -> &'a [TaggedValue] {
        &self.region[self.index..]
    }

    pub fn next_arg(&mut self) -> Option<TaggedValue> {
        if self.index < self.region.len() {
            let val = self.region[self.index];
            self.index += 1;
            Some(val)
        } else {
            None
        }
    }

    /// Escaped cursor over the unconsumed tail, offsets relative to the
    /// region this Vaslist was created over. Valid only while that region
    /// is alive.
    pub fn va_rest_ref(&self) -> VaslistRef {
        VaslistRef {
            offset: self.index as u32,
            len: self.remaining_nargs() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaggedValue as TV;

    #[test]
    fn test_frame_unbound_slots() {
        let mut frame = StackFrame::with_size(3);
        assert!(!frame.is_bound(0));
        frame.set(1, TV::Fixnum(5));
        assert!(frame.is_bound(1));
        assert_eq!(frame.value(1), TV::Fixnum(5));
        frame.make_unbound(1);
        assert!(!frame.is_bound(1));
    }

    #[test]
    fn test_vaslist_consumption() {
        let region = [TV::Fixnum(1), TV::Fixnum(2), TV::Fixnum(3)];
        let mut vas = Vaslist::new(&region);
        assert_eq!(vas.total_nargs(), 3);
        assert_eq!(vas.next_arg(), Some(TV::Fixnum(1)));
        assert_eq!(vas.remaining_nargs(), 2);
        assert_eq!(vas.remaining(), &region[1..]);
        assert_eq!(vas.next_arg(), Some(TV::Fixnum(2)));
        assert_eq!(vas.next_arg(), Some(TV::Fixnum(3)));
        assert_eq!(vas.next_arg(), None);
        assert_eq!(vas.remaining_nargs(), 0);
    }

    #[test]
    fn test_va_rest_ref_roundtrip() {
        let region = [TV::Fixnum(1), TV::Fixnum(2), TV::Fixnum(3)];
        let mut vas = Vaslist::new(&region);
        vas.next_arg();
        let r = vas.va_rest_ref();
        assert_eq!(r.offset, 1);
        assert_eq!(r.len, 2);
        let mut again = Vaslist::from_ref(&region, r);
        assert_eq!(again.next_arg(), Some(TV::Fixnum(2)));
        assert_eq!(again.next_arg(), Some(TV::Fixnum(3)));
        assert_eq!(again.next_arg(), None);
    }
}
