//! Element identity
//!
//! Every scene element is addressed by an integer id that stays stable across
//! save and load. Ids are handed out by a per-document monotonic generator;
//! the generator's counter is itself persisted (as `lastIdCount` in the
//! document record) so that a reloaded document never re-issues an id that a
//! saved view state or material state still refers to.

/// Scene element identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u32);

impl ElementId {
    /// Create an id from its raw numeric value
    #[must_use]
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw numeric value of this id
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Encode an optional id for the document record, where `-1` means none
    #[must_use]
    pub fn to_wire(id: Option<Self>) -> i64 {
        id.map_or(-1, |id| i64::from(id.0))
    }

    /// Decode an optional id from the document record
    #[must_use]
    pub fn from_wire(raw: i64) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id generator, one per document
///
/// Single document-thread model: no interior locking, the owner serializes
/// access the same way it serializes every other document mutation.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: u32,
}

impl IdGenerator {
    /// Create a generator starting at id 0
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next unique id. The counter only ever increases.
    pub fn request(&mut self) -> ElementId {
        let id = ElementId(self.next);
        self.next += 1;
        id
    }

    /// The value the next call to [`Self::request`] will return; this is the
    /// `lastIdCount` persisted in the document record.
    #[must_use]
    pub fn next_value(&self) -> u32 {
        self.next
    }

    /// Restart numbering. Called with 0 on "new document", or with the
    /// persisted counter on load.
    pub fn reset(&mut self, seed: u32) {
        self.next = seed;
    }

    /// Make sure numbering continues past `id`. Used after a load in case the
    /// persisted counter lags behind an id that actually occurs in the file.
    pub fn reserve_past(&mut self, id: ElementId) {
        self.next = self.next.max(id.raw() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let mut gen = IdGenerator::new();
        let a = gen.request();
        let b = gen.request();
        let c = gen.request();
        assert_eq!(a.raw(), 0);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_reset_continues_numbering() {
        let mut gen = IdGenerator::new();
        gen.request();
        gen.request();
        gen.reset(10);
        assert_eq!(gen.request().raw(), 10);

        gen.reset(0);
        assert_eq!(gen.request().raw(), 0);
    }

    #[test]
    fn test_reserve_past_never_moves_backwards() {
        let mut gen = IdGenerator::new();
        gen.reset(5);
        gen.reserve_past(ElementId::from_raw(3));
        assert_eq!(gen.next_value(), 5);
        gen.reserve_past(ElementId::from_raw(9));
        assert_eq!(gen.next_value(), 10);
    }

    #[test]
    fn test_wire_encoding() {
        assert_eq!(ElementId::to_wire(None), -1);
        assert_eq!(ElementId::to_wire(Some(ElementId::from_raw(7))), 7);
        assert_eq!(ElementId::from_wire(-1), None);
        assert_eq!(ElementId::from_wire(7), Some(ElementId::from_raw(7)));
    }
}
