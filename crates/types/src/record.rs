//! Common accessors of every record kept in an object store.

/// Key of a verbatim record, issued from a per-store sequence.
pub type VerbatimKey = u32;

/// A record addressable by a string id and traceable to its source row.
pub trait Record {
    /// Returns the record id, if one has been assigned.
    fn id(&self) -> Option<&str>;

    /// Replaces the record id.
    fn set_id(&mut self, id: Option<String>);

    /// Returns the key of the verbatim record the record was derived from.
    fn verbatim_key(&self) -> Option<VerbatimKey>;
}
