//! Tables of the object store.
//!
//! Every table maps byte keys to byte values. Record tables are keyed by the
//! UTF-8 record id; the verbatim table by a big-endian `u32` sequence key.

use std::fmt;

/// Identifies one table of the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Name id → Name.
    Names,
    /// Usage id → Usage.
    Usages,
    /// Verbatim key → VerbatimRecord.
    Verbatim,
    /// Reference id → Reference.
    References,
    /// Normalized citation → canonical reference id.
    ReferenceCitations,
    /// Duplicate reference id → canonical reference id.
    ReferenceAliases,
    /// Type material id → TypeMaterial.
    TypeMaterial,
    /// Normalized scientific name → set of name node ids.
    NameIndex,
}

impl Table {
    /// Number of tables.
    pub const COUNT: usize = 8;

    /// Table name in the database file.
    pub const fn name(self) -> &'static str {
        match self {
            Table::Names => "names",
            Table::Usages => "usages",
            Table::Verbatim => "verbatim",
            Table::References => "references",
            Table::ReferenceCitations => "reference_citations",
            Table::ReferenceAliases => "reference_aliases",
            Table::TypeMaterial => "type_material",
            Table::NameIndex => "name_index",
        }
    }

    /// All tables, in creation order.
    pub const fn all() -> [Table; Self::COUNT] {
        [
            Table::Names,
            Table::Usages,
            Table::Verbatim,
            Table::References,
            Table::ReferenceCitations,
            Table::ReferenceAliases,
            Table::TypeMaterial,
            Table::NameIndex,
        ]
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_table_names_unique() {
        let names: HashSet<_> = Table::all().iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), Table::COUNT);
    }
}
