//! Literature references and type material.

use serde::{Deserialize, Serialize};

use crate::record::{Record, VerbatimKey};

/// A literature reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Record id.
    pub id: Option<String>,
    /// Source row this reference was derived from.
    pub verbatim_key: Option<VerbatimKey>,
    /// Full citation as given by the source.
    pub citation: Option<String>,
    /// Publication year, when known.
    pub year: Option<i32>,
}

impl Reference {
    /// Creates a reference from its citation.
    pub fn new(id: impl Into<String>, citation: impl Into<String>) -> Self {
        Self { id: Some(id.into()), citation: Some(citation.into()), ..Self::default() }
    }
}

impl Record for Reference {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn verbatim_key(&self) -> Option<VerbatimKey> {
        self.verbatim_key
    }
}

/// A type specimen or other type designation of a name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMaterial {
    /// Record id.
    pub id: Option<String>,
    /// Source row this record was derived from.
    pub verbatim_key: Option<VerbatimKey>,
    /// Id of the typified name.
    pub name_id: Option<String>,
    /// Reference the designation was published in.
    pub reference_id: Option<String>,
    /// Type status, e.g. holotype.
    pub status: Option<String>,
    /// Specimen citation.
    pub citation: Option<String>,
    /// Collection locality.
    pub locality: Option<String>,
}

impl Record for TypeMaterial {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn verbatim_key(&self) -> Option<VerbatimKey> {
        self.verbatim_key
    }
}
