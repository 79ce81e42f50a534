//! Proptest strategies for taxostage domain types.
//!
//! # Usage
//!
//! ```no_run
//! use proptest::prelude::*;
//! use taxostage_test_utils::strategies;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(name in strategies::arb_species_name()) {
//!         prop_assert!(name.contains(' '));
//!     }
//! }
//! ```

use proptest::prelude::*;
use taxostage_types::{Name, Rank};

/// Generates a capitalized genus name of 3-12 letters.
pub fn arb_genus() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,11}"
}

/// Generates a binomial species name such as `Abies alba`.
pub fn arb_species_name() -> impl Strategy<Value = String> {
    (arb_genus(), "[a-z]{3,12}").prop_map(|(genus, epithet)| format!("{genus} {epithet}"))
}

/// Generates a botanical author abbreviation such as `Mill.` or `L.`.
pub fn arb_authorship() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("L.".to_string()),
        Just("Mill.".to_string()),
        "[A-Z][a-z]{1,6}\\.",
        ("[A-Z][a-z]{1,6}", 1750u32..2020).prop_map(|(a, y)| format!("{a}, {y}")),
    ]
}

/// Generates a rank from species level upward.
pub fn arb_rank() -> impl Strategy<Value = Rank> {
    prop::sample::select(vec![
        Rank::Kingdom,
        Rank::Family,
        Rank::Genus,
        Rank::Species,
        Rank::Subspecies,
        Rank::Unranked,
    ])
}

/// Generates a species [`Name`] without id.
pub fn arb_name() -> impl Strategy<Value = Name> {
    (arb_species_name(), proptest::option::of(arb_authorship())).prop_map(|(sci, author)| {
        let mut name = Name::new(sci, Rank::Species);
        name.authorship = author;
        name
    })
}

/// Generates a citation with varying punctuation and case around the same content.
pub fn arb_citation() -> impl Strategy<Value = String> {
    (arb_authorship(), 1750u32..2020, "[A-Z][a-z]{1,4}\\. [A-Z][a-z]{1,3}\\.")
        .prop_map(|(author, year, title)| format!("{author}, {year}, {title}"))
}

/// Generates a set of source ids, some of which look like generated ids.
pub fn arb_source_ids() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("(x{0,3}|~)[0-9a-z]{1,5}", 0..40)
}
