//! Catalog domain types.
//!
//! These types represent the entries served by the catalog and the
//! categories that partition them. Both are immutable once constructed.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag set used for entries whose upstream record carries no tags.
pub const NO_TAGS_PLACEHOLDER: &str = "None";

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// A named partition of the catalog.
///
/// The name is used verbatim when building provider URLs.
/// The known categories are available through [Category::all],
/// but any name can be turned into a category with [Category::new].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(Cow<'static, str>);

static KNOWN_CATEGORIES: [Category; 10] = [
    Category::ALPHABET,
    Category::ANIMALS,
    Category::BLOCKS,
    Category::DECORATION,
    Category::FOOD_DRINKS,
    Category::HUMANS,
    Category::HUMANOID,
    Category::MISCELLANEOUS,
    Category::MONSTERS,
    Category::PLANTS,
];

impl Category {
    pub const ALPHABET: Category = Category::from_static("alphabet");
    pub const ANIMALS: Category = Category::from_static("animals");
    pub const BLOCKS: Category = Category::from_static("blocks");
    pub const DECORATION: Category = Category::from_static("decoration");
    pub const FOOD_DRINKS: Category = Category::from_static("food-drinks");
    pub const HUMANS: Category = Category::from_static("humans");
    pub const HUMANOID: Category = Category::from_static("humanoid");
    pub const MISCELLANEOUS: Category = Category::from_static("miscellaneous");
    pub const MONSTERS: Category = Category::from_static("monsters");
    pub const PLANTS: Category = Category::from_static("plants");

    pub const fn from_static(name: &'static str) -> Self {
        Category(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Category(Cow::Owned(name.into()))
    }

    /// All categories known to the catalog, in provider order.
    pub fn all() -> &'static [Category] {
        &KNOWN_CATEGORIES
    }

    /// Look up a known category by name, ignoring case.
    pub fn known(name: &str) -> Option<&'static Category> {
        KNOWN_CATEGORIES
            .iter()
            .find(|category| category.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Entry identity
// ---------------------------------------------------------------------------

/// The external unique id of an entry.
///
/// Resolved once when an upstream record is decoded:
/// records carrying a well-formed UUID keep it,
/// all others are assigned a random one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "source", content = "uuid", rename_all = "lowercase")]
pub enum UniqueId {
    Provided(Uuid),
    Generated(Uuid),
}

impl UniqueId {
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw.map(Uuid::try_parse) {
            Some(Ok(uuid)) => UniqueId::Provided(uuid),
            Some(Err(_)) | None => UniqueId::Generated(Uuid::new_v4()),
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            UniqueId::Provided(uuid) | UniqueId::Generated(uuid) => *uuid,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, UniqueId::Generated(_))
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Free-text labels attached to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Tags(BTreeSet<String>);

impl Tags {
    /// Split a comma separated tag list as served by the providers.
    ///
    /// Labels are trimmed, empty labels are dropped.
    pub fn parse(raw: &str) -> Self {
        raw.split(',').collect()
    }

    /// The tag set of an entry that has no tags upstream.
    pub fn placeholder() -> Self {
        Tags(BTreeSet::from([NO_TAGS_PLACEHOLDER.to_string()]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Tags(
            iter.into_iter()
                .map(|tag| tag.as_ref().trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A single catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    id: u64,
    unique_id: UniqueId,
    name: String,
    value: String,
    tags: Tags,
    category: Category,
}

impl Entry {
    pub fn new(
        id: u64,
        unique_id: UniqueId,
        name: impl Into<String>,
        value: impl Into<String>,
        tags: Tags,
        category: Category,
    ) -> Self {
        Self {
            id,
            unique_id,
            name: name.into(),
            value: value.into(),
            tags,
            category,
        }
    }

    /// Process local id, unique within one store.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unique_id(&self) -> UniqueId {
        self.unique_id
    }

    pub fn uuid(&self) -> Uuid {
        self.unique_id.uuid()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn category(&self) -> &Category {
        &self.category
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn known_categories_are_ordered() {
        let names = Category::all().iter().map(Category::name).collect::<Vec<_>>();
        assert_eq!(names, [
            "alphabet",
            "animals",
            "blocks",
            "decoration",
            "food-drinks",
            "humans",
            "humanoid",
            "miscellaneous",
            "monsters",
            "plants",
        ]);
    }

    #[test]
    fn owned_and_static_categories_are_equal() {
        assert_eq!(Category::new("monsters"), Category::MONSTERS);
        assert_eq!(Category::known("Food-Drinks"), Some(&Category::FOOD_DRINKS));
        assert_eq!(Category::known("vehicles"), None);
    }

    #[test]
    fn well_formed_uuid_is_kept() {
        let raw = "5f8eb73b-25be-4c5a-a50f-d27d65e30ca0";
        let unique_id = UniqueId::resolve(Some(raw));
        assert_eq!(unique_id, UniqueId::Provided(Uuid::parse_str(raw).unwrap()));
    }

    #[test]
    fn malformed_or_missing_uuid_is_generated() {
        assert!(UniqueId::resolve(Some("not-a-uuid")).is_generated());
        assert!(UniqueId::resolve(None).is_generated());
        assert_ne!(
            UniqueId::resolve(None).uuid(),
            UniqueId::resolve(None).uuid()
        );
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = Tags::parse(" red, blue ,,red");
        assert_eq!(tags.iter().collect::<Vec<_>>(), ["blue", "red"]);
    }

    #[test]
    fn placeholder_tags() {
        let tags = Tags::placeholder();
        assert_eq!(tags.len(), 1);
        assert!(tags.contains(NO_TAGS_PLACEHOLDER));
    }

    proptest! {
        #[test]
        fn joined_tags_split_back(labels in proptest::collection::btree_set("[a-z][a-z ]{0,8}[a-z]", 1..6)) {
            let joined = labels.iter().cloned().collect::<Vec<_>>().join(",");
            let tags = Tags::parse(&joined);
            prop_assert_eq!(tags.iter().map(str::to_string).collect::<BTreeSet<_>>(), labels);
        }
    }
}
