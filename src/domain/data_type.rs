//! Data type identifiers and type-set algebra.
//!
//! A [`DataType`] names one independently configurable unit of synced state.
//! Control types are download-only and always travel with every configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One synchronizable data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Bookmarks,
    Preferences,
    Passwords,
    AutofillProfile,
    Autofill,
    Themes,
    TypedUrls,
    Extensions,
    SearchEngines,
    Sessions,
    Apps,
    AppSettings,
    ExtensionSettings,
    HistoryDeleteDirectives,
    Dictionary,
    FaviconImages,
    FaviconTracking,
    PriorityPreferences,
    SupervisedUserSettings,
    Articles,
    AppList,
    // Control types.
    Nigori,
    DeviceInfo,
    Experiments,
}

impl DataType {
    /// Every known data type, user types first.
    pub const ALL: [Self; 24] = [
        Self::Bookmarks,
        Self::Preferences,
        Self::Passwords,
        Self::AutofillProfile,
        Self::Autofill,
        Self::Themes,
        Self::TypedUrls,
        Self::Extensions,
        Self::SearchEngines,
        Self::Sessions,
        Self::Apps,
        Self::AppSettings,
        Self::ExtensionSettings,
        Self::HistoryDeleteDirectives,
        Self::Dictionary,
        Self::FaviconImages,
        Self::FaviconTracking,
        Self::PriorityPreferences,
        Self::SupervisedUserSettings,
        Self::Articles,
        Self::AppList,
        Self::Nigori,
        Self::DeviceInfo,
        Self::Experiments,
    ];

    /// Canonical upper-case name, as used in logs and config files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bookmarks => "BOOKMARKS",
            Self::Preferences => "PREFERENCES",
            Self::Passwords => "PASSWORDS",
            Self::AutofillProfile => "AUTOFILL_PROFILE",
            Self::Autofill => "AUTOFILL",
            Self::Themes => "THEMES",
            Self::TypedUrls => "TYPED_URLS",
            Self::Extensions => "EXTENSIONS",
            Self::SearchEngines => "SEARCH_ENGINES",
            Self::Sessions => "SESSIONS",
            Self::Apps => "APPS",
            Self::AppSettings => "APP_SETTINGS",
            Self::ExtensionSettings => "EXTENSION_SETTINGS",
            Self::HistoryDeleteDirectives => "HISTORY_DELETE_DIRECTIVES",
            Self::Dictionary => "DICTIONARY",
            Self::FaviconImages => "FAVICON_IMAGES",
            Self::FaviconTracking => "FAVICON_TRACKING",
            Self::PriorityPreferences => "PRIORITY_PREFERENCES",
            Self::SupervisedUserSettings => "SUPERVISED_USER_SETTINGS",
            Self::Articles => "ARTICLES",
            Self::AppList => "APP_LIST",
            Self::Nigori => "NIGORI",
            Self::DeviceInfo => "DEVICE_INFO",
            Self::Experiments => "EXPERIMENTS",
        }
    }

    /// Whether this is a control type (implicitly part of every configuration).
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Nigori | Self::DeviceInfo | Self::Experiments)
    }

    /// Worker group that normally owns this type's change processing.
    #[must_use]
    pub const fn default_group(self) -> ModelSafeGroup {
        match self {
            Self::Passwords => ModelSafeGroup::Password,
            Self::Autofill | Self::AutofillProfile => ModelSafeGroup::Db,
            Self::TypedUrls | Self::HistoryDeleteDirectives => ModelSafeGroup::History,
            Self::Nigori | Self::DeviceInfo | Self::Experiments => ModelSafeGroup::Passive,
            _ => ModelSafeGroup::Ui,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("Unknown data type: {s}"))
    }
}

/// Worker context a type's change processor runs on once activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSafeGroup {
    Ui,
    Db,
    File,
    History,
    Password,
    Passive,
}

impl fmt::Display for ModelSafeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ui => "GROUP_UI",
            Self::Db => "GROUP_DB",
            Self::File => "GROUP_FILE",
            Self::History => "GROUP_HISTORY",
            Self::Password => "GROUP_PASSWORD",
            Self::Passive => "GROUP_PASSIVE",
        };
        f.write_str(name)
    }
}

/// An ordered set of data types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeSet(BTreeSet<DataType>);

impl TypeSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Create a set from a slice of types.
    #[must_use]
    pub fn of(types: &[DataType]) -> Self {
        types.iter().copied().collect()
    }

    /// Every known type.
    #[must_use]
    pub fn all() -> Self {
        Self::of(&DataType::ALL)
    }

    /// Add a type; returns whether it was newly inserted.
    pub fn insert(&mut self, data_type: DataType) -> bool {
        self.0.insert(data_type)
    }

    /// Remove a type; returns whether it was present.
    pub fn remove(&mut self, data_type: DataType) -> bool {
        self.0.remove(&data_type)
    }

    /// Add every type of `other`.
    pub fn put_all(&mut self, other: &Self) {
        self.0.extend(other.iter());
    }

    /// Remove every type of `other`.
    pub fn remove_all(&mut self, other: &Self) {
        self.0.retain(|t| !other.contains(*t));
    }

    /// Keep only the types also in `other`.
    pub fn retain_all(&mut self, other: &Self) {
        self.0.retain(|t| other.contains(*t));
    }

    #[must_use]
    pub fn contains(&self, data_type: DataType) -> bool {
        self.0.contains(&data_type)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether every type of `other` is in this set.
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        other.0.is_subset(&self.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = DataType> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.0.union(&other.0).copied().collect()
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        self.0.intersection(&other.0).copied().collect()
    }

    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.0.difference(&other.0).copied().collect()
    }

    /// Types of this set that are not control types.
    #[must_use]
    pub fn user_types(&self) -> Self {
        self.iter().filter(|t| !t.is_control()).collect()
    }
}

impl FromIterator<DataType> for TypeSet {
    fn from_iter<I: IntoIterator<Item = DataType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<DataType> for TypeSet {
    fn extend<I: IntoIterator<Item = DataType>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<'a> IntoIterator for &'a TypeSet {
    type Item = DataType;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, DataType>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

impl From<DataType> for TypeSet {
    fn from(data_type: DataType) -> Self {
        Self::of(&[data_type])
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(DataType::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// The control types: always configured, never associated.
#[must_use]
pub fn control_types() -> TypeSet {
    DataType::ALL.iter().copied().filter(|t| t.is_control()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_type() {
        assert_eq!("bookmarks".parse::<DataType>(), Ok(DataType::Bookmarks));
        assert_eq!(
            "typed-urls".parse::<DataType>(),
            Ok(DataType::TypedUrls)
        );
        assert_eq!("NIGORI".parse::<DataType>(), Ok(DataType::Nigori));
        assert!("nonsense".parse::<DataType>().is_err());
    }

    #[test]
    fn test_control_types() {
        let control = control_types();
        assert_eq!(control.len(), 3);
        assert!(control.contains(DataType::Nigori));
        assert!(!control.contains(DataType::Bookmarks));
    }

    #[test]
    fn test_set_algebra() {
        let a = TypeSet::of(&[DataType::Bookmarks, DataType::Preferences]);
        let b = TypeSet::of(&[DataType::Preferences, DataType::Passwords]);

        assert_eq!(a.union(&b).len(), 3);
        assert_eq!(a.intersection(&b), TypeSet::of(&[DataType::Preferences]));
        assert_eq!(a.difference(&b), TypeSet::of(&[DataType::Bookmarks]));
        assert!(a.union(&b).contains_all(&a));
    }

    #[test]
    fn test_display() {
        let set = TypeSet::of(&[DataType::Preferences, DataType::Bookmarks]);
        assert_eq!(set.to_string(), "{BOOKMARKS, PREFERENCES}");
        assert_eq!(TypeSet::new().to_string(), "{}");
    }
}
