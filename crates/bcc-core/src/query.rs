//! Mergeable query arguments.
//!
//! Every listing and read call takes an [`Arguments`] set. Business methods start
//! from [`Arguments::new`] and overlay whatever extra sets their caller passed.

use std::collections::BTreeMap;
use std::fmt::Display;

/// Mapping of query-parameter names to values.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Arguments {
    values: BTreeMap<String, String>,
}

impl Arguments {
    /// Create a new, empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Set a value, replacing any previous one for the key.
    pub fn set<V>(&mut self, key: impl Into<String>, value: V)
    where
        V: Display,
    {
        self.values.insert(key.into(), value.to_string());
    }

    /// Builder form of [`Arguments::set`].
    #[must_use]
    pub fn with<V>(mut self, key: impl Into<String>, value: V) -> Self
    where
        V: Display,
    {
        self.set(key, value);
        self
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Overlay each extra set in order; later sets win on conflicting keys.
    pub fn merge<'a, I>(&mut self, extra: I)
    where
        I: IntoIterator<Item = &'a Arguments>,
    {
        for args in extra {
            for (key, value) in &args.values {
                self.values.insert(key.clone(), value.clone());
            }
        }
    }

    /// Return a copy overlaid with `extra`, leaving `self` untouched.
    #[must_use]
    pub fn merged<'a, I>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = &'a Arguments>,
    {
        let mut merged = self.clone();
        merged.merge(extra);
        merged
    }

    /// Iterate over key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no arguments have been set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Encode as an `application/x-www-form-urlencoded` query string.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Arguments
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Arguments {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::Arguments;

    #[test]
    fn merge_is_right_biased() {
        let mut base: Arguments = [("project", "p1"), ("state", "active")].into_iter().collect();
        let first: Arguments = [("state", "deleted"), ("limit", "10")].into_iter().collect();
        let second: Arguments = [("limit", "50")].into_iter().collect();

        base.merge([&first, &second]);

        assert_eq!(base.get("project"), Some("p1"));
        assert_eq!(base.get("state"), Some("deleted"));
        assert_eq!(base.get("limit"), Some("50"));
        assert_eq!(base.len(), 3);
    }

    #[test]
    fn merged_leaves_original_untouched() {
        let base = Arguments::new().with("vdc", "v1");
        let extra = Arguments::new().with("vdc", "v2").with("page", 3);

        let merged = base.merged([&extra]);

        assert_eq!(base.get("vdc"), Some("v1"));
        assert!(base.get("page").is_none());
        assert_eq!(merged.get("vdc"), Some("v2"));
        assert_eq!(merged.get("page"), Some("3"));
    }

    #[test]
    fn merge_with_nothing_is_identity() {
        let mut base = Arguments::new().with("a", "1");
        base.merge(std::iter::empty());
        assert_eq!(base, Arguments::new().with("a", "1"));
    }

    #[test]
    fn query_string_is_encoded() {
        let args = Arguments::new().with("name", "my vm&co").with("page", 2);
        assert_eq!(args.to_query_string(), "name=my+vm%26co&page=2");
    }

    #[test]
    fn empty_query_string() {
        assert_eq!(Arguments::new().to_query_string(), "");
    }
}
