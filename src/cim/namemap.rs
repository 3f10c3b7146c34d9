use indexmap::IndexMap;

/// Insertion-ordered map keyed by CIM element names.
///
/// CIM names (class, property, method, parameter, qualifier, key) compare
/// case-insensitively but preserve the case they were created with. Lookup
/// keys are folded to ASCII lowercase; the original spelling is kept per
/// entry and returned by iteration.
#[derive(Debug, Clone)]
pub struct NameMap<T> {
    inner: IndexMap<String, Entry<T>>,
}

// Not derived: a derived impl would needlessly require `T: Default`.
impl<T> Default for NameMap<T> {
    fn default() -> Self {
        NameMap::new()
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    name: String,
    value: T,
}

impl<T> NameMap<T> {
    pub fn new() -> Self {
        NameMap {
            inner: IndexMap::new(),
        }
    }

    pub fn with_capacity(n: usize) -> Self {
        NameMap {
            inner: IndexMap::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Insert under `name`, replacing (and returning) any entry whose name
    /// differs only in case.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        self.inner
            .insert(key, Entry { name, value })
            .map(|e| e.value)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(|e| &e.value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.inner
            .get_mut(&name.to_ascii_lowercase())
            .map(|e| &mut e.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_lowercase())
    }

    /// Remove by name, preserving the order of the remaining entries.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.inner
            .shift_remove(&name.to_ascii_lowercase())
            .map(|e| e.value)
    }

    /// Iterate in insertion order, yielding original-case names.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.inner.values().map(|e| (e.name.as_str(), &e.value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.inner
            .values_mut()
            .map(|e| (e.name.as_str(), &mut e.value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.values().map(|e| e.name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.inner.values().map(|e| &e.value)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.inner.values_mut().map(|e| &mut e.value)
    }

    pub fn into_iter(self) -> impl Iterator<Item = (String, T)> {
        self.inner.into_values().map(|e| (e.name, e.value))
    }
}

/// Equality ignores both name case and insertion order.
impl<T: PartialEq> PartialEq for NameMap<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.len() == other.inner.len()
            && self
                .inner
                .iter()
                .all(|(k, e)| other.inner.get(k).is_some_and(|o| o.value == e.value))
    }
}

impl<K: Into<String>, T> FromIterator<(K, T)> for NameMap<T> {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        let mut map = NameMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl<K: Into<String>, T> Extend<(K, T)> for NameMap<T> {
    fn extend<I: IntoIterator<Item = (K, T)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}
