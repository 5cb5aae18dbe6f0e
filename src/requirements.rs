//! # Requirements aggregation
//!
//! Consumers of a provider or transformer do not call it with arguments. Instead, each consumer
//! registers a **requirements provider**: a zero-argument callback returning a
//! [`Fragment`] (a JSON object) that describes what it currently needs. At request time the
//! owner calls [`RequirementsManager::gather_requirements`], which invokes every callback in
//! registration order and returns a [`RequirementSet`] over the resulting fragments.
//!
//! Two merge rules are offered by [`RequirementSet`]:
//!
//! - [`find_first`](RequirementSet::find_first): value of the earliest fragment defining a key.
//! - [`concat_all`](RequirementSet::concat_all): flattened concatenation of every fragment's
//!   value for a key (used for column selections, where every consumer's columns count).
//!
//! Callbacks are invoked lazily so they can reflect the current UI state. A panicking callback
//! is a wiring bug and is not caught.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{constants::Fragment, maven_errors::MavenError};

type RequirementsProvider = Arc<dyn Fn() -> Fragment + Send + Sync>;

#[derive(Default)]
pub struct RequirementsManager {
    providers: RwLock<Vec<RequirementsProvider>>,
}

impl std::fmt::Debug for RequirementsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequirementsManager")
            .field("providers", &self.providers.read().len())
            .finish()
    }
}

impl RequirementsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked at every [`gather_requirements`](Self::gather_requirements).
    pub fn add_requirements_provider<F>(&self, provider: F)
    where
        F: Fn() -> Fragment + Send + Sync + 'static,
    {
        self.providers.write().push(Arc::new(provider));
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Invoke every registered provider, in registration order.
    pub fn gather_requirements(&self) -> RequirementSet {
        // clone the list so that a provider may register another one without deadlocking
        let providers: Vec<RequirementsProvider> = self.providers.read().clone();
        RequirementSet {
            fragments: providers.iter().map(|provider| provider()).collect(),
        }
    }
}

/// Ordered view over the fragments gathered during one request cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequirementSet {
    fragments: Vec<Fragment>,
}

impl RequirementSet {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        RequirementSet { fragments }
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Value of `key` in the first fragment that defines it.
    pub fn find_first(&self, key: &str) -> Option<&Value> {
        self.fragments.iter().find_map(|fragment| fragment.get(key))
    }

    /// Concatenation of the values of `key` over all fragments, in registration order.
    ///
    /// List values are flattened one level; scalar values are appended as single items.
    /// Fragments that do not define `key` (or define it as `null`) contribute nothing.
    pub fn concat_all(&self, key: &str) -> Vec<Value> {
        let mut result = Vec::new();
        for value in self.fragments.iter().filter_map(|fragment| fragment.get(key)) {
            match value {
                Value::Array(items) => result.extend(items.iter().cloned()),
                Value::Null => {}
                other => result.push(other.clone()),
            }
        }
        result
    }

    /// [`find_first`](Self::find_first), deserialized into `T`.
    ///
    /// Return
    /// ------
    /// * `Ok(None)` if no fragment defines `key` (or it is `null`),
    ///   [`MavenError::InvalidRequirement`] if the value has the wrong shape.
    pub fn find_first_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, MavenError> {
        match self.find_first(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| MavenError::InvalidRequirement {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Like [`find_first_as`](Self::find_first_as) but the key must be present.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, MavenError> {
        self.find_first_as(key)?
            .ok_or_else(|| MavenError::MissingRequirement(key.to_string()))
    }

    /// [`concat_all`](Self::concat_all) restricted to string items, as used for column names.
    pub fn concat_all_strings(&self, key: &str) -> Result<Vec<String>, MavenError> {
        self.concat_all(key)
            .into_iter()
            .map(|value| match value {
                Value::String(s) => Ok(s),
                other => Err(MavenError::InvalidRequirement {
                    key: key.to_string(),
                    reason: format!("expected a string, found {other}"),
                }),
            })
            .collect()
    }
}

/// Build a [`Fragment`] from `key => value` pairs. Values are single `serde_json::json!`
/// token trees: literals, identifiers, `[...]`, `{...}`, or a parenthesized expression.
///
/// ```rust
/// use maven3d::fragment;
///
/// let f = fragment! { "parameter" => "o2plus", "altitude" => 98.75 };
/// assert_eq!(f["parameter"], "o2plus");
/// ```
#[macro_export]
macro_rules! fragment {
    ($($key:expr => $value:tt),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut fragment = $crate::constants::Fragment::new();
        $(
            fragment.insert($key.to_string(), ::serde_json::json!($value));
        )*
        fragment
    }};
}

#[cfg(test)]
mod requirements_test {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager_with(fragments: Vec<Fragment>) -> RequirementsManager {
        let manager = RequirementsManager::new();
        for fragment in fragments {
            manager.add_requirements_provider(move || fragment.clone());
        }
        manager
    }

    #[test]
    fn test_find_first_uses_registration_order() {
        let manager = manager_with(vec![
            fragment! { "timeframe" => "a" },
            fragment! { "timeframe" => "b", "isInertial" => true },
        ]);
        let requirements = manager.gather_requirements();
        assert_eq!(requirements.find_first("timeframe"), Some(&json!("a")));
        assert_eq!(requirements.find_first("isInertial"), Some(&json!(true)));
        assert_eq!(requirements.find_first("missing"), None);
    }

    #[test]
    fn test_concat_all_flattens_in_order() {
        let manager = manager_with(vec![
            fragment! { "selection" => ["timetag", "lat"] },
            fragment! { "other" => 1 },
            fragment! { "selection" => ["lng"] },
            fragment! { "selection" => "alt" },
        ]);
        let requirements = manager.gather_requirements();
        assert_eq!(
            requirements.concat_all("selection"),
            vec![json!("timetag"), json!("lat"), json!("lng"), json!("alt")]
        );
        assert!(requirements.concat_all("nothing").is_empty());
        assert_eq!(
            requirements.concat_all_strings("selection").unwrap(),
            vec!["timetag", "lat", "lng", "alt"]
        );
    }

    #[test]
    fn test_providers_are_invoked_lazily() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = RequirementsManager::new();
        let counter = calls.clone();
        manager.add_requirements_provider(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            fragment! { "n" => n }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(manager.gather_requirements().find_first("n"), Some(&json!(1)));
        assert_eq!(manager.gather_requirements().find_first("n"), Some(&json!(2)));
    }

    #[test]
    fn test_typed_access() {
        let requirements = RequirementSet::new(vec![
            fragment! { "altitude" => 98.75, "solarFlux" => null },
        ]);
        assert_eq!(requirements.require::<f64>("altitude").unwrap(), 98.75);
        assert_eq!(requirements.find_first_as::<u32>("solarFlux").unwrap(), None);
        assert_eq!(
            requirements.require::<u32>("solarLongitude"),
            Err(MavenError::MissingRequirement("solarLongitude".into()))
        );
        assert!(matches!(
            requirements.require::<String>("altitude"),
            Err(MavenError::InvalidRequirement { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "wiring bug")]
    fn test_panicking_provider_is_not_caught() {
        let manager = RequirementsManager::new();
        manager.add_requirements_provider(|| panic!("wiring bug"));
        manager.gather_requirements();
    }
}
