//! Named action constructors that scenario code looks up instead of naming
//! concrete actions directly.
//!
//! A device-specific variant of an action is substituted by registering a
//! different constructor under the same kind before the table is handed to
//! the scenario.

use std::collections::BTreeMap;

use crate::action::Action;
use crate::error::DslError;

type Constructor<P> = Box<dyn Fn(&P) -> Action<'static>>;

/// Table of action constructors keyed by kind, parameterized by the
/// argument type `P` every constructor receives.
pub struct ActionFactory<P> {
    constructors: BTreeMap<String, Constructor<P>>,
}

impl<P> Default for ActionFactory<P> {
    fn default() -> Self {
        ActionFactory {
            constructors: BTreeMap::new(),
        }
    }
}

impl<P> ActionFactory<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `make` for `kind`, replacing any earlier registration.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        make: impl Fn(&P) -> Action<'static> + 'static,
    ) -> &mut Self {
        self.constructors.insert(kind.into(), Box::new(make));
        self
    }

    /// Chaining form of [`register`](Self::register).
    pub fn with(
        mut self,
        kind: impl Into<String>,
        make: impl Fn(&P) -> Action<'static> + 'static,
    ) -> Self {
        self.register(kind, make);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Builds a fresh action of `kind`.
    pub fn make(&self, kind: &str, params: &P) -> Result<Action<'static>, DslError> {
        let make = self
            .constructors
            .get(kind)
            .ok_or_else(|| DslError::UnknownActionKind {
                kind: kind.to_string(),
            })?;
        Ok(make(params))
    }
}

impl<P> std::fmt::Debug for ActionFactory<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}
