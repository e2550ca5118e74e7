//! Accessor registry
//!
//! Binds accessor names such as `as_triplegs` to factories building a typed
//! view over a table. The registry is filled once at start-up by whoever
//! composes the application and only read afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use super::{entity, Entity, Tagged, View};
use crate::frame::Frame;
use crate::{Error, Result};

/// Builds a typed view over a table
pub type Factory = Arc<dyn Fn(Frame) -> Result<Tagged> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Registry {
    accessors: BTreeMap<String, Factory>,
}

impl Registry {
    /// Registry without accessors
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with an `as_<view>` accessor for every public view
    pub fn with_views() -> Self {
        let mut registry = Self::new();

        registry.register_view::<entity::Positionfix>("as_positionfixes");
        registry.register_view::<entity::Staypoint>("as_staypoints");
        registry.register_view::<entity::Tripleg>("as_triplegs");
        registry.register_view::<entity::Trip>("as_trips");
        registry.register_view::<entity::Location>("as_locations");
        registry.register_view::<entity::Tour>("as_tours");

        registry
    }

    /// Bind `factory` to `name`
    ///
    /// A name can be bound once: registering it again warns and the new
    /// factory replaces the old one, which is returned.
    pub fn register<F>(&mut self, name: &str, factory: F) -> Option<Factory>
    where
        F: Fn(Frame) -> Result<Tagged> + Send + Sync + 'static,
    {
        let previous = self.accessors.insert(name.to_string(), Arc::new(factory));
        if previous.is_some() {
            warn!(
                "registration of accessor {:?} is overriding a preexisting accessor with the same name",
                name
            );
        }

        previous
    }

    /// Bind a factory validating the contract of `E`
    pub fn register_view<E: Entity + 'static>(&mut self, name: &str) -> Option<Factory> {
        self.register(name, |frame| View::<E>::new(frame).map(Tagged::from))
    }

    /// Build the view bound to `name` over `frame`
    ///
    /// The factory runs on every access, nothing is cached.
    pub fn access(&self, name: &str, frame: Frame) -> Result<Tagged> {
        let factory = self
            .accessors
            .get(name)
            .ok_or_else(|| Error::UnknownAccessor(name.to_string()))?;

        factory(frame)
    }

    /// The factory bound to `name`, not evaluated
    pub fn factory(&self, name: &str) -> Option<Factory> {
        self.accessors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.accessors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(|k| k.as_str())
    }
}
