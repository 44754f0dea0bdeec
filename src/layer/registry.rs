//! Default-layer registry and the effective layer view

use std::iter::FusedIterator;
use std::sync::{Arc, PoisonError, RwLock};
use std::vec;

use super::{Layer, SuiteLayer};

/// Process-wide default layers, shared by every context created from it.
///
/// The registry is append-only. Contexts take a snapshot each time they build
/// a layer view, so layers appended after a run has started are only seen by
/// later phases; callers should finish registering before running.
#[derive(Default)]
pub struct LayerRegistry {
    program: RwLock<Vec<Arc<dyn Layer>>>,
    suite: RwLock<Vec<Arc<dyn SuiteLayer>>>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for the common case of sharing one registry.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn add_layer(&self, layer: Arc<dyn Layer>) {
        self.program
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(layer);
    }

    pub fn add_layers(&self, layers: impl IntoIterator<Item = Arc<dyn Layer>>) {
        self.program
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(layers);
    }

    pub fn add_suite_layer(&self, layer: Arc<dyn SuiteLayer>) {
        self.suite
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(layer);
    }

    /// Snapshot of program layers in registration order.
    pub fn program_layers(&self) -> Vec<Arc<dyn Layer>> {
        self.program
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of suite layers in registration order.
    pub fn suite_layers(&self) -> Vec<Arc<dyn SuiteLayer>> {
        self.suite
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.program.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Effective layer sequence: enabled defaults, then enabled custom layers.
///
/// Single-pass. The view owns snapshots of both lists and yields each enabled
/// layer once; a consumed view stays empty. Ask the owner for a fresh view
/// to traverse again. The enabled flag is read as each layer is reached.
pub struct LayerView<L: ?Sized> {
    defaults: vec::IntoIter<Arc<L>>,
    custom: vec::IntoIter<Arc<L>>,
    enabled: fn(&L) -> bool,
}

impl<L: ?Sized> LayerView<L> {
    pub fn new(defaults: Vec<Arc<L>>, custom: Vec<Arc<L>>, enabled: fn(&L) -> bool) -> Self {
        Self {
            defaults: defaults.into_iter(),
            custom: custom.into_iter(),
            enabled,
        }
    }
}

impl<L: ?Sized> Iterator for LayerView<L> {
    type Item = Arc<L>;

    fn next(&mut self) -> Option<Self::Item> {
        let enabled = self.enabled;
        self.defaults
            .by_ref()
            .chain(self.custom.by_ref())
            .find(|layer| enabled(&**layer))
    }
}

impl<L: ?Sized> FusedIterator for LayerView<L> {}

pub(crate) fn layer_enabled(layer: &(dyn Layer + 'static)) -> bool {
    layer.enabled()
}

pub(crate) fn suite_layer_enabled(layer: &(dyn SuiteLayer + 'static)) -> bool {
    layer.enabled()
}
