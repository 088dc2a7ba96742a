use std::collections::BTreeMap;
use std::sync::Arc;

use super::actions::Action;
use super::error::InstanceError;
use super::reducer::CoreReducer;
use super::reducer::Reduction;
use super::root::RootState;

/// Several independent map instances sharing one composition.
///
/// Each entry owns its own root; actions reach an entry only through
/// [`InstanceRegistry::forward`].
pub struct InstanceRegistry {
    reducer: Arc<CoreReducer>,
    entries: BTreeMap<String, RootState>,
}

impl InstanceRegistry {
    pub fn new(reducer: Arc<CoreReducer>) -> Self {
        Self {
            reducer,
            entries: BTreeMap::new(),
        }
    }

    pub fn register_entry(&mut self, id: &str) -> Result<&RootState, InstanceError> {
        if self.entries.contains_key(id) {
            return Err(InstanceError::DuplicateInstance(id.to_string()));
        }
        tracing::debug!(instance = id, "registered map instance");
        let root = self.reducer.initial_state();
        Ok(self.entries.entry(id.to_string()).or_insert(root))
    }

    pub fn delete_entry(&mut self, id: &str) -> Result<RootState, InstanceError> {
        self.entries
            .remove(id)
            .ok_or_else(|| InstanceError::UnknownInstance(id.to_string()))
    }

    /// Moves the root of `old` under `new`, keeping it pointer-identical.
    pub fn rename_entry(&mut self, old: &str, new: &str) -> Result<(), InstanceError> {
        if old == new {
            return self
                .entries
                .contains_key(old)
                .then_some(())
                .ok_or_else(|| InstanceError::UnknownInstance(old.to_string()));
        }
        if self.entries.contains_key(new) {
            return Err(InstanceError::DuplicateInstance(new.to_string()));
        }
        let root = self.delete_entry(old)?;
        self.entries.insert(new.to_string(), root);
        Ok(())
    }

    pub fn forward(&mut self, id: &str, action: &Action) -> Result<Reduction, InstanceError> {
        let root = self
            .entries
            .get_mut(id)
            .ok_or_else(|| InstanceError::UnknownInstance(id.to_string()))?;
        let reduction = self.reducer.reduce(root, action);
        *root = reduction.root.clone();
        Ok(reduction)
    }

    pub fn get(&self, id: &str) -> Option<&RootState> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::actions::UiStateAction;
    use crate::config::CoreConfig;
    use crate::reducer::CompositionBuilder;

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(Arc::new(CompositionBuilder::new(CoreConfig::default()).build()))
    }

    fn locale(locale: &str) -> Action {
        Action::UiState(UiStateAction::SetLocale {
            locale: locale.to_string(),
        })
    }

    #[test]
    fn forwarded_actions_reach_only_their_entry() {
        let mut registry = registry();
        registry.register_entry("left").expect("left");
        registry.register_entry("right").expect("right");

        registry.forward("left", &locale("pt")).expect("forward");
        assert_eq!(registry.get("left").expect("left").ui_state().locale, "pt");
        assert_eq!(registry.get("right").expect("right").ui_state().locale, "en");
    }

    #[test]
    fn unknown_and_duplicate_ids_are_errors() {
        let mut registry = registry();
        registry.register_entry("map").expect("map");
        assert_eq!(
            registry.register_entry("map").expect_err("duplicate"),
            InstanceError::DuplicateInstance("map".to_string())
        );
        assert_eq!(
            registry.forward("other", &locale("pt")).expect_err("unknown"),
            InstanceError::UnknownInstance("other".to_string())
        );
        assert!(registry.delete_entry("other").is_err());
    }

    #[test]
    fn rename_keeps_the_root() {
        let mut registry = registry();
        registry.register_entry("draft").expect("draft");
        registry.forward("draft", &locale("ko")).expect("forward");
        let before = registry.get("draft").expect("draft").clone();

        registry.rename_entry("draft", "final").expect("rename");
        assert!(registry.get("draft").is_none());
        assert!(registry.get("final").expect("final").same(&before));
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["final"]);

        registry.register_entry("other").expect("other");
        assert_eq!(
            registry.rename_entry("final", "other").expect_err("taken"),
            InstanceError::DuplicateInstance("other".to_string())
        );
    }
}
