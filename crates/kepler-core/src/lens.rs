//! Typed accessor/mutator pairs bound to one slice of the root state.
//!
//! A lens is the only way combined updaters and the composer read or replace
//! a slice. `set` swaps exactly one `Arc` and shares every other slice with
//! the input root, and `set(root, get(root))` returns a root whose slices are
//! all pointer-identical to the input.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use super::error::CompositionError;
use super::root::RootState;
use super::root::SliceKey;
use super::slices::map_state::MapState;
use super::slices::map_style::MapStyle;
use super::slices::provider_state::ProviderState;
use super::slices::ui_state::UiState;
use super::slices::vis_state::VisState;

pub trait Lens {
    type Slice: Send + Sync + 'static;

    fn key(&self) -> SliceKey;

    fn get(&self, root: &RootState) -> Result<Arc<Self::Slice>, CompositionError>;

    fn set(&self, root: &RootState, slice: Arc<Self::Slice>) -> RootState;

    /// Run `update` on the focused slice and write the result back.
    fn over<E>(
        &self,
        root: &RootState,
        update: impl FnOnce(&Arc<Self::Slice>) -> Result<Arc<Self::Slice>, E>,
    ) -> Result<RootState, E>
    where
        E: From<CompositionError>,
    {
        let current = self.get(root)?;
        let next = update(&current)?;
        Ok(self.set(root, next))
    }
}

macro_rules! builtin_lens {
    ($lens:ident, $slice:ty, $field:ident, $key:expr) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $lens;

        impl Lens for $lens {
            type Slice = $slice;

            fn key(&self) -> SliceKey {
                $key
            }

            fn get(&self, root: &RootState) -> Result<Arc<$slice>, CompositionError> {
                Ok(Arc::clone(&root.$field))
            }

            fn set(&self, root: &RootState, slice: Arc<$slice>) -> RootState {
                if Arc::ptr_eq(&root.$field, &slice) {
                    return root.clone();
                }
                let mut next = root.clone();
                next.$field = slice;
                next
            }
        }
    };
}

builtin_lens!(VisStateLens, VisState, vis_state, SliceKey::VisState);
builtin_lens!(MapStateLens, MapState, map_state, SliceKey::MapState);
builtin_lens!(MapStyleLens, MapStyle, map_style, SliceKey::MapStyle);
builtin_lens!(UiStateLens, UiState, ui_state, SliceKey::UiState);
builtin_lens!(
    ProviderStateLens,
    ProviderState,
    provider_state,
    SliceKey::ProviderState
);

/// Lens onto an externally registered slice.
///
/// Only `CompositionBuilder::register_slice` hands these out, which ties the
/// key and the slice type together at composition time.
#[derive(Debug)]
pub struct ExtensionLens<S> {
    key: Arc<str>,
    _slice: PhantomData<fn() -> S>,
}

impl<S> Clone for ExtensionLens<S> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _slice: PhantomData,
        }
    }
}

impl<S> ExtensionLens<S> {
    pub(crate) fn new(key: Arc<str>) -> Self {
        Self {
            key,
            _slice: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.key
    }
}

impl<S: Send + Sync + 'static> Lens for ExtensionLens<S> {
    type Slice = S;

    fn key(&self) -> SliceKey {
        SliceKey::Extension(self.key.clone())
    }

    fn get(&self, root: &RootState) -> Result<Arc<S>, CompositionError> {
        let slot = root
            .extension(&self.key)
            .ok_or_else(|| CompositionError::MissingSlice(self.key()))?;
        Arc::clone(slot)
            .downcast::<S>()
            .map_err(|_| CompositionError::SliceTypeMismatch(self.key()))
    }

    fn set(&self, root: &RootState, slice: Arc<S>) -> RootState {
        let erased: Arc<dyn Any + Send + Sync> = slice;
        if root
            .extension(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &erased))
        {
            return root.clone();
        }
        let mut next = root.clone();
        Arc::make_mut(&mut next.extensions).insert(self.key.clone(), erased);
        next
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::CoreConfig;
    use crate::reducer::CompositionBuilder;

    fn root() -> RootState {
        CompositionBuilder::new(CoreConfig::default())
            .build()
            .initial_state()
    }

    #[test]
    fn get_after_set_returns_the_same_allocation() {
        let root = root();
        let replacement = Arc::new(MapState {
            drag_rotate: true,
            ..(**root.map_state()).clone()
        });
        let next = MapStateLens.set(&root, Arc::clone(&replacement));
        let read = MapStateLens.get(&next).expect("builtin");
        assert!(Arc::ptr_eq(&read, &replacement));
        assert_eq!(root.changed_slices(&next), vec![SliceKey::MapState]);
    }

    #[test]
    fn set_of_current_value_is_a_no_op() {
        let root = root();
        let current = VisStateLens.get(&root).expect("builtin");
        let next = VisStateLens.set(&root, current);
        assert!(root.same(&next));
    }

    #[test]
    fn set_shares_untouched_slices() {
        let root = root();
        let next = UiStateLens.set(&root, Arc::new((**root.ui_state()).clone()));
        assert!(Arc::ptr_eq(root.vis_state(), next.vis_state()));
        assert!(Arc::ptr_eq(root.map_state(), next.map_state()));
        assert!(Arc::ptr_eq(root.map_style(), next.map_style()));
        assert!(Arc::ptr_eq(root.provider_state(), next.provider_state()));
        assert!(!Arc::ptr_eq(root.ui_state(), next.ui_state()));
    }

    #[test]
    fn extension_lens_reports_missing_slice() {
        let lens: ExtensionLens<u32> = ExtensionLens::new(Arc::from("counter"));
        let err = lens.get(&root()).expect_err("not registered");
        assert_eq!(
            err,
            CompositionError::MissingSlice(SliceKey::Extension(Arc::from("counter")))
        );
    }

    #[test]
    fn extension_lens_round_trips_through_set() {
        let mut builder = CompositionBuilder::new(CoreConfig::default());
        let lens = builder
            .register_slice("counter", 0_u32, |state, _action, _diagnostics| {
                Arc::clone(state)
            })
            .expect("register");
        let root = builder.build().initial_state();
        let next = lens.set(&root, Arc::new(7));
        assert_eq!(*lens.get(&next).expect("present"), 7);
        assert!(Arc::ptr_eq(next.vis_state(), root.vis_state()));
        assert_eq!(
            root.changed_slices(&next),
            vec![SliceKey::Extension(Arc::from("counter"))]
        );
    }
}
