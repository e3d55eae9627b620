//! Live effect and overlay lists iterated by the render pass.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::effect::Effect;
use crate::overlay::Overlay;

pub type SharedEffect = Rc<RefCell<Effect>>;
pub type SharedOverlay = Rc<RefCell<Overlay>>;

/// Non-owning lists of registered effects and overlays, in registration order.
///
/// Callers own the entities. An entry disappears when it is unregistered or
/// when its last owner drops it; dead entries are skipped and pruned.
#[derive(Default)]
pub struct OverlayRegistry {
    effects: Vec<Weak<RefCell<Effect>>>,
    overlays: Vec<Weak<RefCell<Overlay>>>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `fx`; registering the same effect twice is a no-op.
    pub fn register_effect(&mut self, fx: &SharedEffect) {
        register(&mut self.effects, fx);
    }

    /// Returns whether `fx` was registered.
    pub fn unregister_effect(&mut self, fx: &SharedEffect) -> bool {
        unregister(&mut self.effects, fx)
    }

    pub fn register_overlay(&mut self, overlay: &SharedOverlay) {
        register(&mut self.overlays, overlay);
    }

    pub fn unregister_overlay(&mut self, overlay: &SharedOverlay) -> bool {
        unregister(&mut self.overlays, overlay)
    }

    /// Live effects in registration order.
    pub fn effects(&self) -> Vec<SharedEffect> {
        self.effects.iter().filter_map(Weak::upgrade).collect()
    }

    /// Live overlays in registration (draw) order.
    pub fn overlays(&self) -> Vec<SharedOverlay> {
        self.overlays.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn effect_count(&self) -> usize {
        self.effects.iter().filter(|w| w.strong_count() > 0).count()
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Drops entries whose owners are gone.
    pub fn prune(&mut self) {
        let before = self.effects.len() + self.overlays.len();
        self.effects.retain(|w| w.strong_count() > 0);
        self.overlays.retain(|w| w.strong_count() > 0);
        let pruned = before - (self.effects.len() + self.overlays.len());
        if pruned > 0 {
            log::trace!("registry pruned {pruned} dropped entries");
        }
    }
}

fn register<T>(list: &mut Vec<Weak<RefCell<T>>>, item: &Rc<RefCell<T>>) {
    let weak = Rc::downgrade(item);
    if !list.iter().any(|w| w.ptr_eq(&weak)) {
        list.push(weak);
    }
}

fn unregister<T>(list: &mut Vec<Weak<RefCell<T>>>, item: &Rc<RefCell<T>>) -> bool {
    let weak = Rc::downgrade(item);
    let before = list.len();
    list.retain(|w| !w.ptr_eq(&weak));
    list.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect() -> SharedEffect {
        Rc::new(RefCell::new(Effect::new()))
    }

    #[test]
    fn keeps_registration_order() {
        let mut reg = OverlayRegistry::new();
        let a = effect();
        let b = effect();
        reg.register_effect(&a);
        reg.register_effect(&b);

        let live = reg.effects();
        assert!(Rc::ptr_eq(&live[0], &a));
        assert!(Rc::ptr_eq(&live[1], &b));
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let mut reg = OverlayRegistry::new();
        let a = effect();
        reg.register_effect(&a);
        reg.register_effect(&a);
        assert_eq!(reg.effect_count(), 1);
    }

    #[test]
    fn unregister_removes_entry() {
        let mut reg = OverlayRegistry::new();
        let a = effect();
        reg.register_effect(&a);

        assert!(reg.unregister_effect(&a));
        assert!(!reg.unregister_effect(&a));
        assert!(reg.effects().is_empty());
    }

    #[test]
    fn registry_does_not_keep_entities_alive() {
        let mut reg = OverlayRegistry::new();
        let fx = effect();
        let overlay = Rc::new(RefCell::new(Overlay::new(fx.clone())));
        reg.register_effect(&fx);
        reg.register_overlay(&overlay);

        drop(overlay);
        assert_eq!(reg.overlay_count(), 0);
        assert!(reg.overlays().is_empty());

        reg.prune();
        assert_eq!(reg.overlays.len(), 0);
        assert_eq!(reg.effects.len(), 1);
    }
}
