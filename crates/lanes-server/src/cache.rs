use std::sync::Arc;

use dashmap::DashMap;

use lanes_core::{TodoWithSubtasks, UserId};

type View = Arc<Vec<TodoWithSubtasks>>;

#[derive(Default)]
struct Slot {
    /// Bumped by every invalidation.
    generation: u64,
    view: Option<View>,
}

/// Per-user snapshot of `todos.list`. Reads fill it; every mutation by the
/// same user drops it.
///
/// A load that overlaps an invalidation is returned to its caller but never
/// stored, so a view read before a write cannot outlive that write.
#[derive(Default)]
pub struct ViewCache {
    slots: DashMap<UserId, Slot>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &UserId) -> Option<View> {
        self.slots.get(user_id).and_then(|slot| slot.view.clone())
    }

    /// Return the cached view or build it with `load`. A failed load caches
    /// nothing.
    pub fn get_or_try_load<E>(
        &self,
        user_id: &UserId,
        load: impl FnOnce() -> Result<Vec<TodoWithSubtasks>, E>,
    ) -> Result<View, E> {
        let started = match self.slots.get(user_id) {
            Some(slot) => match &slot.view {
                Some(hit) => return Ok(Arc::clone(hit)),
                None => slot.generation,
            },
            None => 0,
        };

        let view = Arc::new(load()?);
        let mut slot = self.slots.entry(user_id.clone()).or_default();
        if slot.generation == started {
            slot.view = Some(Arc::clone(&view));
        }
        Ok(view)
    }

    pub fn invalidate(&self, user_id: &UserId) {
        let mut slot = self.slots.entry(user_id.clone()).or_default();
        slot.generation += 1;
        slot.view = None;
    }

    /// Number of users with a cached view.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.view.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
