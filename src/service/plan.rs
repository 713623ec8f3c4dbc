//! Write planning: which linked instances must be inserted before a row can be bound.

use crate::entity::Entity;
use crate::error::StoreError;
use crate::value::{Datum, Reference};
use std::collections::HashSet;

/// Keyless instances linked from `root` through persisted references, in the
/// order they must be inserted: every target precedes the instances that link
/// to it. `root` itself is not included. Keyed targets are bound by key and
/// not descended into. Fails before anything is written if the keyless
/// instances link back into a chain still being planned.
pub fn pending_references(root: &Entity) -> Result<Vec<Entity>, StoreError> {
    let mut planner = Planner::default();
    planner.visit(root)?;
    planner.order.pop();
    Ok(planner.order)
}

#[derive(Default)]
struct Planner {
    in_progress: HashSet<usize>,
    done: HashSet<usize>,
    order: Vec<Entity>,
}

impl Planner {
    fn visit(&mut self, entity: &Entity) -> Result<(), StoreError> {
        self.in_progress.insert(entity.id());
        let map = entity.map();
        let slots = entity.snapshot();
        for field in map.persisted().filter(|f| f.data_type.is_reference()) {
            let Some(Datum::Reference(Reference::ByValue(target))) = &slots[field.index] else {
                continue;
            };
            if target.key().is_some() || self.done.contains(&target.id()) {
                continue;
            }
            if self.in_progress.contains(&target.id()) {
                return Err(StoreError::CyclicReferenceDetected(field.full_name(&map.name)));
            }
            self.visit(target)?;
        }
        self.in_progress.remove(&entity.id());
        self.done.insert(entity.id());
        self.order.push(entity.clone());
        Ok(())
    }
}
