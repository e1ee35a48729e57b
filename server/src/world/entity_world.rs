use std::collections::{HashMap, VecDeque};

use log::debug;
use thiserror::Error;

use tickwire_shared::{ClassId, EntityId, EntityVersion, PlayerId, INVALID_ENTITY_ID};

use super::entity::SyncedEntity;
use super::layout::{ClassKind, ClassRegistry};

/// Errors that can occur while creating entities
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    /// The class id was never registered; fatal to this spawn.
    #[error("cannot spawn entity: class {class_id} is not registered")]
    UnregisteredClass { class_id: ClassId },

    /// Every synced entity id is in use.
    #[error("cannot spawn entity: all {capacity} synced entity ids are in use")]
    IdExhausted { capacity: u16 },

    /// A singleton of this class already exists.
    #[error("cannot spawn singleton: class {class_id} already has entity {entity_id}")]
    SingletonExists {
        class_id: ClassId,
        entity_id: EntityId,
    },
}

/// Errors raised by operations on existing entities
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("entity {entity_id} does not exist")]
    NoSuchEntity { entity_id: EntityId },
}

/// Fixed-capacity table of synced entities keyed by id.
///
/// Ids are drawn from a FIFO free queue and recycled with a per-id version
/// counter so reused ids stay distinguishable across reordered packets. A
/// destroyed entity's id goes back to the queue only once no player can
/// still reference it (see `release_id`).
pub struct EntityWorld {
    slots: Vec<Option<SyncedEntity>>,
    versions: Vec<EntityVersion>,
    free_ids: VecDeque<EntityId>,
    singletons: HashMap<ClassId, EntityId>,
    count: usize,
}

impl EntityWorld {
    pub fn new(capacity: u16) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            versions: vec![0; usize::from(capacity)],
            free_ids: (0..capacity).collect(),
            singletons: HashMap::new(),
            count: 0,
        }
    }

    pub fn capacity(&self) -> u16 {
        self.slots.len() as u16
    }

    /// Number of live entities.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn entity(&self, id: EntityId) -> Option<&SyncedEntity> {
        self.slots.get(usize::from(id))?.as_ref()
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut SyncedEntity> {
        self.slots.get_mut(usize::from(id))?.as_mut()
    }

    /// Iterates over live entity ids in id order.
    pub fn live_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(id, _)| id as EntityId)
    }

    pub fn singleton(&self, class_id: ClassId) -> Option<EntityId> {
        self.singletons.get(&class_id).copied()
    }

    /// Allocates an id and creates an entity of the given class.
    ///
    /// The version stored on the new entity is the slot's next version; it
    /// advances on every allocation so a reused id never collides with a
    /// stale reference to its predecessor.
    pub fn spawn(
        &mut self,
        registry: &ClassRegistry,
        class_id: ClassId,
        owner: PlayerId,
    ) -> Result<EntityId, SpawnError> {
        let layout = registry
            .layout(class_id)
            .ok_or(SpawnError::UnregisteredClass { class_id })?;

        if layout.kind == ClassKind::Singleton {
            if let Some(&entity_id) = self.singletons.get(&class_id) {
                return Err(SpawnError::SingletonExists {
                    class_id,
                    entity_id,
                });
            }
        }

        let id = self.free_ids.pop_front().ok_or(SpawnError::IdExhausted {
            capacity: self.capacity(),
        })?;

        let version = self.versions[usize::from(id)];
        self.versions[usize::from(id)] = version.wrapping_add(1);

        self.slots[usize::from(id)] = Some(SyncedEntity::new(layout, id, version, owner));
        self.count += 1;
        if layout.kind == ClassKind::Singleton {
            self.singletons.insert(class_id, id);
        }

        Ok(id)
    }

    /// Reparents `child`, keeping the child-set view and the child's parent
    /// pointer consistent, then propagates the new owner depth-first
    /// through the child's descendants.
    pub fn set_parent(
        &mut self,
        child: EntityId,
        parent: Option<EntityId>,
    ) -> Result<(), WorldError> {
        let old_parent = self
            .entity(child)
            .ok_or(WorldError::NoSuchEntity { entity_id: child })?
            .parent;

        if let Some(parent_id) = parent {
            if self.entity(parent_id).is_none() {
                return Err(WorldError::NoSuchEntity {
                    entity_id: parent_id,
                });
            }
        }

        if old_parent != INVALID_ENTITY_ID {
            if let Some(old) = self.entity_mut(old_parent) {
                old.remove_child(child);
            }
        }

        match parent {
            Some(parent_id) => {
                let owner = self.entity(parent_id).map(|p| p.owner).unwrap_or_default();
                if let Some(parent_entity) = self.entity_mut(parent_id) {
                    parent_entity.add_child(child);
                }
                if let Some(child_entity) = self.entity_mut(child) {
                    child_entity.parent = parent_id;
                }
                self.cascade_owner(child, owner);
            }
            None => {
                if let Some(child_entity) = self.entity_mut(child) {
                    child_entity.parent = INVALID_ENTITY_ID;
                }
            }
        }

        Ok(())
    }

    /// Depth-first owner propagation over the child-set view.
    fn cascade_owner(&mut self, root: EntityId, owner: PlayerId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(entity) = self.entity_mut(id) {
                entity.owner = owner;
                stack.extend_from_slice(entity.children());
            }
        }
    }

    pub fn set_controlled_pawn(
        &mut self,
        controller: EntityId,
        pawn: Option<EntityId>,
    ) -> Result<(), WorldError> {
        if let Some(pawn_id) = pawn {
            if self.entity(pawn_id).is_none() {
                return Err(WorldError::NoSuchEntity { entity_id: pawn_id });
            }
        }
        let entity = self
            .entity_mut(controller)
            .ok_or(WorldError::NoSuchEntity {
                entity_id: controller,
            })?;
        entity.controlled_pawn = pawn;
        Ok(())
    }

    /// Removes the entity from the table, detaching it from the graph.
    /// Returns the removed entity. The id stays reserved until
    /// `release_id`.
    pub(crate) fn remove(&mut self, id: EntityId) -> Option<SyncedEntity> {
        let entity = self.slots.get_mut(usize::from(id))?.take()?;
        self.count -= 1;

        if entity.parent != INVALID_ENTITY_ID {
            if let Some(parent) = self.entity_mut(entity.parent) {
                parent.remove_child(id);
            }
        }
        for &child in entity.children() {
            if let Some(child_entity) = self.entity_mut(child) {
                child_entity.parent = INVALID_ENTITY_ID;
            }
        }
        if self.singletons.get(&entity.class_id) == Some(&id) {
            self.singletons.remove(&entity.class_id);
        }

        Some(entity)
    }

    /// Returns a destroyed entity's id to the free queue.
    ///
    /// Callers invoke this once every player has acknowledged a tick past
    /// the destruction, or immediately when no players remain; in the
    /// latter case no in-flight packet may reference the id.
    pub(crate) fn release_id(&mut self, id: EntityId) {
        debug_assert!(self.slots[usize::from(id)].is_none());
        debug!("entity id {id} returned to the free queue");
        self.free_ids.push_back(id);
    }
}
