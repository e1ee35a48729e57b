use std::collections::HashMap;

use thiserror::Error;

use tickwire_shared::ClassId;

/// Errors that can occur while registering entity classes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A class id was registered twice.
    #[error("class {class_id} is already registered")]
    DuplicateClass { class_id: ClassId },

    /// Field indices ride the wire as a single byte.
    #[error("class {class_id} declares {count} synchronized fields, limit is 255")]
    TooManyFields { class_id: ClassId, count: usize },

    /// A field lies outside the class sync block.
    #[error("class {class_id} field {field_index} overruns its sync block")]
    FieldOutOfBounds {
        class_id: ClassId,
        field_index: usize,
    },
}

/// Replication role of an entity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Plain,
    /// Issues commands to a pawn; owned by a player and destroyed with it.
    Controller,
    Pawn,
    /// At most one live instance per engine.
    Singleton,
}

/// One synchronized field of an entity class: where it lives in the sync
/// block, how wide it is, and how the client should treat it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub offset: usize,
    pub width: usize,
    /// Index of the change-notify callback the client resolves, if any.
    pub notify: Option<u16>,
    pub interpolated: bool,
    pub rollback: bool,
    /// Replicated to the owning player only.
    pub owner_only: bool,
}

impl FieldDescriptor {
    pub fn new(offset: usize, width: usize) -> Self {
        Self {
            offset,
            width,
            notify: None,
            interpolated: false,
            rollback: false,
            owner_only: false,
        }
    }

    pub fn notify(mut self, hook: u16) -> Self {
        self.notify = Some(hook);
        self
    }

    pub fn interpolated(mut self) -> Self {
        self.interpolated = true;
        self
    }

    pub fn rollback(mut self) -> Self {
        self.rollback = true;
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.owner_only = true;
        self
    }
}

/// Field layout and replication markers for one entity class.
///
/// Field order is stable after registration and defines the wire layout of
/// baseline and diff records for the class.
#[derive(Debug, Clone)]
pub struct ClassLayout {
    pub class_id: ClassId,
    pub kind: ClassKind,
    pub updateable: bool,
    pub lag_compensated: bool,
    fields: Vec<FieldDescriptor>,
    block_size: usize,
}

impl ClassLayout {
    pub fn new(class_id: ClassId, kind: ClassKind) -> Self {
        Self {
            class_id,
            kind,
            updateable: false,
            lag_compensated: false,
            fields: Vec::new(),
            block_size: 0,
        }
    }

    /// Marks the class as receiving a user update every logic tick.
    pub fn updateable(mut self) -> Self {
        self.updateable = true;
        self
    }

    pub fn lag_compensated(mut self) -> Self {
        self.lag_compensated = true;
        self
    }

    pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
        self.block_size = self.block_size.max(descriptor.offset + descriptor.width);
        self.fields.push(descriptor);
        self
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Size of the class sync block in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

/// All entity classes known to an engine instance.
///
/// The table is fixed at engine construction; there is no dynamic class
/// registration after startup. Creating an entity of an unregistered class
/// fails the spawn.
pub struct ClassRegistry {
    classes: HashMap<ClassId, ClassLayout>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
        }
    }

    pub fn register(&mut self, layout: ClassLayout) -> Result<(), RegistryError> {
        if self.classes.contains_key(&layout.class_id) {
            return Err(RegistryError::DuplicateClass {
                class_id: layout.class_id,
            });
        }
        if layout.fields.len() > usize::from(u8::MAX) {
            return Err(RegistryError::TooManyFields {
                class_id: layout.class_id,
                count: layout.fields.len(),
            });
        }
        for (field_index, field) in layout.fields.iter().enumerate() {
            if field.offset + field.width > layout.block_size {
                return Err(RegistryError::FieldOutOfBounds {
                    class_id: layout.class_id,
                    field_index,
                });
            }
        }

        self.classes.insert(layout.class_id, layout);
        Ok(())
    }

    pub fn layout(&self, class_id: ClassId) -> Option<&ClassLayout> {
        self.classes.get(&class_id)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassKind, ClassLayout, ClassRegistry, FieldDescriptor, RegistryError};

    #[test]
    fn block_size_tracks_fields() {
        let layout = ClassLayout::new(1, ClassKind::Plain)
            .field(FieldDescriptor::new(0, 4))
            .field(FieldDescriptor::new(4, 2));
        assert_eq!(layout.block_size(), 6);
        assert_eq!(layout.fields().len(), 2);
    }

    #[test]
    fn duplicate_class_is_rejected() {
        let mut registry = ClassRegistry::new();
        registry
            .register(ClassLayout::new(3, ClassKind::Plain).field(FieldDescriptor::new(0, 1)))
            .unwrap();
        assert_eq!(
            registry.register(ClassLayout::new(3, ClassKind::Pawn)),
            Err(RegistryError::DuplicateClass { class_id: 3 })
        );
    }

    #[test]
    fn lookup_of_unregistered_class_is_none() {
        let registry = ClassRegistry::new();
        assert!(registry.layout(42).is_none());
    }
}
