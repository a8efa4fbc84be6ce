use vcs_hash::ObjectId;

use crate::RefName;

/// What to do with one ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefUpdateAction {
    /// Fails with `AlreadyExists` if the ref is present.
    Create { new: ObjectId },
    /// Fails with `CasFailed` unless the ref currently resolves to `expected`.
    Update { expected: ObjectId, new: ObjectId },
    /// Overwrite whatever is there.
    Force { new: ObjectId },
    /// Fails with `NotFound` if absent and `CasFailed` on a value mismatch.
    Delete { expected: Option<ObjectId> },
    SetSymbolic { target: RefName },
}

#[derive(Debug, Clone)]
pub struct RefUpdate {
    pub name: RefName,
    pub action: RefUpdateAction,
    pub message: String,
}

/// A batch of ref updates applied all-or-nothing by
/// [`RefStore::commit`](crate::RefStore::commit).
#[derive(Debug, Default)]
pub struct RefTransaction {
    pub(crate) updates: Vec<RefUpdate>,
}

impl RefTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: RefName, action: RefUpdateAction, message: impl Into<String>) -> &mut Self {
        self.updates.push(RefUpdate {
            name,
            action,
            message: message.into(),
        });
        self
    }

    pub fn create(&mut self, name: RefName, new: ObjectId, message: impl Into<String>) -> &mut Self {
        self.push(name, RefUpdateAction::Create { new }, message)
    }

    pub fn update(
        &mut self,
        name: RefName,
        expected: ObjectId,
        new: ObjectId,
        message: impl Into<String>,
    ) -> &mut Self {
        self.push(name, RefUpdateAction::Update { expected, new }, message)
    }

    /// Create when `expected` is `None`, compare-and-swap otherwise.
    pub fn set(
        &mut self,
        name: RefName,
        expected: Option<ObjectId>,
        new: ObjectId,
        message: impl Into<String>,
    ) -> &mut Self {
        match expected {
            Some(expected) => self.update(name, expected, new, message),
            None => self.create(name, new, message),
        }
    }

    pub fn force(&mut self, name: RefName, new: ObjectId, message: impl Into<String>) -> &mut Self {
        self.push(name, RefUpdateAction::Force { new }, message)
    }

    pub fn delete(
        &mut self,
        name: RefName,
        expected: Option<ObjectId>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.push(name, RefUpdateAction::Delete { expected }, message)
    }

    pub fn set_symbolic(
        &mut self,
        name: RefName,
        target: RefName,
        message: impl Into<String>,
    ) -> &mut Self {
        self.push(name, RefUpdateAction::SetSymbolic { target }, message)
    }

    pub fn updates(&self) -> &[RefUpdate] {
        &self.updates
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}
