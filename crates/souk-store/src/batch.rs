use crate::document::{DocumentPath, Patch, SetMode};

/// One write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Write the document, replacing or merging per `mode`.
    Set {
        path: DocumentPath,
        patch: Patch,
        mode: SetMode,
    },
    /// Write the document only if it does not exist yet.
    Create { path: DocumentPath, patch: Patch },
    /// Modify an existing document; fails if it is missing.
    Update { path: DocumentPath, patch: Patch },
    /// Remove the document (no-op if missing).
    Delete { path: DocumentPath },
}

impl WriteOp {
    pub fn path(&self) -> &DocumentPath {
        match self {
            WriteOp::Set { path, .. }
            | WriteOp::Create { path, .. }
            | WriteOp::Update { path, .. }
            | WriteOp::Delete { path } => path,
        }
    }
}

/// Writes committed atomically: either every op is applied or none is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, patch: Patch, mode: SetMode) -> &mut Self {
        self.ops.push(WriteOp::Set { path, patch, mode });
        self
    }

    pub fn create(&mut self, path: DocumentPath, patch: Patch) -> &mut Self {
        self.ops.push(WriteOp::Create { path, patch });
        self
    }

    pub fn update(&mut self, path: DocumentPath, patch: Patch) -> &mut Self {
        self.ops.push(WriteOp::Update { path, patch });
        self
    }

    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.ops.push(WriteOp::Delete { path });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
