use std::collections::HashMap;

use crate::zip::CompressionMethod;

/// Compression method of every original archive path, in Central Directory order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionTable {
    order: Vec<String>,
    methods: HashMap<String, (usize, CompressionMethod)>,
}

impl CompressionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `method` for `path`. A repeated path keeps its first position.
    pub fn insert(&mut self, path: String, method: CompressionMethod) {
        match self.methods.get_mut(&path) {
            Some(slot) => slot.1 = method,
            None => {
                self.methods.insert(path.clone(), (self.order.len(), method));
                self.order.push(path);
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<CompressionMethod> {
        self.methods.get(path).map(|(_, m)| *m)
    }

    /// Method to repack `path` with; paths the archive never had are deflated.
    pub fn method_for(&self, path: &str) -> CompressionMethod {
        self.get(path).unwrap_or(CompressionMethod::Deflated)
    }

    /// Position of `path` in the original Central Directory
    pub fn position(&self, path: &str) -> Option<usize> {
        self.methods.get(path).map(|(i, _)| *i)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.methods.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Original paths in Central Directory order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}
