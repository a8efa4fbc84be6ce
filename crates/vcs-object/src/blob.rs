/// Raw file contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob {
    pub data: Vec<u8>,
}

/// How far into a file to look for a NUL byte when guessing binary-ness.
const BINARY_SCAN_LEN: usize = 8000;

impl Blob {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A NUL byte near the start marks the content as binary.
    pub fn is_binary(&self) -> bool {
        is_binary(&self.data)
    }
}

/// Binary heuristic shared with the diff and merge engines.
pub fn is_binary(data: &[u8]) -> bool {
    data[..data.len().min(BINARY_SCAN_LEN)].contains(&0)
}
