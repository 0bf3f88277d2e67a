//! In-memory backend, used for buffers that never touched the filesystem.

use super::Backend;

/// An owned byte buffer.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Wrap `data` without copying it.
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_the_buffer_in_place() {
        let data = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34];
        let start = data.as_ptr();
        let memory = Memory::new(data);

        assert_eq!(memory.len(), 6);
        assert_eq!(memory.data().as_ptr(), start);
        assert_eq!(&memory.data()[4..], &[0x00, 0x34]);
    }
}
