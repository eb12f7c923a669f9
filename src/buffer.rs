/// Receive buffer for links that deliver bytes in arbitrary packet sizes.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer {
            data: Vec::with_capacity(256),
            read_pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    /// Drop `len` bytes from the front of the buffer.
    /// Consuming more than is buffered empties it.
    pub fn consume(&mut self, len: usize) {
        self.read_pos += len.min(self.len());
        if self.read_pos == self.data.len() {
            self.clear();
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        if self.read_pos > 0 && self.read_pos * 2 >= self.data.len() {
            // compact before growing
            self.data.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.data.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
