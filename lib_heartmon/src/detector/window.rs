/// # Detection Window
///
/// The most recent samples, oldest first, capped at a fixed length. Appending
/// past the cap drops from the front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionWindow {
    samples: Vec<u16>,
    max_len: usize,
}

impl DetectionWindow {
    /// An empty window holding at most `max_len` samples.
    pub fn new(max_len: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_len),
            max_len,
        }
    }

    /// Appends `samples` and trims the oldest beyond the cap.
    pub fn extend(&mut self, samples: &[u16]) {
        self.samples.extend_from_slice(samples);
        if self.samples.len() > self.max_len {
            let excess = self.samples.len() - self.max_len;
            self.samples.drain(..excess);
        }
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// The retained samples, oldest first.
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// `true` when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The cap.
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}
