use runscope_types::LogEntry;

/// Staging buffer for entries awaiting delivery.
///
/// Owned by a single tail session, so no locking. Callers flush whenever
/// [`BatchBuffer::push`] reports a full batch, which keeps the length at
/// or below the batch size.
#[derive(Debug)]
pub struct BatchBuffer {
    /// Pending entries in arrival order
    entries: Vec<LogEntry>,

    /// Length that counts as a full batch
    batch_size: usize,
}

impl BatchBuffer {
    /// Create a buffer that fills after `batch_size` entries
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            entries: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    /// Append an entry, returning true once a full batch is waiting
    pub fn push(&mut self, entry: LogEntry) -> bool {
        self.entries.push(entry);
        self.entries.len() >= self.batch_size
    }

    /// Take every pending entry, leaving the buffer empty
    pub fn take(&mut self) -> Vec<LogEntry> {
        std::mem::replace(&mut self.entries, Vec::with_capacity(self.batch_size))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}
