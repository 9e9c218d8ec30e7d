use std::collections::VecDeque;

/// Bounded record of recently completed layer ids, newest at the head.
#[derive(Debug, Clone)]
pub struct LayerHistory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for LayerHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerHistory {
    pub const DEFAULT_CAPACITY: usize = 10;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend a completed layer, evicting the oldest entry when full.
    pub fn record(&mut self, layer_id: impl Into<String>) {
        self.entries.push_front(layer_id.into());
        self.entries.truncate(self.capacity);
    }

    /// Newest-first iteration.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn newest_entry_is_at_the_head() {
        let mut history = LayerHistory::new();
        history.record("utahbeach_warfare");
        history.record("carentan_warfare");
        assert_eq!(
            history.to_vec(),
            vec!["carentan_warfare".to_string(), "utahbeach_warfare".to_string()]
        );
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut history = LayerHistory::with_capacity(3);
        for i in 0..5 {
            history.record(format!("layer_{i}"));
        }
        assert_eq!(
            history.to_vec(),
            vec!["layer_4".to_string(), "layer_3".to_string(), "layer_2".to_string()]
        );
    }
}
