use std::collections::VecDeque;

/// Keeps the last `cap` lines pushed into it.
#[derive(Debug, Clone)]
pub struct RingLines {
    inner: VecDeque<String>,
    cap: usize,
}

impl RingLines {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: VecDeque::with_capacity(cap.min(256)),
            cap,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.cap == 0 {
            return;
        }
        let overflow = (self.inner.len() + 1).saturating_sub(self.cap);
        if overflow > 0 {
            self.inner.drain(..overflow);
        }
        self.inner.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.inner.back().map(String::as_str)
    }

    /// The newest `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.inner.len().saturating_sub(n);
        self.inner.iter().skip(skip).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.inner.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_lines_beyond_capacity() {
        let mut ring = RingLines::new(2);
        ring.push("a");
        ring.push("b");
        ring.push("c");
        assert_eq!(ring.to_vec(), vec!["b", "c"]);
        assert_eq!(ring.last(), Some("c"));
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut ring = RingLines::new(0);
        ring.push("a");
        assert!(ring.is_empty());
    }

    #[test]
    fn tail_returns_newest_in_order() {
        let mut ring = RingLines::new(5);
        for line in ["1", "2", "3", "4"] {
            ring.push(line);
        }
        assert_eq!(ring.tail(2), vec!["3", "4"]);
        assert_eq!(ring.tail(10).len(), 4);
    }
}
