use crate::error::Tier2Error;
use crate::jpeg2000::bit_io::BitSink;

/// Value of a leaf that has not been assigned yet.
pub const UNSET: u32 = u32::MAX;

/// Tag tree encoder for JPEG 2000 packet headers (ISO/IEC 15444-1, B.10.2).
///
/// A quad-tree over a `height` x `width` grid of leaves in which every node holds the
/// minimum of its children. Each node also remembers the threshold already communicated
/// for it, so that later calls only emit the bits the decoder does not know yet.
///
/// Leaves are addressed as `(m, n)`: row `m`, column `n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTreeEncoder {
    width: usize,
    height: usize,
    /// Level 0 holds the leaves, the last level is the 1x1 root.
    levels: Vec<TagTreeLevel>,
    saved: Option<TagTreeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TagTreeLevel {
    width: usize,
    height: usize,
    values: Vec<u32>,
    states: Vec<u32>,
}

/// Deep copy of the values and states of every level of a [`TagTreeEncoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTreeSnapshot {
    values: Vec<Vec<u32>>,
    states: Vec<Vec<u32>>,
}

impl TagTreeEncoder {
    /// Create a tree with all leaves unset. Either dimension may be 0.
    pub fn new(height: usize, width: usize) -> Self {
        let mut levels = Vec::new();

        if width > 0 && height > 0 {
            let mut w = width;
            let mut h = height;
            loop {
                levels.push(TagTreeLevel {
                    width: w,
                    height: h,
                    values: vec![UNSET; w * h],
                    states: vec![0; w * h],
                });
                if w == 1 && h == 1 {
                    break;
                }
                w = w.div_ceil(2);
                h = h.div_ceil(2);
            }
        }

        Self {
            width,
            height,
            levels,
            saved: None,
        }
    }

    /// Create a tree with the given leaf values, in row-major order.
    pub fn with_values(height: usize, width: usize, values: &[u32]) -> Result<Self, Tier2Error> {
        let mut tree = Self::new(height, width);
        tree.reset_values(values)?;
        Ok(tree)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Highest threshold communicated so far, stored as the root state.
    fn max_threshold(&self) -> u32 {
        self.levels.last().map_or(0, |root| root.states[0])
    }

    /// Current value of leaf `(m, n)`.
    pub fn value(&self, m: usize, n: usize) -> Result<u32, Tier2Error> {
        let index = self.leaf_index(m, n)?;
        Ok(self.levels[0].values[index])
    }

    fn leaf_index(&self, m: usize, n: usize) -> Result<usize, Tier2Error> {
        if self.levels.is_empty() {
            return Err(Tier2Error::EmptyTagTree);
        }
        if m >= self.height || n >= self.width {
            return Err(Tier2Error::TagTreeIndexOutOfRange);
        }
        Ok(m * self.width + n)
    }

    /// Set the value of leaf `(m, n)`.
    ///
    /// Both the old and the new value must be at least the highest threshold already
    /// encoded, otherwise the decoder could have learned a value that no longer holds.
    pub fn set_value(&mut self, m: usize, n: usize, value: u32) -> Result<(), Tier2Error> {
        let index = self.leaf_index(m, n)?;
        let frozen = self.max_threshold();
        if value < frozen || self.levels[0].values[index] < frozen {
            return Err(Tier2Error::FrozenTagTreeLeaf);
        }

        self.levels[0].values[index] = value;
        for (k, level) in self.levels.iter_mut().enumerate().skip(1) {
            let idx = (m >> k) * level.width + (n >> k);
            if value < level.values[idx] {
                level.values[idx] = value;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Set all leaf values at once, in row-major order.
    pub fn set_values(&mut self, values: &[u32]) -> Result<(), Tier2Error> {
        if self.levels.is_empty() {
            return Err(Tier2Error::EmptyTagTree);
        }
        if values.len() != self.width * self.height {
            return Err(Tier2Error::InvalidArgument);
        }

        let frozen = self.max_threshold();
        let leaves = &self.levels[0].values;
        if leaves
            .iter()
            .zip(values)
            .any(|(&old, &new)| old < frozen || new < frozen)
        {
            return Err(Tier2Error::FrozenTagTreeLeaf);
        }

        self.levels[0].values.copy_from_slice(values);
        self.recalculate();
        Ok(())
    }

    /// Rebuild every non-leaf value as the minimum of its children.
    fn recalculate(&mut self) {
        for k in 1..self.levels.len() {
            let (lower, upper) = self.levels.split_at_mut(k);
            let child = &lower[k - 1];
            let parent = &mut upper[0];

            for y in 0..parent.height {
                for x in 0..parent.width {
                    let mut min = UNSET;
                    for cy in (2 * y)..(2 * y + 2).min(child.height) {
                        for cx in (2 * x)..(2 * x + 2).min(child.width) {
                            min = min.min(child.values[cy * child.width + cx]);
                        }
                    }
                    parent.values[y * parent.width + x] = min;
                }
            }
        }
    }

    /// Signal whether the value of leaf `(m, n)` is below `threshold`.
    ///
    /// Walks from the root to the leaf. For every node the state is raised towards
    /// `threshold` one step at a time: a `0` bit means the value is still above the state,
    /// a `1` bit means the value has been reached. Information already sent by earlier
    /// calls is never repeated.
    pub fn encode(
        &mut self,
        m: usize,
        n: usize,
        threshold: u32,
        sink: &mut BitSink,
    ) -> Result<(), Tier2Error> {
        self.leaf_index(m, n)?;

        let mut k = self.levels.len() - 1;
        let mut floor = self.levels[k].states[0];

        loop {
            let level = &mut self.levels[k];
            let idx = (m >> k) * level.width + (n >> k);
            let value = level.values[idx];
            let mut state = level.states[idx].max(floor);

            while threshold > state {
                if value > state {
                    sink.write_bit(0);
                } else if value == state {
                    sink.write_bit(1);
                } else {
                    state = threshold;
                    break;
                }
                state += 1;
            }
            level.states[idx] = state;

            if k == 0 {
                return Ok(());
            }
            floor = state.min(value);
            k -= 1;
        }
    }

    /// Capture the current values and states.
    pub fn snapshot(&self) -> TagTreeSnapshot {
        TagTreeSnapshot {
            values: self.levels.iter().map(|l| l.values.clone()).collect(),
            states: self.levels.iter().map(|l| l.states.clone()).collect(),
        }
    }

    /// Overwrite values and states with a snapshot taken from this tree.
    pub fn restore_snapshot(&mut self, snapshot: &TagTreeSnapshot) -> Result<(), Tier2Error> {
        let matches = snapshot.values.len() == self.levels.len()
            && self
                .levels
                .iter()
                .zip(&snapshot.values)
                .all(|(level, values)| level.values.len() == values.len());
        if !matches {
            return Err(Tier2Error::InvalidArgument);
        }
        for (level, (values, states)) in self
            .levels
            .iter_mut()
            .zip(snapshot.values.iter().zip(&snapshot.states))
        {
            level.values.copy_from_slice(values);
            level.states.copy_from_slice(states);
        }
        Ok(())
    }

    pub fn save(&mut self) {
        self.saved = Some(self.snapshot());
    }

    /// Return to the state of the last `save()`. The saved state is kept.
    pub fn restore(&mut self) -> Result<(), Tier2Error> {
        let saved = self.saved.take().ok_or(Tier2Error::RestoreWithoutSave)?;
        let result = self.restore_snapshot(&saved);
        self.saved = Some(saved);
        result
    }

    /// Unset every value and clear every state. Any saved state is dropped.
    pub fn reset(&mut self) {
        for level in &mut self.levels {
            level.values.fill(UNSET);
            level.states.fill(0);
        }
        self.saved = None;
    }

    /// Load new leaf values and clear every state. Any saved state is dropped.
    pub fn reset_values(&mut self, values: &[u32]) -> Result<(), Tier2Error> {
        if values.len() != self.width * self.height {
            return Err(Tier2Error::InvalidArgument);
        }
        self.reset();
        if let Some(leaves) = self.levels.first_mut() {
            leaves.values.copy_from_slice(values);
        }
        self.recalculate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg2000::bit_io::HeaderBitReader;

    fn bits_of(sink: &BitSink, count: usize) -> Vec<u8> {
        let bytes = sink.to_vec();
        let mut reader = HeaderBitReader::new(&bytes);
        (0..count).map(|_| reader.read_bit().unwrap()).collect()
    }

    #[test]
    fn test_tag_tree_structure() {
        let tree = TagTreeEncoder::new(3, 3);
        assert_eq!(tree.level_count(), 3);

        let tree = TagTreeEncoder::new(1, 5);
        assert_eq!(tree.level_count(), 4);

        let tree = TagTreeEncoder::new(1, 1);
        assert_eq!(tree.level_count(), 1);

        let tree = TagTreeEncoder::new(0, 4);
        assert_eq!(tree.level_count(), 0);
    }

    #[test]
    fn test_empty_tree_is_usage_error() {
        let mut tree = TagTreeEncoder::new(0, 0);
        let mut sink = BitSink::new();
        assert_eq!(tree.set_value(0, 0, 1), Err(Tier2Error::EmptyTagTree));
        assert_eq!(tree.encode(0, 0, 1, &mut sink), Err(Tier2Error::EmptyTagTree));
    }

    #[test]
    fn test_minimum_propagation() {
        let tree = TagTreeEncoder::with_values(2, 2, &[5, 2, 10, 0]).unwrap();
        assert_eq!(tree.levels[1].values, vec![0]);

        let mut tree = TagTreeEncoder::new(2, 3);
        tree.set_value(1, 2, 4).unwrap();
        assert_eq!(tree.levels[1].values, vec![UNSET, 4]);
        assert_eq!(tree.levels[2].values, vec![4]);
        tree.set_value(0, 0, 7).unwrap();
        assert_eq!(tree.levels[1].values, vec![7, 4]);
        assert_eq!(tree.levels[2].values, vec![4]);
    }

    #[test]
    fn test_single_leaf_encoding() {
        // Value 2 against threshold 3: "0", "0", "1".
        let mut tree = TagTreeEncoder::with_values(1, 1, &[2]).unwrap();
        let mut sink = BitSink::new();
        tree.encode(0, 0, 3, &mut sink).unwrap();
        assert_eq!(bits_of(&sink, 3), vec![0, 0, 1]);

        // Already resolved: nothing more to say.
        let before = sink.clone();
        tree.encode(0, 0, 3, &mut sink).unwrap();
        tree.encode(0, 0, 10, &mut sink).unwrap();
        assert_eq!(sink, before);
    }

    #[test]
    fn test_incremental_thresholds() {
        let mut tree = TagTreeEncoder::with_values(1, 1, &[2]).unwrap();
        let mut sink = BitSink::new();
        tree.encode(0, 0, 1, &mut sink).unwrap();
        tree.encode(0, 0, 2, &mut sink).unwrap();
        tree.encode(0, 0, 3, &mut sink).unwrap();
        // Same bits as a single call with threshold 3.
        assert_eq!(bits_of(&sink, 3), vec![0, 0, 1]);
        assert_eq!(sink.length(), 1);
    }

    #[test]
    fn test_shared_parent_information() {
        // Root value is 1, so the second leaf reuses what the first one established.
        let mut tree = TagTreeEncoder::with_values(1, 2, &[1, 3]).unwrap();
        let mut sink = BitSink::new();
        tree.encode(0, 0, 4, &mut sink).unwrap();
        // Root: 0 (value > 0), 1 (value == 1). Leaf 0: starts at 1, 1 (value == 1).
        assert_eq!(bits_of(&sink, 3), vec![0, 1, 1]);

        let mut second = BitSink::new();
        tree.encode(0, 1, 4, &mut second).unwrap();
        // Leaf 1: starts at 1, 0, 0, 1.
        assert_eq!(bits_of(&second, 3), vec![0, 0, 1]);
    }

    #[test]
    fn test_frozen_leaf() {
        let mut tree = TagTreeEncoder::with_values(1, 2, &[3, 4]).unwrap();
        let mut sink = BitSink::new();
        tree.encode(0, 0, 2, &mut sink).unwrap();

        // Threshold 2 used: values below 2 can no longer be written.
        assert_eq!(tree.set_value(0, 1, 1), Err(Tier2Error::FrozenTagTreeLeaf));
        assert!(tree.set_value(0, 1, 2).is_ok());
        assert_eq!(tree.set_values(&[0, 5]), Err(Tier2Error::FrozenTagTreeLeaf));
        assert!(tree.set_values(&[6, 5]).is_ok());
    }

    #[test]
    fn test_save_restore() {
        let mut tree = TagTreeEncoder::with_values(2, 2, &[0, 1, 2, 3]).unwrap();
        assert_eq!(tree.restore(), Err(Tier2Error::RestoreWithoutSave));

        tree.save();
        let checkpoint = tree.clone();

        tree.set_value(1, 0, 9).unwrap();
        let mut first = BitSink::new();
        tree.encode(1, 1, 4, &mut first).unwrap();
        tree.restore().unwrap();
        assert_eq!(tree.levels, checkpoint.levels);

        let mut second = BitSink::new();
        tree.encode(1, 1, 4, &mut second).unwrap();
        assert_eq!(first, second);

        // The saved state can be restored more than once.
        tree.restore().unwrap();
        assert_eq!(tree.levels, checkpoint.levels);
    }

    #[test]
    fn test_reset() {
        let mut tree = TagTreeEncoder::with_values(2, 2, &[0, 1, 2, 3]).unwrap();
        let mut sink = BitSink::new();
        tree.encode(0, 0, 1, &mut sink).unwrap();
        tree.save();
        tree.reset();
        assert_eq!(tree.value(0, 0), Ok(UNSET));
        assert_eq!(tree.restore(), Err(Tier2Error::RestoreWithoutSave));

        tree.reset_values(&[4, 4, 4, 1]).unwrap();
        assert_eq!(tree.levels[1].values, vec![1]);
        assert_eq!(tree.reset_values(&[1]), Err(Tier2Error::InvalidArgument));
    }
}
