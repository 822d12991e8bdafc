//! Pages: the unit of RecordBatch output.

use super::Block;

/// An ordered tuple of blocks with a common position count.
#[derive(Debug, Clone)]
pub struct Page {
    blocks: Vec<Block>,
    position_count: usize,
}

impl Page {
    /// Build a page from blocks. All blocks must agree on their position
    /// count; a mismatch is a caller bug.
    pub fn new(blocks: Vec<Block>) -> Self {
        let position_count = blocks.first().map_or(0, Block::position_count);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(
                block.position_count(),
                position_count,
                "block {i} disagrees on position count"
            );
        }
        Self { blocks, position_count }
    }

    pub fn position_count(&self) -> usize {
        self.position_count
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: usize) -> &Block {
        &self.blocks[index]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BytesBlock, IntBlock};

    #[test]
    fn test_page_position_count() {
        let page = Page::new(vec![
            Block::Int(IntBlock::vector(vec![1, 2, 3])),
            Block::Bytes(BytesBlock::vector(["a", "b", "c"])),
        ]);
        assert_eq!(page.position_count(), 3);
        assert_eq!(page.block_count(), 2);
    }

    #[test]
    fn test_empty_page() {
        let page = Page::new(vec![]);
        assert_eq!(page.position_count(), 0);
        assert_eq!(page.block_count(), 0);
    }

    #[test]
    #[should_panic(expected = "disagrees on position count")]
    fn test_mismatched_blocks_panic() {
        Page::new(vec![
            Block::Int(IntBlock::vector(vec![1, 2, 3])),
            Block::Int(IntBlock::vector(vec![1])),
        ]);
    }
}
