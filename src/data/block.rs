//! Column blocks and their null-free vector views.
//!
//! A block is the in-memory representation of one column over a run of rows.
//! Blocks that contain neither nulls nor multi-valued cells expose a flat
//! [`Vector`] view; the encoder uses the view's presence to detect the shapes
//! it can stream directly.

/// Bit-packed null bitmap (bit i is 1 if row i is null)
type NullBitmap = Vec<u8>;

fn bitmap_is_null(bitmap: &NullBitmap, index: usize) -> bool {
    let byte_index = index / 8;
    let bit_index = index % 8;
    if byte_index >= bitmap.len() {
        return false;
    }
    (bitmap[byte_index] >> bit_index) & 1 == 1
}

fn bitmap_set_null(bitmap: &mut NullBitmap, index: usize) {
    let byte_index = index / 8;
    while bitmap.len() <= byte_index {
        bitmap.push(0);
    }
    bitmap[byte_index] |= 1 << (index % 8);
}

/// A fixed-width column block. Null rows store `T::default()` as a placeholder.
#[derive(Debug, Clone)]
pub struct PrimitiveBlock<T> {
    values: Vec<T>,
    null_bitmap: Option<NullBitmap>,
    /// Value range start per position, length `position_count + 1`.
    /// Present only for multi-valued blocks.
    first_value_indexes: Option<Vec<u32>>,
}

pub type BoolBlock = PrimitiveBlock<bool>;
pub type IntBlock = PrimitiveBlock<i32>;
pub type LongBlock = PrimitiveBlock<i64>;
pub type DoubleBlock = PrimitiveBlock<f64>;

impl<T: Copy + Default> PrimitiveBlock<T> {
    /// Create a null-free, single-valued block.
    pub fn vector(values: Vec<T>) -> Self {
        Self { values, null_bitmap: None, first_value_indexes: None }
    }

    /// Create a block from per-row optional values.
    pub fn from_options(rows: Vec<Option<T>>) -> Self {
        let mut values = Vec::with_capacity(rows.len());
        let mut bitmap = NullBitmap::new();
        let mut has_nulls = false;
        for (i, row) in rows.into_iter().enumerate() {
            match row {
                Some(v) => values.push(v),
                None => {
                    values.push(T::default());
                    bitmap_set_null(&mut bitmap, i);
                    has_nulls = true;
                }
            }
        }
        Self { values, null_bitmap: has_nulls.then_some(bitmap), first_value_indexes: None }
    }

    /// Create a multi-valued block. `first_value_indexes[p]..first_value_indexes[p+1]`
    /// is the value range of position `p`.
    pub fn multivalued(values: Vec<T>, first_value_indexes: Vec<u32>) -> Self {
        assert!(!first_value_indexes.is_empty(), "first_value_indexes must have length positions + 1");
        assert_eq!(*first_value_indexes.last().unwrap() as usize, values.len());
        Self { values, null_bitmap: None, first_value_indexes: Some(first_value_indexes) }
    }

    pub fn position_count(&self) -> usize {
        match &self.first_value_indexes {
            Some(indexes) => indexes.len() - 1,
            None => self.values.len(),
        }
    }

    pub fn may_have_nulls(&self) -> bool {
        self.null_bitmap.is_some()
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.null_bitmap.as_ref().is_some_and(|b| bitmap_is_null(b, index))
    }

    /// Value at a position. Null rows return the placeholder default.
    pub fn get(&self, index: usize) -> T {
        self.values[index]
    }

    pub(crate) fn is_multivalued(&self) -> bool {
        self.first_value_indexes.is_some()
    }
}

/// A variable-width column block: a flat byte arena plus per-row offsets.
/// Null rows store an empty range.
#[derive(Debug, Clone)]
pub struct BytesBlock {
    data: Vec<u8>,
    offsets: Vec<u32>,
    null_bitmap: Option<NullBitmap>,
    first_value_indexes: Option<Vec<u32>>,
}

impl BytesBlock {
    /// Create a null-free, single-valued block.
    pub fn vector<I, B>(rows: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut data = Vec::new();
        let mut offsets = vec![0u32];
        for row in rows {
            data.extend_from_slice(row.as_ref());
            offsets.push(data.len() as u32);
        }
        Self { data, offsets, null_bitmap: None, first_value_indexes: None }
    }

    /// Create a block from per-row optional values.
    pub fn from_options<I, B>(rows: I) -> Self
    where
        I: IntoIterator<Item = Option<B>>,
        B: AsRef<[u8]>,
    {
        let mut data = Vec::new();
        let mut offsets = vec![0u32];
        let mut bitmap = NullBitmap::new();
        let mut has_nulls = false;
        for (i, row) in rows.into_iter().enumerate() {
            if let Some(row) = row {
                data.extend_from_slice(row.as_ref());
            } else {
                bitmap_set_null(&mut bitmap, i);
                has_nulls = true;
            }
            offsets.push(data.len() as u32);
        }
        Self { data, offsets, null_bitmap: has_nulls.then_some(bitmap), first_value_indexes: None }
    }

    /// Create a multi-valued block over the given row values.
    pub fn multivalued<I, B>(rows: I, first_value_indexes: Vec<u32>) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut block = Self::vector(rows);
        assert!(!first_value_indexes.is_empty(), "first_value_indexes must have length positions + 1");
        assert_eq!(*first_value_indexes.last().unwrap() as usize + 1, block.offsets.len());
        block.first_value_indexes = Some(first_value_indexes);
        block
    }

    pub fn position_count(&self) -> usize {
        match &self.first_value_indexes {
            Some(indexes) => indexes.len() - 1,
            None => self.offsets.len() - 1,
        }
    }

    pub fn may_have_nulls(&self) -> bool {
        self.null_bitmap.is_some()
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.null_bitmap.as_ref().is_some_and(|b| bitmap_is_null(b, index))
    }

    /// Borrow the bytes of a row. Null rows return an empty slice.
    pub fn get_bytes(&self, index: usize) -> &[u8] {
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        &self.data[start..end]
    }

    pub(crate) fn is_multivalued(&self) -> bool {
        self.first_value_indexes.is_some()
    }
}

/// A block with no values at all: every position is null.
#[derive(Debug, Clone)]
pub struct NullBlock {
    positions: usize,
}

impl NullBlock {
    pub fn new(positions: usize) -> Self {
        Self { positions }
    }

    pub fn position_count(&self) -> usize {
        self.positions
    }
}

/// A column block produced by the engine.
#[derive(Debug, Clone)]
pub enum Block {
    Bool(BoolBlock),
    Int(IntBlock),
    Long(LongBlock),
    Double(DoubleBlock),
    Bytes(BytesBlock),
    Null(NullBlock),
}

impl Block {
    pub fn position_count(&self) -> usize {
        match self {
            Block::Bool(b) => b.position_count(),
            Block::Int(b) => b.position_count(),
            Block::Long(b) => b.position_count(),
            Block::Double(b) => b.position_count(),
            Block::Bytes(b) => b.position_count(),
            Block::Null(b) => b.position_count(),
        }
    }

    pub fn may_have_nulls(&self) -> bool {
        match self {
            Block::Bool(b) => b.may_have_nulls(),
            Block::Int(b) => b.may_have_nulls(),
            Block::Long(b) => b.may_have_nulls(),
            Block::Double(b) => b.may_have_nulls(),
            Block::Bytes(b) => b.may_have_nulls(),
            Block::Null(_) => true,
        }
    }

    pub fn is_null(&self, index: usize) -> bool {
        match self {
            Block::Bool(b) => b.is_null(index),
            Block::Int(b) => b.is_null(index),
            Block::Long(b) => b.is_null(index),
            Block::Double(b) => b.is_null(index),
            Block::Bytes(b) => b.is_null(index),
            Block::Null(_) => true,
        }
    }

    /// Count null positions. Skips the scan when the block cannot hold nulls.
    pub fn null_count(&self) -> usize {
        if let Block::Null(b) = self {
            return b.position_count();
        }
        if !self.may_have_nulls() {
            return 0;
        }
        (0..self.position_count()).filter(|&i| self.is_null(i)).count()
    }

    /// Flat vector view, present iff the block has no nulls and no
    /// multi-valued cells.
    pub fn as_vector(&self) -> Option<Vector<'_>> {
        if self.may_have_nulls() || self.is_multivalued() {
            return None;
        }
        Some(match self {
            Block::Bool(b) => Vector::Bool(BoolVector(b)),
            Block::Int(b) => Vector::Int(IntVector(b)),
            Block::Long(b) => Vector::Long(LongVector(b)),
            Block::Double(b) => Vector::Double(DoubleVector(b)),
            Block::Bytes(b) => Vector::Bytes(BytesVector(b)),
            Block::Null(_) => unreachable!("null blocks always report nulls"),
        })
    }

    pub(crate) fn is_multivalued(&self) -> bool {
        match self {
            Block::Bool(b) => b.is_multivalued(),
            Block::Int(b) => b.is_multivalued(),
            Block::Long(b) => b.is_multivalued(),
            Block::Double(b) => b.is_multivalued(),
            Block::Bytes(b) => b.is_multivalued(),
            Block::Null(_) => false,
        }
    }
}

/// Null-free flat view over a block.
#[derive(Debug, Clone, Copy)]
pub enum Vector<'a> {
    Bool(BoolVector<'a>),
    Int(IntVector<'a>),
    Long(LongVector<'a>),
    Double(DoubleVector<'a>),
    Bytes(BytesVector<'a>),
}

impl Vector<'_> {
    pub fn position_count(&self) -> usize {
        match self {
            Vector::Bool(v) => v.0.position_count(),
            Vector::Int(v) => v.0.position_count(),
            Vector::Long(v) => v.0.position_count(),
            Vector::Double(v) => v.0.position_count(),
            Vector::Bytes(v) => v.0.position_count(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoolVector<'a>(&'a BoolBlock);

impl BoolVector<'_> {
    pub fn get_bool(&self, index: usize) -> bool {
        self.0.get(index)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntVector<'a>(&'a IntBlock);

impl IntVector<'_> {
    pub fn get_i32(&self, index: usize) -> i32 {
        self.0.get(index)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LongVector<'a>(&'a LongBlock);

impl LongVector<'_> {
    pub fn get_i64(&self, index: usize) -> i64 {
        self.0.get(index)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DoubleVector<'a>(&'a DoubleBlock);

impl DoubleVector<'_> {
    pub fn get_f64(&self, index: usize) -> f64 {
        self.0.get(index)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BytesVector<'a>(&'a BytesBlock);

impl<'a> BytesVector<'a> {
    pub fn get_bytes(&self, index: usize) -> &'a [u8] {
        self.0.get_bytes(index)
    }
}
