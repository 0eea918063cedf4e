//! Run-length encoded line numbers for a [Chunk](crate::chunk::Chunk).

/// Maps offsets in a bytecode stream back to the source line they were compiled from.
///
/// Every byte written to a chunk is recorded here, but consecutive bytes from the same line share
/// a single [LineNumberRun], so the table grows with the number of distinct lines instead of the
/// length of the bytecode.
///
/// ```
/// use lox_arith::lines::LineTable;
///
/// let mut lines = LineTable::new();
/// lines.push(1);
/// lines.push(1);
/// lines.push(3);
///
/// assert_eq!(2, lines.len());
/// assert_eq!(Some(1), lines.line_number_for(1));
/// assert_eq!(Some(3), lines.line_number_for(2));
/// assert_eq!(None, lines.line_number_for(3));
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LineTable {
    runs: Vec<LineNumberRun>,
}

/// An entry of run-length encoded line numbers.
/// Every entry signifies that the next `length` bytes have the same line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberRun {
    /// The actual line number
    line_number: usize,
    /// How many consecutive bytes came from this line
    length: usize,
}

impl LineTable {
    /// Return a new, empty [LineTable].
    pub fn new() -> Self {
        LineTable::default()
    }

    /// Records that one more byte was written from `line_number`.
    pub fn push(&mut self, line_number: usize) {
        match self.runs.last_mut() {
            Some(run) if run.line_number == line_number => run.increment(),
            _ => self.runs.push(LineNumberRun::new(line_number)),
        }
    }

    /// Returns the line number for whatever is at the given offset.
    pub fn line_number_for(&self, offset: usize) -> Option<usize> {
        let mut base_offset = 0;
        for run in self.runs.iter() {
            if (base_offset..base_offset + run.length).contains(&offset) {
                return Some(run.line_number);
            }

            base_offset += run.length;
        }

        None
    }

    /// The runs, in bytecode order.
    pub fn runs(&self) -> &[LineNumberRun] {
        &self.runs
    }

    /// Total number of bytes accounted for. Always equal to the length of the owning chunk.
    pub fn covered_len(&self) -> usize {
        self.runs.iter().map(|run| run.length).sum()
    }

    /// Returns the number of runs (not bytes!) in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if nothing has been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl LineNumberRun {
    fn new(line_number: usize) -> Self {
        Self {
            line_number,
            length: 1,
        }
    }

    fn increment(&mut self) {
        self.length += 1;
    }

    /// The source line shared by every byte in this run.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// How many bytes this run covers.
    pub fn length(&self) -> usize {
        self.length
    }
}
