/// Stack frame bookkeeping for the procedure being emitted.
///
/// Parameters occupy frame words `0..n_params`; locals are laid out after
/// them in allocation order.
#[derive(Debug)]
pub struct ProcedureFrame {
    label: String,
    n_params: usize,
    /// Code address of the 1-byte frame-size operand of `enter`.
    frame_size_slot: usize,
    /// Word count of every local, in allocation order.
    locals: Vec<usize>,
}

impl ProcedureFrame {
    pub fn new(label: impl Into<String>, n_params: usize, frame_size_slot: usize) -> Self {
        Self {
            label: label.into(),
            n_params,
            frame_size_slot,
            locals: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn n_params(&self) -> usize {
        self.n_params
    }

    pub fn frame_size_slot(&self) -> usize {
        self.frame_size_slot
    }

    /// Reserve `words` frame words and return the word offset of the first.
    pub fn alloc_local(&mut self, words: usize) -> usize {
        let offset = self.n_params + self.locals.iter().sum::<usize>();
        self.locals.push(words);
        offset
    }

    /// Parameters plus all locals, in words.
    pub fn frame_size(&self) -> usize {
        self.n_params + self.locals.iter().sum::<usize>()
    }

    /// The frame size as the unsigned byte `enter` carries.
    ///
    /// Panics when the frame outgrows one byte.
    pub fn frame_size_byte(&self) -> u8 {
        let size = self.frame_size();
        u8::try_from(size).unwrap_or_else(|_| {
            panic!(
                "frame of procedure '{}' needs {} words, enter supports at most {}",
                self.label,
                size,
                u8::MAX
            )
        })
    }
}
