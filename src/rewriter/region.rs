use crate::{
    assembly::InstructionId,
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerKind},
        token::Token,
    },
};

/// An exception handling region bound to the instructions delimiting it.
///
/// Ends are exclusive: `try_end` and `handler_end` name the first instruction after the
/// region. A region that ends with the method is anchored on a zero-size
/// [`crate::assembly::OpCode::Label`] appended during decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRegion {
    /// Clause kind
    pub kind: ExceptionHandlerKind,
    /// First protected instruction
    pub try_start: InstructionId,
    /// First instruction after the protected block
    pub try_end: InstructionId,
    /// First handler instruction
    pub handler_start: InstructionId,
    /// First instruction after the handler
    pub handler_end: InstructionId,
    /// First filter instruction, for [`ExceptionHandlerKind::Filter`] only
    pub filter_start: Option<InstructionId>,
    /// Caught type, for [`ExceptionHandlerKind::Catch`] only
    pub class_token: Option<Token>,
}

impl ExceptionRegion {
    /// The blocks of this region as `(first, end)` handle pairs, end exclusive: the try
    /// block, the filter block if any, then the handler block.
    pub fn blocks(&self) -> impl Iterator<Item = (InstructionId, InstructionId)> + '_ {
        [
            Some((self.try_start, self.try_end)),
            self.filter_start.map(|start| (start, self.handler_start)),
            Some((self.handler_start, self.handler_end)),
        ]
        .into_iter()
        .flatten()
    }

    /// Rebuilds the raw clause from the offsets of the current layout.
    ///
    /// `offset_of` maps a handle to its current offset.
    pub(crate) fn to_clause(&self, offset_of: impl Fn(InstructionId) -> u32) -> ExceptionHandler {
        let try_offset = offset_of(self.try_start);
        let handler_offset = offset_of(self.handler_start);

        let class_or_filter = match self.kind {
            ExceptionHandlerKind::Catch => self.class_token.map_or(0, |token| token.value()),
            ExceptionHandlerKind::Filter => self.filter_start.map_or(0, &offset_of),
            ExceptionHandlerKind::Finally | ExceptionHandlerKind::Fault => 0,
        };

        ExceptionHandler {
            flags: self.kind.flags(),
            try_offset,
            try_length: offset_of(self.try_end).saturating_sub(try_offset),
            handler_offset,
            handler_length: offset_of(self.handler_end).saturating_sub(handler_offset),
            class_or_filter,
        }
    }
}
