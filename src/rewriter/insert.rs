use std::collections::HashSet;

use crate::{
    assembly::{Instruction, InstructionId, OpCode, PENDING_DISPLACEMENT},
    metadata::method::ExceptionHandlerKind,
    rewriter::Method,
    Error, Result,
};

impl Method {
    /// Inserts copies of `templates` at the instruction that currently starts at `offset`.
    ///
    /// The located instruction's handle is taken over by the first inserted instruction and
    /// the located instruction moves behind the inserted run (see the module documentation).
    /// Offsets and displacements are recalculated before returning.
    ///
    /// One exception applies: if the located instruction is a `rethrow` that starts the
    /// handler of a typed catch region, the copies are spliced after it and nothing changes
    /// hands, so `rethrow` stays the first instruction executed on handler entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::InstructionNotFound`] if no instruction starts at `offset`,
    /// or [`crate::Error::Malformed`] if a template branch points outside the template list.
    pub fn insert_at_offset(&mut self, offset: i64, templates: &[Instruction]) -> Result<()> {
        let target = self
            .find_by_offset(offset)
            .ok_or(Error::InstructionNotFound(offset))?;
        self.insert_at(target, templates)
    }

    /// Inserts copies of `templates` at the instruction that started at `offset` when the
    /// body was decoded.
    ///
    /// Original offsets never change, so repeated insertions can all be addressed in terms
    /// of the untouched layout. Behaves like [`Method::insert_at_offset`] otherwise.
    ///
    /// # Errors
    /// See [`Method::insert_at_offset`].
    pub fn insert_at_original_offset(
        &mut self,
        offset: i64,
        templates: &[Instruction],
    ) -> Result<()> {
        let target = self
            .find_by_original_offset(offset)
            .ok_or(Error::InstructionNotFound(offset))?;
        self.insert_at(target, templates)
    }

    /// Returns `true` if a copy of `templates` already starts at the instruction decoded at
    /// `offset`.
    ///
    /// Only meaningful on a body decoded from instrumented output, where the probe itself
    /// occupies an original offset. Branch targets are compared recursively.
    #[must_use]
    pub fn is_instrumented(&self, offset: i64, templates: &[Instruction]) -> bool {
        self.find_by_original_offset(offset)
            .and_then(|id| self.position_of(id))
            .is_some_and(|start| self.matches_at(start, templates))
    }

    /// Returns the first instruction at which a copy of `templates` starts, wherever it is.
    ///
    /// Useful when the templates are unique within the method, such as a probe carrying its
    /// own id, and the offset they were placed at has shifted since.
    #[must_use]
    pub fn find_instrumentation(&self, templates: &[Instruction]) -> Option<InstructionId> {
        (0..self.order.len())
            .find(|start| self.matches_at(*start, templates))
            .map(|start| self.order[start])
    }

    fn matches_at(&self, start: usize, templates: &[Instruction]) -> bool {
        if templates.is_empty() {
            return false;
        }

        let Some(window) = self.order.get(start..start + templates.len()) else {
            return false;
        };

        let mut visited = HashSet::new();
        window
            .iter()
            .enumerate()
            .all(|(index, id)| self.equivalent(*id, templates, index, &mut visited))
    }

    fn insert_at(&mut self, target: InstructionId, templates: &[Instruction]) -> Result<()> {
        if templates.is_empty() {
            return Ok(());
        }

        let position = self
            .position_of(target)
            .ok_or(Error::InstructionNotFound(self.slots[target.0].offset))?;
        let clones = self.splice_after(position, templates)?;

        if self.is_rethrow_handler_entry(target) {
            log::trace!(
                "Probe after rethrow at IL_{:04x} keeps the handler entry",
                self.slots[target.0].offset
            );
        } else {
            self.take_over(target, &clones);
        }

        self.recalculate_offsets();
        Ok(())
    }

    /// Copies `templates` into fresh slots placed right after `position` in execution order.
    ///
    /// Copies are widened to long branch forms, carry no layout and no original offset, and
    /// their template-relative branch targets are mapped to the new handles. Offsets are not
    /// recalculated.
    pub(crate) fn splice_after(
        &mut self,
        position: usize,
        templates: &[Instruction],
    ) -> Result<Vec<InstructionId>> {
        for template in templates {
            if let Some(target) = template.branches.iter().find(|t| t.0 >= templates.len()) {
                return Err(malformed_error!(
                    "Template branch to position {} of a {} instruction sequence",
                    target.0,
                    templates.len()
                ));
            }
        }

        let base = self.slots.len();
        let ids: Vec<InstructionId> = (base..base + templates.len()).map(InstructionId).collect();

        for template in templates {
            let mut copy = template.clone();
            if let Some(long) = copy.opcode.long_form() {
                copy.opcode = long;
                copy.operand = PENDING_DISPLACEMENT;
            }
            copy.offset = -1;
            copy.original_offset = -1;
            copy.branch_offsets.clear();
            for branch in &mut copy.branches {
                *branch = ids[branch.0];
            }
            self.slots.push(copy);
        }

        let at = (position + 1).min(self.order.len());
        self.order.splice(at..at, ids.iter().copied());

        Ok(ids)
    }

    /// Moves the content of `target` behind the freshly spliced `clones`, so the handle
    /// `target` now names the first clone.
    fn take_over(&mut self, target: InstructionId, clones: &[InstructionId]) {
        let mut chain = Vec::with_capacity(clones.len() + 1);
        chain.push(target);
        chain.extend_from_slice(clones);

        for pair in chain.windows(2) {
            self.slots.swap(pair[0].0, pair[1].0);
        }

        // clone j now lives in chain[j]
        for id in &chain[..clones.len()] {
            for branch in &mut self.slots[id.0].branches {
                if let Some(index) = clones.iter().position(|clone| clone == branch) {
                    *branch = chain[index];
                }
            }
        }
    }

    fn is_rethrow_handler_entry(&self, target: InstructionId) -> bool {
        self.slots[target.0].opcode == OpCode::Rethrow
            && self.regions.iter().any(|region| {
                region.kind == ExceptionHandlerKind::Catch && region.handler_start == target
            })
    }

    fn equivalent(
        &self,
        id: InstructionId,
        templates: &[Instruction],
        index: usize,
        visited: &mut HashSet<(InstructionId, usize)>,
    ) -> bool {
        if !visited.insert((id, index)) {
            return true;
        }

        let instruction = &self.slots[id.0];
        let template = &templates[index];
        if !instruction.matches(template) {
            return false;
        }

        instruction
            .branches
            .iter()
            .zip(&template.branches)
            .all(|(target, position)| {
                position.0 < templates.len()
                    && self.equivalent(*target, templates, position.0, visited)
            })
    }

    /// Follows unconditional `br` pass-throughs starting at `id` and returns the last
    /// instruction a jump placed next to `from` may reach.
    ///
    /// A hop is only taken if its target lies in exactly the exception blocks that enclose
    /// `from`, so the chain never enters or leaves a try, filter or handler block. Cycles
    /// stop at the first repeated instruction.
    pub(crate) fn follow_branch_chain(
        &self,
        from: InstructionId,
        mut id: InstructionId,
    ) -> InstructionId {
        let scope = self.enclosing_blocks(from);
        let mut seen = HashSet::new();
        while seen.insert(id) {
            let instruction = &self.slots[id.0];
            match (instruction.opcode, instruction.branches.as_slice()) {
                (OpCode::Br, [next]) if self.enclosing_blocks(*next) == scope => id = *next,
                _ => break,
            }
        }
        id
    }

    /// Exception blocks containing `id`, as `(region index, block index)` pairs in region
    /// order.
    pub(crate) fn enclosing_blocks(&self, id: InstructionId) -> Vec<(usize, usize)> {
        let Some(position) = self.position_of(id) else {
            return Vec::new();
        };

        let mut enclosing = Vec::new();
        for (region_index, region) in self.regions.iter().enumerate() {
            for (block_index, (start, end)) in region.blocks().enumerate() {
                if let (Some(start), Some(end)) = (self.position_of(start), self.position_of(end))
                {
                    if (start..end).contains(&position) {
                        enclosing.push((region_index, block_index));
                    }
                }
            }
        }
        enclosing
    }

    /// The instruction after `id` in execution order.
    pub(crate) fn next_of(&self, id: InstructionId) -> Option<InstructionId> {
        let position = self.position_of(id)?;
        self.order.get(position + 1).copied()
    }

    pub(crate) fn set_branches(&mut self, id: InstructionId, targets: Vec<InstructionId>) {
        self.slots[id.0].branches = targets;
    }
}
