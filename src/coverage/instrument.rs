//! Coverage probe placement.
//!
//! Statement probes go in front of the instruction at their offset and take over its
//! identity, so every jump into the statement runs the probe first.
//!
//! Branch probes are placed per outgoing path of each conditional branch decoded from the
//! input. For a branch with registered paths, one block per path is spliced directly after
//! the branch:
//!
//! ```text
//! brtrue   B1          // path 1 now targets B1
//! B0: ldc.i4 <id0>     // path 0, reached by falling through
//!     <probe call>
//!     br   <fall-through destination>
//! B1: ldc.i4 <id1>
//!     <probe call>
//!     br   <original path 1 destination>
//! ```
//!
//! If path 0 has no id, the first block is a bare `br` to the fall-through destination.
//! Destinations skip over chains of unconditional `br` so that paths which merge further on
//! are counted where they merge. `switch` cases always use their immediate target, and a
//! chain never continues into or out of an exception block the branch is not in.
//!
//! Branch probes are placed before statement probes: a statement probe inserted at a
//! destination takes over the destination's handle, so the branch blocks reach it too.

use crate::{
    assembly::{FlowType, Instruction, InstructionId, OpCode},
    coverage::{BranchPoint, InstrumentationConfig, InstrumentationPoints, Probe, SequencePoint},
    rewriter::Method,
    Error, Result,
};

/// What [`instrument`] placed in one method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Instrumentation {
    /// Statement probes placed
    pub sequence_points: usize,
    /// Branch path probes placed
    pub branch_points: usize,
}

impl Instrumentation {
    /// Total number of probes placed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.sequence_points + self.branch_points
    }
}

/// Places the requested probes in `method` and raises its maximum stack depth.
///
/// # Errors
/// Returns [`crate::Error::InstructionNotFound`] if a statement offset does not start an
/// instruction of the decoded body, or a conditional branch has no fall-through instruction.
pub fn instrument(
    method: &mut Method,
    points: &InstrumentationPoints,
    probe: &Probe,
    config: &InstrumentationConfig,
) -> Result<Instrumentation> {
    let mut placed = Instrumentation::default();

    if config.branch_points {
        placed.branch_points = add_branch_coverage(method, &points.branch_points, probe)?;
    }
    if config.sequence_points {
        placed.sequence_points = add_sequence_coverage(method, &points.sequence_points, probe)?;
    }

    if placed.total() > 0 {
        method.increase_max_stack(config.extra_max_stack.max(probe.stack_depth()));
    }

    log::debug!(
        "Placed {} statement and {} branch probes, code size {} bytes",
        placed.sequence_points,
        placed.branch_points,
        method.code_size()
    );

    Ok(placed)
}

/// Returns `true` if `method` already carries the probe of its first statement point.
///
/// The probe is searched for across the whole method instead of at the point's offset: in a
/// body that was instrumented before, earlier probes and widened branches have moved it.
/// Probe ids are unique per method, so a match can only be that probe.
#[must_use]
pub fn is_already_instrumented(
    method: &Method,
    points: &InstrumentationPoints,
    probe: &Probe,
) -> bool {
    points
        .sequence_points
        .first()
        .is_some_and(|first| method.find_instrumentation(&probe.sequence(first.id)).is_some())
}

/// Inserts one statement probe per point, at the point's original offset.
///
/// # Errors
/// See [`Method::insert_at_original_offset`].
pub fn add_sequence_coverage(
    method: &mut Method,
    points: &[SequencePoint],
    probe: &Probe,
) -> Result<usize> {
    for point in points {
        method.insert_at_original_offset(i64::from(point.offset), &probe.sequence(point.id))?;
    }
    Ok(points.len())
}

/// Splices path probes after every conditional branch that has registered points.
///
/// # Errors
/// Returns [`crate::Error::InstructionNotFound`] if a conditional branch is the last
/// instruction of the method.
pub fn add_branch_coverage(
    method: &mut Method,
    points: &[BranchPoint],
    probe: &Probe,
) -> Result<usize> {
    if points.is_empty() {
        return Ok(0);
    }

    let branches: Vec<InstructionId> = method
        .instruction_ids()
        .iter()
        .copied()
        .filter(|id| {
            let instruction = &method[*id];
            instruction.original_offset() >= 0 && instruction.flow() == FlowType::ConditionalBranch
        })
        .collect();

    let mut placed = 0;
    for branch in branches {
        placed += instrument_branch(method, branch, points, probe)?;
    }

    method.recalculate_offsets();
    Ok(placed)
}

fn instrument_branch(
    method: &mut Method,
    branch: InstructionId,
    points: &[BranchPoint],
    probe: &Probe,
) -> Result<usize> {
    let offset = method[branch].original_offset();
    let registered: Vec<&BranchPoint> = points
        .iter()
        .filter(|point| i64::from(point.offset) == offset)
        .collect();
    if registered.is_empty() {
        return Ok(0);
    }

    let targets = method[branch].branches().to_vec();
    let path_count = targets.len() + 1;
    let id_for = |path: usize| {
        registered
            .iter()
            .find(|point| point.path as usize == path)
            .map(|point| point.id)
    };

    for point in &registered {
        if point.path as usize >= path_count {
            log::warn!(
                "Branch at IL_{:04x} has no path {} (id {})",
                offset,
                point.path,
                point.id
            );
        }
    }

    let follow_chains = method[branch].opcode != OpCode::Switch;
    let destination = |method: &Method, id: InstructionId| {
        if follow_chains {
            method.follow_branch_chain(branch, id)
        } else {
            id
        }
    };

    let fall_through = method
        .next_of(branch)
        .ok_or(Error::InstructionNotFound(offset + method[branch].size() as i64))?;

    let mut templates: Vec<Instruction> = Vec::new();
    // (template index of the closing `br`, destination)
    let mut exits: Vec<(usize, InstructionId)> = Vec::new();
    // (path, template index of the block start)
    let mut entries: Vec<(usize, usize)> = Vec::new();
    let mut placed = 0;

    for path in 0..path_count {
        let Some(id) = id_for(path) else {
            log::warn!("Branch at IL_{:04x} has no probe for path {}", offset, path);
            if path == 0 && registered.iter().any(|point| (point.path as usize) < path_count) {
                exits.push((templates.len(), destination(method, fall_through)));
                templates.push(Instruction::new(OpCode::Br));
            }
            continue;
        };

        let target = if path == 0 {
            fall_through
        } else {
            targets[path - 1]
        };

        entries.push((path, templates.len()));
        templates.extend(probe.sequence(id));
        exits.push((templates.len(), destination(method, target)));
        templates.push(Instruction::new(OpCode::Br));
        placed += 1;
    }

    if placed == 0 {
        return Ok(0);
    }

    let position = method
        .position_of(branch)
        .ok_or(Error::InstructionNotFound(offset))?;
    let spliced = method.splice_after(position, &templates)?;

    for (index, destination) in exits {
        method.set_branches(spliced[index], vec![destination]);
    }

    let mut retargeted = targets;
    for (path, index) in entries {
        if path > 0 {
            retargeted[path - 1] = spliced[index];
        }
    }
    method.set_branches(branch, retargeted);

    log::trace!(
        "Branch at IL_{:04x}: {} of {} paths probed",
        offset,
        placed,
        path_count
    );

    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    const PROBE: Probe = Probe::Managed {
        method: Token::new(0x0A00_0001),
    };

    fn tiny(code: &[u8]) -> Vec<u8> {
        let mut data = vec![((code.len() as u8) << 2) | 0x2];
        data.extend_from_slice(code);
        data
    }

    fn opcodes(method: &Method) -> Vec<OpCode> {
        method.instructions().map(|i| i.opcode).collect()
    }

    #[test]
    fn statement_probes() -> Result<()> {
        // ldarg.0; brtrue.s +1; nop; ret
        let mut method = Method::decode(&tiny(&[0x02, 0x2D, 0x01, 0x00, 0x2A]))?;
        let points = InstrumentationPoints {
            sequence_points: vec![
                SequencePoint { offset: 0, id: 1 },
                SequencePoint { offset: 4, id: 2 },
            ],
            branch_points: Vec::new(),
        };

        let placed = instrument(
            &mut method,
            &points,
            &PROBE,
            &InstrumentationConfig::default(),
        )?;
        assert_eq!(placed.sequence_points, 2);
        assert_eq!(placed.branch_points, 0);
        assert_eq!(method.max_stack(), 10);

        assert_eq!(
            opcodes(&method),
            [
                OpCode::LdcI4,
                OpCode::Call,
                OpCode::Ldarg0,
                OpCode::Brtrue,
                OpCode::Nop,
                OpCode::LdcI4,
                OpCode::Call,
                OpCode::Ret
            ]
        );

        // brtrue lands on the second probe
        let brtrue = method.instruction_ids()[3];
        let target = method[brtrue].branches()[0];
        assert_eq!(method[target].operand, 2);

        Ok(())
    }

    #[test]
    fn both_paths_probed() -> Result<()> {
        // ldarg.0; brtrue.s +1; nop; ret
        let mut method = Method::decode(&tiny(&[0x02, 0x2D, 0x01, 0x00, 0x2A]))?;
        let ids = method.instruction_ids().to_vec();
        let (brtrue, nop, ret) = (ids[1], ids[2], ids[3]);

        let points = [
            BranchPoint { offset: 1, path: 0, id: 10 },
            BranchPoint { offset: 1, path: 1, id: 11 },
        ];
        assert_eq!(add_branch_coverage(&mut method, &points, &PROBE)?, 2);

        assert_eq!(
            opcodes(&method),
            [
                OpCode::Ldarg0,
                OpCode::Brtrue,
                OpCode::LdcI4,
                OpCode::Call,
                OpCode::Br,
                OpCode::LdcI4,
                OpCode::Call,
                OpCode::Br,
                OpCode::Nop,
                OpCode::Ret
            ]
        );

        let order = method.instruction_ids().to_vec();
        assert_eq!(method[brtrue].branches(), &[order[5]]);
        assert_eq!(method[order[5]].operand, 11);
        assert_eq!(method[order[2]].operand, 10);
        assert_eq!(method[order[4]].branches(), &[nop]);
        assert_eq!(method[order[7]].branches(), &[ret]);

        // the rewritten body decodes again with the same shape
        let decoded = Method::decode(&method.to_bytes()?)?;
        assert_eq!(opcodes(&decoded), opcodes(&method));

        Ok(())
    }

    #[test]
    fn missing_fall_through_id_jumps_over() -> Result<()> {
        // ldarg.0; brfalse.s +1; nop; ret
        let mut method = Method::decode(&tiny(&[0x02, 0x2C, 0x01, 0x00, 0x2A]))?;
        let ids = method.instruction_ids().to_vec();

        let points = [BranchPoint { offset: 1, path: 1, id: 5 }];
        assert_eq!(add_branch_coverage(&mut method, &points, &PROBE)?, 1);

        let order = method.instruction_ids().to_vec();
        assert_eq!(method[order[2]].opcode, OpCode::Br);
        assert_eq!(method[order[2]].branches(), &[ids[2]]);
        assert_eq!(method[ids[1]].branches(), &[order[3]]);
        assert_eq!(method[order[3]].operand, 5);

        Ok(())
    }

    #[test]
    fn chains_are_followed_except_for_switch() -> Result<()> {
        // 0: ldarg.0; 1: brtrue.s +2 (-> 5); 3: br.s +1 (-> 6); 5: nop; 6: ret
        let mut method =
            Method::decode(&tiny(&[0x02, 0x2D, 0x02, 0x2B, 0x01, 0x00, 0x2A]))?;
        let ids = method.instruction_ids().to_vec();

        let points = [BranchPoint { offset: 1, path: 0, id: 1 }];
        add_branch_coverage(&mut method, &points, &PROBE)?;

        // fall-through skips the br pass-through and lands on ret
        let order = method.instruction_ids().to_vec();
        assert_eq!(method[order[4]].opcode, OpCode::Br);
        assert_eq!(method[order[4]].branches(), &[ids[4]]);

        #[rustfmt::skip]
        let code = [
            0x02,                               // 0: ldarg.0
            0x45, 0x01, 0x00, 0x00, 0x00,       // 1: switch
            0x00, 0x00, 0x00, 0x00,             //    case 0 -> 10
            0x2B, 0x00,                         // 10: br.s +0 (-> 12)
            0x2A,                               // 12: ret
        ];
        let mut method = Method::decode(&tiny(&code))?;
        let ids = method.instruction_ids().to_vec();
        let points = [
            BranchPoint { offset: 1, path: 0, id: 1 },
            BranchPoint { offset: 1, path: 1, id: 2 },
        ];
        add_branch_coverage(&mut method, &points, &PROBE)?;

        let order = method.instruction_ids().to_vec();
        // the case block jumps to the immediate target, not through it
        assert_eq!(method[order[7]].opcode, OpCode::Br);
        assert_eq!(method[order[7]].branches(), &[ids[2]]);
        assert_eq!(method[ids[1]].branches(), &[order[5]]);
        assert_eq!(method[ids[1]].operand, 1);

        Ok(())
    }

    #[test]
    fn chains_stop_at_try_entry() -> Result<()> {
        #[rustfmt::skip]
        let data = [
            0x0B, 0x30, 0x01, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x02,               // 0: ldarg.0
            0x2C, 0x01,         // 1: brfalse.s -> 4
            0x00,               // 3: nop
            0x2B, 0x01,         // 4: try { br.s -> 7
            0x00,               // 6: nop
            0xDE, 0x01,         // 7: leave.s -> 10 }
            0xDC,               // 9: finally { endfinally }
            0x2A,               // 10: ret
            0x00,
            0x01, 0x10, 0x00, 0x00,
            0x02, 0x00, 0x04, 0x00, 0x05, 0x09, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut method = Method::decode(&data)?;
        let try_start = method.regions()[0].try_start;
        assert_eq!(method[try_start].opcode, OpCode::Br);

        let points = [
            BranchPoint { offset: 1, path: 0, id: 1 },
            BranchPoint { offset: 1, path: 1, id: 2 },
        ];
        assert_eq!(add_branch_coverage(&mut method, &points, &PROBE)?, 2);

        // the taken path enters the try at its first instruction, not at the leave
        let order = method.instruction_ids().to_vec();
        assert_eq!(method[order[7]].opcode, OpCode::Br);
        assert_eq!(method[order[7]].branches(), &[try_start]);
        assert!(method.enclosing_blocks(order[7]).is_empty());
        assert_eq!(method.enclosing_blocks(try_start), [(0, 0)]);

        // a pass-through inside the try still follows its chain from within
        let leave = method.find_by_original_offset(7).unwrap();
        assert_eq!(method.follow_branch_chain(try_start, try_start), leave);

        let decoded = Method::decode(&method.to_bytes()?)?;
        let region = &decoded.regions()[0];
        assert_eq!(decoded[region.try_start].opcode, OpCode::Br);
        assert_eq!(decoded[region.try_start].original_offset(), 37);

        Ok(())
    }

    #[test]
    fn injected_and_unregistered_branches_are_ignored() -> Result<()> {
        let mut method = Method::decode(&tiny(&[0x02, 0x2D, 0x01, 0x00, 0x2A]))?;
        let before = method.len();

        let points = [BranchPoint { offset: 3, path: 0, id: 1 }];
        assert_eq!(add_branch_coverage(&mut method, &points, &PROBE)?, 0);
        assert_eq!(method.len(), before);

        // a path index the branch does not have is reported and skipped
        let points = [BranchPoint { offset: 1, path: 4, id: 1 }];
        assert_eq!(add_branch_coverage(&mut method, &points, &PROBE)?, 0);
        assert_eq!(method.len(), before);

        Ok(())
    }

    #[test]
    fn disabled_kinds_place_nothing() -> Result<()> {
        let mut method = Method::decode(&tiny(&[0x02, 0x2D, 0x01, 0x00, 0x2A]))?;
        let points = InstrumentationPoints {
            sequence_points: vec![SequencePoint { offset: 0, id: 1 }],
            branch_points: vec![BranchPoint { offset: 1, path: 0, id: 2 }],
        };
        let config = InstrumentationConfig::default()
            .with_sequence_points(false)
            .with_branch_points(false);

        let placed = instrument(&mut method, &points, &PROBE, &config)?;
        assert_eq!(placed.total(), 0);
        assert_eq!(method.max_stack(), 8);
        assert_eq!(method.len(), 4);

        Ok(())
    }
}
