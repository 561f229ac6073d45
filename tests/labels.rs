//! Label and exception-region integrity under arbitrary cursor edits.

use cilpatch::prelude::*;
use proptest::{prelude::*, sample::Index};

const METHOD: &str = "Game.Level::Update";

fn op(opcode: OpCode) -> Instruction {
    Instruction::simple(opcode).unwrap()
}

fn jump(opcode: OpCode, label: LabelId) -> Instruction {
    Instruction::new(opcode, Operand::Label(label)).unwrap()
}

/// `br L0; L1: nop; brtrue L1; nop; br L2; nop; L0: nop; L2: ret` with every label bound and
/// a finally region over `[1, 3)` handled by `[3, 5)`.
fn looping_body() -> (MethodBody, Vec<LabelId>) {
    let mut body = MethodBody::new();
    let labels: Vec<LabelId> = (0..3).map(|_| body.define_label()).collect();
    body.push(jump(OpCode::Br, labels[0]));
    let top = body.push(op(OpCode::Nop));
    body.push(jump(OpCode::Brtrue, labels[1]));
    let handler = body.push(op(OpCode::Nop));
    let after = body.push(jump(OpCode::Br, labels[2]));
    body.push(op(OpCode::Nop));
    let middle = body.push(op(OpCode::Nop));
    let ret = body.push(op(OpCode::Ret));
    body.bind_label(labels[0], middle).unwrap();
    body.bind_label(labels[1], top).unwrap();
    body.bind_label(labels[2], ret).unwrap();
    body.exception_handlers.push(ExceptionHandler {
        flags: ExceptionHandlerFlags::FINALLY,
        try_start: top,
        try_end: Some(handler),
        handler_start: handler,
        handler_end: Some(after),
        filter_start: None,
        catch_type: None,
    });
    (body, labels)
}

#[derive(Debug, Clone)]
enum Edit {
    Insert { at: Index, after_labels: bool },
    Remove { at: Index },
    RemoveTail,
    Append,
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        4 => (any::<Index>(), any::<bool>())
            .prop_map(|(at, after_labels)| Edit::Insert { at, after_labels }),
        3 => any::<Index>().prop_map(|at| Edit::Remove { at }),
        1 => Just(Edit::RemoveTail),
        1 => Just(Edit::Append),
    ]
}

fn is_boundary(body: &MethodBody, index: usize) -> bool {
    body.id_at(index).is_some_and(|id| {
        body.exception_handlers
            .iter()
            .any(|handler| !handler.boundaries_at(id).is_empty())
    })
}

fn apply(body: &mut MethodBody, edit: &Edit) -> std::result::Result<(), TestCaseError> {
    let boundary_hit;
    let len_before = body.len();
    let outcome = {
        let mut cursor = ILCursor::new(body, METHOD);
        let len = cursor.len();
        match edit {
            Edit::Insert { at, after_labels } => {
                boundary_hit = false;
                cursor.goto_index(at.index(len + 1)).map_err(fail)?;
                if *after_labels {
                    cursor.move_after_labels();
                }
                cursor.emit(OpCode::Nop, Operand::None).map(|_| ())
            }
            Edit::Append => {
                boundary_hit = false;
                cursor.goto_index(len).map_err(fail)?;
                cursor.emit(OpCode::Ret, Operand::None).map(|_| ())
            }
            Edit::Remove { .. } | Edit::RemoveTail if len == 0 => return Ok(()),
            Edit::Remove { at } => {
                let index = at.index(len);
                cursor.goto_index(index).map_err(fail)?;
                boundary_hit = is_boundary(cursor.body(), index);
                cursor.remove().map(|_| ())
            }
            Edit::RemoveTail => {
                cursor.goto_index(len - 1).map_err(fail)?;
                boundary_hit = is_boundary(cursor.body(), len - 1);
                cursor.remove().map(|_| ())
            }
        }
    };

    match outcome {
        Ok(()) => {
            prop_assert!(!boundary_hit, "removed a region boundary");
        }
        Err(err) => {
            prop_assert!(boundary_hit, "unexpected error: {}", err);
            prop_assert_eq!(err.kind(), ErrorKind::InvalidRemoval);
            prop_assert_eq!(body.len(), len_before);
        }
    }
    Ok(())
}

fn fail(err: Error) -> TestCaseError {
    TestCaseError::fail(err.to_string())
}

proptest! {
    #[test]
    fn labels_survive_any_edit_sequence(edits in prop::collection::vec(edit(), 0..64)) {
        let (mut body, labels) = looping_body();
        for edit in &edits {
            apply(&mut body, edit)?;
        }

        for label in &labels {
            match body.label_state(*label) {
                Some(LabelState::Bound(target)) => {
                    prop_assert!(body.contains(target));
                }
                Some(LabelState::PendingEnd) => {}
                other => {
                    prop_assert!(false, "{} is {:?}", label, other);
                }
            }
        }

        let referenced_pending = body
            .iter()
            .flat_map(|instr| instr.operand.labels())
            .any(|label| body.label_state(label) == Some(LabelState::PendingEnd));

        match body.finalize(METHOD, BranchFormPolicy::Fit, 16) {
            Ok(_) => {
                prop_assert!(!referenced_pending);
                for instr in body.iter() {
                    for label in instr.operand.labels() {
                        let target = body.label_target(label);
                        prop_assert!(target.is_some_and(|id| body.index_of(id).is_some()));
                    }
                }
                let region = &body.exception_handlers[0];
                let try_start = body.index_of(region.try_start);
                let handler_start = body.index_of(region.handler_start);
                prop_assert!(try_start.is_some() && handler_start.is_some());
                prop_assert!(try_start < handler_start);
            }
            Err(Error::UnboundLabelAtFinalization { label, .. }) => {
                prop_assert!(referenced_pending);
                prop_assert_eq!(body.label_state(label), Some(LabelState::PendingEnd));
            }
            Err(other) => {
                prop_assert!(false, "finalization failed with {}", other);
            }
        }
    }
}

#[test]
fn removing_a_jump_target_at_the_tail_fails_finalization() -> Result<()> {
    let (mut body, labels) = looping_body();
    {
        let mut cursor = ILCursor::new(&mut body, METHOD);
        let last = cursor.len() - 1;
        cursor.goto_index(last)?;
        cursor.remove()?;
    }
    assert_eq!(body.label_state(labels[2]), Some(LabelState::PendingEnd));

    let err = body
        .finalize(METHOD, BranchFormPolicy::Fit, 16)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnboundLabelAtFinalization);

    // appending binds the pending label again
    {
        let mut cursor = ILCursor::new(&mut body, METHOD);
        let end = cursor.len();
        cursor.goto_index(end)?;
        cursor.emit(OpCode::Ret, Operand::None)?;
    }
    assert!(matches!(
        body.label_state(labels[2]),
        Some(LabelState::Bound(_))
    ));
    body.finalize(METHOD, BranchFormPolicy::Fit, 16)?;
    Ok(())
}

#[test]
fn region_boundaries_refuse_plain_removal() -> Result<()> {
    let (mut body, _) = looping_body();
    let try_start = body.exception_handlers[0].try_start;
    let index = body.index_of(try_start).unwrap();

    let mut cursor = ILCursor::new(&mut body, METHOD);
    cursor.goto_index(index)?;
    assert_eq!(cursor.remove().unwrap_err().kind(), ErrorKind::InvalidRemoval);
    cursor.remove_reanchoring()?;
    drop(cursor);

    let moved = body.exception_handlers[0].try_start;
    assert_ne!(moved, try_start);
    assert_eq!(body.index_of(moved), Some(index));
    Ok(())
}
