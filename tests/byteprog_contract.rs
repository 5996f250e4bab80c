use riter::{
    CancelToken, InMemorySink, RenderConfig, RenderSession, RiterError, SessionEnd, ShowKind,
    ShowProgram,
};

fn run(src: &str) -> (Result<SessionEnd, RiterError>, InMemorySink) {
    let mut sink = InMemorySink::new();
    let result = RenderSession::new(
        ShowProgram::new(ShowKind::ByteProgram, src),
        RenderConfig::batch(),
    )
    .and_then(|s| s.run(&mut sink, &CancelToken::new()))
    .map(|r| r.end);
    (result, sink)
}

const NEVER_DONE: &str = r#"(module
    (import "env" "memory" (memory 456 456 (pagesize 1)))
    (func (export "next_frame") (param $frame i32) (param $ptr i32) (result i32)
        ;; light pixel `frame` of the top row
        (i32.store8
            (i32.add (local.get $ptr) (i32.shr_u (local.get $frame) (i32.const 3)))
            (i32.shr_u (i32.const 128) (i32.and (local.get $frame) (i32.const 7))))
        (i32.const 0)))"#;

#[test]
fn never_more_than_one_hundred_frames() {
    let (result, sink) = run(NEVER_DONE);
    assert_eq!(result.unwrap(), SessionEnd::Completed);
    assert_eq!(sink.frames().len(), 100);
    for (idx, frame) in sink.frames() {
        let x = idx.0 as usize;
        if x < 96 {
            assert!(frame.get(x, 0), "frame {x}");
        }
        assert_eq!(frame.count_on(), 1);
    }
}

#[test]
fn final_status_ends_after_emitting() {
    let src = r#"(module
        (import "env" "memory" (memory 456 456 (pagesize 1)))
        (func (export "next_frame") (param $frame i32) (param $ptr i32) (result i32)
            (i32.store8 (local.get $ptr) (i32.const 255))
            (i32.eq (local.get $frame) (i32.const 2))))"#;
    let (result, sink) = run(src);
    assert_eq!(result.unwrap(), SessionEnd::Completed);
    assert_eq!(sink.frames().len(), 3);
}

#[test]
fn write_outside_window_terminates_immediately() {
    let src = r#"(module
        (import "env" "memory" (memory 456 456 (pagesize 1)))
        (func (export "next_frame") (param $frame i32) (param $ptr i32) (result i32)
            (if (i32.eq (local.get $frame) (i32.const 3))
                (then (i32.store8 (i32.const 500) (i32.const 1))))
            (i32.const 0)))"#;
    let (result, sink) = run(src);
    assert!(matches!(result, Err(RiterError::Trap(_))), "{result:?}");
    assert_eq!(sink.frames().len(), 3);
    assert!(sink.fault_message().is_some());
}

#[test]
fn load_straddling_the_window_end_is_a_trap() {
    let src = r#"(module
        (import "env" "memory" (memory 456 456 (pagesize 1)))
        (func (export "next_frame") (param i32 i32) (result i32)
            (drop (i32.load (i32.const 453)))
            (i32.const 0)))"#;
    let (result, sink) = run(src);
    assert!(matches!(result, Err(RiterError::Trap(_))), "{result:?}");
    assert!(sink.frames().is_empty());
}

#[test]
fn unreachable_is_a_runtime_fault() {
    let src = r#"(module
        (import "env" "memory" (memory 456 456 (pagesize 1)))
        (func (export "next_frame") (param i32 i32) (result i32) unreachable))"#;
    let (result, _) = run(src);
    assert!(matches!(result, Err(RiterError::RuntimeFault(_))), "{result:?}");
}

#[test]
fn restored_write_outside_window_still_terminates() {
    let src = r#"(module
        (import "env" "memory" (memory 456 456 (pagesize 1)))
        (func (export "next_frame") (param $frame i32) (param $ptr i32) (result i32)
            (i32.store8 (local.get $ptr) (i32.const 255))
            (if (i32.eq (local.get $frame) (i32.const 1))
                (then
                    (i32.store8 (i32.const 500) (i32.const 7))
                    (i32.store8 (i32.const 500) (i32.const 0))))
            (i32.const 0)))"#;
    let (result, sink) = run(src);
    assert!(matches!(result, Err(RiterError::Trap(_))), "{result:?}");
    assert_eq!(sink.frames().len(), 1);
}

#[test]
fn data_segment_past_the_window_is_a_compile_error() {
    let src = r#"(module
        (import "env" "memory" (memory 456 456 (pagesize 1)))
        (data (i32.const 454) "abc")
        (func (export "next_frame") (param i32 i32) (result i32) (i32.const 1)))"#;
    let (result, sink) = run(src);
    assert!(matches!(result, Err(RiterError::Compile(_))), "{result:?}");
    assert!(sink.frames().is_empty());
}
