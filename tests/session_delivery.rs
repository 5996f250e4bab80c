use riter::{
    CancelToken, Frame, FrameIndex, FrameSink, FrameStream, InMemorySink, RenderConfig,
    RenderSession, RiterError, RiterResult, SessionEnd, ShowKind, ShowProgram, SinkConfig,
    SseDecoder, SseEvent, SseSink,
};

/// Cancels its token as soon as frame `k` arrives.
struct CancelAfter {
    k: u64,
    token: CancelToken,
    seen: Vec<u64>,
}

impl FrameSink for CancelAfter {
    fn begin(&mut self, _cfg: SinkConfig) -> RiterResult<()> {
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, _frame: &Frame) -> RiterResult<()> {
        self.seen.push(idx.0);
        if idx.0 == self.k {
            self.token.cancel();
        }
        Ok(())
    }

    fn fault(&mut self, _err: &RiterError) -> RiterResult<()> {
        Ok(())
    }

    fn end(&mut self) -> RiterResult<()> {
        Ok(())
    }
}

#[test]
fn cancelling_after_frame_k_stops_production() {
    for kind_src in [
        (ShowKind::Shader, "u_time"),
        (ShowKind::Imperative, "function draw() { background(frameCount % 255); }"),
    ] {
        let token = CancelToken::new();
        let mut sink = CancelAfter {
            k: 4,
            token: token.clone(),
            seen: Vec::new(),
        };
        let report = RenderSession::new(ShowProgram::new(kind_src.0, kind_src.1), RenderConfig::batch())
            .unwrap()
            .run(&mut sink, &token)
            .unwrap();
        assert_eq!(report.end, SessionEnd::Cancelled);
        assert_eq!(sink.seen, vec![0, 1, 2, 3, 4]);
    }
}

#[test]
fn consumer_going_away_is_cancellation_not_fault() {
    struct Gone;
    impl std::io::Write for Gone {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    let report = RenderSession::new(ShowProgram::new(ShowKind::Shader, "1.0"), RenderConfig::batch())
        .unwrap()
        .run(&mut SseSink::new(Gone), &CancelToken::new())
        .unwrap();
    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(report.frames, 0);
}

#[test]
fn sse_wire_round_trips_through_decoder() {
    let src = "function draw() { if (frameCount > 3) { explode(); } background(frameCount * 80); }";
    let mut sink = SseSink::new(Vec::new());
    let err = RenderSession::new(ShowProgram::new(ShowKind::Imperative, src), RenderConfig::batch())
        .unwrap()
        .run(&mut sink, &CancelToken::new())
        .unwrap_err();
    assert!(err.is_session_fault());

    let wire = sink.into_inner();
    let text = String::from_utf8(wire.clone()).unwrap();
    assert_eq!(text.matches("data: ").count(), 3);
    assert!(text.ends_with("event: error\n\n"));

    let mut dec = SseDecoder::new();
    let mut events = Vec::new();
    for chunk in wire.chunks(97) {
        events.extend(dec.feed(chunk).unwrap());
    }
    assert_eq!(events.len(), 4);
    assert_eq!(events[3], SseEvent::Error);
    // Gray 80 is below the 50% luminance threshold; 160 and 240 are above it.
    let lit: Vec<u32> = events[..3]
        .iter()
        .map(|e| match e {
            SseEvent::Frame(f) => f.count_on(),
            SseEvent::Error => u32::MAX,
        })
        .collect();
    assert_eq!(lit, vec![0, 96 * 38, 96 * 38]);
}

#[test]
fn stream_is_pulled_one_frame_at_a_time() {
    let mut stream =
        FrameStream::spawn(ShowProgram::new(ShowKind::Shader, "u_time"), RenderConfig::batch())
            .unwrap();
    let first: Vec<u64> = stream.by_ref().take(3).map(|r| r.unwrap().0.0).collect();
    assert_eq!(first, vec![0, 1, 2]);
    let report = stream.finish().unwrap();
    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(report.frames, 3);
}

#[test]
fn dropping_a_stream_stops_an_endless_show() {
    let src = "function draw() { while (true) {} }";
    let stream = FrameStream::spawn(
        ShowProgram::new(ShowKind::Imperative, src),
        RenderConfig {
            max_steps_per_frame: u64::MAX,
            wall_clock_ms: None,
            ..RenderConfig::batch()
        },
    )
    .unwrap();
    let token = stream.cancel_token();
    let started = std::time::Instant::now();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(30));
        token.cancel();
    });
    let mut stream = stream;
    assert!(stream.next().is_none());
    drop(stream);
    handle.join().unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[test]
fn in_memory_sink_sees_frames_in_order() {
    let mut sink = InMemorySink::new();
    RenderSession::new(
        ShowProgram::new(ShowKind::Shader, "u_time / 10.0"),
        RenderConfig {
            max_frames: Some(20),
            ..RenderConfig::batch()
        },
    )
    .unwrap()
    .run(&mut sink, &CancelToken::new())
    .unwrap();
    let idx: Vec<u64> = sink.frames().iter().map(|(i, _)| i.0).collect();
    assert_eq!(idx, (0..20).collect::<Vec<_>>());
}

const WANDERING_SKETCH: &str = r#"
let x = 0;
let y = 0;
function setup() { noStroke(); }
function draw() {
    background(0);
    x = (x + 7 + floor(random(5))) % 96;
    y = (y + 1 + floor(random(3))) % 38;
    fill(255);
    rect(x, y, 4, 4);
}
"#;

const COUNTING_MODULE: &str = r#"(module
    (import "env" "memory" (memory 456 456 (pagesize 1)))
    (global $n (mut i32) (i32.const 0))
    (func (export "next_frame") (param $frame i32) (param $ptr i32) (result i32)
        (global.set $n (i32.add (global.get $n) (i32.const 37)))
        (i32.store8
            (i32.add (local.get $ptr) (i32.rem_u (global.get $n) (i32.const 456)))
            (i32.const 255))
        (i32.const 0)))"#;

fn collect_stream(kind: ShowKind, src: &str, config: RenderConfig) -> Vec<(u64, Frame)> {
    FrameStream::spawn(ShowProgram::new(kind, src), config)
        .unwrap()
        .map(|r| r.map(|(idx, frame)| (idx.0, frame)).unwrap())
        .collect()
}

#[test]
fn concurrent_sessions_do_not_share_state() {
    let config = RenderConfig {
        max_frames: Some(30),
        seed: 42,
        ..RenderConfig::batch()
    };
    let shows = [
        (ShowKind::Imperative, WANDERING_SKETCH),
        (ShowKind::ByteProgram, COUNTING_MODULE),
    ];
    let solo: Vec<Vec<(u64, Frame)>> = shows
        .iter()
        .map(|&(kind, src)| collect_stream(kind, src, config.clone()))
        .collect();
    for frames in &solo {
        assert_eq!(frames.len(), 30);
        assert!(frames.windows(2).any(|w| w[0].1 != w[1].1));
    }

    let start = std::sync::Barrier::new(2 * shows.len());
    let concurrent: Vec<(usize, Vec<(u64, Frame)>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = shows
            .iter()
            .enumerate()
            .flat_map(|(i, &(kind, src))| [(i, kind, src), (i, kind, src)])
            .map(|(i, kind, src)| {
                let (start, config) = (&start, config.clone());
                scope.spawn(move || {
                    start.wait();
                    (i, collect_stream(kind, src, config))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(concurrent.len(), 4);
    for (i, frames) in concurrent {
        assert_eq!(frames, solo[i], "{:?}", shows[i].0);
    }
}
