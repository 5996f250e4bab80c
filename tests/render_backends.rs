use riter::{
    CancelToken, FRAME_BYTES, Frame, InMemorySink, RenderConfig, RenderSession, RiterError,
    SessionEnd, ShowKind, ShowProgram,
};

fn render(kind: ShowKind, src: &str, cfg: RenderConfig) -> (Result<SessionEnd, RiterError>, InMemorySink) {
    let mut sink = InMemorySink::new();
    let result = RenderSession::new(ShowProgram::new(kind, src), cfg)
        .and_then(|s| s.run(&mut sink, &CancelToken::new()))
        .map(|r| r.end);
    (result, sink)
}

fn limited(n: u64) -> RenderConfig {
    RenderConfig {
        max_frames: Some(n),
        ..RenderConfig::batch()
    }
}

#[test]
fn imperative_fault_on_fifth_draw_keeps_four_frames() {
    let src = r#"
        let calls = 0;
        function setup() { background(0); }
        function draw() {
            calls = calls + 1;
            if (calls == 5) {
                let broken = null;
                broken.x();
            }
            fill(255);
            rect(calls * 10, 0, 8, 8);
        }
    "#;
    let (result, sink) = render(ShowKind::Imperative, src, RenderConfig::batch());
    assert!(matches!(result, Err(RiterError::RuntimeFault(_))), "{result:?}");
    let idx: Vec<u64> = sink.frames().iter().map(|(i, _)| i.0).collect();
    assert_eq!(idx, vec![0, 1, 2, 3]);
    assert!(sink.fault_message().is_some());
    assert!(sink.ended());
}

#[test]
fn imperative_frames_accumulate_without_background() {
    let src = "function draw() { noStroke(); fill(255); rect(frameCount * 8, 0, 8, 8); }";
    let (result, sink) = render(ShowKind::Imperative, src, limited(3));
    assert!(result.is_ok());
    let counts: Vec<u32> = sink.frames().iter().map(|(_, f)| f.count_on()).collect();
    assert_eq!(counts, vec![64, 128, 192]);
}

#[test]
fn imperative_random_is_seeded() {
    let src = "function draw() { background(0); fill(255); rect(random(90), random(30), 4, 4); }";
    let (_, a) = render(ShowKind::Imperative, src, limited(5));
    let (_, b) = render(ShowKind::Imperative, src, limited(5));
    assert_eq!(a.frames(), b.frames());
}

#[test]
fn shader_is_deterministic() {
    let src = r#"
        precision mediump float;
        uniform vec2 u_resolution;
        uniform float u_time;
        void main() {
            vec2 uv = gl_FragCoord.xy / u_resolution;
            float v = sin(uv.x * 12.0 + u_time * 3.0) * 0.5 + 0.5;
            gl_FragColor = vec4(vec3(step(0.5, v)), 1.0);
        }
    "#;
    let (ra, a) = render(ShowKind::Shader, src, limited(12));
    let (rb, b) = render(ShowKind::Shader, src, limited(12));
    assert!(ra.is_ok() && rb.is_ok());
    assert_eq!(a.frames().len(), 12);
    assert_eq!(a.frames(), b.frames());
    assert_ne!(a.frames()[0].1, a.frames()[5].1);
}

#[test]
fn shader_runs_exactly_two_hundred_frames() {
    let (result, sink) = render(ShowKind::Shader, "fract(u_time)", RenderConfig::batch());
    assert_eq!(result.unwrap(), SessionEnd::Completed);
    assert_eq!(sink.frames().len(), 200);
}

#[test]
fn glyph_ab_matches_golden_frame() {
    let (result, sink) = render(ShowKind::Glyph, "AB", RenderConfig::batch());
    assert_eq!(result.unwrap(), SessionEnd::Completed);
    assert_eq!(sink.frames().len(), 1);

    let mut golden = [0u8; FRAME_BYTES];
    for (i, b) in [
        (0, 0x73),
        (1, 0xC0),
        (12, 0x8A),
        (13, 0x20),
        (24, 0x8A),
        (25, 0x20),
        (36, 0x8B),
        (37, 0xC0),
        (48, 0xFA),
        (49, 0x20),
        (60, 0x8A),
        (61, 0x20),
        (72, 0x8B),
        (73, 0xC0),
    ] {
        golden[i] = b;
    }
    assert_eq!(sink.frames()[0].1, Frame::from_bytes(golden));
}

#[test]
fn every_frame_is_456_bytes() {
    for (kind, src) in [
        (ShowKind::Glyph, "hello"),
        (ShowKind::Shader, "vec3(0.2, 0.9, 0.1)"),
        (ShowKind::Imperative, "function draw() { background(128); }"),
    ] {
        let (_, sink) = render(kind, src, limited(2));
        assert!(!sink.frames().is_empty());
        for (_, f) in sink.frames() {
            assert_eq!(f.as_bytes().len(), 456);
        }
    }
}

#[test]
fn compile_errors_produce_no_frames() {
    for (kind, src) in [
        (ShowKind::Shader, "vec3(1.0"),
        (ShowKind::Imperative, "function draw() {"),
        (ShowKind::ByteProgram, "(module (func"),
    ] {
        let (result, sink) = render(kind, src, RenderConfig::batch());
        assert!(matches!(result, Err(RiterError::Compile(_))), "{kind}: {result:?}");
        assert!(sink.frames().is_empty());
        assert!(sink.config().is_none());
    }
}

#[test]
fn escaped_multibyte_characters_do_not_break_compilation() {
    let (result, sink) = render(
        ShowKind::Imperative,
        "let s = \"\\é\"; function draw() { background(s == 'é' ? 255 : 0); noLoop(); }",
        RenderConfig::batch(),
    );
    assert_eq!(result.unwrap(), SessionEnd::Completed);
    assert_eq!(sink.frames()[0].1.count_on(), 96 * 38);

    let (result, _) = render(ShowKind::Shader, "\"\\é\"", RenderConfig::batch());
    assert!(matches!(result, Err(RiterError::Compile(_))), "{result:?}");
}

#[test]
fn deeply_nested_sources_are_compile_errors() {
    let open = "(".repeat(200_000);
    let close = ")".repeat(200_000);
    for (kind, src) in [
        (ShowKind::Imperative, format!("let x = {open}1{close};")),
        (ShowKind::Shader, format!("{open}1.0{close}")),
    ] {
        let err = RenderSession::new(ShowProgram::new(kind, src), RenderConfig::batch()).unwrap_err();
        assert!(matches!(err, RiterError::Compile(ref m) if m.contains("nested too deeply")), "{kind}: {err}");
    }
}

#[test]
fn shader_type_errors_surface_before_the_session_starts() {
    let err = RenderSession::new(
        ShowProgram::new(ShowKind::Shader, "float a = vec2(1.0); vec3(1.0) + vec2(1.0)"),
        RenderConfig::batch(),
    )
    .unwrap_err();
    assert!(matches!(err, RiterError::Compile(ref m) if m.contains("cannot initialize float")), "{err}");
}
