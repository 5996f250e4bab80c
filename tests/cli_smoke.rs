use std::path::PathBuf;
use std::process::Command;

fn riter() -> Command {
    Command::new(env!("CARGO_BIN_EXE_riter"))
}

fn scratch(name: &str) -> PathBuf {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

#[test]
fn render_prints_one_base64_frame_per_line() {
    let show = scratch("hello.txt");
    std::fs::write(&show, "HELLO").unwrap();
    let out = riter()
        .args(["render", "--kind", "text", "--in"])
        .arg(&show)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].len(), 608);
}

#[test]
fn render_reads_json_shows_and_honours_max_frames() {
    let show = scratch("shader.json");
    std::fs::write(&show, r#"{"kind": "shader", "source": "fract(u_time)"}"#).unwrap();
    let out = riter()
        .args(["render", "--max-frames", "5", "--in"])
        .arg(&show)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8(out.stdout).unwrap().lines().count(), 5);
}

#[test]
fn runtime_fault_keeps_frames_and_fails() {
    let show = scratch("fault.js");
    std::fs::write(&show, "function draw() { if (frameCount == 3) { nope(); } }").unwrap();
    let out = riter()
        .args(["render", "--kind", "p5", "--in"])
        .arg(&show)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert_eq!(String::from_utf8(out.stdout).unwrap().lines().count(), 2);
    assert!(String::from_utf8_lossy(&out.stderr).contains("runtime fault"));
}

#[test]
fn sse_ends_with_error_event_on_trap() {
    let show = scratch("trap.wat");
    std::fs::write(
        &show,
        r#"(module (import "env" "memory" (memory 456 456 (pagesize 1)))
            (func (export "next_frame") (param i32 i32) (result i32)
                (i32.store8 (i32.const 4000) (i32.const 1)) (i32.const 0)))"#,
    )
    .unwrap();
    let out = riter()
        .args(["sse", "--kind", "wasm", "--in"])
        .arg(&show)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert_eq!(String::from_utf8(out.stdout).unwrap(), "event: error\n\n");
}

#[test]
fn frame_writes_png() {
    let show = scratch("png.glsl");
    std::fs::write(&show, "gl_FragCoord.x < 48.0 ? vec3(1.0) : vec3(0.0)").unwrap();
    let png = scratch("out.png");
    let _ = std::fs::remove_file(&png);
    let status = riter()
        .args(["frame", "--kind", "shader", "--index", "3", "--scale", "2", "--in"])
        .arg(&show)
        .arg("--out")
        .arg(&png)
        .status()
        .unwrap();
    assert!(status.success());
    let img = image::open(&png).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (192, 76));
    assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
    assert_eq!(img.get_pixel(191, 75).0, [0, 0, 0, 255]);
}

#[test]
fn unknown_kind_is_rejected() {
    let show = scratch("unknown.txt");
    std::fs::write(&show, "x").unwrap();
    let out = riter()
        .args(["render", "--kind", "flash", "--in"])
        .arg(&show)
        .output()
        .unwrap();
    assert!(!out.status.success());
}
