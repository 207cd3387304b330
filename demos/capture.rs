use std::env;
use std::time::Instant;

use v4l_capture::io::Mode;
use v4l_capture::{Config, Frame, Session};

fn main() -> v4l_capture::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "/dev/video0".to_string());
    let method = args.next().unwrap_or_else(|| Mode::Mmap.name().to_string());
    println!("Using device: {}\n", path);

    // Capture 4 frames by default
    let count = 4;

    let config = Config {
        io_method: Some(method),
        ..Config::new(&path)
    };
    let mut session = Session::new(config);
    session.connect()?;

    if let Some(caps) = session.capabilities() {
        println!("Capabilities:\n{}", caps);
    }
    if let Some(format) = session.format() {
        println!("Active format:\n{}", format);
    }
    println!("I/O method: {} ({} buffers)\n", session.mode(), session.buffer_count());

    session.start()?;

    let start = Instant::now();
    let mut captured = 0;
    while captured < count {
        let res = session.update(&mut |frame: &Frame| {
            println!("Frame {}", frame.number);
            println!("  sequence  : {}", frame.meta.sequence);
            println!("  timestamp : {}", frame.meta.timestamp);
            println!("  flags     : {}", frame.meta.flags);
            println!("  length    : {}", frame.data.len());
        });
        match res {
            Ok(_) => captured += 1,
            Err(e) if e.is_recoverable() => continue,
            Err(e) => return Err(e),
        }
    }

    println!();
    println!("FPS: {}", count as f64 / start.elapsed().as_secs_f64());

    session.stop();
    session.disconnect()
}
