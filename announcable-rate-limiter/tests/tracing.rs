#![allow(missing_docs)]
#![cfg(feature = "tracing")]

use std::io::Write;
use std::sync::{Arc, Mutex};

use announcable_rate_limiter::presets;
use tracing_subscriber::{filter::LevelFilter, util::SubscriberInitExt};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn output(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[test]
fn it_logs_rejections_at_debug_level() {
    let captured = Captured::default();
    let writer = captured.clone();
    let _guard = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish()
        .set_default();

    let limiter = presets::password_forgot().build().unwrap();
    while limiter.hit("user@example.com").is_ok() {}

    let output = captured.output();
    assert!(output.contains("rate limit bucket created"), "{output}");
    assert!(output.contains("rate limit exceeded"), "{output}");
    assert!(output.contains("password_forgot"), "{output}");
    assert!(output.contains("DEBUG"), "{output}");
    assert!(!output.contains("WARN"), "{output}");
}
