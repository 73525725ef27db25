//! Process-wide tracing setup shared by every binary.

mod subscriber;

pub use subscriber::LogFormat;

/// Initialize tracing with the format chosen by `LOG_FORMAT` (JSON unless `pretty`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    let format = std::env::var("LOG_FORMAT")
        .map(|v| LogFormat::parse(&v))
        .unwrap_or_default();
    subscriber::init(format);
}
