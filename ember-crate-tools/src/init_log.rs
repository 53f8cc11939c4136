use std::io::Write;

use env_logger::fmt::Formatter;

/// 统一的日志格式：`[时间] 级别 [文件:行号] 内容`
fn format_record(buf: &mut Formatter, record: &log::Record<'_>) -> std::io::Result<()> {
    let level_style = match record.level() {
        log::Level::Info => buf
            .default_level_style(log::Level::Info)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        log::Level::Warn => buf
            .default_level_style(log::Level::Warn)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
        log::Level::Error => buf
            .default_level_style(log::Level::Error)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        level => buf.default_level_style(level),
    };
    let grey_style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

    let line = record.line().unwrap_or(!0);
    // windows 和 unix 的路径分隔符都需要处理
    let file = record.file().unwrap_or("").rsplit(['\\', '/']).next().unwrap_or("");
    let time = chrono::Local::now().format("%H:%M:%S%.3f");
    let level = record.level();

    writeln!(
        buf,
        "{level_style}[{time}] {level:<5}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} {}",
        record.args()
    )
}

fn builder(default_level: log::LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.format(format_record).filter(None, default_level);
    // RUST_LOG 可以覆盖默认级别
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder
}

/// 初始化全局 logger，只能调用一次
pub fn init_log() {
    builder(log::LevelFilter::Info).init();
}

/// 测试使用的 logger
///
/// 每个测试都可以调用，重复初始化会被忽略。
pub fn init_test_log() {
    let _ = builder(log::LevelFilter::Debug).is_test(true).try_init();
}
