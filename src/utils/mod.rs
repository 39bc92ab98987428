use std::path::Path;
use std::time::Duration;

/// Format duration in human-readable format
pub fn format_duration(elapsed: Duration) -> String {
    let total_seconds = elapsed.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Truncate a message to at most `max_chars` characters, marking the cut
pub fn truncate_chars(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

/// Report which external tools cannot be run
pub async fn check_dependencies(ytdlp: &str, ffmpeg: &Path) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(Path::new(ytdlp), "--version").await {
        missing.push(format!("{} - required to download audio and read video metadata", ytdlp));
    }

    if !check_command_available(ffmpeg, "-version").await {
        missing.push(format!("{} - required to convert audio to mp3", ffmpeg.display()));
    }

    missing
}

/// Check if a command runs and exits successfully with `version_flag`
pub async fn check_command_available(command: &Path, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
