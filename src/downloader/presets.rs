// Per-format yt-dlp argument templates
//
// The selector strings encode layered fallbacks: each slash-separated
// alternative is tried by yt-dlp in order, so a missing exact quality
// degrades to the closest available stream instead of failing.

use super::models::Format;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn selector(format: Format) -> &'static str {
    match format {
        Format::Hd | Format::Mp4 => "best[height>=720][ext=mp4]/best[ext=mp4]/best",
        Format::P1080 => "best[height>=1080][ext=mp4]/best[height=1080]/best[ext=mp4]/best",
        Format::P720 => {
            "best[height>=720][height<=720][ext=mp4]/best[height=720]/best[ext=mp4]/best"
        }
        Format::Mp3 => "bestaudio/best",
    }
}

/// Build the full argument vector for one download invocation.
/// `output_template` is the store-reserved `<dir>/<ts>_<id>.%(ext)s`
/// path; the tool substitutes the real extension.
pub fn build_args(format: Format, output_template: &str, url: &str) -> Vec<String> {
    let mut args = vec!["-f".to_string(), selector(format).to_string()];

    if format.is_audio() {
        args.extend([
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            "0".to_string(),
        ]);
    } else {
        args.extend(["--merge-output-format".to_string(), "mp4".to_string()]);
    }

    // Randomized inter-request delay reduces rate-limiting
    args.extend([
        "--sleep-interval".to_string(),
        "1".to_string(),
        "--max-sleep-interval".to_string(),
        "3".to_string(),
    ]);

    // Shared resilience/anti-bot options: realistic browser headers,
    // geo bypass, bounded retries, socket timeout
    args.extend([
        "--no-playlist".to_string(),
        "--geo-bypass".to_string(),
        "--no-check-certificate".to_string(),
        "--user-agent".to_string(),
        USER_AGENT.to_string(),
        "--add-header".to_string(),
        "Accept:text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        "--add-header".to_string(),
        "Accept-Language:en-us,en;q=0.5".to_string(),
        "--add-header".to_string(),
        "Sec-Fetch-Mode:navigate".to_string(),
        "--extractor-retries".to_string(),
        "5".to_string(),
        "--fragment-retries".to_string(),
        "5".to_string(),
        "--socket-timeout".to_string(),
        "30".to_string(),
    ]);

    args.extend(["-o".to_string(), output_template.to_string()]);
    args.push(url.to_string());
    args
}
