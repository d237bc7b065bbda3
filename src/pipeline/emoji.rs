//! `:shortcode:` emoji replacement.
//!
//! Only text outside of tags is touched, and never inside `<code>`, `<pre>`,
//! `<script>` or `<style>`. Unknown shortcodes are left as written.

use crate::settings::EmojiType;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

const GITHUB_BASE: &str = "https://github.githubassets.com/images/icons/emoji/unicode";
const TWEMOJI_BASE: &str = "https://cdn.jsdelivr.net/gh/twitter/twemoji@14.0.2/assets/72x72";

static SHORTCODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([a-z0-9_+\-]+):").expect("valid regex"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static TABLE: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    [
        ("+1", 0x1f44d),
        ("-1", 0x1f44e),
        ("100", 0x1f4af),
        ("alarm_clock", 0x23f0),
        ("arrow_down", 0x2b07),
        ("arrow_left", 0x2b05),
        ("arrow_right", 0x27a1),
        ("arrow_up", 0x2b06),
        ("art", 0x1f3a8),
        ("blush", 0x1f60a),
        ("book", 0x1f4d6),
        ("books", 0x1f4da),
        ("boom", 0x1f4a5),
        ("bug", 0x1f41b),
        ("bulb", 0x1f4a1),
        ("calendar", 0x1f4c5),
        ("chart_with_upwards_trend", 0x1f4c8),
        ("clap", 0x1f44f),
        ("cloud", 0x2601),
        ("coffee", 0x2615),
        ("computer", 0x1f4bb),
        ("construction", 0x1f6a7),
        ("cry", 0x1f622),
        ("earth_americas", 0x1f30e),
        ("email", 0x1f4e7),
        ("exclamation", 0x2757),
        ("eyes", 0x1f440),
        ("fire", 0x1f525),
        ("gear", 0x2699),
        ("gift", 0x1f381),
        ("globe_with_meridians", 0x1f310),
        ("grin", 0x1f601),
        ("hammer", 0x1f528),
        ("heart", 0x2764),
        ("heart_eyes", 0x1f60d),
        ("heavy_check_mark", 0x2714),
        ("hourglass", 0x231b),
        ("information_source", 0x2139),
        ("joy", 0x1f602),
        ("laughing", 0x1f606),
        ("link", 0x1f517),
        ("lock", 0x1f512),
        ("mag", 0x1f50d),
        ("memo", 0x1f4dd),
        ("muscle", 0x1f4aa),
        ("no_entry", 0x26d4),
        ("ok_hand", 0x1f44c),
        ("package", 0x1f4e6),
        ("paperclip", 0x1f4ce),
        ("phone", 0x260e),
        ("pray", 0x1f64f),
        ("pushpin", 0x1f4cc),
        ("question", 0x2753),
        ("recycle", 0x267b),
        ("rocket", 0x1f680),
        ("rotating_light", 0x1f6a8),
        ("smile", 0x1f604),
        ("smiley", 0x1f603),
        ("snowflake", 0x2744),
        ("sparkles", 0x2728),
        ("star", 0x2b50),
        ("sunglasses", 0x1f60e),
        ("sunny", 0x2600),
        ("sweat_smile", 0x1f605),
        ("tada", 0x1f389),
        ("thinking", 0x1f914),
        ("thumbsdown", 0x1f44e),
        ("thumbsup", 0x1f44d),
        ("trophy", 0x1f3c6),
        ("umbrella", 0x2614),
        ("warning", 0x26a0),
        ("wave", 0x1f44b),
        ("white_check_mark", 0x2705),
        ("wink", 0x1f609),
        ("wrench", 0x1f527),
        ("x", 0x274c),
        ("zap", 0x26a1),
    ]
    .into_iter()
    .collect()
});

/// Replace known shortcodes in text nodes of `html`.
pub fn replace_emoji(html: &str, mode: EmojiType) -> String {
    if mode == EmojiType::None {
        return html.to_string();
    }

    let mut out = String::with_capacity(html.len());
    let mut raw_depth = 0usize;
    let mut last = 0;

    for tag in TAG_RE.find_iter(html) {
        let text = &html[last..tag.start()];
        if raw_depth == 0 {
            out.push_str(&replace_in_text(text, mode));
        } else {
            out.push_str(text);
        }
        out.push_str(tag.as_str());
        raw_depth = track_raw_depth(tag.as_str(), raw_depth);
        last = tag.end();
    }

    let tail = &html[last..];
    if raw_depth == 0 {
        out.push_str(&replace_in_text(tail, mode));
    } else {
        out.push_str(tail);
    }
    out
}

fn track_raw_depth(tag: &str, depth: usize) -> usize {
    let inner = tag.trim_start_matches('<');
    let (closing, inner) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };
    let name: String = inner
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if !matches!(name.as_str(), "code" | "pre" | "script" | "style") {
        return depth;
    }
    if closing {
        depth.saturating_sub(1)
    } else {
        depth + 1
    }
}

fn replace_in_text(text: &str, mode: EmojiType) -> String {
    SHORTCODE_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            match TABLE.get(name) {
                Some(&cp) => render(name, cp, mode),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn render(name: &str, codepoint: u32, mode: EmojiType) -> String {
    match mode {
        EmojiType::None => format!(":{name}:"),
        EmojiType::Native => char::from_u32(codepoint)
            .map(String::from)
            .unwrap_or_else(|| format!(":{name}:")),
        EmojiType::GitHub => image(name, &format!("{GITHUB_BASE}/{codepoint:04x}.png")),
        EmojiType::Twemoji => image(name, &format!("{TWEMOJI_BASE}/{codepoint:x}.png")),
    }
}

fn image(name: &str, src: &str) -> String {
    format!(
        r#"<img class="emoji" title=":{name}:" alt=":{name}:" src="{src}" height="20" width="20" align="absmiddle">"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_keeps_shortcodes() {
        let html = "<p><strong>:sparkles:</strong></p>";
        assert_eq!(replace_emoji(html, EmojiType::None), html);
    }

    #[test]
    fn github_inserts_image_inside_strong() {
        let out = replace_emoji("<p><strong>:sparkles:</strong></p>", EmojiType::GitHub);
        assert!(
            out.starts_with("<p><strong><img class=\"emoji\""),
            "{out}"
        );
        assert!(out.contains("/2728.png"), "{out}");
    }

    #[test]
    fn native_uses_unicode() {
        assert_eq!(replace_emoji("ship it :rocket:", EmojiType::Native), "ship it 🚀");
    }

    #[test]
    fn twemoji_url_uses_lowercase_hex() {
        let out = replace_emoji(":tada:", EmojiType::Twemoji);
        assert!(out.contains("72x72/1f389.png"), "{out}");
    }

    #[test]
    fn code_and_attributes_are_untouched() {
        let html = r#"<p title=":smile:">a <code>:smile:</code> <pre><code>:x:</code></pre> :smile:</p>"#;
        let out = replace_emoji(html, EmojiType::Native);
        assert!(out.contains(r#"title=":smile:""#), "{out}");
        assert!(out.contains("<code>:smile:</code>"), "{out}");
        assert!(out.contains("<code>:x:</code>"), "{out}");
        assert!(out.ends_with(" 😄</p>"), "{out}");
    }

    #[test]
    fn unknown_shortcodes_survive() {
        assert_eq!(
            replace_emoji("time 10:30:45 :not_an_emoji:", EmojiType::Native),
            "time 10:30:45 :not_an_emoji:"
        );
    }
}
