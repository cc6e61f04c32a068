use chrono::NaiveDate;
use regex::Regex;

pub const TITLE: &str = "📊 Crypto Market Update";
pub const HASHTAGS: &str = "#CryptoNews #MarketOverview";
pub const BULLET: &str = "•";
pub const MAX_BULLETS: usize = 6;
/// Counted on the escaped text, so entities such as `&amp;` use their full width.
pub const MAX_BULLET_CHARS: usize = 160;
/// Telegram caption cap. Plain text messages allow 4096, so anything that
/// fits a caption also fits a text message.
pub const MAX_CAPTION_CHARS: usize = 1024;
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Short words that end in a period without ending a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "vs", "st", "jr", "sr", "inc", "ltd", "co", "corp",
];

pub struct BriefingFormatter;

impl BriefingFormatter {
    /// Render a raw summary as a Telegram HTML post for `date`.
    ///
    /// Pure: the same summary and date always give the same text.
    pub fn format(raw_summary: &str, date: NaiveDate) -> String {
        let cleaned = clean_summary(raw_summary);

        let mut bullets: Vec<String> = Self::split_sentences(&cleaned)
            .into_iter()
            .take(MAX_BULLETS)
            .map(|s| truncate_escaped(&escape_html(&s), MAX_BULLET_CHARS))
            .collect();

        let mut message = Self::assemble(&bullets, date);
        while message.chars().count() > MAX_CAPTION_CHARS && bullets.len() > 1 {
            bullets.pop();
            message = Self::assemble(&bullets, date);
        }

        message
    }

    /// "Month DD, YYYY", e.g. "November 08, 2025"
    pub fn format_date(date: NaiveDate) -> String {
        date.format("%B %d, %Y").to_string()
    }

    fn assemble(bullets: &[String], date: NaiveDate) -> String {
        let mut out = String::new();

        out.push_str(&format!("<b>{}</b>\n", TITLE));
        out.push_str(&format!("<i>{}</i>\n\n", Self::format_date(date)));

        if !bullets.is_empty() {
            for bullet in bullets {
                out.push_str(&format!("{} {}\n", BULLET, bullet));
            }
            out.push('\n');
        }

        out.push_str(HASHTAGS);
        out
    }

    /// Split after `.`, `!` or `?` (plus any closing quotes/brackets) when
    /// followed by whitespace, unless the period ends an abbreviation.
    fn split_sentences(text: &str) -> Vec<String> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < chars.len() {
            let (_, c) = chars[i];
            if !matches!(c, '.' | '!' | '?') {
                i += 1;
                continue;
            }

            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j].1, '"' | '\'' | ')' | '”' | '’' | ']') {
                j += 1;
            }

            let at_boundary = chars.get(j).map(|(_, n)| n.is_whitespace()).unwrap_or(false);
            if !at_boundary {
                i = j;
                continue;
            }

            let end = chars[j].0;
            let candidate = &text[start..end];
            let next_is_lowercase = text[end..]
                .trim_start()
                .chars()
                .next()
                .map(char::is_lowercase)
                .unwrap_or(false);
            if c == '.' && Self::ends_with_abbreviation(candidate, next_is_lowercase) {
                i = j;
                continue;
            }

            let sentence = candidate.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = end;
            i = j;
        }

        let rest = text[start..].trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }

        sentences
    }

    /// `next_is_lowercase` tells whether the text after the period starts
    /// with a lowercase letter.
    fn ends_with_abbreviation(candidate: &str, next_is_lowercase: bool) -> bool {
        let word = match candidate.split_whitespace().last() {
            Some(w) => w.trim_end_matches('.'),
            None => return false,
        };

        let is_initials = !word.is_empty()
            && word
                .split('.')
                .all(|part| part.chars().count() == 1 && part.chars().all(char::is_alphabetic));

        // "U.S." always; a lone "J." only when the sentence plainly goes on,
        // so "Plan B. Ether rises." still splits
        if is_initials && (word.contains('.') || next_is_lowercase) {
            return true;
        }

        ABBREVIATIONS.contains(&word.to_lowercase().as_str())
    }
}

/// Strip citation markers and trailing hashtags, collapse whitespace.
pub fn clean_summary(text: &str) -> String {
    let citations = Regex::new(r"\s*\[\d+(?:\s*,\s*\d+)*\]").expect("valid regex");
    let trailing_tags = Regex::new(r"(?:\s*#\w+)+\s*$").expect("valid regex");
    let whitespace = Regex::new(r"\s+").expect("valid regex");

    let text = citations.replace_all(text, "");
    let text = trailing_tags.replace(&text, "");
    whitespace.replace_all(&text, " ").trim().to_string()
}

/// Cut to at most `max_chars` characters on a word boundary, ending in `…`.
pub fn truncate_on_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    let head = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    let head = head.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-'));

    format!("{}…", head)
}

/// Like [`truncate_on_word`] for text that is already HTML-escaped: a cut
/// never leaves half of an `&…;` entity behind.
pub fn truncate_escaped(escaped: &str, max_chars: usize) -> String {
    let cut = truncate_on_word(escaped, max_chars);
    let Some(head) = cut.strip_suffix('…') else {
        return cut;
    };

    match head.rfind('&') {
        Some(amp) if !head[amp..].contains(';') => format!("{}…", head[..amp].trim_end()),
        _ => cut,
    }
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
