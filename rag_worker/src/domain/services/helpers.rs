use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(?P<sentence>[^.!?]*(?:[.!?]|$))").expect("Invalid sentence regex")
});

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("Invalid word regex"));

/// Simple sentences splitter.
///
/// Simple regex:
/// - groups sentences finishing by .?! or if reaching the end of the content.
/// - removes sentences with less than 2 characters (ex: a `!` from several `!!!`)
pub fn split_sentences(content: &str) -> Vec<String> {
    sentence_spans(content)
        .into_iter()
        .map(|(start, end)| content[start..end].to_string())
        .collect()
}

/// Byte ranges of the sentences found by `split_sentences`
pub fn sentence_spans(content: &str) -> Vec<(usize, usize)> {
    SENTENCE_RE
        .captures_iter(content)
        .filter_map(|cap| cap.name("sentence"))
        .filter(|sentence| sentence.as_str().len() > 1)
        .map(|sentence| (sentence.start(), sentence.end()))
        .collect()
}

/// Lowercased words of a text
pub fn tokenize(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(text)
        .map(|word| word.as_str().to_lowercase())
        .collect()
}

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "more", "my", "no",
    "not", "of", "on", "or", "our", "she", "so", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "to", "was", "we", "were", "what", "when", "where",
    "which", "who", "will", "with", "would", "you", "your",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// 64 bits FNV-1a hash, stable across processes and platforms
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

/// Hex fingerprint of a source file content
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:016x}", fnv1a_64(bytes))
}

/// Number of chars before a byte offset
pub fn char_offset(content: &str, byte_offset: usize) -> usize {
    content[..byte_offset].chars().count()
}
