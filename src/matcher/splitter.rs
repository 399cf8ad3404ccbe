use std::collections::VecDeque;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_OVERLAP: usize = 50;

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Cuts text on the coarsest separator present (paragraph, line, sentence,
/// word, then single chars) and packs the pieces into chunks of at most
/// `chunk_size` chars, carrying up to `overlap` chars into the next chunk.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be > 0");
        assert!(overlap < chunk_size, "overlap must be smaller than chunk_size");
        Self {
            chunk_size,
            overlap,
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Coarsest separator that occurs; "" always matches.
        let (pos, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(**s))
            .map(|(i, s)| (i, *s))
            .unwrap_or((separators.len().saturating_sub(1), ""));
        let finer = if separator.is_empty() {
            &[][..]
        } else {
            &separators[pos + 1..]
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&std::mem::take(&mut pending)));
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Pack pieces into chunks, keeping an `overlap`-sized tail between them.
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut out, &window);
                while total > self.overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_trimmed(&mut out, &window);
        out
    }
}

fn push_trimmed(out: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Split on `separator`, attaching it to the start of the following piece.
/// An empty separator yields single characters. Empty pieces are dropped.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut out: Vec<String> = parts.next().map(String::from).into_iter().collect();
    out.extend(parts.map(|p| format!("{}{}", separator, p)));
    out.retain(|p| !p.is_empty());
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = TextSplitter::default().split("Acme Widget\n\nDescription: Contains lead paint");
        assert_eq!(chunks, vec!["Acme Widget\n\nDescription: Contains lead paint"]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(TextSplitter::default().split("").is_empty());
        assert!(TextSplitter::default().split("   \n\n  ").is_empty());
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let a = "a".repeat(300);
        let b = "b".repeat(300);
        let chunks = TextSplitter::default().split(&format!("{}\n\n{}", a, b));
        assert_eq!(chunks, vec![a, b]);
    }

    #[test]
    fn words_are_packed_with_overlap() {
        let text = (0..30).map(|i| format!("w{:02}", i)).collect::<Vec<_>>().join(" ");
        let chunks = TextSplitter::new(40, 10).split(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        // Each chunk after the first repeats the tail of the previous one.
        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            assert!(pair[0].ends_with(first_word) || pair[0].contains(&format!("{} ", first_word)));
        }
        assert!(chunks[1].starts_with("w08 w09"));
        assert!(chunks.last().unwrap().ends_with("w29"));
    }

    #[test]
    fn unbroken_text_is_hard_cut() {
        let text = "x".repeat(1200);
        let chunks = TextSplitter::default().split(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 500);
        assert_eq!(chunks[1].len(), 500);
        assert_eq!(chunks[2].len(), 300);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(600);
        let chunks = TextSplitter::default().split(&text);
        assert_eq!(chunks[0].chars().count(), 500);
    }

    #[test]
    fn separator_attaches_to_following_piece() {
        assert_eq!(
            split_keeping_separator("a b  c", " "),
            vec!["a", " b", " ", " c"]
        );
    }
}
