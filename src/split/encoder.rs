use super::TrackCorpus;
use crate::models::Track;

/// Render the corpus as one `{index: name, artist1, artist2}` record per line.
///
/// Output depends only on the corpus, so the same playlist always produces
/// the same prompt.
pub fn encode(corpus: &TrackCorpus) -> String {
    corpus
        .iter()
        .map(|(index, track)| encode_track(index, track))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn encode_track(index: usize, track: &Track) -> String {
    let fields: Vec<String> = std::iter::once(&track.name)
        .chain(track.artists.iter())
        .map(|field| escape(field))
        .collect();
    format!("{{{}: {}}}", index, fields.join(", "))
}

/// Backslash-escape the record separators and flatten control characters.
fn escape(field: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for c in field.trim().chars() {
        match c {
            '\\' | ',' | '{' | '}' => {
                escaped.push('\\');
                escaped.push(c);
            }
            c if c.is_control() => escaped.push(' '),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> TrackCorpus {
        TrackCorpus::new(vec![
            Track::new("aaaaaa", "Blue in Green", &["Miles Davis", "Bill Evans"]),
            Track::new("bbbbbb", "Solo", &[]),
            Track::new("cccccc", "Hello, {World}", &["A\\B"]),
        ])
    }

    #[test]
    fn test_one_record_per_track() {
        let text = encode(&corpus());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "{0: Blue in Green, Miles Davis, Bill Evans}");
        assert_eq!(lines[1], "{1: Solo}");
    }

    #[test]
    fn test_separators_are_escaped() {
        let text = encode(&corpus());
        assert_eq!(
            text.lines().nth(2).unwrap(),
            r"{2: Hello\, \{World\}, A\\B}"
        );
    }

    #[test]
    fn test_newlines_cannot_split_a_record() {
        let corpus = TrackCorpus::new(vec![Track::new("dddddd", "Line\nBreak\tTab", &["X"])]);
        assert_eq!(encode(&corpus), "{0: Line Break Tab, X}");
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let corpus = corpus();
        assert_eq!(encode(&corpus).as_bytes(), encode(&corpus.clone()).as_bytes());
    }

    #[test]
    fn test_empty_corpus() {
        assert_eq!(encode(&TrackCorpus::default()), "");
    }
}
