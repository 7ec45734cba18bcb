//! Greedy word wrap over codepoint sequences.
//!
//! This is the layout engine for the message pane: a pure function from a
//! codepoint sequence and a column width to a list of wrapped lines. The
//! break rules, in priority order while scanning left to right:
//!
//! 1. an explicit `'\n'` always ends the current line;
//! 2. a space ends the line when the line plus the next word would reach or
//!    exceed the width (the break happens *before* the word that would
//!    overflow, and the space itself is consumed);
//! 3. a line that has reached the width with no break opportunity is
//!    force-broken at exactly the width, without consuming the next input
//!    character;
//! 4. anything else is appended.
//!
//! The final (possibly empty) line is always emitted.

/// Length of the whitespace-delimited word starting at `start`.
fn word_len(input: &[char], start: usize) -> usize {
    input[start..]
        .iter()
        .take_while(|&&ch| ch != ' ' && ch != '\n')
        .count()
}

/// Wrap `input` to lines of at most `width` codepoints.
pub fn wrap(input: &[char], width: usize) -> Vec<Vec<char>> {
    // Callers guarantee width >= 1; clamping keeps the scan finite anyway.
    let width = width.max(1);

    let mut lines = Vec::new();
    let mut line: Vec<char> = Vec::new();
    let mut i = 0;
    while i < input.len() {
        let ch = input[i];
        if ch == '\n' {
            lines.push(std::mem::take(&mut line));
            i += 1;
        } else if ch == ' ' {
            // break nicely on spaces
            if line.len() + word_len(input, i + 1) >= width {
                lines.push(std::mem::take(&mut line));
            } else {
                line.push(ch);
            }
            i += 1;
        } else if line.len() >= width {
            // forcibly break overly long words; don't consume the character
            lines.push(std::mem::take(&mut line));
        } else {
            line.push(ch);
            i += 1;
        }
    }
    lines.push(line);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn lines(s: &str, width: usize) -> Vec<String> {
        wrap(&chars(s), width)
            .into_iter()
            .map(|line| line.into_iter().collect())
            .collect()
    }

    // -- canonical examples ------------------------------------------------

    #[test]
    fn force_breaks_a_word_longer_than_the_width() {
        assert_eq!(lines("hello", 3), vec!["hel", "lo"]);
    }

    #[test]
    fn breaks_before_the_word_that_would_overflow() {
        assert_eq!(lines("hi there", 4), vec!["hi", "ther", "e"]);
    }

    // -- break rules -------------------------------------------------------

    #[test]
    fn explicit_newline_always_ends_the_line() {
        assert_eq!(lines("a\nb", 10), vec!["a", "b"]);
        assert_eq!(lines("a\n\nb", 10), vec!["a", "", "b"]);
    }

    #[test]
    fn trailing_newline_emits_a_final_empty_line() {
        assert_eq!(lines("ab\n", 10), vec!["ab", ""]);
    }

    #[test]
    fn short_text_is_a_single_line() {
        assert_eq!(lines("hi there", 20), vec!["hi there"]);
    }

    #[test]
    fn empty_input_is_one_empty_line() {
        assert_eq!(lines("", 5), vec![""]);
    }

    #[test]
    fn space_that_fits_is_kept_inside_the_line() {
        // "ab cd" at width 6: the word "cd" fits after the space
        assert_eq!(lines("ab cd", 6), vec!["ab cd"]);
    }

    #[test]
    fn break_at_space_consumes_the_space() {
        // width 5: "hello" + " " + "world"; the break happens at the space,
        // which appears in neither line
        assert_eq!(lines("hello world", 5), vec!["hello", "world"]);
    }

    #[test]
    fn multibyte_codepoints_count_as_one_cell() {
        assert_eq!(lines("héllo wörld", 5), vec!["héllo", "wörld"]);
    }

    #[test]
    fn width_one_degenerates_to_one_codepoint_per_line() {
        assert_eq!(lines("abc", 1), vec!["a", "b", "c"]);
    }

    // -- properties --------------------------------------------------------

    #[test]
    fn no_line_ever_exceeds_the_width() {
        let samples = [
            "the quick brown fox jumps over the lazy dog",
            "antidisestablishmentarianism",
            "a  b   c    d",
            "x\ny zzzzzzzzzzzzzzz w",
            "",
        ];
        for sample in samples {
            for width in 1..12 {
                for line in wrap(&chars(sample), width) {
                    assert!(
                        line.len() <= width,
                        "wrap({sample:?}, {width}) produced over-long line {line:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn non_break_codepoints_survive_in_order() {
        // Breaks only ever consume spaces and newlines; everything else must
        // come back out, in order, regardless of width.
        let strip = |s: &str| s.chars().filter(|c| *c != ' ' && *c != '\n').collect::<String>();
        let sample = "one two\nthree four five";
        for width in 1..10 {
            let rejoined: String = wrap(&chars(sample), width)
                .into_iter()
                .map(|line| line.into_iter().collect::<String>())
                .collect();
            assert_eq!(strip(&rejoined), strip(sample));
        }
    }

    #[test]
    fn restartable_identical_calls_agree() {
        let input = chars("pure function, no shared state");
        assert_eq!(wrap(&input, 7), wrap(&input, 7));
    }
}
