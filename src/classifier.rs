//! Incremental markdown classifier for streamed model output.
//!
//! Text arrives in fragments of any size, and a marker such as `## ` or a
//! code fence can be split across two of them. The classifier keeps all of
//! its state in [`RenderState`], so feeding a text in one piece or in any
//! number of pieces produces the same sequence of [`Unit`]s.

/// One classified event emitted by the classifier, consumed in order by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    /// A heading was confirmed; the `#` run and the space are not content
    BeginHeading(usize),
    HeadingChar(char),
    EndHeading,
    /// An ordered-list marker was confirmed, e.g. `"12."`
    BeginOrderedItem(String),
    OrderedChar(char),
    BeginUnorderedItem,
    UnorderedChar(char),
    BeginCodeFence,
    CodeChar(char),
    EndCodeFence,
    PlainChar(char),
    LineBreak,
}

impl Unit {
    /// The source text this unit stands for
    pub fn source_text(&self) -> String {
        match self {
            Unit::BeginHeading(level) => format!("{} ", "#".repeat(*level)),
            Unit::BeginOrderedItem(marker) => format!("{} ", marker),
            Unit::BeginUnorderedItem => "* ".to_string(),
            Unit::BeginCodeFence | Unit::EndCodeFence => "```".to_string(),
            Unit::EndHeading => String::new(),
            Unit::LineBreak => "\n".to_string(),
            Unit::HeadingChar(c)
            | Unit::OrderedChar(c)
            | Unit::UnorderedChar(c)
            | Unit::CodeChar(c)
            | Unit::PlainChar(c) => c.to_string(),
        }
    }
}

/// Where the classifier stands on the current logical line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineState {
    /// Nothing has been emitted on this line yet
    Start,
    /// A run of `#` is held waiting for a space
    HashRun(usize),
    /// Leading digits are held waiting for a `.`
    Digits(String),
    /// Leading digits and a `.` are held waiting for a space
    DigitsDot(String),
    /// A leading `*` is held waiting for a space
    Star,
    Heading,
    OrderedItem,
    UnorderedItem,
    /// Ordinary text for the rest of the line
    Text,
}

impl LineState {
    /// Characters held speculatively by this state
    fn pending(&self) -> String {
        match self {
            LineState::HashRun(n) => "#".repeat(*n),
            LineState::Digits(digits) | LineState::DigitsDot(digits) => digits.clone(),
            LineState::Star => "*".to_string(),
            _ => String::new(),
        }
    }

    fn is_pending(&self) -> bool {
        matches!(
            self,
            LineState::HashRun(_) | LineState::Digits(_) | LineState::DigitsDot(_) | LineState::Star
        )
    }

    /// Unit used for ordinary content in this state
    fn content(&self, c: char) -> Unit {
        match self {
            LineState::Heading => Unit::HeadingChar(c),
            LineState::OrderedItem => Unit::OrderedChar(c),
            LineState::UnorderedItem => Unit::UnorderedChar(c),
            _ => Unit::PlainChar(c),
        }
    }
}

/// Outcome of feeding one character to the line detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Keep holding; nothing is emitted yet
    Hold(LineState),
    /// A construct was confirmed
    Confirm(LineState, Unit),
    /// The held characters were not a marker; re-emit them as plain text
    /// followed by the character itself
    Reject { held: String, next: LineState },
    /// Emit the character as content of the given state
    Emit(LineState, Unit),
}

/// Pure transition table for line-level detection outside code blocks.
///
/// Backticks and line breaks never reach this function; they are handled by
/// the fence and line logic in [`Classifier`].
pub fn transition(state: &LineState, c: char) -> Transition {
    match state {
        LineState::Start => match c {
            '#' => Transition::Hold(LineState::HashRun(1)),
            '*' => Transition::Hold(LineState::Star),
            d if d.is_ascii_digit() => Transition::Hold(LineState::Digits(d.to_string())),
            _ => Transition::Emit(LineState::Text, Unit::PlainChar(c)),
        },
        LineState::HashRun(n) => match c {
            '#' => Transition::Hold(LineState::HashRun(n + 1)),
            ' ' => Transition::Confirm(LineState::Heading, Unit::BeginHeading(*n)),
            _ => Transition::Reject {
                held: state.pending(),
                next: LineState::Text,
            },
        },
        LineState::Digits(digits) => match c {
            d if d.is_ascii_digit() => {
                let mut digits = digits.clone();
                digits.push(d);
                Transition::Hold(LineState::Digits(digits))
            }
            '.' => Transition::Hold(LineState::DigitsDot(format!("{}.", digits))),
            _ => Transition::Reject {
                held: state.pending(),
                next: LineState::Text,
            },
        },
        LineState::DigitsDot(marker) => match c {
            ' ' => Transition::Confirm(
                LineState::OrderedItem,
                Unit::BeginOrderedItem(marker.clone()),
            ),
            _ => Transition::Reject {
                held: state.pending(),
                next: LineState::Text,
            },
        },
        LineState::Star => match c {
            ' ' => Transition::Confirm(LineState::UnorderedItem, Unit::BeginUnorderedItem),
            _ => Transition::Reject {
                held: state.pending(),
                next: LineState::Text,
            },
        },
        LineState::Heading | LineState::OrderedItem | LineState::UnorderedItem | LineState::Text => {
            Transition::Emit(state.clone(), state.content(c))
        }
    }
}

/// State carried across fragment boundaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderState {
    pub line: LineState,
    /// Backticks seen in a row and not yet resolved
    pub fence_run: usize,
    pub in_code_block: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            line: LineState::Start,
            fence_run: 0,
            in_code_block: false,
        }
    }
}

/// Character-level state machine turning fragments into [`Unit`]s
#[derive(Debug, Default)]
pub struct Classifier {
    state: RenderState,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Classify one fragment. Held characters stay in the state until a
    /// later fragment resolves them or [`Classifier::flush`] is called.
    pub fn feed(&mut self, fragment: &str) -> Vec<Unit> {
        let mut out = Vec::with_capacity(fragment.len());
        for c in fragment.chars() {
            self.step(c, &mut out);
        }
        out
    }

    /// Drain anything still held at end of stream and reset to a fresh line
    pub fn flush(&mut self) -> Vec<Unit> {
        let mut out = Vec::new();
        self.release_fence_run(&mut out);
        self.release_pending(&mut out);
        if self.state.line == LineState::Heading {
            out.push(Unit::EndHeading);
        }
        self.state = RenderState::default();
        out
    }

    fn step(&mut self, c: char, out: &mut Vec<Unit>) {
        if c == '`' {
            if !self.state.in_code_block {
                self.release_pending(out);
            }
            self.state.fence_run += 1;
            if self.state.fence_run == 3 {
                self.state.fence_run = 0;
                self.toggle_fence(out);
            }
            return;
        }

        self.release_fence_run(out);

        if c == '\n' {
            self.release_pending(out);
            if self.state.line == LineState::Heading {
                out.push(Unit::EndHeading);
            }
            out.push(Unit::LineBreak);
            self.state.line = LineState::Start;
            return;
        }

        if self.state.in_code_block {
            out.push(Unit::CodeChar(c));
            return;
        }

        match transition(&self.state.line, c) {
            Transition::Hold(next) => self.state.line = next,
            Transition::Confirm(next, unit) | Transition::Emit(next, unit) => {
                out.push(unit);
                self.state.line = next;
            }
            Transition::Reject { held, next } => {
                out.extend(held.chars().map(Unit::PlainChar));
                out.push(next.content(c));
                self.state.line = next;
            }
        }
    }

    fn toggle_fence(&mut self, out: &mut Vec<Unit>) {
        if self.state.in_code_block {
            out.push(Unit::EndCodeFence);
            self.state.in_code_block = false;
        } else {
            if self.state.line == LineState::Heading {
                out.push(Unit::EndHeading);
            }
            out.push(Unit::BeginCodeFence);
            self.state.in_code_block = true;
        }
        self.state.line = LineState::Text;
    }

    /// Emit a short backtick run as code inside a code block, plain text elsewhere
    fn release_fence_run(&mut self, out: &mut Vec<Unit>) {
        if self.state.fence_run == 0 {
            return;
        }
        let run = std::mem::take(&mut self.state.fence_run);
        if self.state.in_code_block {
            out.extend(std::iter::repeat(Unit::CodeChar('`')).take(run));
            return;
        }
        if self.state.line == LineState::Start {
            self.state.line = LineState::Text;
        }
        // the line keeps its construct; only the backticks themselves are plain
        out.extend(std::iter::repeat(Unit::PlainChar('`')).take(run));
    }

    /// Give up on a held marker and emit it verbatim as plain text
    fn release_pending(&mut self, out: &mut Vec<Unit>) {
        if self.state.line.is_pending() {
            out.extend(self.state.line.pending().chars().map(Unit::PlainChar));
            self.state.line = LineState::Text;
        }
    }
}

/// Classify a complete text in one go
pub fn classify_all(text: &str) -> Vec<Unit> {
    let mut classifier = Classifier::new();
    let mut units = classifier.feed(text);
    units.extend(classifier.flush());
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(fragments: &[&str]) -> Vec<Unit> {
        let mut classifier = Classifier::new();
        let mut units = Vec::new();
        for fragment in fragments {
            units.extend(classifier.feed(fragment));
        }
        units.extend(classifier.flush());
        units
    }

    fn plain(text: &str) -> Vec<Unit> {
        text.chars().map(Unit::PlainChar).collect()
    }

    const SAMPLE: &str = "# 一级标题\n普通文本 with `inline` code\n\n0. 没有\n1. 第一项\n12x\n* 无序\n** bold\n## 二级\n```code\ncurl -o <file,string> <url,url>\n\n```\n### 三级\n``x\n#no\n";

    #[test]
    fn test_heading_marker_is_consumed() {
        let units = feed_all(&["## Title\n"]);
        let mut expected = vec![Unit::BeginHeading(2)];
        expected.extend("Title".chars().map(Unit::HeadingChar));
        expected.push(Unit::EndHeading);
        expected.push(Unit::LineBreak);
        assert_eq!(units, expected);
    }

    #[test]
    fn test_hash_without_space_is_plain() {
        assert_eq!(feed_all(&["#", "tag"]), plain("#tag"));
    }

    #[test]
    fn test_ordered_marker() {
        let units = feed_all(&["1", ".", " ", "ab"]);
        assert_eq!(
            units,
            vec![
                Unit::BeginOrderedItem("1.".to_string()),
                Unit::OrderedChar('a'),
                Unit::OrderedChar('b'),
            ]
        );
    }

    #[test]
    fn test_digits_then_letter_flush_as_plain() {
        assert_eq!(feed_all(&["12", "x"]), plain("12x"));
    }

    #[test]
    fn test_digits_dot_without_space_flush_as_plain() {
        assert_eq!(feed_all(&["3.", "14"]), plain("3.14"));
    }

    #[test]
    fn test_unordered_marker() {
        let units = feed_all(&["*", " ", "x\n"]);
        assert_eq!(
            units,
            vec![Unit::BeginUnorderedItem, Unit::UnorderedChar('x'), Unit::LineBreak]
        );
    }

    #[test]
    fn test_double_star_is_plain() {
        assert_eq!(feed_all(&["**b"]), plain("**b"));
    }

    #[test]
    fn test_markers_only_at_line_start() {
        assert_eq!(feed_all(&["a # b"]), plain("a # b"));
        assert_eq!(feed_all(&["a 1. b"]), plain("a 1. b"));
    }

    #[test]
    fn test_fence_split_across_fragments_toggles_once() {
        let units = feed_all(&["``", "`\n", "ls\n", "```"]);
        assert_eq!(
            units,
            vec![
                Unit::BeginCodeFence,
                Unit::LineBreak,
                Unit::CodeChar('l'),
                Unit::CodeChar('s'),
                Unit::LineBreak,
                Unit::EndCodeFence,
            ]
        );
    }

    #[test]
    fn test_fence_state_persists_between_fragments() {
        let mut classifier = Classifier::new();
        classifier.feed("``");
        assert!(!classifier.state().in_code_block);
        assert_eq!(classifier.state().fence_run, 2);
        classifier.feed("`\n");
        assert!(classifier.state().in_code_block);
        assert_eq!(classifier.state().fence_run, 0);
    }

    #[test]
    fn test_code_block_suppresses_detection() {
        let units = feed_all(&["```\n# not heading\n1. no\n```"]);
        assert!(!units.iter().any(|u| matches!(u, Unit::BeginHeading(_))));
        assert!(!units.iter().any(|u| matches!(u, Unit::BeginOrderedItem(_))));
        assert!(units.contains(&Unit::CodeChar('#')));
    }

    #[test]
    fn test_short_backtick_run_in_code_is_code() {
        let units = feed_all(&["```\na``b\n```"]);
        assert!(units.contains(&Unit::CodeChar('`')));
        assert_eq!(units.iter().filter(|u| **u == Unit::BeginCodeFence).count(), 1);
        assert_eq!(units.iter().filter(|u| **u == Unit::EndCodeFence).count(), 1);
    }

    #[test]
    fn test_short_backtick_run_outside_code_is_plain() {
        let units = feed_all(&["# a `b`\n"]);
        assert_eq!(
            units,
            vec![
                Unit::BeginHeading(1),
                Unit::HeadingChar('a'),
                Unit::HeadingChar(' '),
                Unit::PlainChar('`'),
                Unit::HeadingChar('b'),
                Unit::PlainChar('`'),
                Unit::EndHeading,
                Unit::LineBreak,
            ]
        );

        let units = feed_all(&["* x`", "`y\n"]);
        assert!(units.contains(&Unit::BeginUnorderedItem));
        assert_eq!(units.iter().filter(|u| **u == Unit::PlainChar('`')).count(), 2);
        assert!(units.contains(&Unit::UnorderedChar('y')));
    }

    #[test]
    fn test_fence_in_heading_ends_heading() {
        let units = feed_all(&["# x```y"]);
        assert_eq!(
            units,
            vec![
                Unit::BeginHeading(1),
                Unit::HeadingChar('x'),
                Unit::EndHeading,
                Unit::BeginCodeFence,
                Unit::CodeChar('y'),
            ]
        );
    }

    #[test]
    fn test_backtick_disqualifies_pending_marker() {
        let units = feed_all(&["#`x"]);
        assert_eq!(units, plain("#`x"));
    }

    #[test]
    fn test_line_break_ends_list_but_not_code() {
        let mut classifier = Classifier::new();
        classifier.feed("* a\n");
        assert_eq!(classifier.state().line, LineState::Start);
        classifier.feed("```\nx\n");
        assert!(classifier.state().in_code_block);
    }

    #[test]
    fn test_flush_releases_pending_marker() {
        let mut classifier = Classifier::new();
        assert!(classifier.feed("##").is_empty());
        assert_eq!(classifier.flush(), plain("##"));
        assert_eq!(classifier.state(), &RenderState::default());
    }

    #[test]
    fn test_flush_closes_heading() {
        let units = feed_all(&["# a"]);
        assert_eq!(units.last(), Some(&Unit::EndHeading));
    }

    #[test]
    fn test_flush_releases_backticks() {
        assert_eq!(feed_all(&["``"]), plain("``"));
    }

    #[test]
    fn test_multibyte_characters_preserved() {
        let units = feed_all(&["你", "好"]);
        assert_eq!(units, plain("你好"));
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(transition(&LineState::Start, '#'), Transition::Hold(LineState::HashRun(1)));
        assert_eq!(
            transition(&LineState::HashRun(2), ' '),
            Transition::Confirm(LineState::Heading, Unit::BeginHeading(2))
        );
        assert_eq!(
            transition(&LineState::HashRun(2), 'x'),
            Transition::Reject {
                held: "##".to_string(),
                next: LineState::Text
            }
        );
        assert_eq!(
            transition(&LineState::Digits("4".to_string()), '.'),
            Transition::Hold(LineState::DigitsDot("4.".to_string()))
        );
        assert_eq!(
            transition(&LineState::DigitsDot("4.".to_string()), ' '),
            Transition::Confirm(LineState::OrderedItem, Unit::BeginOrderedItem("4.".to_string()))
        );
        assert_eq!(
            transition(&LineState::Star, ' '),
            Transition::Confirm(LineState::UnorderedItem, Unit::BeginUnorderedItem)
        );
        assert_eq!(
            transition(&LineState::Star, '*'),
            Transition::Reject {
                held: "*".to_string(),
                next: LineState::Text
            }
        );
        assert_eq!(
            transition(&LineState::Start, 'a'),
            Transition::Emit(LineState::Text, Unit::PlainChar('a'))
        );
        assert_eq!(
            transition(&LineState::OrderedItem, 'a'),
            Transition::Emit(LineState::OrderedItem, Unit::OrderedChar('a'))
        );
    }

    #[test]
    fn test_fragmentation_invariance_every_split() {
        let whole = classify_all(SAMPLE);
        let chars: Vec<char> = SAMPLE.chars().collect();
        for split in 0..=chars.len() {
            let head: String = chars[..split].iter().collect();
            let tail: String = chars[split..].iter().collect();
            assert_eq!(feed_all(&[&head, &tail]), whole, "split at char {}", split);
        }
    }

    #[test]
    fn test_fragmentation_invariance_single_chars() {
        let whole = classify_all(SAMPLE);
        let pieces: Vec<String> = SAMPLE.chars().map(|c| c.to_string()).collect();
        let refs: Vec<&str> = pieces.iter().map(|s| s.as_str()).collect();
        assert_eq!(feed_all(&refs), whole);
    }

    #[test]
    fn test_source_text_reconstructs_input() {
        let text: String = classify_all(SAMPLE).iter().map(|u| u.source_text()).collect();
        assert_eq!(text, SAMPLE);
    }
}
