use crate::classifier::Unit;
use colored::{Color, ColoredString, Colorize};
use std::io::{self, Write};

/// Semantic category of a piece of rendered text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    HeadingText,
    OrderedMarker,
    OrderedText,
    UnorderedMarker,
    UnorderedText,
    CodeFence,
    CodeText,
    PlainText,
}

/// The five display styles a category can be drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStyle {
    Heading,
    OrderedMarker,
    UnorderedMarker,
    Code,
    Plain,
}

/// Which display style each category uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleMap {
    pub heading_text: DisplayStyle,
    pub ordered_marker: DisplayStyle,
    pub ordered_text: DisplayStyle,
    pub unordered_marker: DisplayStyle,
    pub unordered_text: DisplayStyle,
    pub code_fence: DisplayStyle,
    pub code_text: DisplayStyle,
    pub plain_text: DisplayStyle,
}

impl Default for StyleMap {
    fn default() -> Self {
        Self {
            heading_text: DisplayStyle::Heading,
            ordered_marker: DisplayStyle::OrderedMarker,
            ordered_text: DisplayStyle::Plain,
            unordered_marker: DisplayStyle::UnorderedMarker,
            unordered_text: DisplayStyle::Plain,
            code_fence: DisplayStyle::Code,
            code_text: DisplayStyle::Code,
            plain_text: DisplayStyle::Plain,
        }
    }
}

impl StyleMap {
    pub fn style_for(&self, category: Category) -> DisplayStyle {
        match category {
            Category::HeadingText => self.heading_text,
            Category::OrderedMarker => self.ordered_marker,
            Category::OrderedText => self.ordered_text,
            Category::UnorderedMarker => self.unordered_marker,
            Category::UnorderedText => self.unordered_text,
            Category::CodeFence => self.code_fence,
            Category::CodeText => self.code_text,
            Category::PlainText => self.plain_text,
        }
    }
}

/// Foreground color and weight applied to a run of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextStyle {
    pub color: Option<Color>,
    pub bold: bool,
}

impl TextStyle {
    pub fn color(color: Color) -> Self {
        Self {
            color: Some(color),
            bold: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    fn paint(&self, text: &str) -> ColoredString {
        let mut painted = match self.color {
            Some(color) => text.color(color),
            None => text.normal(),
        };
        if self.bold {
            painted = painted.bold();
        }
        painted
    }
}

/// Colors for each display style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub heading: TextStyle,
    pub ordered_marker: TextStyle,
    pub unordered_marker: TextStyle,
    pub code: TextStyle,
    pub plain: TextStyle,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            heading: TextStyle::color(Color::Red).bold(),
            ordered_marker: TextStyle::color(Color::Blue),
            unordered_marker: TextStyle::color(Color::Blue),
            code: TextStyle::color(Color::BrightBlack),
            plain: TextStyle::default(),
        }
    }
}

impl Palette {
    pub fn style(&self, display: DisplayStyle) -> TextStyle {
        match display {
            DisplayStyle::Heading => self.heading,
            DisplayStyle::OrderedMarker => self.ordered_marker,
            DisplayStyle::UnorderedMarker => self.unordered_marker,
            DisplayStyle::Code => self.code,
            DisplayStyle::Plain => self.plain,
        }
    }
}

/// Border glyphs and the header/footer captions framing a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header_glyph: String,
    pub line_glyph: String,
    pub heading_glyph: String,
    pub footer_glyph: String,
    pub header_text: String,
    pub footer_text: String,
    pub border: TextStyle,
    pub heading_border: TextStyle,
    pub caption: TextStyle,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            header_glyph: "╭──".to_string(),
            line_glyph: "│".to_string(),
            heading_glyph: "│──".to_string(),
            footer_glyph: "╰──".to_string(),
            header_text: "wen".to_string(),
            footer_text: "END".to_string(),
            border: TextStyle::color(Color::Cyan),
            heading_border: TextStyle::color(Color::Yellow),
            caption: TextStyle::color(Color::BrightWhite).bold(),
        }
    }
}

impl Frame {
    pub fn with_captions(mut self, header: impl Into<String>, footer: impl Into<String>) -> Self {
        self.header_text = header.into();
        self.footer_text = footer.into();
        self
    }
}

/// Complete visual configuration of the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub styles: StyleMap,
    pub palette: Palette,
    pub frame: Frame,
    /// When false, no escape sequences are written at all
    pub colors: bool,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            styles: StyleMap::default(),
            palette: Palette::default(),
            frame: Frame::default(),
            colors: true,
        }
    }
}

impl Theme {
    /// Same layout without any color
    pub fn monochrome() -> Self {
        Self {
            colors: false,
            ..Self::default()
        }
    }

    pub fn with_captions(mut self, header: impl Into<String>, footer: impl Into<String>) -> Self {
        self.frame = self.frame.with_captions(header, footer);
        self
    }

    fn text_style(&self, category: Category) -> TextStyle {
        self.palette.style(self.styles.style_for(category))
    }
}

/// Writes classified units to a terminal with borders and styling.
///
/// The renderer only projects units to text. Its own bookkeeping (whether the
/// header was written, whether the current line already has its border) is
/// never read by other components.
pub struct TerminalRenderer<W: Write> {
    out: W,
    theme: Theme,
    header_written: bool,
    line_open: bool,
    closed: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, theme: Theme) -> Self {
        Self {
            out,
            theme,
            header_written: false,
            line_open: false,
            closed: false,
        }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn on_unit(&mut self, unit: &Unit) -> io::Result<()> {
        match unit {
            Unit::LineBreak => return self.on_line_break(),
            Unit::EndHeading => return Ok(()),
            _ => {}
        }

        let heading_line = matches!(unit, Unit::BeginHeading(_));
        self.open_line(heading_line)?;

        match unit {
            Unit::BeginHeading(_) => Ok(()),
            Unit::HeadingChar(c) => self.write_char(Category::HeadingText, *c),
            Unit::BeginOrderedItem(marker) => {
                self.write_styled(Category::OrderedMarker, &format!("{} ", marker))
            }
            Unit::OrderedChar(c) => self.write_char(Category::OrderedText, *c),
            Unit::BeginUnorderedItem => self.write_styled(Category::UnorderedMarker, "* "),
            Unit::UnorderedChar(c) => self.write_char(Category::UnorderedText, *c),
            Unit::BeginCodeFence | Unit::EndCodeFence => self.write_styled(Category::CodeFence, "```"),
            Unit::CodeChar(c) => self.write_char(Category::CodeText, *c),
            Unit::PlainChar(c) => self.write_char(Category::PlainText, *c),
            Unit::LineBreak | Unit::EndHeading => Ok(()),
        }
    }

    /// End the current line. A line with no content still gets its border.
    pub fn on_line_break(&mut self) -> io::Result<()> {
        self.open_line(false)?;
        writeln!(self.out)?;
        self.line_open = false;
        self.out.flush()
    }

    /// Write the footer. Further calls are no-ops.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.write_header()?;
        if self.line_open {
            writeln!(self.out)?;
            self.line_open = false;
        }
        let frame = self.theme.frame.clone();
        let line = self.paint(frame.border, &frame.line_glyph);
        let footer = self.paint(frame.border, &frame.footer_glyph);
        let caption = self.paint(frame.caption, &frame.footer_text);
        writeln!(self.out, "{}", line)?;
        writeln!(self.out, "{} {}", footer, caption)?;
        self.out.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn write_header(&mut self) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;
        let frame = self.theme.frame.clone();
        let glyph = self.paint(frame.border, &frame.header_glyph);
        let caption = self.paint(frame.caption, &frame.header_text);
        let line = self.paint(frame.border, &frame.line_glyph);
        writeln!(self.out, "{} {}", glyph, caption)?;
        writeln!(self.out, "{}", line)
    }

    fn open_line(&mut self, heading_line: bool) -> io::Result<()> {
        self.write_header()?;
        if self.line_open {
            return Ok(());
        }
        self.line_open = true;
        let (style, glyph) = if heading_line {
            (self.theme.frame.heading_border, self.theme.frame.heading_glyph.clone())
        } else {
            (self.theme.frame.border, self.theme.frame.line_glyph.clone())
        };
        let painted = self.paint(style, &glyph);
        write!(self.out, "{} ", painted)
    }

    fn write_char(&mut self, category: Category, c: char) -> io::Result<()> {
        let mut buf = [0u8; 4];
        self.write_styled(category, c.encode_utf8(&mut buf))
    }

    fn write_styled(&mut self, category: Category, text: &str) -> io::Result<()> {
        let style = self.theme.text_style(category);
        let painted = self.paint(style, text);
        write!(self.out, "{}", painted)
    }

    fn paint(&self, style: TextStyle, text: &str) -> String {
        if self.theme.colors {
            style.paint(text).to_string()
        } else {
            text.to_string()
        }
    }
}
