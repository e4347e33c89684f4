//! Output formatting for search hits and filter-coloured lines

use crate::data::LineNumber;
use crate::search::filter::{Colour, FilterColours};
use crate::search::pattern::SearchPattern;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Stdout, coloured only when asked and attached to a terminal
pub fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Line numbers are printed one-based, like editors and grep
fn display_number(line: LineNumber) -> u64 {
    u64::from(line.get()) + 1
}

fn term_colour(colour: Colour) -> Color {
    Color::Rgb(colour.r, colour.g, colour.b)
}

/// Print a match line with every match of `pattern` highlighted
pub fn print_match_line<W: WriteColor>(
    out: &mut W,
    line: LineNumber,
    content: &str,
    pattern: &SearchPattern,
    line_numbers: bool,
) -> io::Result<()> {
    if line_numbers {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(out, "{}", display_number(line))?;
        out.reset()?;
        write!(out, ":")?;
    }

    let mut printed = 0;
    for (start, end) in pattern.find_all(content) {
        if end == start {
            continue;
        }
        write!(out, "{}", &content[printed..start])?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        write!(out, "{}", &content[start..end])?;
        out.reset()?;
        printed = end;
    }
    writeln!(out, "{}", &content[printed..])?;

    Ok(())
}

/// Print a line in its filter colours, or plain when no filter matched
pub fn print_filtered_line<W: WriteColor>(
    out: &mut W,
    line: LineNumber,
    content: &str,
    colours: Option<FilterColours>,
    line_numbers: bool,
) -> io::Result<()> {
    if line_numbers {
        write!(out, "{:>6} ", display_number(line))?;
    }
    match colours {
        Some(colours) => {
            out.set_color(
                ColorSpec::new()
                    .set_fg(Some(term_colour(colours.foreground)))
                    .set_bg(Some(term_colour(colours.background))),
            )?;
            write!(out, "{}", content)?;
            out.reset()?;
            writeln!(out)
        }
        None => writeln!(out, "{}", content),
    }
}

/// Print a match count summary (for -c and the follow footer)
pub fn print_summary<W: WriteColor>(out: &mut W, matches: usize, lines: u32, complete: bool) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
    write!(out, "{} matches in {} lines", matches, lines)?;
    if !complete {
        write!(out, " (incomplete)")?;
    }
    out.reset()?;
    writeln!(out)
}
