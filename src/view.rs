use crate::session::FocusRegion;

/// Render the lines of `diff` inside `region`, numbered, with the selected
/// line marked by `>`.
///
/// Line numbers are the zero-based diff line indices used everywhere else,
/// so they can be fed back as selections. Lines are never wrapped.
pub fn render_region(diff: &str, region: &FocusRegion) -> String {
    let width = region.bottom.to_string().len();

    diff.lines()
        .enumerate()
        .skip(region.top)
        .take_while(|(index, _)| *index <= region.bottom)
        .map(|(index, line)| {
            let marker = if index == region.selected && region.hint().highlight {
                '>'
            } else {
                ' '
            };
            format!("{marker}{index:>width$} {line}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
