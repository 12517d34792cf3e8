//! Byte-offset helpers for windowed text slicing
//!
//! Window arithmetic over match offsets must stay total for arbitrary
//! input, including multi-byte characters that survive upstream cleaning.

/// Largest char boundary at or below `index`
pub(crate) fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Smallest char boundary at or above `index`
pub(crate) fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Slice a window of `radius` bytes around `[start, end)`, clamped to bounds
pub(crate) fn window<'a>(text: &'a str, start: usize, end: usize, radius: usize) -> &'a str {
    let lo = floor_char_boundary(text, start.saturating_sub(radius));
    let hi = ceil_char_boundary(text, end.saturating_add(radius).min(text.len()));
    &text[lo..hi]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_clamps_to_bounds() {
        assert_eq!(window("milk", 0, 4, 100), "milk");
        assert_eq!(window("abcdef", 2, 3, 1), "bcd");
    }

    #[test]
    fn boundaries_respect_multibyte_chars() {
        let text = "caf\u{e9} latte";
        // Index 4 falls inside the two-byte 'é'
        assert!(floor_char_boundary(text, 4) <= 4);
        let w = window(text, 0, text.len(), 10);
        assert_eq!(w, text);
    }
}
