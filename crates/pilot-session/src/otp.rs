//! Six-cell OTP entry with index-based focus.

use crate::validate::OTP_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OtpInput {
    cells: [Option<char>; OTP_LEN],
    focus: usize,
}

impl OtpInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn cells(&self) -> &[Option<char>; OTP_LEN] {
        &self.cells
    }

    /// Writes `ch` into cell `index`. A digit advances focus to the next cell;
    /// anything else empties the cell and leaves focus where it is.
    pub fn input(&mut self, index: usize, ch: char) {
        let Some(cell) = self.cells.get_mut(index) else {
            return;
        };
        if ch.is_ascii_digit() {
            *cell = Some(ch);
            self.focus = (index + 1).min(OTP_LEN - 1);
        } else {
            *cell = None;
        }
    }

    /// Clears a filled cell; on an empty cell moves focus one to the left.
    pub fn backspace(&mut self, index: usize) {
        if index >= OTP_LEN {
            return;
        }
        if self.cells[index].is_none() && index > 0 {
            self.focus = index - 1;
        } else {
            self.cells[index] = None;
        }
    }

    pub fn arrow_left(&mut self, index: usize) {
        if index > 0 && index < OTP_LEN {
            self.focus = index - 1;
        }
    }

    pub fn arrow_right(&mut self, index: usize) {
        if index < OTP_LEN - 1 {
            self.focus = index + 1;
        }
    }

    /// Keeps the digits of `text`, fills from the first cell and empties the rest.
    pub fn paste(&mut self, text: &str) {
        let digits: Vec<char> = text
            .chars()
            .filter(char::is_ascii_digit)
            .take(OTP_LEN)
            .collect();
        self.cells = [None; OTP_LEN];
        for (cell, digit) in self.cells.iter_mut().zip(&digits) {
            *cell = Some(*digit);
        }
        self.focus = digits.len().min(OTP_LEN - 1);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// The code, once every cell holds a digit.
    pub fn value(&self) -> Option<String> {
        self.cells.iter().copied().collect()
    }

    /// Cells joined for display, `_` for empty ones.
    pub fn render(&self) -> String {
        self.cells.iter().map(|cell| cell.unwrap_or('_')).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_advances_and_stops_on_last_cell() {
        let mut otp = OtpInput::new();
        for (index, ch) in "123456".chars().enumerate() {
            otp.input(index, ch);
        }
        assert_eq!(otp.focus(), 5);
        assert_eq!(otp.value().as_deref(), Some("123456"));
    }

    #[test]
    fn non_digit_empties_the_cell_without_moving() {
        let mut otp = OtpInput::new();
        otp.input(0, '7');
        otp.input(1, 'x');
        assert_eq!(otp.cells()[1], None);
        assert_eq!(otp.focus(), 1);
        otp.input(0, 'x');
        assert_eq!(otp.cells()[0], None);
    }

    #[test]
    fn backspace_clears_then_moves_left() {
        let mut otp = OtpInput::new();
        otp.paste("12");
        assert_eq!(otp.focus(), 2);

        otp.backspace(2);
        assert_eq!(otp.focus(), 1);
        assert_eq!(otp.render(), "12____");

        otp.backspace(1);
        assert_eq!(otp.render(), "1_____");
        assert_eq!(otp.focus(), 1);

        otp.backspace(0);
        otp.backspace(0);
        assert_eq!(otp.render(), "______");
        assert_eq!(otp.focus(), 1);
    }

    #[test]
    fn arrows_stay_in_bounds() {
        let mut otp = OtpInput::new();
        otp.arrow_left(0);
        assert_eq!(otp.focus(), 0);
        otp.arrow_right(4);
        assert_eq!(otp.focus(), 5);
        otp.arrow_right(5);
        assert_eq!(otp.focus(), 5);
        otp.arrow_left(5);
        assert_eq!(otp.focus(), 4);
    }

    #[test]
    fn paste_keeps_digits_and_resets_the_rest() {
        let mut otp = OtpInput::new();
        otp.paste("999999");
        otp.paste("code: 12-34");
        assert_eq!(otp.render(), "1234__");
        assert_eq!(otp.focus(), 4);
        assert_eq!(otp.value(), None);

        otp.paste("12345678");
        assert_eq!(otp.value().as_deref(), Some("123456"));
        assert_eq!(otp.focus(), 5);

        otp.clear();
        assert_eq!(otp, OtpInput::default());
    }
}
