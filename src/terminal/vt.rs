//! Virtual-terminal state machine
//!
//! Terminal sessions cannot trust raw keystrokes: by the time the user hits
//! Enter, the line the shell will execute has been shaped by echo, Tab
//! completion, backspace editing, and cursor movement. This emulator tracks
//! just enough screen state - a character grid, a cursor, and the control
//! sequences an interactive shell actually emits - to read the committed
//! command line back off the grid. It is not a general-purpose terminal
//! emulator.
//!
//! The session's writer task feeds container output in; the reader task
//! queries the cursor row when a newline arrives. Both sides hold the
//! session's VT lock only for the span of a single write or row read.

const DEFAULT_COLS: usize = 80;
const DEFAULT_ROWS: usize = 24;

/// Empty cell marker; never produced by printable input
const EMPTY: char = '\0';

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParseState {
    Ground,
    Escape,
    Csi,
    Osc,
    OscEscape,
}

/// A character-grid terminal emulator
pub struct VirtualTerminal {
    cols: usize,
    rows: usize,
    grid: Vec<char>,
    cursor_row: usize,
    cursor_col: usize,
    saved_cursor: (usize, usize),
    state: ParseState,
    csi_params: Vec<usize>,
    csi_current: Option<usize>,
}

impl VirtualTerminal {
    /// Create an emulator with the default 80x24 geometry
    pub fn new() -> Self {
        Self::with_size(DEFAULT_COLS, DEFAULT_ROWS)
    }

    /// Create an emulator with an explicit geometry
    pub fn with_size(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            grid: vec![EMPTY; cols * rows],
            cursor_row: 0,
            cursor_col: 0,
            saved_cursor: (0, 0),
            state: ParseState::Ground,
            csi_params: Vec::new(),
            csi_current: None,
        }
    }

    /// Grid geometry as (cols, rows)
    pub fn size(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Row the cursor currently sits on
    pub fn cursor_row(&self) -> usize {
        self.cursor_row
    }

    /// Column the cursor currently sits on
    pub fn cursor_col(&self) -> usize {
        self.cursor_col
    }

    /// Change the grid geometry, preserving the overlapping region
    pub fn resize(&mut self, cols: usize, rows: usize) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let mut grid = vec![EMPTY; cols * rows];
        for r in 0..rows.min(self.rows) {
            for c in 0..cols.min(self.cols) {
                grid[r * cols + c] = self.grid[r * self.cols + c];
            }
        }
        self.grid = grid;
        self.cols = cols;
        self.rows = rows;
        self.cursor_row = self.cursor_row.min(rows - 1);
        self.cursor_col = self.cursor_col.min(cols - 1);
    }

    /// Printable characters of a row, in column order
    ///
    /// Unwritten cells are skipped, so sparse rows read as contiguous text.
    pub fn row_text(&self, row: usize) -> String {
        if row >= self.rows {
            return String::new();
        }
        self.grid[row * self.cols..(row + 1) * self.cols]
            .iter()
            .filter(|&&c| c != EMPTY)
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    /// Text of the cursor's row
    pub fn current_line(&self) -> String {
        self.row_text(self.cursor_row)
    }

    /// Text of the row above the cursor, if any
    pub fn previous_line(&self) -> Option<String> {
        self.cursor_row.checked_sub(1).map(|r| self.row_text(r))
    }

    /// Advance the state machine over a chunk of input
    pub fn process(&mut self, input: &str) {
        for c in input.chars() {
            self.step(c);
        }
    }

    fn step(&mut self, c: char) {
        match self.state {
            ParseState::Ground => self.ground(c),
            ParseState::Escape => self.escape(c),
            ParseState::Csi => self.csi(c),
            ParseState::Osc => {
                if c == '\x07' {
                    self.state = ParseState::Ground;
                } else if c == '\x1b' {
                    self.state = ParseState::OscEscape;
                }
            }
            ParseState::OscEscape => {
                // ESC \ terminates the OSC string; anything else resumes it
                self.state = if c == '\\' {
                    ParseState::Ground
                } else {
                    ParseState::Osc
                };
            }
        }
    }

    fn ground(&mut self, c: char) {
        match c {
            '\x1b' => self.state = ParseState::Escape,
            '\r' => self.cursor_col = 0,
            '\n' => self.line_feed(),
            '\x08' => self.cursor_col = self.cursor_col.saturating_sub(1),
            '\t' => {
                let next_stop = (self.cursor_col / 8 + 1) * 8;
                self.cursor_col = next_stop.min(self.cols - 1);
            }
            '\x07' => {}
            c if (c as u32) < 0x20 || c == '\x7f' => {}
            c => self.put(c),
        }
    }

    fn escape(&mut self, c: char) {
        self.state = ParseState::Ground;
        match c {
            '[' => {
                self.csi_params.clear();
                self.csi_current = None;
                self.state = ParseState::Csi;
            }
            ']' => self.state = ParseState::Osc,
            'D' => self.line_feed(),
            'E' => {
                self.cursor_col = 0;
                self.line_feed();
            }
            'M' => self.cursor_row = self.cursor_row.saturating_sub(1),
            '7' => self.saved_cursor = (self.cursor_row, self.cursor_col),
            '8' => {
                self.cursor_row = self.saved_cursor.0.min(self.rows - 1);
                self.cursor_col = self.saved_cursor.1.min(self.cols - 1);
            }
            _ => {}
        }
    }

    fn csi(&mut self, c: char) {
        match c {
            '0'..='9' => {
                let d = c as usize - '0' as usize;
                self.csi_current = Some(self.csi_current.unwrap_or(0).saturating_mul(10) + d);
            }
            ';' => {
                self.csi_params.push(self.csi_current.take().unwrap_or(0));
            }
            // Private markers and intermediates carry nothing we act on
            '\x20'..='\x3f' => {}
            c if ('\x40'..='\x7e').contains(&c) => {
                if let Some(p) = self.csi_current.take() {
                    self.csi_params.push(p);
                }
                self.dispatch_csi(c);
                self.state = ParseState::Ground;
            }
            _ => self.state = ParseState::Ground,
        }
    }

    fn param(&self, index: usize, default: usize) -> usize {
        match self.csi_params.get(index) {
            Some(0) | None => default,
            Some(&v) => v,
        }
    }

    fn dispatch_csi(&mut self, action: char) {
        match action {
            'A' => self.cursor_row = self.cursor_row.saturating_sub(self.param(0, 1)),
            'B' => self.cursor_row = (self.cursor_row + self.param(0, 1)).min(self.rows - 1),
            'C' => self.cursor_col = (self.cursor_col + self.param(0, 1)).min(self.cols - 1),
            'D' => self.cursor_col = self.cursor_col.saturating_sub(self.param(0, 1)),
            'G' => self.cursor_col = self.param(0, 1).saturating_sub(1).min(self.cols - 1),
            'd' => self.cursor_row = self.param(0, 1).saturating_sub(1).min(self.rows - 1),
            'H' | 'f' => {
                self.cursor_row = self.param(0, 1).saturating_sub(1).min(self.rows - 1);
                self.cursor_col = self.param(1, 1).saturating_sub(1).min(self.cols - 1);
            }
            'J' => self.erase_display(self.csi_params.first().copied().unwrap_or(0)),
            'K' => self.erase_line(self.csi_params.first().copied().unwrap_or(0)),
            'P' => self.delete_chars(self.param(0, 1)),
            '@' => self.insert_chars(self.param(0, 1)),
            'X' => self.erase_chars(self.param(0, 1)),
            'L' => self.insert_lines(self.param(0, 1)),
            'M' => self.delete_lines(self.param(0, 1)),
            // SGR and mode switches do not move text
            'm' | 'h' | 'l' | 'r' | 'c' | 'n' | 't' => {}
            _ => {}
        }
    }

    fn put(&mut self, c: char) {
        if self.cursor_col >= self.cols {
            self.cursor_col = 0;
            self.line_feed();
        }
        let index = self.cursor_row * self.cols + self.cursor_col;
        self.grid[index] = c;
        self.cursor_col += 1;
        if self.cursor_col >= self.cols {
            self.cursor_col = 0;
            self.line_feed();
        }
    }

    fn line_feed(&mut self) {
        if self.cursor_row + 1 < self.rows {
            self.cursor_row += 1;
        } else {
            self.scroll_up();
        }
    }

    fn scroll_up(&mut self) {
        self.grid.copy_within(self.cols.., 0);
        let start = (self.rows - 1) * self.cols;
        self.grid[start..].fill(EMPTY);
    }

    fn erase_display(&mut self, mode: usize) {
        let cursor = self.cursor_row * self.cols + self.cursor_col;
        match mode {
            0 => self.grid[cursor..].fill(EMPTY),
            1 => {
                let end = cursor.min(self.grid.len() - 1);
                self.grid[..=end].fill(EMPTY)
            }
            _ => self.grid.fill(EMPTY),
        }
    }

    fn erase_line(&mut self, mode: usize) {
        let start = self.cursor_row * self.cols;
        let end = start + self.cols;
        let cursor = start + self.cursor_col;
        match mode {
            0 => self.grid[cursor..end].fill(EMPTY),
            1 => self.grid[start..=cursor.min(end - 1)].fill(EMPTY),
            _ => self.grid[start..end].fill(EMPTY),
        }
    }

    fn delete_chars(&mut self, n: usize) {
        let start = self.cursor_row * self.cols;
        let end = start + self.cols;
        let cursor = start + self.cursor_col;
        let n = n.min(end - cursor);
        self.grid.copy_within(cursor + n..end, cursor);
        self.grid[end - n..end].fill(EMPTY);
    }

    fn insert_chars(&mut self, n: usize) {
        let start = self.cursor_row * self.cols;
        let end = start + self.cols;
        let cursor = start + self.cursor_col;
        let n = n.min(end - cursor);
        self.grid.copy_within(cursor..end - n, cursor + n);
        self.grid[cursor..cursor + n].fill(EMPTY);
    }

    fn erase_chars(&mut self, n: usize) {
        let start = self.cursor_row * self.cols + self.cursor_col;
        let end = (start + n).min((self.cursor_row + 1) * self.cols);
        self.grid[start..end].fill(EMPTY);
    }

    fn insert_lines(&mut self, n: usize) {
        let n = n.min(self.rows - self.cursor_row);
        let row_start = self.cursor_row * self.cols;
        let shift = n * self.cols;
        let len = self.grid.len();
        self.grid.copy_within(row_start..len - shift, row_start + shift);
        self.grid[row_start..row_start + shift].fill(EMPTY);
    }

    fn delete_lines(&mut self, n: usize) {
        let n = n.min(self.rows - self.cursor_row);
        let row_start = self.cursor_row * self.cols;
        let shift = n * self.cols;
        let len = self.grid.len();
        self.grid.copy_within(row_start + shift.., row_start);
        self.grid[len - shift..].fill(EMPTY);
    }
}

impl Default for VirtualTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Committed-Line Reconstruction Stories
    // =========================================================================
    //
    // The emulator exists for one purpose: when a newline arrives on stdin,
    // the cursor row must read back exactly what the shell will execute.
    // These scenarios replay the stdout a shell would actually produce.

    /// Story: plain echo. The shell prints its prompt and echoes every
    /// keystroke; the cursor row is prompt + command.
    #[test]
    fn story_echoed_keystrokes_form_the_line() {
        let mut vt = VirtualTerminal::new();
        vt.process("/ # ls -la");
        assert_eq!(vt.current_line(), "/ # ls -la");
        assert_eq!(vt.cursor_row(), 0);
    }

    /// Story: Tab completion. The user typed "ec" and hit Tab; the shell
    /// echoed the completed remainder. The grid holds the full word even
    /// though stdin never carried it.
    #[test]
    fn story_tab_completion_lands_on_the_grid() {
        let mut vt = VirtualTerminal::new();
        vt.process("$ ec");
        // completion rendered by the shell
        vt.process("ho wayne");
        assert_eq!(vt.current_line(), "$ echo wayne");
    }

    /// Story: backspace editing. bash rubs out a character with BS SP BS;
    /// the final grid shows the corrected command.
    #[test]
    fn story_backspace_editing_is_applied() {
        let mut vt = VirtualTerminal::new();
        vt.process("$ lss");
        vt.process("\x08 \x08");
        assert_eq!(vt.current_line(), "$ ls");
    }

    /// Story: readline redraws the line in place with carriage return and
    /// erase-to-end; stale text must not survive.
    #[test]
    fn story_cr_redraw_replaces_the_line() {
        let mut vt = VirtualTerminal::new();
        vt.process("$ cat /etc/passwd");
        vt.process("\r\x1b[K$ ls");
        assert_eq!(vt.current_line(), "$ ls");
    }

    /// Story: after Enter the cursor drops a row; the committed command is
    /// then on the previous line.
    #[test]
    fn story_newline_moves_committed_text_to_previous_line() {
        let mut vt = VirtualTerminal::new();
        vt.process("$ uptime");
        vt.process("\r\n");
        assert_eq!(vt.current_line(), "");
        assert_eq!(vt.previous_line().as_deref(), Some("$ uptime"));
    }

    // =========================================================================
    // Grid Mechanics
    // =========================================================================

    #[test]
    fn long_input_wraps_to_the_next_row() {
        let mut vt = VirtualTerminal::with_size(8, 4);
        vt.process("12345678abc");
        assert_eq!(vt.row_text(0), "12345678");
        assert_eq!(vt.row_text(1), "abc");
        assert_eq!(vt.cursor_row(), 1);
    }

    #[test]
    fn scrolling_discards_the_top_row() {
        let mut vt = VirtualTerminal::with_size(10, 2);
        vt.process("one\r\ntwo\r\nthree");
        assert_eq!(vt.row_text(0), "two");
        assert_eq!(vt.row_text(1), "three");
        assert_eq!(vt.cursor_row(), 1);
    }

    #[test]
    fn cursor_movement_sequences_are_honored() {
        let mut vt = VirtualTerminal::new();
        vt.process("abcdef");
        // Jump to column 3 (1-based) and overwrite
        vt.process("\x1b[3Gxy");
        assert_eq!(vt.current_line(), "abxyef");
        // CUP to 2;1
        vt.process("\x1b[2;1Hsecond");
        assert_eq!(vt.row_text(1), "second");
    }

    #[test]
    fn sgr_colors_are_invisible_to_row_text() {
        let mut vt = VirtualTerminal::new();
        vt.process("\x1b[1;32muser@pod\x1b[0m:~$ id");
        assert_eq!(vt.current_line(), "user@pod:~$ id");
    }

    #[test]
    fn osc_title_sequences_are_swallowed() {
        let mut vt = VirtualTerminal::new();
        vt.process("\x1b]0;window title\x07$ pwd");
        assert_eq!(vt.current_line(), "$ pwd");
        let mut vt = VirtualTerminal::new();
        vt.process("\x1b]0;title\x1b\\$ pwd");
        assert_eq!(vt.current_line(), "$ pwd");
    }

    #[test]
    fn delete_and_insert_chars_shift_the_row() {
        let mut vt = VirtualTerminal::new();
        vt.process("abcdef");
        vt.process("\x1b[3G\x1b[2P");
        assert_eq!(vt.current_line(), "abef");

        let mut vt = VirtualTerminal::new();
        vt.process("abef");
        vt.process("\x1b[3G\x1b[2@cd");
        assert_eq!(vt.current_line(), "abcdef");
    }

    #[test]
    fn resize_preserves_overlap_and_clamps_cursor() {
        let mut vt = VirtualTerminal::with_size(20, 5);
        vt.process("hello world");
        vt.resize(5, 2);
        assert_eq!(vt.row_text(0), "hello");
        assert!(vt.cursor_col() < 5);
        assert!(vt.cursor_row() < 2);
    }

    #[test]
    fn erase_line_variants() {
        let mut vt = VirtualTerminal::new();
        vt.process("abcdef\x1b[4G\x1b[K");
        assert_eq!(vt.current_line(), "abc");

        let mut vt = VirtualTerminal::new();
        vt.process("abcdef\x1b[4G\x1b[1K");
        assert_eq!(vt.current_line(), "ef");

        let mut vt = VirtualTerminal::new();
        vt.process("abcdef\x1b[2K");
        assert_eq!(vt.current_line(), "");
    }

    #[test]
    fn unknown_sequences_do_not_derail_parsing() {
        let mut vt = VirtualTerminal::new();
        vt.process("\x1b[?2004h$ ok\x1b[?2004l");
        assert_eq!(vt.current_line(), "$ ok");
    }
}
