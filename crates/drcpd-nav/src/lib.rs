//! Navigation + filter (C5): cursor, selected line, wrap mode, and
//! visibility/selectability filtering over a list of known size.

/// A filter owns per-item visibility/selectability flags. The default,
/// [`NoFilter`], makes every item in range both visible and selectable.
pub trait NavItemFilter: Send + Sync {
    fn is_visible(&self, line: usize) -> bool;
    fn is_selectable(&self, line: usize) -> bool;

    /// Called by `Nav` after any operation that might have raced with a
    /// filter update. Returning `false` tells `Nav` its cursor may need
    /// re-anchoring via `check_selection()`.
    fn ensure_consistency(&self, _list_size: usize) -> bool {
        true
    }
}

pub struct NoFilter;

impl NavItemFilter for NoFilter {
    fn is_visible(&self, _line: usize) -> bool {
        true
    }

    fn is_selectable(&self, _line: usize) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    None,
    WrapToTop,
    WrapToBottom,
    Full,
}

pub struct Nav {
    list_size: usize,
    max_lines: usize,
    wrap_mode: WrapMode,
    cursor: usize,
    first_displayed: usize,
    selected_line: usize,
    filter: Box<dyn NavItemFilter>,
}

impl Nav {
    pub fn new(max_lines: usize, wrap_mode: WrapMode) -> Self {
        Nav {
            list_size: 0,
            max_lines: max_lines.max(1),
            wrap_mode,
            cursor: 0,
            first_displayed: 0,
            selected_line: 0,
            filter: Box::new(NoFilter),
        }
    }

    pub fn with_filter(max_lines: usize, wrap_mode: WrapMode, filter: Box<dyn NavItemFilter>) -> Self {
        Nav {
            list_size: 0,
            max_lines: max_lines.max(1),
            wrap_mode,
            cursor: 0,
            first_displayed: 0,
            selected_line: 0,
            filter,
        }
    }

    pub fn set_filter(&mut self, filter: Box<dyn NavItemFilter>) {
        self.filter = filter;
        self.check_selection();
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn first_displayed_item(&self) -> usize {
        self.first_displayed
    }

    pub fn selected_line_number(&self) -> usize {
        self.selected_line
    }

    pub fn wrap_mode(&self) -> WrapMode {
        self.wrap_mode
    }

    pub fn set_wrap_mode(&mut self, mode: WrapMode) {
        self.wrap_mode = mode;
    }

    pub fn list_size(&self) -> usize {
        self.list_size
    }

    pub fn get_total_number_of_visible_items(&self) -> usize {
        (0..self.list_size).filter(|&i| self.is_visible(i)).count()
    }

    /// Content changed underneath the view: reset bookkeeping and re-anchor
    /// the cursor to a selectable item.
    pub fn set_list_size(&mut self, size: usize) {
        self.list_size = size;
        if self.cursor >= size {
            self.cursor = size.saturating_sub(1);
        }
        self.check_selection();
    }

    fn is_visible(&self, line: usize) -> bool {
        line < self.list_size && self.filter.is_visible(line)
    }

    fn is_selectable(&self, line: usize) -> bool {
        line < self.list_size && self.filter.is_selectable(line)
    }

    /// Re-anchor the cursor to the nearest selectable item after filter or
    /// content changes.
    pub fn check_selection(&mut self) {
        if self.list_size == 0 {
            self.cursor = 0;
            self.first_displayed = 0;
            self.selected_line = 0;
            return;
        }
        if !self.filter.ensure_consistency(self.list_size) {
            tracing::warn!("filter reported inconsistency, re-anchoring cursor");
        }
        if !self.is_selectable(self.cursor) {
            let mut offset = 1usize;
            let mut found = None;
            loop {
                if self.cursor >= offset && self.is_selectable(self.cursor - offset) {
                    found = Some(self.cursor - offset);
                    break;
                }
                if self.cursor + offset < self.list_size && self.is_selectable(self.cursor + offset) {
                    found = Some(self.cursor + offset);
                    break;
                }
                if offset > self.list_size {
                    break;
                }
                offset += 1;
            }
            if let Some(found) = found {
                self.cursor = found;
            }
        }
        self.recompute_window();
    }

    pub fn set_cursor_by_line_number(&mut self, n: usize) {
        if self.list_size == 0 {
            return;
        }
        self.cursor = n.min(self.list_size - 1);
        if !self.is_selectable(self.cursor) {
            self.check_selection();
        } else {
            self.recompute_window();
        }
    }

    pub fn down(&mut self, n: usize) -> bool {
        self.move_by(n as i64)
    }

    pub fn up(&mut self, n: usize) -> bool {
        self.move_by(-(n as i64))
    }

    /// Moves the cursor by `delta` selectable steps. When the walk runs out
    /// of room before consuming all of `delta`, the configured wrap mode
    /// fires *exactly once* and any remaining steps are discarded.
    fn move_by(&mut self, delta: i64) -> bool {
        if self.list_size == 0 {
            return false;
        }
        if delta == 0 {
            return false;
        }
        let dir: i64 = if delta > 0 { 1 } else { -1 };
        let mut remaining = delta.unsigned_abs();
        let mut cur = self.cursor;
        let start = cur;

        while remaining > 0 {
            match self.step_selectable(cur, dir) {
                Some(next) => {
                    cur = next;
                    remaining -= 1;
                }
                None => {
                    if let Some(wrapped) = self.wrap_target(dir) {
                        cur = wrapped;
                    }
                    break;
                }
            }
        }

        if cur != start {
            self.cursor = cur;
            self.recompute_window();
            true
        } else {
            false
        }
    }

    fn step_selectable(&self, from: usize, dir: i64) -> Option<usize> {
        if dir > 0 {
            ((from + 1)..self.list_size).find(|&i| self.is_selectable(i))
        } else {
            (0..from).rev().find(|&i| self.is_selectable(i))
        }
    }

    fn first_selectable(&self) -> Option<usize> {
        (0..self.list_size).find(|&i| self.is_selectable(i))
    }

    fn last_selectable(&self) -> Option<usize> {
        (0..self.list_size).rev().find(|&i| self.is_selectable(i))
    }

    fn wrap_target(&self, dir: i64) -> Option<usize> {
        match (dir > 0, self.wrap_mode) {
            (true, WrapMode::WrapToTop) | (true, WrapMode::Full) => self.first_selectable(),
            (false, WrapMode::WrapToBottom) | (false, WrapMode::Full) => self.last_selectable(),
            _ => None,
        }
    }

    fn recompute_window(&mut self) {
        if self.cursor < self.first_displayed {
            self.first_displayed = self.cursor;
        } else {
            let visible_between = self.count_visible_between(self.first_displayed, self.cursor);
            if visible_between >= self.max_lines {
                self.first_displayed = self.anchor_for_last_visible(self.cursor);
            }
        }
        self.selected_line = self.count_visible_between(self.first_displayed, self.cursor);
    }

    fn count_visible_between(&self, a: usize, b: usize) -> usize {
        (a..b).filter(|&i| self.is_visible(i)).count()
    }

    fn anchor_for_last_visible(&self, cursor: usize) -> usize {
        let mut remaining = self.max_lines.saturating_sub(1);
        let mut i = cursor;
        while remaining > 0 && i > 0 {
            i -= 1;
            if self.is_visible(i) {
                remaining -= 1;
            }
        }
        i
    }

    /// The visible item indices currently on screen, `begin()..end()` in
    /// spec terms.
    pub fn visible_items(&self) -> impl Iterator<Item = usize> + '_ {
        let end = (self.first_displayed + self.max_lines).min(self.list_size);
        (self.first_displayed..end).filter(move |&i| self.is_visible(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_filter_total_visible_equals_size() {
        let mut nav = Nav::new(5, WrapMode::None);
        nav.set_list_size(100);
        assert_eq!(nav.get_total_number_of_visible_items(), 100);
    }

    #[test]
    fn set_cursor_roundtrips() {
        let mut nav = Nav::new(5, WrapMode::None);
        nav.set_list_size(100);
        nav.set_cursor_by_line_number(42);
        assert_eq!(nav.cursor(), 42);
    }

    #[test]
    fn visible_window_bounded_by_max_lines() {
        let mut nav = Nav::new(5, WrapMode::None);
        nav.set_list_size(100);
        nav.set_cursor_by_line_number(42);
        let items: Vec<_> = nav.visible_items().collect();
        assert!(items.len() <= 5);
        assert_eq!(items[0], nav.first_displayed_item());
    }

    #[test]
    fn full_wrap_down_from_zero_wraps_to_zero() {
        let mut nav = Nav::new(5, WrapMode::Full);
        nav.set_list_size(10);
        nav.down(10);
        assert_eq!(nav.cursor(), 0);
    }

    #[test]
    fn no_wrap_down_from_zero_stops_at_last() {
        let mut nav = Nav::new(5, WrapMode::None);
        nav.set_list_size(10);
        nav.down(10);
        assert_eq!(nav.cursor(), 9);
    }

    #[test]
    fn wrap_fires_exactly_once() {
        let mut nav = Nav::new(5, WrapMode::WrapToTop);
        nav.set_list_size(10);
        nav.set_cursor_by_line_number(8);
        nav.down(100);
        assert_eq!(nav.cursor(), 0);
    }
}
