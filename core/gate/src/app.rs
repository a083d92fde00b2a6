//! Gate state: which items are checked, where they are on screen, and what
//! the last verification said. The challenge itself never changes.

use ratatui::layout::Rect;
use wakegate_core::lockdown::Point;
use wakegate_core::{Challenge, Verdict};

pub const PROMPT: &str = "Select the 3 files you worked on recently:";
const WRONG_COUNT_MESSAGE: &str = "Please select exactly 3 files. Try again.";
const INCORRECT_MESSAGE: &str = "Incorrect challenge response. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Item(usize),
    Submit,
}

pub struct GateApp {
    challenge: Challenge,
    checked: Vec<bool>,
    cursor: usize,
    message: Option<String>,
    attempts: u32,
    unlocked: bool,
    pub item_areas: Vec<Rect>,
    pub submit_area: Option<Rect>,
}

impl GateApp {
    pub fn new(challenge: Challenge) -> Self {
        let len = challenge.displayed().len();
        Self {
            challenge,
            checked: vec![false; len],
            cursor: 0,
            message: None,
            attempts: 0,
            unlocked: false,
            item_areas: Vec::new(),
            submit_area: None,
        }
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, bool)> + '_ {
        self.challenge
            .displayed()
            .iter()
            .zip(self.checked.iter())
            .map(|(name, checked)| (name.as_str(), *checked))
    }

    pub fn cursor(&self) -> Target {
        if self.cursor < self.checked.len() {
            Target::Item(self.cursor)
        } else {
            Target::Submit
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    pub fn next(&mut self) {
        self.cursor = (self.cursor + 1).min(self.checked.len());
    }

    pub fn previous(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn toggle(&mut self, index: usize) {
        if let Some(checked) = self.checked.get_mut(index) {
            *checked = !*checked;
            self.cursor = index;
        }
    }

    /// Space/Enter on the cursor.
    pub fn activate(&mut self) -> Option<Verdict> {
        match self.cursor() {
            Target::Item(index) => {
                self.toggle(index);
                None
            }
            Target::Submit => Some(self.submit()),
        }
    }

    pub fn click(&mut self, column: u16, row: u16) -> Option<Verdict> {
        match self.target_at(column, row)? {
            Target::Item(index) => {
                self.toggle(index);
                None
            }
            Target::Submit => {
                self.cursor = self.checked.len();
                Some(self.submit())
            }
        }
    }

    pub fn selected(&self) -> Vec<&str> {
        self.items()
            .filter(|(_, checked)| *checked)
            .map(|(name, _)| name)
            .collect()
    }

    /// Verifies the current selection. A rejection keeps the selection so the
    /// user can adjust it.
    pub fn submit(&mut self) -> Verdict {
        self.attempts += 1;
        let verdict = self.challenge.verify(self.selected());
        match verdict {
            Verdict::Accepted => {
                self.unlocked = true;
                self.message = None;
            }
            Verdict::WrongCount { .. } => self.message = Some(WRONG_COUNT_MESSAGE.to_string()),
            Verdict::Incorrect => self.message = Some(INCORRECT_MESSAGE.to_string()),
        }
        verdict
    }

    fn target_at(&self, column: u16, row: u16) -> Option<Target> {
        let hit = |area: &Rect| {
            row >= area.y && row < area.y + area.height && column >= area.x && column < area.x + area.width
        };
        if let Some(index) = self.item_areas.iter().position(hit) {
            return Some(Target::Item(index));
        }
        self.submit_area
            .as_ref()
            .filter(|area| hit(area))
            .map(|_| Target::Submit)
    }

    /// Click targets for the input policy: each item's checkbox and the
    /// submit button's centre.
    pub fn hotspots(&self) -> Vec<Point> {
        let mut points: Vec<Point> = self
            .item_areas
            .iter()
            .map(|area| Point {
                x: i32::from(area.x) + 1,
                y: i32::from(area.y),
            })
            .collect();
        if let Some(area) = self.submit_area {
            points.push(Point {
                x: i32::from(area.x) + i32::from(area.width) / 2,
                y: i32::from(area.y) + i32::from(area.height) / 2,
            });
        }
        points
    }
}
