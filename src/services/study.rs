//! Flashcard study session: a fixed snapshot of cards walked through in order.
//!
//! No route drives this; it is the study model for library consumers building
//! a client on top of `/api/flashcards`.

use crate::dto::flashcard::Flashcard;

pub const MAX_STUDY_CARDS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyState {
    Idle,
    CardShown,
    Done,
}

#[derive(Debug, Clone)]
pub struct StudySession {
    cards: Vec<Flashcard>,
    index: usize,
    graded: usize,
    state: StudyState,
}

impl StudySession {
    /// Snapshots up to [`MAX_STUDY_CARDS`] cards. With no cards the session
    /// stays idle.
    pub fn start(cards: &[Flashcard]) -> Self {
        let cards: Vec<Flashcard> = cards.iter().take(MAX_STUDY_CARDS).cloned().collect();
        let state = if cards.is_empty() {
            StudyState::Idle
        } else {
            StudyState::CardShown
        };

        Self {
            cards,
            index: 0,
            graded: 0,
            state,
        }
    }

    pub fn state(&self) -> StudyState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn graded(&self) -> usize {
        self.graded
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn current(&self) -> Option<&Flashcard> {
        match self.state {
            StudyState::CardShown => self.cards.get(self.index),
            _ => None,
        }
    }

    /// Grades the shown card and moves on. Ignored unless a card is shown.
    pub fn grade(&mut self) -> StudyState {
        if self.state != StudyState::CardShown {
            return self.state;
        }

        self.graded += 1;
        if self.index + 1 < self.cards.len() {
            self.index += 1;
        } else {
            self.state = StudyState::Done;
        }
        self.state
    }

    /// Restarts the same snapshot from the first card.
    pub fn review_again(&mut self) {
        if self.cards.is_empty() {
            return;
        }
        self.index = 0;
        self.graded = 0;
        self.state = StudyState::CardShown;
    }
}
