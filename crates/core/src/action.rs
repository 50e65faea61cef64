//! Fixed catalog of recommendable pedagogical actions.
//!
//! An action is one move kind crossed with a temporal focus (review the
//! past, work the present, preview the future), giving a 15-entry catalog
//! with stable indices. The index order is part of the trained-table
//! fingerprint; changing it invalidates any checkpoint.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ViewContent,
    ReviewMaterial,
    PracticeExercise,
    AttemptQuiz,
    SeekHelp,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::ViewContent,
        ActionKind::ReviewMaterial,
        ActionKind::PracticeExercise,
        ActionKind::AttemptQuiz,
        ActionKind::SeekHelp,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::ViewContent => "view_content",
            ActionKind::ReviewMaterial => "review_material",
            ActionKind::PracticeExercise => "practice_exercise",
            ActionKind::AttemptQuiz => "attempt_quiz",
            ActionKind::SeekHelp => "seek_help",
        }
    }

    /// Parse an LMS activity label. Accepts the canonical labels plus the
    /// aliases the common event sources emit.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "view_content" | "content_view" | "view" | "page_view" => {
                Some(ActionKind::ViewContent)
            }
            "review_material" | "review" | "revisit" => Some(ActionKind::ReviewMaterial),
            "practice_exercise" | "practice" | "exercise" => Some(ActionKind::PracticeExercise),
            "attempt_quiz" | "quiz_attempt" | "quiz" | "assessment" => {
                Some(ActionKind::AttemptQuiz)
            }
            "seek_help" | "help" | "forum_post" => Some(ActionKind::SeekHelp),
            _ => None,
        }
    }

    /// Relative difficulty in [0, 1], compared against the learner tier's
    /// target difficulty by the reward model.
    pub fn difficulty(&self) -> f64 {
        match self {
            ActionKind::ViewContent => 0.2,
            ActionKind::ReviewMaterial => 0.35,
            ActionKind::PracticeExercise => 0.55,
            ActionKind::AttemptQuiz => 0.75,
            ActionKind::SeekHelp => 0.15,
        }
    }

    /// Nominal minutes shown alongside a recommendation.
    pub fn estimated_minutes(&self) -> u32 {
        match self {
            ActionKind::ViewContent => 10,
            ActionKind::ReviewMaterial => 15,
            ActionKind::PracticeExercise => 20,
            ActionKind::AttemptQuiz => 25,
            ActionKind::SeekHelp => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFocus {
    Present,
    Past,
    Future,
}

impl TimeFocus {
    pub const ALL: [TimeFocus; 3] = [TimeFocus::Present, TimeFocus::Past, TimeFocus::Future];

    pub fn label(&self) -> &'static str {
        match self {
            TimeFocus::Present => "present",
            TimeFocus::Past => "past",
            TimeFocus::Future => "future",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "present" | "current" => Some(TimeFocus::Present),
            "past" | "previous" => Some(TimeFocus::Past),
            "future" | "upcoming" => Some(TimeFocus::Future),
            _ => None,
        }
    }
}

/// One catalog entry: a pedagogical move with a temporal focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub focus: TimeFocus,
}

impl Action {
    pub const COUNT: usize = ActionKind::ALL.len() * TimeFocus::ALL.len();

    pub fn new(kind: ActionKind, focus: TimeFocus) -> Self {
        Self { kind, focus }
    }

    /// The full catalog in stable index order: kinds outer, focuses inner.
    pub fn catalog() -> Vec<Action> {
        ActionKind::ALL
            .iter()
            .flat_map(|&kind| TimeFocus::ALL.iter().map(move |&focus| Action { kind, focus }))
            .collect()
    }

    /// Deterministic fallback when a state has no trained estimates.
    pub fn default_action() -> Action {
        Action {
            kind: ActionKind::ViewContent,
            focus: TimeFocus::Present,
        }
    }

    /// Stable catalog index, the action half of every value-table key.
    pub fn index(&self) -> u8 {
        let kind_ix = ActionKind::ALL.iter().position(|k| k == &self.kind).unwrap_or(0);
        let focus_ix = TimeFocus::ALL.iter().position(|f| f == &self.focus).unwrap_or(0);
        (kind_ix * TimeFocus::ALL.len() + focus_ix) as u8
    }

    pub fn from_index(index: u8) -> Option<Action> {
        let index = index as usize;
        if index >= Self::COUNT {
            return None;
        }
        let kind = ActionKind::ALL[index / TimeFocus::ALL.len()];
        let focus = TimeFocus::ALL[index % TimeFocus::ALL.len()];
        Some(Action { kind, focus })
    }

    pub fn label(&self) -> String {
        format!("{}.{}", self.kind.label(), self.focus.label())
    }

    /// Parse `kind.focus` or a bare kind label (focus defaults to present).
    pub fn parse(label: &str) -> Option<Action> {
        match label.split_once('.') {
            Some((kind, focus)) => Some(Action {
                kind: ActionKind::from_label(kind)?,
                focus: TimeFocus::from_label(focus)?,
            }),
            None => Some(Action {
                kind: ActionKind::from_label(label)?,
                focus: TimeFocus::Present,
            }),
        }
    }
}
