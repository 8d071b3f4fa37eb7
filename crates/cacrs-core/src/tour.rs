//! Onboarding tour: a fixed sequence of steps, each anchored to an element
//! of the interface, with highlight and tooltip geometry per step.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Padding added around the anchor on every side.
pub const HIGHLIGHT_PADDING: f64 = 6.0;
/// Gap between the anchor and its tooltip.
pub const TOOLTIP_OFFSET: f64 = 12.0;

/// Axis-aligned rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Grow by `padding` on every side.
    pub fn inflate(&self, padding: f64) -> Self {
        Self::new(
            self.x - padding,
            self.y - padding,
            self.width + 2.0 * padding,
            self.height + 2.0 * padding,
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Side of the anchor the tooltip is placed on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Top,
    #[default]
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TourStep {
    pub anchor: String,
    pub title: String,
    pub content: String,
    pub placement: Placement,
}

impl TourStep {
    fn new(anchor: &str, title: &str, content: &str, placement: Placement) -> Self {
        Self {
            anchor: anchor.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            placement,
        }
    }
}

/// The built-in tour.
pub fn default_steps() -> Vec<TourStep> {
    vec![
        TourStep::new(
            "dashboard-nav",
            "Tableau de Bord",
            "C'est ici que vous trouverez une vue d'ensemble de l'activité, des dossiers actifs et des derniers renseignements collectés.",
            Placement::Right,
        ),
        TourStep::new(
            "cases-nav",
            "Dossiers d'Enquête",
            "Le cœur de l'application. Gérez toutes vos enquêtes, ajoutez des fichiers et collaborez avec l'assistant IA.",
            Placement::Right,
        ),
        TourStep::new(
            "watchlists-nav",
            "Veille & Findings",
            "Effectuez des recherches web ciblées avec l'aide de Gemini et sauvegardez les informations pertinentes ('findings') pour vos enquêtes.",
            Placement::Right,
        ),
        TourStep::new(
            "user-profile",
            "Votre Compte",
            "Vous trouverez ici votre e-mail et le bouton pour vous déconnecter de la plateforme.",
            Placement::Left,
        ),
    ]
}

/// Highlight and tooltip geometry of the active step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepLayout {
    pub step_index: usize,
    /// `None` when the anchor could not be located.
    pub highlight: Option<Rect>,
    pub tooltip: Point,
}

/// Place a tooltip of `tooltip` size next to `anchor`, clamped to the viewport.
///
/// A missing anchor centres the tooltip.
pub fn compute_layout(
    anchor: Option<Rect>,
    placement: Placement,
    tooltip: Size,
    viewport: Size,
) -> (Option<Rect>, Point) {
    let Some(anchor) = anchor else {
        let centred = Point {
            x: ((viewport.width - tooltip.width) / 2.0).max(0.0),
            y: ((viewport.height - tooltip.height) / 2.0).max(0.0),
        };
        return (None, centred);
    };

    let raw = match placement {
        Placement::Right => Point {
            x: anchor.right() + TOOLTIP_OFFSET,
            y: anchor.y,
        },
        Placement::Left => Point {
            x: anchor.x - TOOLTIP_OFFSET - tooltip.width,
            y: anchor.y,
        },
        Placement::Top => Point {
            x: anchor.x,
            y: anchor.y - TOOLTIP_OFFSET - tooltip.height,
        },
        Placement::Bottom => Point {
            x: anchor.x,
            y: anchor.bottom() + TOOLTIP_OFFSET,
        },
    };
    let clamped = Point {
        x: raw.x.clamp(0.0, (viewport.width - tooltip.width).max(0.0)),
        y: raw.y.clamp(0.0, (viewport.height - tooltip.height).max(0.0)),
    };
    (Some(anchor.inflate(HIGHLIGHT_PADDING)), clamped)
}

/// Locates step anchors in whatever renders the interface.
pub trait AnchorLocator {
    fn locate(&self, anchor: &str) -> Option<Rect>;

    /// Bring the anchor into view before measuring.
    fn scroll_into_view(&self, _anchor: &str) {}
}

/// Anchor rectangles measured by a client and sent along with a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasuredAnchors(pub HashMap<String, Rect>);

impl AnchorLocator for MeasuredAnchors {
    fn locate(&self, anchor: &str) -> Option<Rect> {
        self.0.get(anchor).copied()
    }
}

/// Persists which users finished the tour.
pub trait CompletionStore: Send + Sync {
    fn is_completed(&self, user_id: &str) -> Result<bool>;
    fn mark_completed(&self, user_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCompletionStore {
    completed: Mutex<HashSet<String>>,
}

impl CompletionStore for MemoryCompletionStore {
    fn is_completed(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user_id))
    }

    fn mark_completed(&self, user_id: &str) -> Result<()> {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CompletionFile {
    completed: BTreeSet<String>,
}

/// JSON file listing the users who completed the tour.
#[derive(Debug)]
pub struct FileCompletionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCompletionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<CompletionFile> {
        if !self.path.exists() {
            return Ok(CompletionFile::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl CompletionStore for FileCompletionStore {
    fn is_completed(&self, user_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.completed.contains(user_id))
    }

    fn mark_completed(&self, user_id: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.read()?;
        if !file.completed.insert(user_id.to_string()) {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

/// Where a user is in the tour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TourState {
    Inactive,
    Active { step: usize },
    Completed,
}

/// Tour state machine for one user.
pub struct TourController {
    user_id: String,
    steps: Vec<TourStep>,
    state: TourState,
    store: Arc<dyn CompletionStore>,
}

impl TourController {
    /// Create a controller. The tour starts on its own unless the user
    /// already completed it.
    pub fn new(
        user_id: impl Into<String>,
        steps: Vec<TourStep>,
        store: Arc<dyn CompletionStore>,
    ) -> Result<Self> {
        let user_id = user_id.into();
        let state = if store.is_completed(&user_id)? {
            TourState::Completed
        } else if steps.is_empty() {
            TourState::Inactive
        } else {
            TourState::Active { step: 0 }
        };
        Ok(Self {
            user_id,
            steps,
            state,
            store,
        })
    }

    pub fn state(&self) -> TourState {
        self.state
    }

    pub fn steps(&self) -> &[TourStep] {
        &self.steps
    }

    pub fn current_step(&self) -> Option<&TourStep> {
        match self.state {
            TourState::Active { step } => self.steps.get(step),
            _ => None,
        }
    }

    /// Restart from the first step.
    pub fn start(&mut self) -> TourState {
        if !self.steps.is_empty() {
            self.state = TourState::Active { step: 0 };
        }
        self.state
    }

    /// Advance, completing the tour after the last step.
    pub fn next(&mut self) -> Result<TourState> {
        if let TourState::Active { step } = self.state {
            if step + 1 < self.steps.len() {
                self.state = TourState::Active { step: step + 1 };
            } else {
                self.store.mark_completed(&self.user_id)?;
                self.state = TourState::Completed;
                tracing::info!(user_id = %self.user_id, "Onboarding tour completed");
            }
        }
        Ok(self.state)
    }

    pub fn previous(&mut self) -> TourState {
        if let TourState::Active { step } = self.state {
            self.state = TourState::Active {
                step: step.saturating_sub(1),
            };
        }
        self.state
    }

    /// Leave the tour without recording completion.
    pub fn skip(&mut self) -> TourState {
        if matches!(self.state, TourState::Active { .. }) {
            self.state = TourState::Inactive;
        }
        self.state
    }

    /// Geometry of the active step. Recompute on every resize or scroll.
    pub fn layout(
        &self,
        locator: &dyn AnchorLocator,
        tooltip: Size,
        viewport: Size,
    ) -> Option<StepLayout> {
        let TourState::Active { step } = self.state else {
            return None;
        };
        let current = self.steps.get(step)?;
        let anchor = locator.locate(&current.anchor);
        if anchor.is_some() {
            locator.scroll_into_view(&current.anchor);
        }
        let (highlight, tooltip) = compute_layout(anchor, current.placement, tooltip, viewport);
        Some(StepLayout {
            step_index: step,
            highlight,
            tooltip,
        })
    }
}

#[cfg(test)]
#[path = "tour_tests.rs"]
mod tests;
