use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::element::ElementSnapshot;
use crate::geometry::{Coordinates, Point};
use crate::DeskError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    DoubleClick,
    RightClick,
    Type,
    Key,
    Hotkey,
    Scroll,
    Drag,
    Wait,
    Move,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::Click,
        ActionKind::DoubleClick,
        ActionKind::RightClick,
        ActionKind::Type,
        ActionKind::Key,
        ActionKind::Hotkey,
        ActionKind::Scroll,
        ActionKind::Drag,
        ActionKind::Wait,
        ActionKind::Move,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::RightClick => "right_click",
            ActionKind::Type => "type",
            ActionKind::Key => "key",
            ActionKind::Hotkey => "hotkey",
            ActionKind::Scroll => "scroll",
            ActionKind::Drag => "drag",
            ActionKind::Wait => "wait",
            ActionKind::Move => "move",
        }
    }

    pub fn is_click(&self) -> bool {
        matches!(
            self,
            ActionKind::Click | ActionKind::DoubleClick | ActionKind::RightClick
        )
    }

    /// Kinds that cannot run without a concrete on-screen point.
    pub fn requires_position(&self) -> bool {
        self.is_click() || matches!(self, ActionKind::Move | ActionKind::Drag)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| DeskError::new(format!("unknown action type: {s}")))
    }
}

/// One instruction of a plan produced by the plan generator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActionPlan {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "element_ref")]
    pub element_id: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Vec<i32>>,
    #[serde(default)]
    pub text: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Seconds between typed characters.
    #[serde(default)]
    pub interval: Option<f64>,
    #[serde(default)]
    pub clicks: Option<i32>,
    #[serde(default)]
    pub keys: Option<Vec<String>>,
}

/// Where a dispatched action lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// The action does not address a screen position.
    Nowhere,
    At(Point),
    Path { from: Point, to: Point },
}

impl ResolvedTarget {
    /// Point the pointer is expected to rest on after the action.
    pub fn expected_pointer(&self) -> Option<Point> {
        match self {
            ResolvedTarget::Nowhere => None,
            ResolvedTarget::At(point) => Some(*point),
            ResolvedTarget::Path { to, .. } => Some(*to),
        }
    }
}

impl ActionPlan {
    pub fn new(kind: ActionKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            element_id: None,
            coordinates: None,
            text: None,
            duration: None,
            interval: None,
            clicks: None,
            keys: None,
        }
    }

    pub fn with_element(mut self, id: impl ToString) -> Self {
        self.element_id = Some(id.to_string());
        self
    }

    pub fn with_coordinates(mut self, coordinates: Vec<i32>) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Raw coordinates parsed into a point or a box.
    pub fn parsed_coordinates(&self) -> Result<Option<Coordinates>, DeskError> {
        self.coordinates
            .as_deref()
            .map(Coordinates::parse)
            .transpose()
    }

    /// Key tokens addressed by `key` (text split on `+`) and `hotkey` (`keys`) actions.
    pub fn key_tokens(&self) -> Vec<String> {
        match self.kind {
            ActionKind::Key => self
                .text
                .as_deref()
                .map(|text| {
                    text.split('+')
                        .map(|token| token.trim().to_ascii_lowercase())
                        .collect()
                })
                .unwrap_or_default(),
            ActionKind::Hotkey => self
                .keys
                .iter()
                .flatten()
                .map(|key| key.trim().to_ascii_lowercase())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Point the action aims at: the referenced element's centre first, then
    /// the raw coordinates (a point, or the centre of a box).
    pub fn target_point(&self, elements: &ElementSnapshot) -> Result<Option<Point>, DeskError> {
        if let Some(center) = self
            .element_id
            .as_deref()
            .and_then(|id| elements.get(id))
            .and_then(|element| element.center())
        {
            return Ok(Some(center));
        }
        Ok(self.parsed_coordinates()?.map(|coords| coords.anchor()))
    }

    pub fn resolve_target(&self, elements: &ElementSnapshot) -> Result<ResolvedTarget, DeskError> {
        match self.kind {
            ActionKind::Drag => match self.parsed_coordinates()? {
                Some(Coordinates::Rect(rect)) => Ok(ResolvedTarget::Path {
                    from: rect.start(),
                    to: rect.end(),
                }),
                _ => Err(DeskError::UnresolvedTarget(
                    "drag needs [x1, y1, x2, y2] coordinates".to_string(),
                )),
            },
            kind if kind.requires_position() => match self.target_point(elements)? {
                Some(point) => Ok(ResolvedTarget::At(point)),
                None => Err(DeskError::UnresolvedTarget(format!(
                    "element_id={:?}, coordinates={:?}",
                    self.element_id, self.coordinates
                ))),
            },
            ActionKind::Scroll => Ok(self
                .target_point(elements)?
                .map(ResolvedTarget::At)
                .unwrap_or(ResolvedTarget::Nowhere)),
            _ => Ok(ResolvedTarget::Nowhere),
        }
    }
}

fn element_ref<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawRef {
        Number(i64),
        Text(String),
    }

    Ok(Option::<RawRef>::deserialize(deserializer)?.map(|raw| match raw {
        RawRef::Number(id) => id.to_string(),
        RawRef::Text(id) => id,
    }))
}
